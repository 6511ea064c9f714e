//! Command-line interface definition for ChatVault
//!
//! This module defines the CLI structure using clap's derive API: session
//! management, search, retention, import and backup commands.

use crate::storage::Role;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ChatVault - local store for AI assistant chat sessions
///
/// Keeps sessions as JSON records on disk, imports exported conversations
/// with duplicate detection, and manages backups.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatvault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Override the data directory
    #[arg(long, env = "CHATVAULT_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for ChatVault
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create the data directory and an empty index
    Init,

    /// Create a new session
    New {
        /// Session title (defaults to the creation time)
        #[arg(short, long)]
        title: Option<String>,

        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Project identifier stored in metadata
        #[arg(short, long)]
        project: Option<String>,

        /// User identifier stored in metadata
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Append a message to a session
    Add {
        /// Session id
        session_id: String,

        /// Message text
        content: String,

        /// Message role (user, assistant, system)
        #[arg(short, long, default_value = "user")]
        role: Role,
    },

    /// Show a session and its messages
    Show {
        /// Session id
        id: String,
    },

    /// Search sessions
    Search {
        /// Case-insensitive text in the title or any message
        keyword: Option<String>,

        /// Require at least one of these tags (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Require a message with this role
        #[arg(short, long)]
        role: Option<Role>,

        /// Only sessions that started strictly after this time
        #[arg(long)]
        since: Option<String>,

        /// Only sessions that started strictly before this time
        #[arg(long)]
        until: Option<String>,

        /// Filter by project metadata
        #[arg(short, long)]
        project: Option<String>,

        /// Filter by user metadata
        #[arg(short, long)]
        user: Option<String>,

        /// Page size (0 returns everything)
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Number of results to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Delete a session
    Delete {
        /// Session id
        id: String,
    },

    /// Show store statistics
    Stats,

    /// Delete sessions older than the retention window
    Cleanup {
        /// Retention in days (overrides storage.retention_days)
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Import exported conversations
    Import {
        /// Files or directories to import (defaults to import.exports_dir)
        paths: Vec<PathBuf>,
    },

    /// Manage backups
    Backup {
        /// Backup subcommand
        #[command(subcommand)]
        command: BackupCommand,
    },
}

/// Backup subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum BackupCommand {
    /// Write a bundle of every session
    Create {
        /// Output file (defaults to a timestamped file in the backup directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List bundles in the backup directory, newest first
    List,

    /// Replace the store contents with a bundle
    Restore {
        /// Bundle file
        path: PathBuf,
    },

    /// Delete bundles beyond storage.max_backups
    Prune,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            data_dir: None,
            verbose: false,
            json: false,
            command: Commands::Stats,
        }
    }
}
