//! Configuration management for ChatVault
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! A [`Config`] is built once and handed to the store and importer by value;
//! nothing in the core reads configuration from ambient state.

use crate::error::{ChatVaultError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for ChatVault
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Session store settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Import pipeline settings
    #[serde(default)]
    pub import: ImportConfig,

    /// Logging output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding the index, session records and backups
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Per-session message cap; the oldest messages are evicted beyond it
    #[serde(default = "default_max_messages")]
    pub max_messages_per_session: usize,

    /// Sessions older than this many days are removed by cleanup.
    /// `None` or `0` disables retention.
    #[serde(default)]
    pub retention_days: Option<u32>,

    /// Number of backup bundles kept by backup pruning
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,

    /// Backup directory override (defaults to `<data_dir>/backups`)
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("com", "chatvault", "chatvault")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".chatvault"))
}

fn default_max_messages() -> usize {
    1000
}

fn default_max_backups() -> usize {
    10
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_messages_per_session: default_max_messages(),
            retention_days: None,
            max_backups: default_max_backups(),
            backup_dir: None,
        }
    }
}

impl StorageConfig {
    /// Build a storage configuration rooted at `data_dir` with default limits
    ///
    /// # Examples
    ///
    /// ```
    /// use chatvault::config::StorageConfig;
    ///
    /// let config = StorageConfig::with_data_dir("/tmp/vault");
    /// assert_eq!(config.max_messages_per_session, 1000);
    /// assert!(config.backups_dir().ends_with("backups"));
    /// ```
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Directory where backup bundles are written and listed
    pub fn backups_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("backups"))
    }

    /// Effective retention window, `None` when retention is disabled
    pub fn effective_retention_days(&self) -> Option<u32> {
        self.retention_days.filter(|days| *days > 0)
    }
}

/// Import pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Directory scanned by `import_all_exports`
    #[serde(default)]
    pub exports_dir: Option<PathBuf>,

    /// Jaccard similarity at or above which two records are duplicates
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Tags added to every imported session
    #[serde(default)]
    pub extra_tags: Vec<String>,
}

fn default_similarity_threshold() -> f64 {
    0.9
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            exports_dir: None,
            similarity_threshold: default_similarity_threshold(),
            extra_tags: Vec::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json_format: bool,

    /// Optional file that receives a copy of every log line
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatVaultError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ChatVaultError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(data_dir) = std::env::var("CHATVAULT_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(max_messages) = std::env::var("CHATVAULT_MAX_MESSAGES") {
            match max_messages.parse() {
                Ok(value) => self.storage.max_messages_per_session = value,
                Err(_) => tracing::warn!("Ignoring invalid CHATVAULT_MAX_MESSAGES: {}", max_messages),
            }
        }

        if let Ok(retention) = std::env::var("CHATVAULT_RETENTION_DAYS") {
            match retention.parse() {
                Ok(value) => self.storage.retention_days = Some(value),
                Err(_) => tracing::warn!("Ignoring invalid CHATVAULT_RETENTION_DAYS: {}", retention),
            }
        }

        if let Ok(max_backups) = std::env::var("CHATVAULT_MAX_BACKUPS") {
            match max_backups.parse() {
                Ok(value) => self.storage.max_backups = value,
                Err(_) => tracing::warn!("Ignoring invalid CHATVAULT_MAX_BACKUPS: {}", max_backups),
            }
        }

        if let Ok(exports_dir) = std::env::var("CHATVAULT_EXPORTS_DIR") {
            self.import.exports_dir = Some(PathBuf::from(exports_dir));
        }

        if let Ok(threshold) = std::env::var("CHATVAULT_SIMILARITY_THRESHOLD") {
            match threshold.parse() {
                Ok(value) => self.import.similarity_threshold = value,
                Err(_) => tracing::warn!(
                    "Ignoring invalid CHATVAULT_SIMILARITY_THRESHOLD: {}",
                    threshold
                ),
            }
        }

        if let Ok(level) = std::env::var("CHATVAULT_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(json_logs) = std::env::var("CHATVAULT_JSON_LOGS") {
            self.logging.json_format = matches!(json_logs.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(data_dir) = &cli.data_dir {
            self.storage.data_dir = data_dir.clone();
        }
        if cli.verbose {
            self.logging.level = "debug".to_string();
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(ChatVaultError::Config("storage.data_dir cannot be empty".to_string()).into());
        }

        if self.storage.max_messages_per_session == 0 {
            return Err(ChatVaultError::Config(
                "storage.max_messages_per_session must be greater than 0".to_string(),
            )
            .into());
        }

        if self.storage.max_backups == 0 {
            return Err(
                ChatVaultError::Config("storage.max_backups must be greater than 0".to_string()).into(),
            );
        }

        let threshold = self.import.similarity_threshold;
        if threshold <= 0.0 || threshold > 1.0 {
            return Err(ChatVaultError::Config(
                "import.similarity_threshold must be between 0.0 and 1.0".to_string(),
            )
            .into());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ChatVaultError::Config(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ))
            .into());
        }

        Ok(())
    }
}
