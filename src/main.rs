//! ChatVault - local store for AI assistant chat sessions
//!
#![doc = "Main entry point for the ChatVault command-line tool."]

use anyhow::Result;

use chatvault::cli::Cli;
use chatvault::commands;
use chatvault::config::Config;
use chatvault::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    init_logging(&config.logging)?;
    tracing::debug!(data_dir = %config.storage.data_dir.display(), "Configuration loaded");

    commands::run(cli, config).await
}
