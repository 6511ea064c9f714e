//! Structured logging setup
//!
//! Human-readable or JSON output on stderr, with an optional file copy.
//! `RUST_LOG`, when set, takes precedence over the configured level.

use crate::config::LoggingConfig;
use crate::error::{ChatVaultError, Result};
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for a configured level, scoped to this crate
pub fn filter_directive(level: &str) -> String {
    format!("chatvault={}", level.to_lowercase())
}

/// Initialize the global tracing subscriber
///
/// # Errors
///
/// Fails if the filter is invalid, the log file cannot be opened, or a
/// global subscriber is already installed.
///
/// # Examples
///
/// ```no_run
/// use chatvault::config::LoggingConfig;
/// use chatvault::logging::init_logging;
///
/// let config = LoggingConfig {
///     level: "debug".to_string(),
///     json_format: true,
///     file_path: None,
/// };
/// init_logging(&config).unwrap();
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directive(&config.level)))
        .map_err(|e| ChatVaultError::Config(format!("Invalid log filter: {}", e)))?;

    let file = match &config.file_path {
        Some(path) => Some(Arc::new(
            OpenOptions::new().create(true).append(true).open(path)?,
        )),
        None => None,
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if config.json_format {
        let stderr_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr);
        let file_layer = file.map(|file| fmt::layer().json().with_current_span(true).with_writer(file));
        registry.with(stderr_layer).with(file_layer).try_init()
    } else {
        let stderr_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr);
        let file_layer = file.map(|file| {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .with_writer(file)
        });
        registry.with(stderr_layer).with(file_layer).try_init()
    };

    installed.map_err(|e| ChatVaultError::Config(format!("Failed to install logger: {}", e)).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_is_crate_scoped() {
        assert_eq!(filter_directive("INFO"), "chatvault=info");
        assert!(EnvFilter::try_new(filter_directive("debug")).is_ok());
    }

    #[test]
    fn test_init_logging_rejects_unwritable_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: "info".to_string(),
            json_format: false,
            file_path: Some(dir.path().join("missing").join("vault.log")),
        };
        assert!(init_logging(&config).is_err());
    }
}
