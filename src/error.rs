//! Error types for ChatVault
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for ChatVault operations
///
/// Store operations only surface [`ChatVaultError::NotFound`] from
/// `add_message`; lookups that miss return `None` or `false` instead.
/// Batch operations (import, restore) collect per-item failures into
/// their reports rather than returning them.
#[derive(Error, Debug)]
pub enum ChatVaultError {
    /// A session required by the operation does not exist
    #[error("Session not found: {0}")]
    NotFound(String),

    /// A record or request failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage backend failures (index, record and backup files)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Import pipeline errors (parsing, duplicate detection)
    #[error("Import error: {0}")]
    Import(String),

    /// File extension has no registered parser
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ChatVaultError {
    /// Returns true when `err` wraps a [`ChatVaultError::NotFound`]
    ///
    /// # Examples
    ///
    /// ```
    /// use chatvault::error::ChatVaultError;
    ///
    /// let err: anyhow::Error = ChatVaultError::NotFound("abc".to_string()).into();
    /// assert!(ChatVaultError::is_not_found(&err));
    /// ```
    pub fn is_not_found(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<ChatVaultError>(),
            Some(ChatVaultError::NotFound(_))
        )
    }

    /// Returns true when `err` wraps a [`ChatVaultError::Validation`]
    pub fn is_validation(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<ChatVaultError>(),
            Some(ChatVaultError::Validation(_))
        )
    }
}

/// Result type alias for ChatVault operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
