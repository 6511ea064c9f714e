//! ChatVault - local store for AI assistant chat sessions
//!
//! This library persists conversation sessions as JSON records on disk and
//! imports conversations exported by other tools, skipping ones it already
//! holds.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `storage`: Session store (records, index, search, retention, backups)
//! - `import`: Export parsers, duplicate detection and the import coordinator
//! - `events`: Notifications published by the store and importer
//! - `config`: Configuration management and validation
//! - `logging`: Tracing subscriber setup
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```
//! use chatvault::config::StorageConfig;
//! use chatvault::storage::{NewMessage, NewSession, SessionStore};
//!
//! tokio_test::block_on(async {
//!     let dir = tempfile::tempdir().unwrap();
//!     let store = SessionStore::new(StorageConfig::with_data_dir(dir.path()));
//!     store.initialize().await.unwrap();
//!
//!     let session = store.create_session(NewSession::titled("Lifetimes")).await.unwrap();
//!     store
//!         .add_message(&session.id, NewMessage::user("why won't this borrow?"))
//!         .await
//!         .unwrap();
//!
//!     let stored = store.get_session(&session.id).await.unwrap().unwrap();
//!     assert_eq!(stored.message_count(), 1);
//! });
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod import;
pub mod logging;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use error::{ChatVaultError, Result};
pub use import::{ImportCoordinator, ImportReport};
pub use storage::{Session, SessionStore};
