//! Backup bundles: point-in-time exports of every session
//!
//! A bundle is a single JSON document holding descriptive metadata and the
//! full session bodies. Restoring is destructive: the store is emptied and
//! the bundle replayed through `SessionStore::import_session`. Neither
//! direction is atomic; an interrupted restore leaves a partially
//! populated store.

use crate::error::{ChatVaultError, Result};
use crate::events::VaultEvent;
use crate::storage::codec::{self, format_timestamp};
use crate::storage::types::Session;
use crate::storage::{write_atomic, SessionStore};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Version tag written into bundle metadata
pub const BACKUP_VERSION: &str = "1.0";

const BACKUP_PREFIX: &str = "backup-";

/// Descriptive header of a backup bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub version: String,
    #[serde(with = "codec::timestamp")]
    pub created_at: DateTime<Utc>,
    pub session_count: usize,
    pub total_messages: usize,
}

/// A complete backup bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupBundle {
    pub metadata: BackupMetadata,
    pub sessions: Vec<Session>,
}

/// Bundle as read during restore; sessions are decoded one at a time so a
/// single bad entry does not sink the whole restore
#[derive(Debug, Deserialize)]
struct RawBundle {
    metadata: BackupMetadata,
    #[serde(default)]
    sessions: Vec<Value>,
}

/// A bundle file on disk
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

/// Where a new bundle was written and what it holds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedBackup {
    pub path: PathBuf,
    pub metadata: BackupMetadata,
}

/// Outcome of a restore
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RestoreReport {
    pub restored: usize,
    pub errors: Vec<String>,
}

impl SessionStore {
    fn default_backup_path(&self, now: DateTime<Utc>) -> PathBuf {
        self.config().backups_dir().join(format!(
            "{}{}.json",
            BACKUP_PREFIX,
            now.format("%Y%m%dT%H%M%S%3fZ")
        ))
    }

    /// Write a bundle of every indexed session
    ///
    /// Uses `path` when given, else a timestamped file in the backup directory.
    pub async fn create_backup(&self, path: Option<&Path>) -> Result<CreatedBackup> {
        let now = codec::now_millis();
        let sessions = self.load_all().await?;
        let metadata = BackupMetadata {
            version: BACKUP_VERSION.to_string(),
            created_at: now,
            session_count: sessions.len(),
            total_messages: sessions.iter().map(Session::message_count).sum(),
        };
        let bundle = BackupBundle {
            metadata: metadata.clone(),
            sessions,
        };

        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_backup_path(now));
        let bytes = serde_json::to_vec_pretty(&bundle).context("Failed to serialize backup")?;
        write_atomic(&path, &bytes).await?;

        tracing::info!(
            path = %path.display(),
            sessions = metadata.session_count,
            created_at = %format_timestamp(&metadata.created_at),
            "Created backup"
        );
        self.publish(VaultEvent::BackupCreated {
            path: path.clone(),
            sessions: metadata.session_count,
        });
        Ok(CreatedBackup { path, metadata })
    }

    /// Bundles in the backup directory, newest first
    pub async fn get_backup_list(&self) -> Result<Vec<BackupInfo>> {
        let dir = self.config().backups_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list backups in {}", dir.display()))
            }
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            backups.push(BackupInfo {
                path,
                size_bytes: metadata.len(),
                modified: DateTime::<Utc>::from(metadata.modified()?),
            });
        }

        backups.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.path.cmp(&a.path))
        });
        Ok(backups)
    }

    /// Delete all but the newest `max_backups` bundles; returns how many were deleted
    pub async fn cleanup_old_backups(&self) -> Result<usize> {
        let keep = self.config().max_backups;
        let mut deleted = 0;
        for backup in self.get_backup_list().await?.into_iter().skip(keep) {
            tokio::fs::remove_file(&backup.path)
                .await
                .with_context(|| format!("Failed to delete backup {}", backup.path.display()))?;
            tracing::debug!(path = %backup.path.display(), "Deleted old backup");
            deleted += 1;
        }
        if deleted > 0 {
            tracing::info!(deleted, kept = keep, "Pruned old backups");
        }
        Ok(deleted)
    }

    /// Replace the store's contents with the sessions in a bundle
    ///
    /// The bundle is parsed before anything is deleted, so an unreadable
    /// file leaves the store untouched. Entries that fail to decode or
    /// validate are reported in [`RestoreReport::errors`] and skipped.
    pub async fn restore_from_backup(&self, path: &Path) -> Result<RestoreReport> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read backup {}", path.display()))?;
        let bundle: RawBundle = serde_json::from_slice(&bytes).map_err(|e| {
            ChatVaultError::Validation(format!("Malformed backup {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            version = %bundle.metadata.version,
            sessions = bundle.sessions.len(),
            "Restoring backup"
        );

        self.clear_all().await?;

        let mut report = RestoreReport::default();
        for (position, value) in bundle.sessions.into_iter().enumerate() {
            let label = value
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("entry {}", position));

            let outcome = match codec::decode_session_value(value) {
                Ok(session) => self.import_session(session, true).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(_) => report.restored += 1,
                Err(e) => {
                    tracing::warn!(session = %label, "Failed to restore session: {:#}", e);
                    report.errors.push(format!("{}: {:#}", label, e));
                }
            }
        }

        tracing::info!(
            restored = report.restored,
            errors = report.errors.len(),
            "Restore finished"
        );
        self.publish(VaultEvent::RestoreCompleted {
            restored: report.restored,
            errors: report.errors.len(),
        });
        Ok(report)
    }
}
