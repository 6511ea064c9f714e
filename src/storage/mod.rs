//! File-backed session store
//!
//! Layout under the configured data directory:
//!
//! ```text
//! <data_dir>/index.json          ordered list of known session ids
//! <data_dir>/sessions/<id>.json  one record per session
//! <data_dir>/backups/            backup bundles (see `backup`)
//! ```
//!
//! The index is the source of truth for which sessions exist. Every write
//! replaces a whole file through a temp-file rename. The store assumes a
//! single writer: two concurrent `add_message` calls on the same session
//! race and the last one to finish wins.

use crate::config::StorageConfig;
use crate::error::{ChatVaultError, Result};
use crate::events::{EventSink, VaultEvent};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod backup;
pub mod codec;
pub mod types;

pub use backup::{BackupBundle, BackupInfo, BackupMetadata, CreatedBackup, RestoreReport};
pub use codec::IndexRecord;
pub use types::{
    new_message_id, new_session_id, validate_session_id, AddedMessage, Message, NewMessage,
    NewSession, Role, SearchFilter, SearchResult, Session, SessionMetadata, SessionUpdate,
    StoreStats,
};

const INDEX_FILE: &str = "index.json";
const SESSIONS_DIR: &str = "sessions";
const RECORD_EXTENSION: &str = "json";

/// Session store over a directory of JSON records
pub struct SessionStore {
    config: StorageConfig,
    events: Option<Arc<dyn EventSink>>,
}

impl SessionStore {
    /// Create a store for the given configuration
    ///
    /// No I/O happens until [`SessionStore::initialize`] or the first operation.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatvault::config::StorageConfig;
    /// use chatvault::storage::{NewSession, NewMessage, SessionStore};
    ///
    /// # tokio_test::block_on(async {
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = SessionStore::new(StorageConfig::with_data_dir(dir.path()));
    /// store.initialize().await.unwrap();
    ///
    /// let session = store.create_session(NewSession::titled("Demo")).await.unwrap();
    /// store.add_message(&session.id, NewMessage::user("hi")).await.unwrap();
    ///
    /// let loaded = store.get_session(&session.id).await.unwrap().unwrap();
    /// assert_eq!(loaded.messages.len(), 1);
    /// # });
    /// ```
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            events: None,
        }
    }

    /// Attach a sink that receives a [`VaultEvent`] for every mutation
    pub fn with_events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    fn index_path(&self) -> PathBuf {
        self.config.data_dir.join(INDEX_FILE)
    }

    fn sessions_dir(&self) -> PathBuf {
        self.config.data_dir.join(SESSIONS_DIR)
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.sessions_dir()
            .join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    pub(crate) fn publish(&self, event: VaultEvent) {
        if let Some(sink) = &self.events {
            sink.publish(event);
        }
    }

    /// Ensure the data directory and index exist
    ///
    /// Idempotent: an existing index is left untouched.
    pub async fn initialize(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.sessions_dir())
            .await
            .with_context(|| {
                format!(
                    "Failed to create session directory {}",
                    self.sessions_dir().display()
                )
            })?;

        if !tokio::fs::try_exists(self.index_path()).await? {
            self.write_index(&IndexRecord::empty()).await?;
            tracing::info!("Created empty session index at {}", self.index_path().display());
        }

        Ok(())
    }

    /// Create and persist a new session
    ///
    /// Generates an id when none is given and defaults the title to the
    /// creation time. An explicit id that already exists overwrites the
    /// stored body.
    ///
    /// # Errors
    ///
    /// Returns [`ChatVaultError::Validation`] for ids that cannot name a
    /// record file, or a storage error if the write fails.
    pub async fn create_session(&self, request: NewSession) -> Result<Session> {
        let now = codec::now_millis();
        let id = request.id.unwrap_or_else(new_session_id);
        validate_session_id(&id)?;

        let title = request
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| format!("Session {}", now.format("%Y-%m-%d %H:%M:%S")));

        let mut tags: Vec<String> = Vec::with_capacity(request.tags.len());
        for tag in request.tags {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        let mut session = Session {
            id,
            title,
            start_time: request.start_time.unwrap_or(now),
            end_time: request.end_time,
            messages: request.messages,
            tags,
            metadata: request.metadata.unwrap_or_default(),
        };
        let evicted = session.truncate_to(self.config.max_messages_per_session);
        if evicted > 0 {
            tracing::warn!(
                session_id = %session.id,
                evicted,
                "Initial messages exceed the per-session cap; oldest dropped"
            );
        }
        round_timestamps(&mut session);

        self.write_session(&session).await?;
        let mut index = self.read_index().await?;
        if index.insert(&session.id) {
            self.write_index(&index).await?;
        }

        tracing::info!(session_id = %session.id, title = %session.title, "Created session");
        self.publish(VaultEvent::SessionCreated {
            id: session.id.clone(),
        });
        Ok(session)
    }

    /// Append a message to a session
    ///
    /// Assigns a fresh id and timestamp. When the session exceeds the
    /// configured cap, the oldest messages are evicted and the count is
    /// reported in [`AddedMessage::evicted`].
    ///
    /// # Errors
    ///
    /// Returns [`ChatVaultError::NotFound`] when the session does not exist.
    pub async fn add_message(&self, session_id: &str, message: NewMessage) -> Result<AddedMessage> {
        let mut session = self
            .get_session(session_id)
            .await?
            .ok_or_else(|| ChatVaultError::NotFound(session_id.to_string()))?;

        let message = Message {
            id: new_message_id(),
            role: message.role,
            content: message.content,
            timestamp: codec::now_millis(),
            metadata: message.metadata,
        };
        session.messages.push(message.clone());
        let evicted = session.truncate_to(self.config.max_messages_per_session);
        if evicted > 0 {
            tracing::debug!(session_id, evicted, "Evicted oldest messages over cap");
        }

        self.write_session(&session).await?;

        self.publish(VaultEvent::MessageAdded {
            session_id: session.id.clone(),
            message_id: message.id.clone(),
            evicted,
        });
        Ok(AddedMessage { message, evicted })
    }

    /// Load a session by id; `None` when it does not exist
    pub async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        if validate_session_id(id).is_err() {
            return Ok(None);
        }
        self.read_session(id).await
    }

    /// Shallow-merge `update` over the stored session
    ///
    /// Returns `None` when the session does not exist. The id never changes.
    pub async fn update_session(&self, id: &str, update: SessionUpdate) -> Result<Option<Session>> {
        let Some(mut session) = self.get_session(id).await? else {
            return Ok(None);
        };

        if let Some(title) = update.title {
            session.title = title;
        }
        if let Some(start_time) = update.start_time {
            session.start_time = start_time;
        }
        if let Some(end_time) = update.end_time {
            session.end_time = Some(end_time);
        }
        if let Some(tags) = update.tags {
            session.tags = tags;
        }
        if let Some(metadata) = update.metadata {
            session.metadata = metadata;
        }
        session.metadata.total_messages = session.messages.len();
        round_timestamps(&mut session);

        self.write_session(&session).await?;
        tracing::debug!(session_id = %id, "Updated session");
        self.publish(VaultEvent::SessionUpdated { id: id.to_string() });
        Ok(Some(session))
    }

    /// Remove a session; returns whether anything was removed
    ///
    /// The index entry goes first, then the record file. A crash in between
    /// leaves an unindexed record that searches never see.
    pub async fn delete_session(&self, id: &str) -> Result<bool> {
        if validate_session_id(id).is_err() {
            return Ok(false);
        }

        let mut index = self.read_index().await?;
        let unindexed = index.remove(id);
        if unindexed {
            self.write_index(&index).await?;
        }

        let removed_file = match tokio::fs::remove_file(self.session_path(id)).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to delete session record {}", id))
            }
        };

        let deleted = unindexed || removed_file;
        if deleted {
            tracing::info!(session_id = %id, "Deleted session");
            self.publish(VaultEvent::SessionDeleted { id: id.to_string() });
        }
        Ok(deleted)
    }

    /// Session ids in index order
    pub async fn list_session_ids(&self) -> Result<Vec<String>> {
        Ok(self.read_index().await?.sessions)
    }

    /// Filter, sort and page every indexed session
    ///
    /// Reads every record on each call. Results are ordered by start time,
    /// newest first.
    pub async fn search_sessions(&self, filter: &SearchFilter) -> Result<SearchResult> {
        let mut matches: Vec<Session> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|session| filter.matches(session))
            .collect();
        matches.sort_by(|a, b| b.start_time.cmp(&a.start_time));

        let total_count = matches.len();
        let limit = filter.limit.filter(|limit| *limit > 0);
        let sessions: Vec<Session> = match limit {
            Some(limit) => matches.into_iter().skip(filter.offset).take(limit).collect(),
            None => matches.into_iter().skip(filter.offset).collect(),
        };

        let (current_page, total_pages) = match limit {
            Some(limit) => (filter.offset / limit + 1, (total_count + limit - 1) / limit),
            None => (1, usize::from(total_count > 0)),
        };
        let has_more = filter.offset + sessions.len() < total_count;

        tracing::debug!(total_count, returned = sessions.len(), "Searched sessions");
        Ok(SearchResult {
            sessions,
            total_count,
            has_more,
            current_page,
            total_pages,
        })
    }

    /// Aggregate counts, time bounds and on-disk size
    pub async fn get_stats(&self) -> Result<StoreStats> {
        let sessions = self.load_all().await?;
        let total_sessions = sessions.len();
        let total_messages: usize = sessions.iter().map(Session::message_count).sum();
        let oldest_session = sessions.iter().map(|s| s.start_time).min();
        let newest_session = sessions.iter().map(|s| s.start_time).max();

        let data_dir = self.config.data_dir.clone();
        let storage_size_bytes = tokio::task::spawn_blocking(move || directory_size(&data_dir))
            .await
            .context("Storage size task failed")?;

        let average_messages_per_session = if total_sessions == 0 {
            0.0
        } else {
            total_messages as f64 / total_sessions as f64
        };

        Ok(StoreStats {
            total_sessions,
            total_messages,
            average_messages_per_session,
            oldest_session,
            newest_session,
            storage_size_bytes,
        })
    }

    /// Delete sessions that started before `now - retention_days`
    ///
    /// `None` or `Some(0)` disables retention and deletes nothing.
    pub async fn cleanup(&self, retention_days: Option<u32>) -> Result<usize> {
        let Some(days) = retention_days.filter(|days| *days > 0) else {
            tracing::debug!("Retention disabled; skipping cleanup");
            return Ok(0);
        };

        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let mut deleted = 0;
        for session in self.load_all().await? {
            if session.start_time < cutoff && self.delete_session(&session.id).await? {
                deleted += 1;
            }
        }

        tracing::info!(deleted, retention_days = days, "Retention cleanup finished");
        self.publish(VaultEvent::CleanupCompleted { deleted });
        Ok(deleted)
    }

    /// Persist a fully-formed session as-is
    ///
    /// Used by restore. Without `overwrite`, an existing record is left
    /// untouched and `false` is returned.
    pub async fn import_session(&self, mut session: Session, overwrite: bool) -> Result<bool> {
        codec::validate_session(&session)?;

        if !overwrite && tokio::fs::try_exists(self.session_path(&session.id)).await? {
            tracing::debug!(session_id = %session.id, "Session exists; not overwriting");
            return Ok(false);
        }

        let evicted = session.truncate_to(self.config.max_messages_per_session);
        if evicted > 0 {
            tracing::warn!(
                session_id = %session.id,
                evicted,
                "Stored session exceeds the per-session cap; oldest dropped"
            );
        }
        round_timestamps(&mut session);
        self.write_session(&session).await?;
        let mut index = self.read_index().await?;
        if index.insert(&session.id) {
            self.write_index(&index).await?;
        }
        Ok(true)
    }

    /// Remove every session record and reset the index; returns records removed
    pub(crate) async fn clear_all(&self) -> Result<usize> {
        let mut removed = 0;
        match tokio::fs::read_dir(self.sessions_dir()).await {
            Ok(mut entries) => {
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    if path.extension().is_some_and(|ext| ext == RECORD_EXTENSION) {
                        tokio::fs::remove_file(&path)
                            .await
                            .with_context(|| format!("Failed to remove {}", path.display()))?;
                        removed += 1;
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e).context("Failed to read session directory"),
        }

        self.write_index(&IndexRecord::empty()).await?;
        tracing::info!(removed, "Cleared all sessions");
        Ok(removed)
    }

    /// Every readable session named by the index
    pub(crate) async fn load_all(&self) -> Result<Vec<Session>> {
        let index = self.read_index().await?;
        let mut sessions = Vec::with_capacity(index.sessions.len());
        for id in &index.sessions {
            match self.read_session(id).await {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => tracing::warn!(session_id = %id, "Index entry has no record"),
                Err(e) => tracing::warn!(session_id = %id, "Skipping unreadable session: {:#}", e),
            }
        }
        Ok(sessions)
    }

    async fn read_index(&self) -> Result<IndexRecord> {
        match tokio::fs::read(self.index_path()).await {
            Ok(bytes) => codec::decode_index(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(IndexRecord::empty()),
            Err(e) => Err(ChatVaultError::Storage(format!("Failed to read session index: {}", e)).into()),
        }
    }

    async fn write_index(&self, index: &IndexRecord) -> Result<()> {
        write_atomic(&self.index_path(), &codec::encode_index(index)?).await
    }

    async fn read_session(&self, id: &str) -> Result<Option<Session>> {
        match tokio::fs::read(self.session_path(id)).await {
            Ok(bytes) => {
                let session = codec::decode_session(&bytes)
                    .with_context(|| format!("Failed to decode session {}", id))?;
                Ok(Some(session))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read session {}", id)),
        }
    }

    async fn write_session(&self, session: &Session) -> Result<()> {
        let bytes = codec::encode_session(session)?;
        write_atomic(&self.session_path(&session.id), &bytes).await?;
        tracing::debug!(session_id = %session.id, bytes = bytes.len(), "Wrote session record");
        Ok(())
    }
}

/// Bring every timestamp to the precision records are written with
fn round_timestamps(session: &mut Session) {
    session.start_time = codec::to_millis(session.start_time);
    session.end_time = session.end_time.map(codec::to_millis);
    for message in &mut session.messages {
        message.timestamp = codec::to_millis(message.timestamp);
    }
}

/// Write `bytes` to a sibling temp file and rename it over `path`
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

fn directory_size(root: &Path) -> u64 {
    walkdir::WalkDir::new(root)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}
