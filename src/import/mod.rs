//! Import of exported chat files into the session store
//!
//! The [`ImportCoordinator`] walks a batch of files sequentially, parses each
//! with the parser chosen by extension, asks the [`DuplicateDetector`]
//! whether it is already stored and creates a session for every new record.
//! Per-file failures are collected into the [`ImportReport`] and never abort
//! the batch.
//!
//! # Examples
//!
//! ```
//! use chatvault::config::{ImportConfig, StorageConfig};
//! use chatvault::import::ImportCoordinator;
//! use chatvault::storage::SessionStore;
//! use std::sync::Arc;
//!
//! tokio_test::block_on(async {
//!     let dir = tempfile::tempdir().unwrap();
//!     let store = Arc::new(SessionStore::new(StorageConfig::with_data_dir(dir.path().join("data"))));
//!     store.initialize().await.unwrap();
//!
//!     let export = dir.path().join("chat.txt");
//!     std::fs::write(&export, "hello\nhi there\n").unwrap();
//!
//!     let importer = ImportCoordinator::new(store.clone(), ImportConfig::default());
//!     let first = importer.import_files(&[export.clone()]).await;
//!     let second = importer.import_files(&[export]).await;
//!     assert_eq!((first.imported, second.skipped), (1, 1));
//! });
//! ```

pub mod dedup;
pub mod metrics;
pub mod parsers;

pub use dedup::{jaccard_similarity, DuplicateDetector, DuplicateMatch, SessionLookup, Verdict};
pub use parsers::{
    content_hash, derive_import_id, parse_file, ExportFormat, ImportMetadata, ImportRecord,
    ImportedMessage, IMPORT_SOURCE,
};

use crate::config::ImportConfig;
use crate::error::{ChatVaultError, Result};
use crate::events::{EventSink, VaultEvent};
use crate::storage::{Message, NewSession, SessionMetadata, SessionStore};
use chrono::Utc;
use self::metrics::{BatchMetrics, FileOutcomeLabel};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Tag carried by every imported session
pub const IMPORTED_TAG: &str = "imported";

/// Result of importing one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// A new session was created with this id
    Imported(String),
    Duplicate,
    /// The file parsed to zero messages
    Empty,
}

/// A file that could not be imported
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Per-batch summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<ImportFailure>,
    /// Ids of sessions created in this batch, in processing order
    pub session_ids: Vec<String>,
}

/// Drives parse, duplicate check and persist for batches of export files
pub struct ImportCoordinator {
    store: Arc<SessionStore>,
    config: ImportConfig,
    detector: DuplicateDetector,
    events: Option<Arc<dyn EventSink>>,
}

impl ImportCoordinator {
    pub fn new(store: Arc<SessionStore>, config: ImportConfig) -> Self {
        let detector = DuplicateDetector::new(config.similarity_threshold);
        Self {
            store,
            config,
            detector,
            events: None,
        }
    }

    pub fn with_events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    fn publish(&self, event: VaultEvent) {
        if let Some(sink) = &self.events {
            sink.publish(event);
        }
    }

    /// Import every supported file under the configured exports directory
    ///
    /// # Errors
    ///
    /// Fails when no exports directory is configured or it cannot be read.
    pub async fn import_all_exports(&self) -> Result<ImportReport> {
        let dir = self.config.exports_dir.clone().ok_or_else(|| {
            ChatVaultError::Config("import.exports_dir is not configured".to_string())
        })?;
        if !tokio::fs::try_exists(&dir).await? {
            return Err(ChatVaultError::Config(format!(
                "exports directory {} does not exist",
                dir.display()
            ))
            .into());
        }

        let files = discover_exports(dir).await?;
        tracing::info!(files = files.len(), "Importing exports directory");
        Ok(self.import_files(&files).await)
    }

    /// Import the given files in order
    ///
    /// Directories are expanded to the supported files beneath them.
    pub async fn import_files(&self, paths: &[PathBuf]) -> ImportReport {
        let mut report = ImportReport::default();
        let mut metrics = BatchMetrics::start();

        for path in paths {
            let is_dir = tokio::fs::metadata(path)
                .await
                .map(|metadata| metadata.is_dir())
                .unwrap_or(false);
            if is_dir {
                match discover_exports(path.clone()).await {
                    Ok(files) => {
                        for file in files {
                            self.process(&file, &mut report, &mut metrics).await;
                        }
                    }
                    Err(e) => self.fail(path, &e, &mut report, &mut metrics),
                }
            } else {
                self.process(path, &mut report, &mut metrics).await;
            }
        }

        metrics.finish();
        tracing::info!(
            imported = report.imported,
            skipped = report.skipped,
            errors = report.errors.len(),
            "Import batch completed"
        );
        self.publish(VaultEvent::BatchCompleted {
            imported: report.imported,
            skipped: report.skipped,
            errors: report.errors.len(),
        });
        report
    }

    async fn process(&self, path: &Path, report: &mut ImportReport, metrics: &mut BatchMetrics) {
        match self.import_single_file(path).await {
            Ok(FileOutcome::Imported(id)) => {
                report.imported += 1;
                report.session_ids.push(id);
                metrics.record_file(FileOutcomeLabel::Imported);
            }
            Ok(FileOutcome::Duplicate) => {
                report.skipped += 1;
                metrics.record_file(FileOutcomeLabel::Duplicate);
            }
            Ok(FileOutcome::Empty) => metrics.record_file(FileOutcomeLabel::Empty),
            Err(e) => self.fail(path, &e, report, metrics),
        }
    }

    fn fail(
        &self,
        path: &Path,
        error: &anyhow::Error,
        report: &mut ImportReport,
        metrics: &mut BatchMetrics,
    ) {
        let message = format!("{:#}", error);
        tracing::warn!(path = %path.display(), "Import failed: {}", message);
        metrics.record_file(FileOutcomeLabel::Error);
        self.publish(VaultEvent::ImportFailed {
            path: path.to_path_buf(),
            error: message.clone(),
        });
        report.errors.push(ImportFailure {
            path: path.to_path_buf(),
            message,
        });
    }

    /// Parse one file, check it for duplicates and persist it if new
    ///
    /// # Errors
    ///
    /// Returns [`ChatVaultError::UnsupportedFormat`] for unknown extensions,
    /// parse and validation errors, and store write failures.
    pub async fn import_single_file(&self, path: &Path) -> Result<FileOutcome> {
        let record = parse_file(path).await?;

        if record.messages.is_empty() {
            tracing::debug!(path = %path.display(), "Export has no messages; skipping");
            self.publish(VaultEvent::FileSkipped {
                path: path.to_path_buf(),
                reason: "no messages".to_string(),
            });
            return Ok(FileOutcome::Empty);
        }

        let mut verdict = self.detector.check(&record, self.store.as_ref()).await?;
        // Content checks miss records the store truncated to its cap; the
        // derived id still identifies the same file bytes.
        if matches!(verdict, Verdict::New) {
            if let Some(existing) = self.store.get_session(&record.id).await? {
                verdict = Verdict::Duplicate(DuplicateMatch::SameId {
                    session_id: existing.id,
                });
            }
        }

        if let Verdict::Duplicate(found) = verdict {
            tracing::info!(path = %path.display(), "Skipping duplicate: {}", found.describe());
            self.publish(VaultEvent::FileSkipped {
                path: path.to_path_buf(),
                reason: found.describe(),
            });
            return Ok(FileOutcome::Duplicate);
        }

        let session = self.store.create_session(self.session_spec(record)).await?;
        tracing::info!(
            path = %path.display(),
            session_id = %session.id,
            messages = session.message_count(),
            "Imported export"
        );
        self.publish(VaultEvent::FileImported {
            path: path.to_path_buf(),
            session_id: session.id.clone(),
        });
        Ok(FileOutcome::Imported(session.id))
    }

    fn session_spec(&self, record: ImportRecord) -> NewSession {
        let mut tags = vec![
            IMPORTED_TAG.to_string(),
            format!("format:{}", record.metadata.export_format),
        ];
        tags.extend(self.config.extra_tags.iter().cloned());

        let end_time = record
            .messages
            .iter()
            .map(|m| m.timestamp)
            .max()
            .filter(|last| *last > record.timestamp);

        let metadata = SessionMetadata {
            source: Some(record.metadata.source.clone()),
            import_date: Some(Utc::now()),
            file_hash: Some(record.metadata.file_hash.clone()),
            export_format: Some(record.metadata.export_format.as_str().to_string()),
            source_file: record.metadata.source_file.clone(),
            estimated_duration_secs: record.metadata.estimated_duration_secs,
            total_messages: record.metadata.message_count,
            ..SessionMetadata::default()
        };

        NewSession {
            id: Some(record.id),
            title: Some(record.title),
            tags,
            metadata: Some(metadata),
            start_time: Some(record.timestamp),
            end_time,
            messages: record
                .messages
                .into_iter()
                .map(|m| Message::new(m.role, m.content, m.timestamp))
                .collect(),
        }
    }
}

/// Supported export files under `dir`, hidden entries skipped, sorted by path
async fn discover_exports(dir: PathBuf) -> Result<Vec<PathBuf>> {
    let walk = tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let entries = WalkDir::new(&dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));
        for entry in entries {
            let entry = entry.map_err(|e| {
                ChatVaultError::Import(format!("Failed to walk {}: {}", dir.display(), e))
            })?;
            if entry.file_type().is_file() && ExportFormat::from_path(entry.path()).is_some() {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    });
    walk.await
        .map_err(|e| ChatVaultError::Import(format!("Export discovery task failed: {}", e)))?
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|n| n.starts_with('.')).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::events::channel;
    use crate::storage::SearchFilter;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Arc<SessionStore>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SessionStore::new(StorageConfig::with_data_dir(
            dir.path().join("data"),
        )));
        store.initialize().await.unwrap();
        (dir, store)
    }

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_import_creates_session_with_provenance() {
        let (dir, store) = setup().await;
        let config = ImportConfig {
            extra_tags: vec!["laptop".to_string()],
            ..ImportConfig::default()
        };
        let importer = ImportCoordinator::new(store.clone(), config);
        let path = write(
            dir.path(),
            "rust.md",
            "# Borrowing\n**User:** what is a borrow?\n**Assistant:** a reference\n",
        );

        let outcome = importer.import_single_file(&path).await.unwrap();
        let id = match outcome {
            FileOutcome::Imported(id) => id,
            other => panic!("expected import, got {:?}", other),
        };
        assert!(id.starts_with("import-"));

        let session = store.get_session(&id).await.unwrap().unwrap();
        assert_eq!(session.title, "Borrowing");
        assert_eq!(session.message_count(), 2);
        assert_eq!(session.tags, vec!["imported", "format:markdown", "laptop"]);
        assert_eq!(session.metadata.source.as_deref(), Some(IMPORT_SOURCE));
        assert_eq!(session.metadata.export_format.as_deref(), Some("markdown"));
        assert_eq!(session.metadata.total_messages, 2);
        assert!(session.metadata.file_hash.is_some());
        assert!(session.metadata.import_date.is_some());
    }

    #[tokio::test]
    async fn test_reimport_is_skipped() {
        let (dir, store) = setup().await;
        let importer = ImportCoordinator::new(store.clone(), ImportConfig::default());
        let path = write(dir.path(), "log.txt", "question\nanswer\n");

        let first = importer.import_files(&[path.clone()]).await;
        let second = importer.import_files(&[path]).await;

        assert_eq!(first.imported, 1);
        assert_eq!(second.imported, 0);
        assert_eq!(second.skipped, 1);
        assert!(second.errors.is_empty());
        assert_eq!(store.list_session_ids().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reimport_of_capped_export_keeps_later_messages() {
        let dir = TempDir::new().unwrap();
        let mut config = StorageConfig::with_data_dir(dir.path().join("data"));
        config.max_messages_per_session = 2;
        let store = Arc::new(SessionStore::new(config));
        store.initialize().await.unwrap();
        let importer = ImportCoordinator::new(store.clone(), ImportConfig::default());
        let path = write(dir.path(), "long.txt", "a one\nb two\nc three\n");

        let first = importer.import_files(&[path.clone()]).await;
        assert_eq!((first.imported, first.skipped), (1, 0));
        let id = first.session_ids[0].clone();
        store
            .add_message(&id, crate::storage::NewMessage::user("kept note"))
            .await
            .unwrap();

        let second = importer.import_files(&[path]).await;
        assert_eq!((second.imported, second.skipped), (0, 1));
        assert!(second.errors.is_empty());

        let session = store.get_session(&id).await.unwrap().unwrap();
        let contents: Vec<&str> = session.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["c three", "kept note"]);
    }

    #[tokio::test]
    async fn test_batch_isolates_errors_and_empty_files() {
        let (dir, store) = setup().await;
        let (sink, mut rx) = channel();
        let importer =
            ImportCoordinator::new(store.clone(), ImportConfig::default()).with_events(sink);

        let good = write(dir.path(), "good.txt", "a\nb\n");
        let empty = write(dir.path(), "empty.md", "just a preamble\n");
        let broken = write(dir.path(), "broken.json", "{not json");
        let unsupported = write(dir.path(), "slides.pdf", "%PDF");
        let missing = dir.path().join("missing.txt");

        let report = importer
            .import_files(&[good, empty, broken.clone(), unsupported.clone(), missing])
            .await;

        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.errors.len(), 3);
        assert_eq!(report.errors[0].path, broken);
        assert_eq!(report.errors[1].path, unsupported);
        assert_eq!(report.session_ids.len(), 1);

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        assert_eq!(
            last,
            Some(VaultEvent::BatchCompleted {
                imported: 1,
                skipped: 0,
                errors: 3
            })
        );
    }

    #[tokio::test]
    async fn test_similar_export_collapses_to_one_session() {
        let (dir, store) = setup().await;
        let importer = ImportCoordinator::new(store.clone(), ImportConfig::default());
        let words = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu \
                     one two three four five six seven eight";
        let a = write(
            dir.path(),
            "a/chat.txt",
            &format!("{} nu\n{}\n", words, words),
        );
        let b = write(
            dir.path(),
            "b/chat.txt",
            &format!("{} xi\n{}\n", words, words),
        );

        let report = importer.import_files(&[a, b]).await;
        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, 1);

        let result = store.search_sessions(&SearchFilter::default()).await.unwrap();
        assert_eq!(result.total_count, 1);
    }

    #[tokio::test]
    async fn test_import_all_exports_walks_sorted_and_skips_hidden() {
        let (dir, store) = setup().await;
        let exports = dir.path().join("exports");
        write(&exports, "b.txt", "two\nlines\n");
        write(&exports, "nested/a.md", "**User:** hi\n**Claude:** hello\n");
        write(&exports, ".hidden/c.txt", "secret\nstuff\n");
        write(&exports, "notes.pdf", "ignored");

        let importer = ImportCoordinator::new(
            store.clone(),
            ImportConfig {
                exports_dir: Some(exports.clone()),
                ..ImportConfig::default()
            },
        );
        let report = importer.import_all_exports().await.unwrap();
        assert_eq!(report.imported, 2);
        assert!(report.errors.is_empty());

        let files = discover_exports(exports.clone()).await.unwrap();
        assert_eq!(files, vec![exports.join("b.txt"), exports.join("nested/a.md")]);
    }

    #[tokio::test]
    async fn test_import_all_exports_requires_directory() {
        let (dir, store) = setup().await;
        let unconfigured = ImportCoordinator::new(store.clone(), ImportConfig::default());
        assert!(unconfigured.import_all_exports().await.is_err());

        let missing = ImportCoordinator::new(
            store,
            ImportConfig {
                exports_dir: Some(dir.path().join("nope")),
                ..ImportConfig::default()
            },
        );
        let err = missing.import_all_exports().await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
