//! Store and import notifications
//!
//! The store and the import coordinator publish [`VaultEvent`]s to an
//! optional [`EventSink`] supplied at construction. They keep no listener
//! bookkeeping of their own; fan-out, buffering and filtering belong to the
//! sink.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Something observable happened to the store or an import batch
#[derive(Debug, Clone, PartialEq)]
pub enum VaultEvent {
    SessionCreated {
        id: String,
    },
    MessageAdded {
        session_id: String,
        message_id: String,
        /// Oldest messages dropped by the per-session cap
        evicted: usize,
    },
    SessionUpdated {
        id: String,
    },
    SessionDeleted {
        id: String,
    },
    CleanupCompleted {
        deleted: usize,
    },
    BackupCreated {
        path: PathBuf,
        sessions: usize,
    },
    RestoreCompleted {
        restored: usize,
        errors: usize,
    },
    FileImported {
        path: PathBuf,
        session_id: String,
    },
    FileSkipped {
        path: PathBuf,
        reason: String,
    },
    ImportFailed {
        path: PathBuf,
        error: String,
    },
    BatchCompleted {
        imported: usize,
        skipped: usize,
        errors: usize,
    },
}

/// Receiver side of the observer interface
pub trait EventSink: Send + Sync {
    fn publish(&self, event: VaultEvent);
}

impl EventSink for mpsc::UnboundedSender<VaultEvent> {
    fn publish(&self, event: VaultEvent) {
        if self.send(event).is_err() {
            tracing::debug!("Event receiver dropped; discarding event");
        }
    }
}

/// Sink that writes every event to the tracing log at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: VaultEvent) {
        tracing::debug!(?event, "vault event");
    }
}

/// Create an unbounded channel sink and its receiver
///
/// # Examples
///
/// ```
/// use chatvault::events::{channel, EventSink, VaultEvent};
///
/// let (sink, mut rx) = channel();
/// sink.publish(VaultEvent::SessionDeleted { id: "a".to_string() });
/// assert_eq!(rx.try_recv().unwrap(), VaultEvent::SessionDeleted { id: "a".to_string() });
/// ```
pub fn channel() -> (Arc<dyn EventSink>, mpsc::UnboundedReceiver<VaultEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(tx), rx)
}
