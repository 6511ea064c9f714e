//! Import batch metrics
//!
//! Recorded through the `metrics` facade; without an installed recorder the
//! calls are no-ops.
//!
//! # Metrics
//!
//! - `chatvault_import_files_total`: counter of processed files, labeled by
//!   `outcome` (`imported`, `duplicate`, `empty`, `error`)
//! - `chatvault_import_batches_total`: counter of completed batches
//! - `chatvault_import_batch_duration_seconds`: histogram of batch wall time
//! - `chatvault_import_batch_files`: histogram of files seen per batch

use metrics::{histogram, increment_counter};
use std::time::Instant;

/// Outcome label for a processed file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcomeLabel {
    Imported,
    Duplicate,
    Empty,
    Error,
}

impl FileOutcomeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imported => "imported",
            Self::Duplicate => "duplicate",
            Self::Empty => "empty",
            Self::Error => "error",
        }
    }
}

/// Metrics for one import batch
///
/// # Examples
///
/// ```
/// use chatvault::import::metrics::{BatchMetrics, FileOutcomeLabel};
///
/// let mut metrics = BatchMetrics::start();
/// metrics.record_file(FileOutcomeLabel::Imported);
/// metrics.record_file(FileOutcomeLabel::Duplicate);
/// assert_eq!(metrics.files_seen(), 2);
/// metrics.finish();
/// ```
#[derive(Debug)]
pub struct BatchMetrics {
    start: Instant,
    files_seen: usize,
}

impl BatchMetrics {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            files_seen: 0,
        }
    }

    pub fn record_file(&mut self, outcome: FileOutcomeLabel) {
        self.files_seen += 1;
        increment_counter!("chatvault_import_files_total", "outcome" => outcome.as_str());
    }

    pub fn files_seen(&self) -> usize {
        self.files_seen
    }

    /// Record batch totals; consumes the tracker so a batch is counted once
    pub fn finish(self) {
        increment_counter!("chatvault_import_batches_total");
        histogram!(
            "chatvault_import_batch_duration_seconds",
            self.start.elapsed().as_secs_f64()
        );
        histogram!("chatvault_import_batch_files", self.files_seen as f64);
    }
}
