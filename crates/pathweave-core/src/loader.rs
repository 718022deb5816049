//! Loader contract.
//!
//! A loader owns one partition from `init` until `close`, claims the input
//! paths it understands and converts their records into objects on its own
//! worker pool.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::graph::Objects;

/// Progress callback: `(current, max)`.
///
/// For each argument a positive value sets the absolute figure, a negative
/// value adds its magnitude, and zero leaves it unchanged.
pub type ProgressFn = Arc<dyn Fn(i64, i64) + Send + Sync>;

/// Position of a loader in the engine's registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderId(pub usize);

impl std::fmt::Display for LoaderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "loader-{}", self.0)
    }
}

/// Result of offering a path to a loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The loader took responsibility for the path
    Claimed,
    /// The path is not in a format this loader understands
    Uninterested,
}

/// Errors raised by loaders.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt input '{path}' at byte {offset}: {message}")]
    Decode {
        path: PathBuf,
        offset: u64,
        message: String,
    },

    #[error("loader used before init")]
    NotInitialized,

    #[error("worker pool failed to start: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ingest worker panicked")]
    WorkerPanicked,

    #[error("ingest queue closed before all records were submitted")]
    QueueClosed,
}

impl LoaderError {
    /// Create an Io error for a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a Decode error at a byte offset.
    pub fn decode(path: impl Into<PathBuf>, offset: u64, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            offset,
            message: message.into(),
        }
    }
}

/// A source-specific ingestion plug-in.
pub trait Loader: Send {
    /// Human readable loader name, used in logs and as the data source tag.
    fn name(&self) -> &str;

    /// Take ownership of an empty partition and start the worker pool.
    fn init(&mut self, partition: Objects) -> Result<(), LoaderError>;

    /// Offer an input path.
    ///
    /// Returns `Uninterested` for paths the loader does not recognize.
    /// Decoding may happen synchronously; conversion runs on workers.
    fn load(&mut self, path: &Path, progress: &ProgressFn) -> Result<LoadOutcome, LoaderError>;

    /// Drain outstanding work, fix up structure and hand back the
    /// partition(s).
    fn close(&mut self) -> Result<Vec<Objects>, LoaderError>;
}

/// Atomic sink implementing the progress protocol.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    current: AtomicI64,
    max: AtomicI64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one progress report.
    pub fn report(&self, current: i64, max: i64) {
        Self::apply(&self.max, max);
        Self::apply(&self.current, current);
    }

    fn apply(slot: &AtomicI64, value: i64) {
        match value {
            v if v > 0 => slot.store(v, Ordering::Relaxed),
            v if v < 0 => {
                slot.fetch_add(-v, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn current(&self) -> i64 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> i64 {
        self.max.load(Ordering::Relaxed)
    }

    /// Wrap a tracker into a progress callback.
    pub fn callback(tracker: &Arc<ProgressTracker>) -> ProgressFn {
        let tracker = Arc::clone(tracker);
        Arc::new(move |current, max| tracker.report(current, max))
    }
}

/// A callback that discards every report.
pub fn no_progress() -> ProgressFn {
    Arc::new(|_, _| {})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_protocol() {
        let tracker = ProgressTracker::new();

        tracker.report(0, -1000);
        tracker.report(0, -24);
        assert_eq!(tracker.max(), 1024);

        tracker.report(-10, 0);
        tracker.report(-5, 0);
        assert_eq!(tracker.current(), 15);

        tracker.report(500, 2000);
        assert_eq!(tracker.current(), 500);
        assert_eq!(tracker.max(), 2000);

        tracker.report(0, 0);
        assert_eq!(tracker.current(), 500);
        assert_eq!(tracker.max(), 2000);
    }

    #[test]
    fn test_callback_shares_tracker() {
        let tracker = Arc::new(ProgressTracker::new());
        let progress = ProgressTracker::callback(&tracker);
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let progress = Arc::clone(&progress);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        progress(-1, 0);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(tracker.current(), 400);
    }

    #[test]
    fn test_error_display() {
        let err = LoaderError::decode("dump.objects.jsonl", 42, "expected value");
        let msg = err.to_string();
        assert!(msg.contains("dump.objects.jsonl"));
        assert!(msg.contains("42"));
    }
}
