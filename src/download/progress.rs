//! Progress events and the sinks that receive them.

use std::path::PathBuf;

use tokio::sync::mpsc;

/// One progress event, emitted after each chunk is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes written by the chunk that triggered this event.
    pub chunk_bytes: usize,
    /// Bytes on disk so far, including any resumed prefix.
    pub total_bytes_transferred: u64,
    /// Expected final size, when the server announced a length.
    pub expected_total_bytes: Option<u64>,
    /// Sanitized destination path.
    pub destination: PathBuf,
    /// Source URL.
    pub source_url: String,
}

impl TransferProgress {
    /// Completion percentage, or `None` when the total is unknown.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> Option<f64> {
        match self.expected_total_bytes {
            Some(total) if total > 0 => {
                Some(self.total_bytes_transferred as f64 * 100.0 / total as f64)
            }
            _ => None,
        }
    }
}

/// Receives progress events.
///
/// Called synchronously from the copy loop between chunk writes, so a slow
/// implementation slows the transfer down. Nothing is queued behind the caller's back.
pub trait ProgressSink: Send + Sync {
    /// Handles one event.
    fn on_progress(&self, progress: &TransferProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&TransferProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &TransferProgress) {
        self(progress);
    }
}

/// Forwards events into an unbounded channel. A closed receiver is ignored.
impl ProgressSink for mpsc::UnboundedSender<TransferProgress> {
    fn on_progress(&self, progress: &TransferProgress) {
        let _ = self.send(progress.clone());
    }
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _progress: &TransferProgress) {}
}
