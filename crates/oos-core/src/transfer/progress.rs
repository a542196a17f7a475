//! Transfer progress notifications.

use std::fmt;

/// Stage of a transfer reported to a [`ProgressListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEventKind {
    /// The transfer began; emitted once.
    Started,
    /// A part finished.
    Data,
    /// Every part finished and the transfer was finalized; emitted once.
    Completed,
    /// The transfer failed; emitted once.
    Failed,
}

/// A progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Stage.
    pub kind: ProgressEventKind,
    /// Bytes transferred so far, resumed parts included.
    pub consumed_bytes: u64,
    /// Bytes of the whole transfer.
    pub total_bytes: u64,
}

impl ProgressEvent {
    /// Create an event.
    #[must_use]
    pub fn new(kind: ProgressEventKind, consumed_bytes: u64, total_bytes: u64) -> Self {
        Self {
            kind,
            consumed_bytes,
            total_bytes,
        }
    }
}

/// Receives [`ProgressEvent`]s from the transfer engine.
///
/// Events are delivered from the task driving the transfer, in order.
pub trait ProgressListener: Send + Sync + fmt::Debug {
    /// Handle one event.
    fn on_progress(&self, event: &ProgressEvent);
}
