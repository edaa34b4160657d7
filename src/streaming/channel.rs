//! Channel types for the archive pipeline.
//!
//! Two-stage pipeline: Worker -> Controller -> client.
//! Worker -> Controller is unbounded so a slow client never stalls the walk.
//! Controller -> client is bounded: each frame is handed off before the next
//! event is taken.

use tokio::sync::mpsc;

/// Channel size for Controller -> HTTP body (encoded frames)
pub const SINK_CHANNEL_SIZE: usize = 16;

// =============================================================================
// ProgressEvent: Worker -> Controller
// =============================================================================

/// Progress reported by the archive worker.
///
/// A run emits any number of `Output` events followed by exactly one
/// `Error` or `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A file was added to the archive (path relative to the root).
    Output { text: String },

    /// The run failed. No further events follow.
    Error { message: String, diagnostic: String },

    /// The archive is finalized and on disk.
    Done,
}

impl ProgressEvent {
    pub fn output(text: impl Into<String>) -> Self {
        ProgressEvent::Output { text: text.into() }
    }

    /// Flatten an error into an `Error` event: one-line chain as the message,
    /// the full report (causes, backtrace if captured) as the diagnostic.
    pub fn failure(err: &anyhow::Error) -> Self {
        ProgressEvent::Error {
            message: format!("{:#}", err),
            diagnostic: format!("{:?}", err),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Output { .. })
    }
}

// =============================================================================
// Channel types
// =============================================================================

/// Sending half held by the worker
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Receiving half held by the controller
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// Create the Worker -> Controller channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

// =============================================================================
// Tests
// =============================================================================
