//! Advisory progress reporting.
//!
//! The caller may watch a negotiation through a callback, but the
//! callback is never load-bearing: every invocation runs as its own task
//! under a short deadline, a stalled or panicking callback is abandoned,
//! and the handover hot path skips it entirely to avoid deadlocking the
//! caller.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

/// Deadline for one callback invocation.
pub const PROGRESS_DEADLINE: Duration = Duration::from_millis(500);

/// What phase of the negotiation a progress event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Starting,
    Initializing,
    Thinking,
    Sending,
    Received,
    InfoNeeded,
    Processing,
    Complete,
    Timeout,
    Error,
    Handover,
}

impl ProgressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::Starting => "starting",
            ProgressStatus::Initializing => "initializing",
            ProgressStatus::Thinking => "thinking",
            ProgressStatus::Sending => "sending",
            ProgressStatus::Received => "received",
            ProgressStatus::InfoNeeded => "info_needed",
            ProgressStatus::Processing => "processing",
            ProgressStatus::Complete => "complete",
            ProgressStatus::Timeout => "timeout",
            ProgressStatus::Error => "error",
            ProgressStatus::Handover => "handover",
        }
    }
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Async progress callback: `(turn, status, message)`.
pub type ProgressCallback =
    Arc<dyn Fn(u32, ProgressStatus, String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Invoke the callback with a deadline, absorbing every failure mode.
///
/// Handover events are skipped outright — the transition must not block
/// on a slow observer.
pub(crate) async fn emit(
    callback: &Option<ProgressCallback>,
    turn: u32,
    status: ProgressStatus,
    message: impl Into<String>,
) {
    let Some(callback) = callback else { return };

    if status == ProgressStatus::Handover {
        tracing::debug!("skipping progress callback for handover status");
        return;
    }

    let message = message.into();
    tracing::debug!(turn, status = %status, "progress: {message}");

    // Run as a task: a panic stays inside it, and a stall is aborted at
    // the deadline instead of holding up the turn.
    let handle = tokio::spawn(callback(turn, status, message));
    let abort = handle.abort_handle();
    match tokio::time::timeout(PROGRESS_DEADLINE, handle).await {
        Ok(Ok(())) => {}
        Ok(Err(join_err)) => {
            tracing::warn!(turn, status = %status, error = %join_err, "progress callback failed; continuing");
        }
        Err(_) => {
            abort.abort();
            tracing::warn!(turn, status = %status, "progress callback timed out; continuing");
        }
    }
}
