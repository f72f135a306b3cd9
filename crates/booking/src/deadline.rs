//! Deadline wrapper for the negotiation's suspension points.
//!
//! Dropping the inner future at expiry is the cancellation mechanism:
//! every child I/O derives from the future being polled, so a timeout
//! here aborts the in-flight step.

use std::future::Future;
use std::time::Duration;

use ca_domain::error::{Error, Result};

/// Await `fut` for at most `deadline`, mapping expiry to a timeout error
/// naming the step.
pub(crate) async fn with_deadline<T>(
    deadline: Duration,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "{what} timed out after {}s",
            deadline.as_secs()
        ))),
    }
}
