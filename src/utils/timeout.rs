//! Timeout utilities for fault tolerance
//!
//! Wraps a single attempt with an explicit deadline. When the deadline wins the
//! attempt's cancellation token is triggered, so cooperating I/O can release its
//! connection instead of running on in the background.

use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// Default per-attempt timeout for remote container fetches
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Deadline and cancellation signal for one attempt
#[derive(Debug, Clone)]
pub struct AttemptContext {
    /// 1-based attempt number
    pub attempt: u32,
    /// Instant after which the attempt is abandoned
    pub deadline: Instant,
    /// Cancelled when the deadline passes
    pub cancel: CancellationToken,
}

impl AttemptContext {
    /// Context whose deadline is `timeout` from now
    pub fn starting_now(attempt: u32, timeout: Duration) -> Self {
        Self {
            attempt,
            deadline: Instant::now() + timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Run `operation` until the context's deadline
///
/// Returns `None` when the deadline passed first; the token is cancelled and
/// the operation future is dropped.
pub async fn with_deadline<F, T>(ctx: &AttemptContext, operation: F) -> Option<T>
where
    F: std::future::Future<Output = T>,
{
    match timeout_at(ctx.deadline, operation).await {
        Ok(value) => Some(value),
        Err(_) => {
            ctx.cancel.cancel();
            None
        }
    }
}
