//! Bounded-attempt retry policies.
//!
//! Shared primitive behind the route capture and polling loops: a fixed
//! number of attempts at a fixed interval, an optional wall-clock ceiling,
//! and cooperative cancellation. The first attempt runs immediately.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared cancellation flag for in-flight retry loops.
///
/// Cloning hands out another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a new, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. All loops holding a clone stop at their next
    /// attempt boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A bounded, fixed-interval retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the immediate first one.
    pub max_attempts: u32,
    /// Delay between consecutive attempts.
    pub interval: Duration,
    /// Total wall-clock budget. A sleep that would overrun it is skipped
    /// and the loop gives up instead.
    pub ceiling: Option<Duration>,
}

impl RetryPolicy {
    /// Policy with the given attempt count and interval, no ceiling.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            ceiling: None,
        }
    }

    /// Add a wall-clock ceiling to the policy.
    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = Some(ceiling);
        self
    }

    /// Run `attempt` until it yields a value, attempts run out, the ceiling
    /// is reached, or `cancel` fires. Returns `None` on exhaustion or
    /// cancellation.
    pub async fn run<T, F, Fut>(&self, cancel: &CancelToken, mut attempt: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let started = tokio::time::Instant::now();

        for n in 0..self.max_attempts {
            if cancel.is_cancelled() {
                tracing::debug!(attempt = n, "retry loop cancelled");
                return None;
            }

            if let Some(value) = attempt().await {
                return Some(value);
            }

            if n + 1 == self.max_attempts {
                break;
            }

            if let Some(ceiling) = self.ceiling {
                if started.elapsed() + self.interval > ceiling {
                    tracing::debug!(attempt = n, "retry ceiling reached");
                    break;
                }
            }

            tokio::time::sleep(self.interval).await;
        }

        None
    }
}
