//! Retry policies for the bootstrap flow
//!
//! Two kinds of retry happen while bootstrapping a node:
//!
//! - **polling** for objects that other components create asynchronously
//!   (CSRs from the kubelet, the host subnet annotation from the overlay).
//!   Bounded by [`RetryPolicy`] and abortable through a
//!   [`CancellationToken`].
//! - **optimistic-concurrency** retries around read-modify-write updates,
//!   retried only on version conflicts with exponential backoff.

use crate::error::{Error, Result};
use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default number of polling attempts
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 20;

/// Default spacing between polling attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

// =============================================================================
// Polling Policy
// =============================================================================

/// Bounded polling configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least one attempt is always made)
    pub max_attempts: u32,
    /// Delay between attempts
    pub interval: Duration,
    /// Optional overall budget measured from the first attempt
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            interval: DEFAULT_RETRY_INTERVAL,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Poll `probe` until it yields a value.
    ///
    /// Returns `Ok(None)` once the attempt or deadline budget is spent.
    /// Errors from `probe` abort polling immediately. Cancellation of
    /// `cancel` during a wait returns [`Error::Cancelled`].
    pub async fn poll<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        operation: &str,
        mut probe: F,
    ) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let started = Instant::now();
        let attempts = self.max_attempts.max(1);

        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(operation.to_string()));
            }

            if let Some(found) = probe().await? {
                debug!(operation, attempt, "Poll succeeded");
                return Ok(Some(found));
            }

            if attempt == attempts {
                break;
            }
            if let Some(deadline) = self.deadline {
                if started.elapsed() + self.interval > deadline {
                    debug!(operation, attempt, "Poll deadline reached");
                    break;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::Cancelled(operation.to_string()));
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        warn!(operation, attempts, "Poll budget exhausted");
        Ok(None)
    }
}

// =============================================================================
// Optimistic Concurrency
// =============================================================================

/// Backoff used for version-conflict retries
#[derive(Debug, Clone, Copy)]
pub struct ConflictRetry {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed: Option<Duration>,
}

impl Default for ConflictRetry {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            max_elapsed: Some(Duration::from_secs(30)),
        }
    }
}

impl ConflictRetry {
    /// Run a read-modify-write `operation`, retrying only on conflicts.
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_max_elapsed_time(self.max_elapsed)
            .build();

        backoff::future::retry(policy, || {
            let attempt = operation();
            async move {
                attempt.await.map_err(|e| {
                    if e.is_conflict() {
                        warn!(operation = operation_name, "Update conflict, retrying");
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
    }
}
