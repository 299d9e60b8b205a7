//! Timeout, retry count and linear backoff shared by the walker and the coordinator.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::UpstreamError;

/// Retry settings for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Deadline for each attempt; an expired attempt is dropped and counts as failed.
    pub timeout: Duration,
    /// Delay unit: the wait after attempt `n` is `n * base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(10),
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Outcome of a call that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// `attempts` counts every attempt started, including one dropped in flight.
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("failed after {attempts} attempt(s): {source}")]
    Failed {
        attempts: u32,
        #[source]
        source: UpstreamError,
    },
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or runs out of attempts.
    ///
    /// `op` is invoked once per attempt. Cancellation is observed while an attempt is
    /// in flight and while backing off; the in-flight request is dropped.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        call: &'static str,
        mut op: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                outcome = tokio::time::timeout(self.timeout, op()) => outcome,
            };

            let error = match outcome {
                Ok(Ok(value)) => {
                    if attempt > 1 {
                        debug!(call, attempt, "Upstream call recovered");
                    }
                    return Ok(value);
                }
                Ok(Err(error)) => error,
                Err(_elapsed) => UpstreamError::Timeout(self.timeout),
            };

            if !error.is_retryable() || attempt >= max_attempts {
                return Err(RetryError::Failed {
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = self.delay_after(attempt);
            warn!(
                call,
                attempt,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Upstream call failed, retrying"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
