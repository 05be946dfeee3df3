//! Attempt executor with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use ledger_types::LedgerError;

/// Bounded retry policy for transient failures.
///
/// Defaults:
/// - `max_retries`: 3 (four attempts in total)
/// - `base_delay`: 2 seconds, doubling after every retry (2s, 4s, 8s)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicy {
    pub const fn new() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }

    /// A policy that gives up after the first failure.
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Short policy for event delivery: 2 retries from 100ms (100ms, 200ms).
    /// Publishing runs after commit, so the caller waits out every backoff.
    pub const fn delivery() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
        }
    }

    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `retry` (0-indexed): `base_delay * 2^retry`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .checked_mul(1u32 << retry.min(20))
            .unwrap_or(Duration::MAX)
    }

    /// Runs `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// `op` receives the 1-based attempt number and must start from fresh
    /// state on every call. Only [`LedgerError::is_retryable`] errors are
    /// retried; the last error is returned unchanged. Cancellation during a
    /// backoff wait ends the loop with [`LedgerError::Cancelled`].
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, LedgerError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut retry = 0;
        loop {
            let attempt = retry + 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && retry < self.max_retries => {
                    let delay = self.delay_for(retry);
                    warn!(
                        attempt,
                        max_attempts = self.max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(LedgerError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    retry += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        warn!(attempt, error = %err, "Retries exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }
}
