//! Retry/backoff policy shared by every remote call site.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::RemoteError;

/// Bounded exponential backoff with a hard timeout per attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub attempt_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 250,
            max_delay_ms: 8_000,
            attempt_timeout_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        backoff::exponential(self.base_delay(), attempt, self.max_delay())
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. Cancellation interrupts both the in-flight attempt
    /// and the backoff sleep.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let timeout = self.attempt_timeout();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RemoteError::Cancelled),
                result = tokio::time::timeout(timeout, call()) => match result {
                    Ok(inner) => inner,
                    Err(_) => Err(RemoteError::Timeout(timeout)),
                },
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "remote call failed; retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RemoteError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

pub mod backoff {
    use std::time::Duration;

    /// `base * 2^(attempt - 1)`, capped at `max`.
    pub fn exponential(base: Duration, attempt: u32, max: Duration) -> Duration {
        let multiplier = 2_u32.saturating_pow(attempt.saturating_sub(1));
        base.saturating_mul(multiplier).min(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 4,
            attempt_timeout_ms: 200,
        }
    }

    #[test]
    fn exponential_backoff_caps_at_max() {
        let base = Duration::from_millis(250);
        let max = Duration::from_secs(2);
        assert_eq!(backoff::exponential(base, 1, max), base);
        assert_eq!(
            backoff::exponential(base, 3, max),
            Duration::from_millis(1_000)
        );
        assert_eq!(backoff::exponential(base, 12, max), max);
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = fast_policy(3);
        let token = CancellationToken::new();

        let result = policy
            .run("list", &token, || {
                let calls = Arc::clone(&calls);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(RemoteError::Transient("502".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_rejections() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = fast_policy(5);
        let token = CancellationToken::new();

        let result: Result<(), _> = policy
            .run("create", &token, || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(RemoteError::Rejected {
                        status: 422,
                        message: "bad slot".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(RemoteError::Rejected { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = fast_policy(2);
        let token = CancellationToken::new();

        let result: Result<(), _> = policy
            .run("delete", &token, || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(RemoteError::Transient("connection reset".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(RemoteError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let policy = RetryPolicy {
            max_attempts: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
            attempt_timeout_ms: 10,
        };
        let token = CancellationToken::new();

        let result: Result<(), _> = policy
            .run("list", &token, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(RemoteError::Timeout(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn cancellation_stops_before_calling() {
        let policy = fast_policy(3);
        let token = CancellationToken::new();
        token.cancel();

        let result: Result<(), _> = policy
            .run("list", &token, || async { Ok(()) })
            .await;

        assert_eq!(result, Err(RemoteError::Cancelled));
    }
}
