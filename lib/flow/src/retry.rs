//! Retry policy for calls to external systems.
//!
//! Provider calls and bus publishes are attempted once unless a policy with
//! more attempts is configured. Backoff doubles after each failed attempt.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_backoff_millis")]
    pub backoff_millis: u64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_backoff_millis() -> u64 {
    200
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_millis: default_backoff_millis(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff_millis: 0,
        }
    }

    /// A policy with the given attempt count and initial backoff.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff_millis: u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Delay before attempt `attempt` (1-based); zero for the first.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u64 << (attempt - 2).min(16);
        Duration::from_millis(self.backoff_millis.saturating_mul(factor))
    }

    /// Runs `op` until it succeeds or the attempts are exhausted.
    ///
    /// Returns the last error when every attempt fails.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_when(op, |_| true).await
    }

    /// Like [`RetryPolicy::run`], but stops at the first error `retryable`
    /// rejects.
    pub async fn run_when<T, E, F, Fut, P>(&self, mut op: F, retryable: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && retryable(&e) => {
                    let delay = self.delay_before(attempt + 1);
                    tracing::debug!(attempt, error = %e, ?delay, "attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn default_is_a_single_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let result: Result<(), String> = policy
            .run(|_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("boom".to_string())
            })
            .await;

        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_first_success() {
        let policy = RetryPolicy::new(5, Duration::ZERO);

        let result: Result<u32, String> = policy
            .run(|attempt| async move {
                if attempt < 2 {
                    Err("not yet".to_string())
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(0, Duration::ZERO);

        let _: Result<(), &str> = policy
            .run(|_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("x")
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::ZERO);

        let result: Result<(), u16> = policy
            .run_when(
                |_| async {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    Err(if n == 0 { 503 } else { 404 })
                },
                |status| *status >= 500,
            )
            .await;

        assert_eq!(result, Err(404));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
