//! Retry helpers for calls to external tools.
//!
//! Attempts are bounded by [`RetryPolicy::max_attempts`] with a fixed delay
//! between them (`retryDelayMs` for workflow calls, `ai.retryDelayMs` for the
//! chat backend). Both the GitHub agent and the AI client retry through here.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

// ============================================================================
// Policy
// ============================================================================

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Same delay before every retry.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

// ============================================================================
// Retry Loops
// ============================================================================

/// Run `op` until `accept` approves its output or attempts run out. The last
/// output is returned either way.
///
/// Used where the operation itself never fails but may hand back a degraded
/// value (a fallback issue, for instance).
pub async fn retry_until<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
    mut accept: impl FnMut(&T) -> bool,
) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
{
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        let value = op().await;
        if accept(&value) || attempt >= attempts {
            return value;
        }
        let delay = policy.delay;
        warn!(
            "{} attempt {}/{} not accepted, retrying in {:?}",
            what, attempt, attempts, delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Run `op` until it succeeds, the error is not retryable, or attempts run
/// out.
pub async fn retry_result<T, E, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
    mut retryable: impl FnMut(&E) -> bool,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && retryable(&e) => {
                let delay = policy.delay;
                warn!(
                    "{} attempt {}/{} failed: {}; retrying in {:?}",
                    what, attempt, attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_accepts_eventually() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
        let value = retry_until(
            &policy,
            "poll",
            move || async move { calls.fetch_add(1, Ordering::SeqCst) + 1 },
            |v| *v == 2,
        )
        .await;
        assert_eq!(value, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_returns_last_value_when_exhausted() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
        let value = retry_until(
            &policy,
            "poll",
            move || async move { calls.fetch_add(1, Ordering::SeqCst) + 1 },
            |_| false,
        )
        .await;
        assert_eq!(value, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_result_retries_transient_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
        let result: Result<u32, String> = retry_result(
            &policy,
            "op",
            move || async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Err("busy".to_string()),
                    n => Ok(n + 1),
                }
            },
            |_| true,
        )
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_result_stops_on_permanent_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::fixed(5, Duration::from_millis(10));
        let result: Result<(), String> = retry_result(
            &policy,
            "op",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("permanent".to_string())
            },
            |e: &String| e != "permanent",
        )
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_result_zero_attempts_runs_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::fixed(0, Duration::from_millis(10));
        let result: Result<u32, String> = retry_result(
            &policy,
            "op",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("transient".to_string())
            },
            |_| true,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
