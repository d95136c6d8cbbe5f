use std::future::Future;
use std::time::Duration;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Retry after the configured linear backoff.
    Retry,
    /// Retry after a server-provided delay (e.g. `Retry-After` on HTTP 429).
    RetryAfter(Duration),
}

/// Linear backoff configuration: the wait after attempt `n` (1-based) is
/// `n * step_delay_secs`, unless the classifier supplies its own delay.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub step_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            step_delay_secs: 2,
        }
    }
}

impl RetryConfig {
    /// Compute the delay after a failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.step_delay_secs.saturating_mul(u64::from(attempt)))
    }
}

/// Retry an async operation with linear backoff.
///
/// - `config`: retry configuration
/// - `classifier`: inspects an error and picks the delay before the next attempt
/// - `operation`: the async closure to retry
///
/// Every failure is retried until attempts run out. Returns the first `Ok`
/// result, or the last error.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    classifier: C,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => e,
        };

        let delay = match classifier(&err) {
            RetryAction::Retry => config.delay_for_attempt(attempt),
            RetryAction::RetryAfter(hint) => hint,
        };
        if attempt >= total_attempts {
            return Err(err);
        }

        tracing::warn!(
            "Retryable error (attempt {}/{}), retrying in {}s: {}",
            attempt,
            total_attempts,
            delay.as_secs(),
            err
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.step_delay_secs, 2);
    }

    #[test]
    fn test_delay_is_linear_in_attempt() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(6));
    }

    #[test]
    fn test_delay_zero_step() {
        let config = RetryConfig {
            max_attempts: 3,
            step_delay_secs: 0,
        };
        assert_eq!(config.delay_for_attempt(2), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let result: Result<i32, String> = retry_with_backoff(
            &RetryConfig::default(),
            |_| RetryAction::Retry,
            || async { Ok(42) },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_on_last_attempt_is_not_slept() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();
        let start = tokio::time::Instant::now();
        let result: Result<i32, String> = retry_with_backoff(
            &RetryConfig::default(),
            |_| RetryAction::RetryAfter(Duration::from_secs(30)),
            || {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err("rate limited".to_string())
                }
            },
        )
        .await;
        assert_eq!(result.unwrap_err(), "rate limited");
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();
        let start = tokio::time::Instant::now();
        let result: Result<i32, String> = retry_with_backoff(
            &RetryConfig::default(),
            |_| RetryAction::Retry,
            || {
                let cc = cc.clone();
                async move {
                    let n = cc.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok(99)
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
        // 2s after attempt 1, 4s after attempt 2
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted_without_trailing_wait() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();
        let start = tokio::time::Instant::now();
        let result: Result<i32, String> = retry_with_backoff(
            &RetryConfig::default(),
            |_| RetryAction::Retry,
            || {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err("still failing".to_string())
                }
            },
        )
        .await;
        assert_eq!(result.unwrap_err(), "still failing");
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_overrides_linear_delay() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();
        let start = tokio::time::Instant::now();
        let result: Result<i32, String> = retry_with_backoff(
            &RetryConfig::default(),
            |_| RetryAction::RetryAfter(Duration::from_secs(7)),
            || {
                let cc = cc.clone();
                async move {
                    let n = cc.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err("rate limited".to_string())
                    } else {
                        Ok(1)
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }
}
