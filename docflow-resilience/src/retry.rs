//! ABOUTME: Generic exponential-backoff retry wrapper around fallible async operations (C1)

use docflow_core::PipelineError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Tunables for one retry wrapper invocation. `base_delay * (exponential_base
/// ** attempt)` gives the sleep before the next attempt, matching §4.1
/// exactly (no jitter, no alternate backoff strategies — those are a
/// richer feature the source implementation does not call for).
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub exponential_base: f64,
}

impl RetryConfig {
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration, exponential_base: f64) -> Self {
        Self {
            max_retries,
            base_delay,
            exponential_base,
        }
    }

    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let secs = self.base_delay.as_secs_f64() * self.exponential_base.powi(attempt as i32);
        Duration::from_secs_f64(secs.max(0.0))
    }
}

impl Default for RetryConfig {
    /// Matches the source implementation's `retry_with_backoff` default:
    /// 3 additional attempts, 1s base delay, base-2 exponential growth.
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), 2.0)
    }
}

/// Runs `operation`, retrying up to `config.max_retries` additional times
/// when `is_retryable` returns true for the returned error. Sleeps
/// `delay_for_attempt(attempt)` between attempts. On final exhaustion the
/// last failure is surfaced unchanged (§4.1).
///
/// Generic over the operation's error type so every external-service
/// client (and the Job Registry's own storage-write retry) can reuse the
/// same helper instead of hand-rolling a backoff loop.
pub async fn retry_with_backoff<T, E, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < config.max_retries && is_retryable(&err) => {
                let delay = config.delay_for_attempt(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if attempt > 0 {
                    tracing::error!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = %err,
                        "retry attempts exhausted"
                    );
                }
                return Err(err);
            }
        }
    }
}

/// Convenience wrapper using `PipelineError::is_retryable` as the retry
/// predicate, the default used by every external-service client in this
/// workspace.
pub async fn retry_default<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    operation: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    retry_with_backoff(operation_name, config, PipelineError::is_retryable, operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_follows_exponential_formula() {
        let config = RetryConfig::new(3, Duration::from_secs(1), 2.0);
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_up_to_max_then_returns_last_error() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::new(2, Duration::from_millis(1), 2.0);

        let result: Result<(), PipelineError> = retry_default("op", config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(PipelineError::Transient {
                    service: "svc".to_string(),
                    message: "boom".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3); // initial + 2 retries
    }

    #[tokio::test]
    async fn non_retryable_errors_propagate_immediately() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default();

        let result: Result<(), PipelineError> = retry_default("op", config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PipelineError::Configuration { message: "bad config".to_string() }) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_default("op", RetryConfig::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, PipelineError>(42) }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
