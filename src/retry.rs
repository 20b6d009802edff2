//! Bounded retry with exponential backoff
//!
//! Used by the orchestrator for model transport calls. Only errors the
//! `BrokerError::is_retryable` classification marks as transient are retried;
//! everything else propagates immediately. The attempt budget is a hard
//! bound: exhaustion yields `RetryExhausted` with sanitized detail.

use std::time::Duration;
use tokio::time::sleep;

use crate::errors::{BrokerError, Result};
use crate::sanitize;

/// Default total attempt budget (first try included)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for the exponential schedule
const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Default delay cap
const DEFAULT_MAX_DELAY_MS: u64 = 8_000;

/// Retry policy with exponential backoff and jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms,
            jitter: true,
        }
    }

    /// Disable jitter for deterministic scheduling in tests
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run the operation until it succeeds, fails non-transiently, or the
    /// attempt budget is spent.
    pub async fn run<F, Fut, T>(&self, operation: &str, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) => {
                    if attempt >= self.max_attempts {
                        return Err(BrokerError::RetryExhausted {
                            attempts: attempt,
                            last_error: sanitize::sanitize(&error.to_string()),
                        });
                    }

                    let delay = self.delay_for(attempt);
                    log::debug!(
                        "{} attempt {}/{} failed ({}), retrying in {:?}",
                        operation,
                        attempt,
                        self.max_attempts,
                        error,
                        delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Exponential delay for the given (1-based) attempt, capped, with
    /// optional ±25% jitter.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let exponential = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let capped = exponential.min(self.max_delay_ms);

        let final_ms = if self.jitter {
            let jitter_band = (capped / 4) as i64;
            let offset = ((rand::random::<f64>() * 2.0 - 1.0) * jitter_band as f64) as i64;
            (capped as i64 + offset).max(0) as u64
        } else {
            capped
        };

        Duration::from_millis(final_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> BrokerError {
        BrokerError::Transport("connection reset".to_string())
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let policy = RetryPolicy::new(3, 1, 10).without_jitter();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = policy
            .run("op", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<u32, BrokerError>(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let policy = RetryPolicy::new(3, 1, 10).without_jitter();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = policy
            .run("op", move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(transient())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let policy = RetryPolicy::new(3, 1, 10).without_jitter();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<u32> = policy
            .run("op", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(BrokerError::RetryExhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_propagates_immediately() {
        let policy = RetryPolicy::new(5, 1, 10).without_jitter();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<u32> = policy
            .run("op", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(BrokerError::MalformedResponse("garbage".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(BrokerError::MalformedResponse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_detail_is_sanitized() {
        let policy = RetryPolicy::new(2, 1, 10).without_jitter();

        let result: Result<u32> = policy
            .run("op", || async {
                Err(BrokerError::Transport(
                    "401 for key sk-abcdef1234567890".to_string(),
                ))
            })
            .await;

        match result {
            Err(BrokerError::RetryExhausted { last_error, .. }) => {
                assert!(!last_error.contains("sk-abcdef1234567890"));
            }
            other => panic!("expected RetryExhausted, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::new(5, 100, 800).without_jitter();

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
        // Capped thereafter
        assert_eq!(policy.delay_for(10), Duration::from_millis(800));
    }
}
