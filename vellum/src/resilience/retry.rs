//! Bounded retry with exponential backoff and jitter.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::error::AssistantError;

use super::CircuitBreaker;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Hard cap applied after jitter.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff for a zero-based attempt index: `base * 2^attempt` plus jitter,
    /// capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let jitter_cap = self.base_delay.as_millis().max(1) as u64;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::from(d.subsec_nanos()))
            .unwrap_or(0);
        let jitter = Duration::from_millis(nanos % jitter_cap);
        (exp + jitter).min(self.max_delay)
    }
}

/// Runs `op` through the breaker with bounded retries.
///
/// Non-retryable errors short-circuit without consuming attempts. An explicit
/// rate-limit wait takes precedence over computed backoff. Breaker rejections
/// behave like any other retryable error and carry the remaining cooldown.
pub async fn execute_with_retry<T, F, Fut>(
    breaker: &CircuitBreaker,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, AssistantError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AssistantError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        let error = match breaker.check() {
            Ok(()) => match op().await {
                Ok(value) => {
                    breaker.record_success();
                    return Ok(value);
                }
                Err(e) => {
                    if e.is_retryable() {
                        breaker.record_failure();
                    }
                    e
                }
            },
            Err(e) => e,
        };

        if !error.is_retryable() {
            return Err(error);
        }
        attempt += 1;
        if attempt >= attempts {
            warn!(attempts, error = %error, "retries exhausted");
            return Err(error);
        }

        let delay = error
            .retry_after()
            .unwrap_or_else(|| policy.backoff_delay(attempt - 1));
        debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::BreakerConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_breaker() -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: u32::MAX,
            ..BreakerConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_until_success() {
        let breaker = no_breaker();
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result = execute_with_retry(&breaker, &policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AssistantError::NetworkTransient("flaky".into()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_short_circuit_without_retrying() {
        let breaker = no_breaker();
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = execute_with_retry(&breaker, &policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AssistantError::CredentialInvalid("bad key".into())) }
        })
        .await;

        assert!(matches!(result, Err(AssistantError::CredentialInvalid(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_wait_overrides_computed_backoff() {
        let breaker = no_breaker();
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_secs(60),
        };
        let calls = AtomicU32::new(0);

        let started = tokio::time::Instant::now();
        let result = execute_with_retry(&breaker, &policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(AssistantError::RateLimited {
                        retry_after: Some(Duration::from_secs(7)),
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert!(started.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_rejects_without_invoking_the_operation() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(600),
            close_threshold: 1,
        });
        breaker.record_failure();
        let policy = RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        };
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = execute_with_retry(&breaker, &policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;

        assert!(matches!(result, Err(AssistantError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn backoff_never_exceeds_the_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        };
        for attempt in 0..20 {
            assert!(policy.backoff_delay(attempt) <= policy.max_delay);
        }
    }

    #[test]
    fn backoff_grows_exponentially_before_the_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(600),
        };
        // jitter is bounded by base_delay, so attempt 3 strictly exceeds attempt 0's range
        assert!(policy.backoff_delay(3) >= Duration::from_millis(800));
        assert!(policy.backoff_delay(0) < Duration::from_millis(200));
    }
}
