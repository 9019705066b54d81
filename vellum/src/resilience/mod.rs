//! Resilience wrapper around external calls.
//!
//! Two cooperating pieces: a [`CircuitBreaker`] that stops calling a failing
//! dependency for a cooldown period, and a [`RetryPolicy`] of bounded
//! exponential backoff with jitter. [`execute_with_retry`] composes both
//! around any async operation.
//!
//! The breaker is process-wide per wrapped dependency and shared across
//! sessions behind an `Arc`; the retry policy is plain configuration.

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use retry::{execute_with_retry, RetryPolicy};
