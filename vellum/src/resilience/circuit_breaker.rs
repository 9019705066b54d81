//! Circuit breaker for a single wrapped dependency.
//!
//! Closed counts consecutive failures; crossing the threshold opens the
//! circuit. While open, calls are rejected immediately with the remaining
//! cooldown. Once the cooldown elapses exactly one probe call passes through
//! (half-open) regardless of how many callers race for it; the configured
//! number of consecutive probe successes closes the circuit again, and any
//! probe failure reopens it. The probe slot is a lease: a probe that never
//! reports back forfeits it after another cooldown, so an abandoned caller
//! cannot wedge the circuit half-open forever.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::AssistantError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Clone, Debug)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Cooldown before a probe is allowed through.
    pub reset_timeout: Duration,
    /// Consecutive probe successes that close the circuit again.
    pub close_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            close_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    probe_successes: u32,
    opened_at: Option<Instant>,
    /// When the in-flight probe was admitted; `None` while the slot is free.
    probe_started: Option<Instant>,
}

/// Shared, concurrency-safe circuit state for one dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                probe_successes: 0,
                opened_at: None,
                probe_started: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Admission check before a call. `Err(CircuitOpen)` carries the wait
    /// until the next probe slot.
    pub fn check(&self) -> Result<(), AssistantError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.reset_timeout {
                    debug!("circuit cooldown elapsed, allowing probe");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_started = Some(Instant::now());
                    inner.probe_successes = 0;
                    Ok(())
                } else {
                    Err(AssistantError::CircuitOpen {
                        wait: self.config.reset_timeout - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen => match inner.probe_started.map(|t| t.elapsed()) {
                Some(held) if held < self.config.reset_timeout => {
                    // another caller holds the probe lease
                    Err(AssistantError::CircuitOpen {
                        wait: self.config.reset_timeout - held,
                    })
                }
                _ => {
                    // free slot, or a lease whose holder never reported back
                    inner.probe_started = Some(Instant::now());
                    Ok(())
                }
            },
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.probe_started = None;
                inner.probe_successes += 1;
                if inner.probe_successes >= self.config.close_threshold {
                    debug!("circuit closed after successful probes");
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.probe_successes = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        failures = inner.consecutive_failures,
                        "failure threshold crossed, circuit open"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!("probe failed, circuit reopened");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_started = None;
                inner.probe_successes = 0;
            }
            CircuitState::Open => {}
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
