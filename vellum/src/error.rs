//! Error taxonomy for generation calls, action execution, and session control.
//!
//! Classification drives the resilience layer: [`AssistantError::is_retryable`] decides
//! whether the retry handler may re-attempt a call, [`AssistantError::retry_after`]
//! surfaces a mandatory wait (rate limits, open circuit) that overrides computed backoff,
//! and [`AssistantError::is_session_fatal`] marks errors that terminate the whole session
//! rather than one invocation.
//!
//! `Display` is the diagnostic message; [`AssistantError::user_message`] is the separate
//! human-facing line (actionable, no internals).

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the assistant core.
#[derive(Debug, Error, Clone)]
pub enum AssistantError {
    /// Timeout or unavailable dependency; safe to retry.
    #[error("transient network failure: {0}")]
    NetworkTransient(String),

    /// Provider rate limit; retryable after the mandatory wait when one was given.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Bad or missing credentials; fatal, never retried.
    #[error("invalid credentials: {0}")]
    CredentialInvalid(String),

    /// Argument validation rejected one invocation; fatal for that invocation only.
    #[error("validation failed for action '{action}': {errors:?}")]
    ActionValidationFailed {
        action: String,
        errors: Vec<String>,
    },

    /// An action's underlying effect failed; recorded on the invocation, not the session.
    #[error("action '{action}' failed: {message}")]
    ActionExecutionFailed { action: String, message: String },

    /// Resumption token missing or invalid, or the event stream violated the protocol.
    /// Fatal for the session; restarting could re-run already-approved actions.
    #[error("stream state invalid: {0}")]
    StreamStateInvalid(String),

    /// Circuit breaker is open; the call was rejected before reaching the dependency.
    #[error("circuit open; next attempt allowed in {wait:?}")]
    CircuitOpen { wait: Duration },

    /// The caller cancelled the session.
    #[error("cancelled")]
    Cancelled,
}

impl AssistantError {
    /// Whether the retry handler may re-attempt the failed call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkTransient(_) | Self::RateLimited { .. } | Self::CircuitOpen { .. }
        )
    }

    /// Mandatory wait before the next attempt, when the error carries one.
    /// Takes precedence over computed backoff.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            Self::CircuitOpen { wait } => Some(*wait),
            _ => None,
        }
    }

    /// Whether this error terminates the session (caller must start a new turn).
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::CredentialInvalid(_) | Self::StreamStateInvalid(_))
    }

    /// Human-facing message: actionable, no stack traces or internal detail.
    pub fn user_message(&self) -> String {
        match self {
            Self::NetworkTransient(_) => {
                "The assistant could not reach the model. Check your connection and try again."
                    .to_string()
            }
            Self::RateLimited { retry_after } => match retry_after {
                Some(wait) => format!(
                    "The model is rate limited. Try again in {} seconds.",
                    wait.as_secs().max(1)
                ),
                None => "The model is rate limited. Try again shortly.".to_string(),
            },
            Self::CredentialInvalid(_) => {
                "The configured API key was rejected. Update your credentials in settings."
                    .to_string()
            }
            Self::ActionValidationFailed { action, errors } => format!(
                "The '{}' action had invalid arguments: {}.",
                action,
                errors.join("; ")
            ),
            Self::ActionExecutionFailed { action, .. } => {
                format!("The '{}' action could not be completed.", action)
            }
            Self::StreamStateInvalid(_) => {
                "This conversation turn can no longer be resumed. Please send a new message."
                    .to_string()
            }
            Self::CircuitOpen { wait } => format!(
                "The model has been failing repeatedly; paused for {} seconds.",
                wait.as_secs().max(1)
            ),
            Self::Cancelled => "The request was cancelled.".to_string(),
        }
    }
}
