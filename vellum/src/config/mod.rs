//! Assistant configuration.
//!
//! `Default` gives working values; `from_env` overrides them from `VELLUM_*`
//! environment variables. Which actions require approval is configuration,
//! not code: the per-action declared default can be overridden per deployment
//! through [`AssistantConfig::approval_required`] and
//! [`AssistantConfig::approval_exempt`].

use std::time::Duration;

use tracing::warn;

use crate::actions::ActionRegistry;
use crate::generation::GenerationConfig;
use crate::resilience::{BreakerConfig, RetryPolicy};

#[derive(Clone, Debug)]
pub struct AssistantConfig {
    pub model: String,
    pub temperature: Option<f32>,
    /// Budget on suspend/resume rounds within one turn.
    pub max_turns: u32,
    pub ledger_capacity: usize,
    pub retry: RetryPolicy,
    pub breaker: BreakerConfig,
    /// Action names forced to require approval, on top of their declared spec.
    pub approval_required: Vec<String>,
    /// Action names exempted from approval.
    pub approval_exempt: Vec<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: None,
            max_turns: 8,
            ledger_capacity: 100,
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
            approval_required: vec![],
            approval_exempt: vec![],
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, value = %raw, "unparseable value ignored");
                None
            }
        },
        Err(_) => None,
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

impl AssistantConfig {
    /// Defaults overridden by `VELLUM_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(model) = std::env::var("VELLUM_MODEL") {
            config.model = model;
        }
        if let Some(t) = env_parse::<f32>("VELLUM_TEMPERATURE") {
            config.temperature = Some(t);
        }
        if let Some(n) = env_parse::<u32>("VELLUM_MAX_TURNS") {
            config.max_turns = n;
        }
        if let Some(n) = env_parse::<usize>("VELLUM_LEDGER_CAPACITY") {
            config.ledger_capacity = n;
        }
        if let Some(n) = env_parse::<u32>("VELLUM_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = n;
        }
        if let Some(ms) = env_parse::<u64>("VELLUM_RETRY_BASE_DELAY_MS") {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("VELLUM_RETRY_MAX_DELAY_MS") {
            config.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<u32>("VELLUM_BREAKER_FAILURE_THRESHOLD") {
            config.breaker.failure_threshold = n;
        }
        if let Some(secs) = env_parse::<u64>("VELLUM_BREAKER_RESET_SECS") {
            config.breaker.reset_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<u32>("VELLUM_BREAKER_CLOSE_THRESHOLD") {
            config.breaker.close_threshold = n;
        }
        if let Some(names) = env_list("VELLUM_APPROVAL_REQUIRED") {
            config.approval_required = names;
        }
        if let Some(names) = env_list("VELLUM_APPROVAL_EXEMPT") {
            config.approval_exempt = names;
        }
        config
    }

    /// Applies the per-deployment approval overrides to a populated registry.
    /// Unknown names are logged and skipped.
    pub fn apply_approval_overrides(&self, registry: &mut ActionRegistry) {
        for name in &self.approval_required {
            if registry.set_approval_required(name, true).is_err() {
                warn!(action = %name, "approval override names unknown action");
            }
        }
        for name in &self.approval_exempt {
            if registry.set_approval_required(name, false).is_err() {
                warn!(action = %name, "approval exemption names unknown action");
            }
        }
    }

    /// The generation-side view of this configuration, with the enabled
    /// actions a registry currently offers.
    pub fn generation_config(&self, registry: &ActionRegistry) -> GenerationConfig {
        GenerationConfig {
            model: self.model.clone(),
            temperature: self.temperature,
            max_turns: self.max_turns,
            actions: registry.specs(),
        }
    }
}
