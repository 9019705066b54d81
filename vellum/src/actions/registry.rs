//! Action registry: registration, enable/disable, approval lookup,
//! validation, and fault-contained dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::invocation::ActionInvocation;

use super::{Action, ActionContext, ActionOutcome, ActionSpec, ReversibleEffect, Validation};

/// Registration and lookup failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("action '{0}' is already registered")]
    Duplicate(String),
    #[error("unknown action '{0}'")]
    Unknown(String),
}

struct Registered {
    action: Arc<dyn Action>,
    spec: ActionSpec,
    enabled: bool,
    requires_approval: bool,
}

/// Catalog of available actions.
///
/// Configured up-front (register, enable, approval overrides), then shared
/// immutably with the coordinator. Dispatch contains the blast radius of a
/// single faulty action: every execution error becomes a structured failed
/// outcome.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Registered>,
}

/// Outcome of one dispatched invocation plus its reversible effect, when the
/// action produced one.
pub struct ExecutionRecord {
    pub outcome: ActionOutcome,
    pub reversal: Option<ReversibleEffect>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action. Fails on a duplicate name; no silent overwrite.
    pub fn register(&mut self, action: Arc<dyn Action>) -> Result<(), RegistryError> {
        let spec = action.spec();
        let name = spec.name.clone();
        if self.actions.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        let requires_approval = spec.requires_approval;
        self.actions.insert(
            name,
            Registered {
                action,
                spec,
                enabled: true,
                requires_approval,
            },
        );
        Ok(())
    }

    /// Toggles whether an action is offered to generation, without
    /// unregistering it. Idempotent.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), RegistryError> {
        let entry = self
            .actions
            .get_mut(name)
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))?;
        entry.enabled = enabled;
        Ok(())
    }

    /// Overrides the declared approval requirement for one action.
    /// Which actions need approval is deployment configuration, not code.
    pub fn set_approval_required(
        &mut self,
        name: &str,
        required: bool,
    ) -> Result<(), RegistryError> {
        let entry = self
            .actions
            .get_mut(name)
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))?;
        entry.requires_approval = required;
        Ok(())
    }

    /// Whether executing `name` needs a human decision. Unknown actions
    /// require approval (fail closed).
    pub fn is_approval_required(&self, name: &str) -> bool {
        self.actions
            .get(name)
            .map(|r| r.requires_approval)
            .unwrap_or(true)
    }

    /// Whether `name` may run concurrently with other parallel-safe actions.
    pub fn is_parallel_safe(&self, name: &str) -> bool {
        self.actions
            .get(name)
            .map(|r| r.spec.parallel_safe)
            .unwrap_or(false)
    }

    pub fn description(&self, name: &str) -> Option<&str> {
        self.actions.get(name).map(|r| r.spec.description.as_str())
    }

    /// Specs of all enabled actions, declared to the generation capability.
    pub fn specs(&self) -> Vec<ActionSpec> {
        let mut specs: Vec<ActionSpec> = self
            .actions
            .values()
            .filter(|r| r.enabled)
            .map(|r| r.spec.clone())
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Validates an argument payload. Unknown or disabled actions fail
    /// validation; nothing is partially applied.
    pub fn validate(&self, name: &str, args: &serde_json::Value) -> Validation {
        match self.actions.get(name) {
            None => Validation::error(format!("unknown action '{}'", name)),
            Some(r) if !r.enabled => Validation::error(format!("action '{}' is disabled", name)),
            Some(r) => r.action.validate(args),
        }
    }

    /// Dispatches one approved invocation.
    ///
    /// Validation runs strictly first; a failed validation prevents execution
    /// and surfaces the error list. Execution errors are converted to a failed
    /// outcome, never propagated raw past this boundary.
    pub async fn execute(
        &self,
        invocation: &ActionInvocation,
        ctx: &ActionContext,
    ) -> ExecutionRecord {
        let validation = self.validate(&invocation.name, &invocation.arguments);
        if !validation.is_valid() {
            warn!(
                action = %invocation.name,
                call_id = %invocation.id,
                errors = ?validation.errors,
                "validation rejected invocation"
            );
            return ExecutionRecord {
                outcome: ActionOutcome {
                    call_id: invocation.id.clone(),
                    name: invocation.name.clone(),
                    content: format!("Validation failed: {}", validation.errors.join("; ")),
                    is_error: true,
                },
                reversal: None,
            };
        }
        for warning in &validation.warnings {
            debug!(action = %invocation.name, warning = %warning, "validation warning");
        }

        // validate() above guarantees the entry exists and is enabled
        let Some(registered) = self.actions.get(&invocation.name) else {
            return ExecutionRecord {
                outcome: ActionOutcome {
                    call_id: invocation.id.clone(),
                    name: invocation.name.clone(),
                    content: format!("unknown action '{}'", invocation.name),
                    is_error: true,
                },
                reversal: None,
            };
        };

        debug!(action = %invocation.name, call_id = %invocation.id, "executing action");
        match registered
            .action
            .execute(invocation.arguments.clone(), ctx)
            .await
        {
            Ok(receipt) => ExecutionRecord {
                outcome: ActionOutcome {
                    call_id: invocation.id.clone(),
                    name: invocation.name.clone(),
                    content: receipt.content,
                    is_error: false,
                },
                reversal: receipt.reversal,
            },
            Err(e) => {
                warn!(action = %invocation.name, call_id = %invocation.id, error = %e, "action failed");
                ExecutionRecord {
                    outcome: ActionOutcome {
                        call_id: invocation.id.clone(),
                        name: invocation.name.clone(),
                        content: e.to_string(),
                        is_error: true,
                    },
                    reversal: None,
                }
            }
        }
    }
}
