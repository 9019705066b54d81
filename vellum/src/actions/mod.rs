//! Action capability set: the trait one side-effecting capability implements,
//! plus the registry that validates and dispatches invocations.
//!
//! The core treats actions as a closed, named set. Each action declares a spec
//! (name, description, JSON input schema, approval requirement, parallel
//! safety), validates its arguments before execution, and may return a
//! reversible effect that the coordinator records in the undo ledger.

mod registry;

pub use registry::{ActionRegistry, ExecutionRecord, RegistryError};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Declared properties of one action, offered to the generation capability.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for the argument payload.
    pub input_schema: Value,
    /// Whether executing this action needs a human decision first.
    /// Configuration, not code: the registry can override it per deployment.
    pub requires_approval: bool,
    /// Whether this action may run concurrently with other parallel-safe actions.
    /// Defaults to false; order-dependent side effects stay sequential.
    pub parallel_safe: bool,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            requires_approval: false,
            parallel_safe: false,
        }
    }

    pub fn requires_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    pub fn parallel_safe(mut self) -> Self {
        self.parallel_safe = true;
        self
    }
}

/// Result of validating an argument payload: field-level errors and warnings.
/// Any error prevents execution.
#[derive(Clone, Debug, Default)]
pub struct Validation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Validation {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            warnings: vec![],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Failure inside one action's underlying effect. Caught at the registry
/// boundary and converted into a failed outcome, never propagated raw.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Failed(String),
}

/// Structured result of one invocation, fed back into the generation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub call_id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

impl ActionOutcome {
    /// Synthesized outcome for a rejected invocation; the action never ran,
    /// but the generation must learn that it did not happen.
    pub fn declined(call_id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            call_id: call_id.into(),
            content: format!("User declined to run '{}'. The action was not executed.", name),
            name,
            is_error: true,
        }
    }
}

/// One side of a reversible mutation.
pub type EffectFuture = Pin<Box<dyn Future<Output = Result<(), ActionError>> + Send>>;
pub type Effect = Arc<dyn Fn() -> EffectFuture + Send + Sync>;

/// Undo/redo pair for an executed mutation, recorded in the ledger.
#[derive(Clone)]
pub struct ReversibleEffect {
    pub description: String,
    pub undo: Effect,
    pub redo: Effect,
}

impl std::fmt::Debug for ReversibleEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReversibleEffect")
            .field("description", &self.description)
            .finish()
    }
}

/// Successful execution result: payload text plus an optional reversible effect.
pub struct ActionReceipt {
    pub content: String,
    pub reversal: Option<ReversibleEffect>,
}

impl ActionReceipt {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reversal: None,
        }
    }

    pub fn reversible(
        content: impl Into<String>,
        description: impl Into<String>,
        undo: Effect,
        redo: Effect,
    ) -> Self {
        Self {
            content: content.into(),
            reversal: Some(ReversibleEffect {
                description: description.into(),
                undo,
                redo,
            }),
        }
    }
}

/// Per-call context handed to action implementations.
#[derive(Clone, Debug, Default)]
pub struct ActionContext {
    pub conversation_id: String,
    pub session_id: String,
}

/// A single capability the generation can invoke.
///
/// Implementations expose a name, a spec, an argument validator, and the
/// executor. The core never reflects into their internals.
#[async_trait]
pub trait Action: Send + Sync {
    /// Unique name across the registry.
    fn name(&self) -> &str;

    /// Declared properties offered to generation and to the approval layer.
    fn spec(&self) -> ActionSpec;

    /// Validates the argument payload. Runs strictly before `execute`;
    /// any error prevents execution.
    fn validate(&self, args: &Value) -> Validation {
        let _ = args;
        Validation::ok()
    }

    /// Executes the action. Errors are caught at the registry boundary.
    async fn execute(&self, args: Value, ctx: &ActionContext) -> Result<ActionReceipt, ActionError>;
}
