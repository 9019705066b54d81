//! # Vellum
//!
//! Tool-call interception, approval, and resumable-streaming orchestration for
//! a conversational document assistant. The model may both stream text and
//! request side-effecting actions; vellum interposes a human-approval
//! checkpoint between "the model decided to act" and "the action executes",
//! without losing the in-flight generation context, and resumes streaming once
//! decisions exist.
//!
//! ## Design principles
//!
//! - **Suspension is a first-class state**: a [`StreamingSession`] is Active,
//!   Suspended, Completed or Failed; pending invocations exist only while
//!   Suspended, and no text past an unresolved request is treated as final.
//! - **Fail closed**: undecided invocations are rejected; unknown actions
//!   require approval; re-decisions never flip a committed approval. Actions
//!   declared exempt are approved automatically and never surface at the
//!   checkpoint.
//! - **Rejection is not failure**: a declined invocation never reaches the
//!   registry, but the generation is told it did not happen and keeps going.
//! - **Conversation-scoped state**: transcript, ledger, decision store and id
//!   allocation live in one [`ConversationContext`] per conversation; the only
//!   process-wide structure is the [`CircuitBreaker`].
//!
//! ## Main modules
//!
//! - [`session`]: [`StreamingSession`], [`SessionState`] — drives one generation
//!   turn and detects suspension.
//! - [`coordinator`]: [`Coordinator`], [`Turn`] — the suspend/decide/execute/resume
//!   state machine.
//! - [`approval`]: [`ApprovalBroker`], [`ApprovalOutcome`], [`pending_view`] —
//!   fail-closed, idempotent decisions.
//! - [`actions`]: [`Action`] trait, [`ActionRegistry`], [`ActionSpec`],
//!   [`ReversibleEffect`] — validation and fault-contained dispatch.
//! - [`generation`]: [`GenerationClient`] trait, [`ChatCompletions`],
//!   [`ScriptedGeneration`], [`ResumptionToken`] — the opaque model capability.
//! - [`resilience`]: [`CircuitBreaker`], [`RetryPolicy`], [`execute_with_retry`].
//! - [`ledger`]: [`UndoLedger`] — linear, bounded undo/redo over reversible effects.
//! - [`normalize`]: [`InvocationIdAllocator`], [`normalize_action_event`] — maps
//!   inconsistent raw event shapes to canonical invocations at the boundary.
//! - [`message`], [`invocation`], [`error`], [`config`], [`context`].
//!
//! Key types are re-exported at crate root:
//! `use vellum::{Coordinator, ConversationContext, ActionRegistry};`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use vellum::{
//!     AssistantConfig, ConversationContext, Coordinator, ActionRegistry,
//!     ChatCompletions, Turn,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), vellum::AssistantError> {
//! let generation = Arc::new(ChatCompletions::from_env()?);
//! let registry = Arc::new(ActionRegistry::new());
//! let coordinator = Coordinator::new(generation, registry, AssistantConfig::default());
//!
//! let mut ctx = ConversationContext::default();
//! let mut sink = |event| println!("{:?}", event);
//! match coordinator.run_turn(&mut ctx, "hello", &mut sink).await? {
//!     Turn::Completed { final_text } => println!("{}", final_text),
//!     Turn::Suspended { session, pending } => {
//!         // render `pending`, collect decisions, then:
//!         let decisions: HashMap<String, bool> = HashMap::new();
//!         coordinator.resume(&mut ctx, session, &decisions, &mut sink).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod approval;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod generation;
pub mod invocation;
pub mod ledger;
pub mod message;
pub mod normalize;
pub mod resilience;
pub mod session;

pub use actions::{
    Action, ActionContext, ActionError, ActionOutcome, ActionReceipt, ActionRegistry, ActionSpec,
    Effect, EffectFuture, ExecutionRecord, RegistryError, ReversibleEffect, Validation,
};
pub use approval::{pending_view, ApprovalBroker, ApprovalOutcome, PendingApproval};
pub use config::AssistantConfig;
pub use context::ConversationContext;
pub use coordinator::{approval_event, Coordinator, Turn};
pub use error::AssistantError;
pub use generation::{
    ChatCompletions, GenerationClient, GenerationConfig, GenerationEvent, GenerationRequest,
    GenerationStream, ResumptionToken, ScriptedGeneration,
};
pub use invocation::{ActionInvocation, InvocationStatus};
pub use ledger::{LedgerEntry, UndoLedger};
pub use message::{Message, MessageStatus, Role};
pub use normalize::{normalize_action_event, InvocationIdAllocator, RawActionEvent};
pub use resilience::{execute_with_retry, BreakerConfig, CircuitBreaker, CircuitState, RetryPolicy};
pub use session::{SessionState, StreamingSession};
