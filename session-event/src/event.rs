//! Protocol-level event types (type + payload).
//!
//! One variant per observable step of a session turn: text chunks, action requests,
//! the approval checkpoint, per-action execution progress, and turn termination.
//! Envelope fields (session_id, event_id) are applied separately.

use serde::Serialize;
use serde_json::Value;

/// One pending invocation as rendered on the decision surface.
///
/// `description` is human-readable copy for the approval UI; `arguments` is the
/// structured payload the action would run with.
#[derive(Clone, Debug, Serialize)]
pub struct PendingAction {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
    pub description: String,
}

/// Protocol event: wire shape for one session stream event (type + payload).
///
/// Serialized with `type` tag in snake_case, e.g.
/// `{"type":"message_chunk","content":"Hello"}`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// Incremental assistant text, delivered in production order.
    MessageChunk { content: String },
    /// The generation requested one action invocation.
    ActionRequested {
        call_id: String,
        name: String,
        arguments: Value,
    },
    /// The session suspended; clients show an approval UI and reply with a decision map.
    ApprovalRequired { pending: Vec<PendingAction> },
    /// An approved invocation started executing.
    ActionStarted { call_id: String, name: String },
    /// An invocation reached a terminal status (executed, failed, or declined).
    ActionFinished {
        call_id: String,
        name: String,
        ok: bool,
        summary: String,
    },
    /// The turn finished; `final_text` is the full assistant reply.
    TurnCompleted { final_text: String },
    /// The turn failed; `message` is the human-facing error line.
    TurnFailed { message: String },
}

impl ProtocolEvent {
    /// Serializes this event to a JSON object (type + payload only; no envelope).
    ///
    /// Use [`crate::to_json`] when you need envelope fields injected.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
