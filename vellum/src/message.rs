//! Role-tagged transcript messages.
//!
//! The transcript (`Vec<Message>`) is the only state expected to persist across
//! process restarts, so messages are serde round-trippable: role, content,
//! timestamp, status, and an optional call id linking an action result back to
//! its invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message author role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Result of an executed (or declined) action, fed back into generation.
    Action,
}

/// Delivery status of one transcript message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Complete,
    /// Text accumulated before a failure or cancellation; preserved, not discarded.
    Partial,
    Failed,
}

/// One transcript message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Present only on `Role::Action` messages: the invocation this result belongs to.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub call_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            call_id: None,
            timestamp: Utc::now(),
            status: MessageStatus::Complete,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant text cut short by a failure; kept in the transcript for display.
    pub fn assistant_partial(content: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Assistant, content);
        msg.status = MessageStatus::Partial;
        msg
    }

    /// Result of one action invocation (success or failure), keyed by call id.
    pub fn action_result(call_id: impl Into<String>, content: impl Into<String>, ok: bool) -> Self {
        let mut msg = Self::new(Role::Action, content);
        msg.call_id = Some(call_id.into());
        msg.status = if ok {
            MessageStatus::Complete
        } else {
            MessageStatus::Failed
        };
        msg
    }
}
