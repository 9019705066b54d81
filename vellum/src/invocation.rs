//! Canonical action invocation record and its status lifecycle.
//!
//! Status transitions are owned by exactly two components: the approval broker
//! moves `Pending` to `Approved`/`Rejected`, and the coordinator moves approved
//! invocations through `Executing` to `Completed`/`Failed`. Terminal statuses
//! are never mutated again.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of one invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Pending,
    Approved,
    Rejected,
    Executing,
    Completed,
    Failed,
}

impl InvocationStatus {
    /// Terminal statuses: `Rejected`, `Completed`, `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Failed)
    }
}

/// One requested execution of a named action with concrete arguments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionInvocation {
    /// Stable identity; never reassigned within a session (see `normalize`).
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub session_id: String,
    pub status: InvocationStatus,
}

impl ActionInvocation {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Value,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            session_id: session_id.into(),
            status: InvocationStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
