//! Normalization adapter: raw generation events to canonical [`ActionInvocation`]s.
//!
//! Upstream SDKs emit action requests in several shapes (id under `id` or
//! `call_id`, arguments under `arguments` or `input`, sometimes as a JSON string
//! instead of an object). This module maps any of those shapes to the canonical
//! record at the system boundary so nothing downstream branches on shape.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::invocation::ActionInvocation;

/// Raw action-request payload as received from the generation capability.
///
/// All fields are optional; [`normalize_action_event`] resolves the aliases.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawActionEvent {
    pub id: Option<String>,
    /// Alternate id location used by some event shapes.
    pub call_id: Option<String>,
    pub name: Option<String>,
    /// Alternate name location.
    pub tool_name: Option<String>,
    pub arguments: Option<Value>,
    /// Alternate arguments location.
    pub input: Option<Value>,
}

impl RawActionEvent {
    pub fn named(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: Some(name.into()),
            arguments: Some(arguments),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Allocates stable invocation ids for one session.
///
/// Events that carry an explicit id keep it, and repeats of the same explicit id
/// map back to the same allocation. Events without an id get a deterministic
/// fallback from the action name plus a monotonic counter. Either way, one raw
/// event is never assigned two different ids within the session.
#[derive(Debug, Default)]
pub struct InvocationIdAllocator {
    next_seq: u64,
    assigned: HashMap<String, String>,
}

impl InvocationIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, explicit: Option<&str>, name: &str) -> String {
        if let Some(explicit) = explicit {
            return self
                .assigned
                .entry(explicit.to_string())
                .or_insert_with(|| explicit.to_string())
                .clone();
        }
        let id = format!("{}-{}", name, self.next_seq);
        self.next_seq += 1;
        id
    }
}

/// Flattens nested argument encodings: a JSON string payload that itself parses
/// as JSON is unwrapped, anything absent becomes an empty object.
fn resolve_arguments(raw: &RawActionEvent) -> Value {
    let value = raw
        .arguments
        .clone()
        .or_else(|| raw.input.clone())
        .unwrap_or_else(|| Value::Object(Default::default()));
    if let Some(s) = value.as_str() {
        match serde_json::from_str(s) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "nested action arguments failed to parse, keeping raw string");
                value
            }
        }
    } else {
        value
    }
}

/// Maps one raw event shape to the canonical invocation record.
///
/// Returns `None` (with a warning) when no action name is present in any known
/// location; such events cannot be dispatched and are dropped at the boundary.
pub fn normalize_action_event(
    raw: &RawActionEvent,
    session_id: &str,
    ids: &mut InvocationIdAllocator,
) -> Option<ActionInvocation> {
    let name = raw
        .name
        .as_deref()
        .or(raw.tool_name.as_deref())?
        .to_string();
    let explicit_id = raw.id.as_deref().or(raw.call_id.as_deref());
    let id = ids.allocate(explicit_id, &name);
    let arguments = resolve_arguments(raw);
    Some(ActionInvocation::new(id, name, arguments, session_id))
}
