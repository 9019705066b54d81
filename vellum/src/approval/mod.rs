//! Approval broker: applies human decisions to a suspended session's pending batch.
//!
//! Decisions are fail-closed (an invocation with no explicit decision is
//! rejected) and idempotent per id (re-deciding an already-decided invocation
//! keeps the original decision, so a stale UI event cannot flip a committed
//! approval). The broker never executes anything; it only moves invocations
//! from `Pending` to `Approved` or `Rejected`.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::actions::ActionRegistry;
use crate::invocation::{ActionInvocation, InvocationStatus};

/// Resolution of one decided batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalOutcome {
    AllApproved,
    AllRejected,
    /// At least one approved and at least one rejected. The approved subset
    /// still executes; the rejected subset is reported as cancelled.
    Mixed,
}

/// One pending invocation as exposed to the decision surface.
#[derive(Clone, Debug, Serialize)]
pub struct PendingApproval {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub description: String,
}

/// Builds the decision-surface view of a pending batch, pulling the
/// human-readable description from the registry when the action is known.
/// Only invocations still awaiting a decision appear; auto-approved or
/// already-decided ones are omitted.
pub fn pending_view(batch: &[ActionInvocation], registry: &ActionRegistry) -> Vec<PendingApproval> {
    batch
        .iter()
        .filter(|inv| inv.status == InvocationStatus::Pending)
        .map(|inv| PendingApproval {
            id: inv.id.clone(),
            name: inv.name.clone(),
            arguments: inv.arguments.clone(),
            description: registry
                .description(&inv.name)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Run action '{}'", inv.name)),
        })
        .collect()
}

/// Conversation-scoped decision store.
#[derive(Debug, Default)]
pub struct ApprovalBroker {
    decided: HashMap<String, bool>,
}

impl ApprovalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed decision for an id, when one exists.
    pub fn decision_for(&self, id: &str) -> Option<bool> {
        self.decided.get(id).copied()
    }

    /// Applies a decision map to a pending batch atomically.
    ///
    /// Every pending invocation ends up decided: ids missing from the map are
    /// rejected. Already-decided ids keep their original decision regardless of
    /// what the map says.
    pub fn decide(
        &mut self,
        batch: &mut [ActionInvocation],
        decisions: &HashMap<String, bool>,
    ) -> ApprovalOutcome {
        for inv in batch.iter_mut() {
            if inv.status != InvocationStatus::Pending {
                continue;
            }
            let approved = match self.decided.get(&inv.id) {
                Some(original) => {
                    debug!(call_id = %inv.id, decision = original, "ignoring re-decision");
                    *original
                }
                None => {
                    let approved = decisions.get(&inv.id).copied().unwrap_or(false);
                    self.decided.insert(inv.id.clone(), approved);
                    approved
                }
            };
            inv.status = if approved {
                InvocationStatus::Approved
            } else {
                InvocationStatus::Rejected
            };
        }

        let approved = batch
            .iter()
            .filter(|i| i.status == InvocationStatus::Approved)
            .count();
        let rejected = batch
            .iter()
            .filter(|i| i.status == InvocationStatus::Rejected)
            .count();
        match (approved, rejected) {
            (_, 0) => ApprovalOutcome::AllApproved,
            (0, _) => ApprovalOutcome::AllRejected,
            _ => ApprovalOutcome::Mixed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch() -> Vec<ActionInvocation> {
        vec![
            ActionInvocation::new("c1", "create_note", json!({"path": "A.md"}), "s-1"),
            ActionInvocation::new("c2", "delete_note", json!({"path": "B.md"}), "s-1"),
        ]
    }

    #[test]
    fn partial_map_rejects_the_remainder() {
        let mut broker = ApprovalBroker::new();
        let mut batch = batch();
        let decisions = HashMap::from([("c1".to_string(), true)]);

        let outcome = broker.decide(&mut batch, &decisions);

        assert_eq!(outcome, ApprovalOutcome::Mixed);
        assert_eq!(batch[0].status, InvocationStatus::Approved);
        assert_eq!(batch[1].status, InvocationStatus::Rejected);
    }

    #[test]
    fn empty_map_rejects_everything() {
        let mut broker = ApprovalBroker::new();
        let mut batch = batch();
        let outcome = broker.decide(&mut batch, &HashMap::new());

        assert_eq!(outcome, ApprovalOutcome::AllRejected);
        assert!(batch.iter().all(|i| i.status == InvocationStatus::Rejected));
    }

    #[test]
    fn re_deciding_keeps_the_first_decision() {
        let mut broker = ApprovalBroker::new();
        let mut batch = batch();
        broker.decide(&mut batch, &HashMap::from([("c1".to_string(), true)]));

        // simulate a stale UI event flipping the decision on a fresh copy
        let mut replay = vec![ActionInvocation::new(
            "c1",
            "create_note",
            json!({"path": "A.md"}),
            "s-1",
        )];
        broker.decide(&mut replay, &HashMap::from([("c1".to_string(), false)]));

        assert_eq!(replay[0].status, InvocationStatus::Approved);
        assert_eq!(broker.decision_for("c1"), Some(true));
    }

    #[test]
    fn pending_view_skips_already_decided_invocations() {
        let registry = ActionRegistry::new();
        let mut batch = batch();
        batch[1].status = InvocationStatus::Approved;

        let view = pending_view(&batch, &registry);

        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, "c1");
        assert_eq!(view[0].description, "Run action 'create_note'");
    }

    #[test]
    fn all_approved_outcome() {
        let mut broker = ApprovalBroker::new();
        let mut batch = batch();
        let decisions = HashMap::from([("c1".to_string(), true), ("c2".to_string(), true)]);
        assert_eq!(broker.decide(&mut batch, &decisions), ApprovalOutcome::AllApproved);
    }
}
