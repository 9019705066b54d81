//! Reversible-operation ledger backing undo/redo.
//!
//! Entries form one linear sequence with a cursor: everything before the
//! cursor is undoable, everything at or after it is redoable. Recording a new
//! entry truncates the redo tail, so no orphaned redo branch survives a new
//! action. The ledger is conversation-scoped and in-memory; it is lost on
//! restart.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::actions::{ActionError, Effect, ReversibleEffect};

/// One recorded mutation with its inverse.
pub struct LedgerEntry {
    pub id: String,
    /// Operation kind, usually the action name.
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    undo: Effect,
    redo: Effect,
}

/// Linear, bounded undo/redo history for one conversation.
pub struct UndoLedger {
    entries: Vec<LedgerEntry>,
    cursor: usize,
    capacity: usize,
}

impl UndoLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Description of the entry `undo` would revert, when one exists.
    pub fn undo_description(&self) -> Option<&str> {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(|e| e.description.as_str())
    }

    /// Description of the entry `redo` would re-apply, when one exists.
    pub fn redo_description(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(|e| e.description.as_str())
    }

    /// Kinds of all recorded entries, oldest first.
    pub fn kinds(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.kind.as_str()).collect()
    }

    /// Appends at the cursor, discarding any redo tail, then evicts the oldest
    /// entries past capacity. Eviction only removes entries strictly before
    /// the earliest reachable undo point, never redo targets.
    pub fn record(&mut self, kind: impl Into<String>, reversal: ReversibleEffect) {
        if self.cursor < self.entries.len() {
            let dropped = self.entries.len() - self.cursor;
            debug!(dropped, "discarding redo tail");
            self.entries.truncate(self.cursor);
        }
        self.entries.push(LedgerEntry {
            id: Uuid::new_v4().to_string(),
            kind: kind.into(),
            timestamp: Utc::now(),
            description: reversal.description,
            undo: reversal.undo,
            redo: reversal.redo,
        });
        self.cursor = self.entries.len();

        while self.entries.len() > self.capacity && self.cursor > 0 {
            self.entries.remove(0);
            self.cursor -= 1;
        }
    }

    /// Runs the undo effect of the entry before the cursor and moves the
    /// cursor back. `Ok(None)` when there is nothing to undo. The cursor does
    /// not move if the effect fails.
    pub async fn undo(&mut self) -> Result<Option<String>, ActionError> {
        let Some(index) = self.cursor.checked_sub(1) else {
            return Ok(None);
        };
        let (effect, description) = {
            let entry = &self.entries[index];
            (entry.undo.clone(), entry.description.clone())
        };
        if let Err(e) = effect().await {
            warn!(entry = %description, error = %e, "undo effect failed");
            return Err(e);
        }
        self.cursor = index;
        debug!(entry = %description, "undone");
        Ok(Some(description))
    }

    /// Runs the redo effect of the entry at the cursor and advances the
    /// cursor. `Ok(None)` when there is nothing to redo.
    pub async fn redo(&mut self) -> Result<Option<String>, ActionError> {
        if self.cursor >= self.entries.len() {
            return Ok(None);
        }
        let (effect, description) = {
            let entry = &self.entries[self.cursor];
            (entry.redo.clone(), entry.description.clone())
        };
        if let Err(e) = effect().await {
            warn!(entry = %description, error = %e, "redo effect failed");
            return Err(e);
        }
        self.cursor += 1;
        debug!(entry = %description, "redone");
        Ok(Some(description))
    }
}

impl Default for UndoLedger {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Reversal that sets a shared cell to `applied` on redo and `reverted` on undo.
    fn cell_reversal(
        cell: &Arc<Mutex<String>>,
        applied: &str,
        reverted: &str,
        description: &str,
    ) -> ReversibleEffect {
        let set = |cell: Arc<Mutex<String>>, value: String| -> Effect {
            Arc::new(move || {
                let cell = cell.clone();
                let value = value.clone();
                Box::pin(async move {
                    *cell.lock().unwrap() = value;
                    Ok(())
                })
            })
        };
        ReversibleEffect {
            description: description.to_string(),
            undo: set(cell.clone(), reverted.to_string()),
            redo: set(cell.clone(), applied.to_string()),
        }
    }

    fn read(cell: &Arc<Mutex<String>>) -> String {
        cell.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn undo_then_redo_round_trips() {
        let cell = Arc::new(Mutex::new("v1".to_string()));
        let mut ledger = UndoLedger::new(10);
        ledger.record("edit", cell_reversal(&cell, "v1", "v0", "set v1"));

        assert_eq!(ledger.undo().await.unwrap().as_deref(), Some("set v1"));
        assert_eq!(read(&cell), "v0");

        assert_eq!(ledger.redo().await.unwrap().as_deref(), Some("set v1"));
        assert_eq!(read(&cell), "v1");
    }

    #[tokio::test]
    async fn undo_and_redo_no_op_at_the_ends() {
        let mut ledger = UndoLedger::new(10);
        assert_eq!(ledger.undo().await.unwrap(), None);
        assert_eq!(ledger.redo().await.unwrap(), None);
    }

    #[tokio::test]
    async fn recording_after_undo_discards_the_redo_tail() {
        let cell = Arc::new(Mutex::new(String::new()));
        let mut ledger = UndoLedger::new(10);
        ledger.record("a", cell_reversal(&cell, "a", "", "op a"));
        ledger.record("b", cell_reversal(&cell, "b", "a", "op b"));

        ledger.undo().await.unwrap();
        ledger.record("c", cell_reversal(&cell, "c", "a", "op c"));

        assert_eq!(ledger.kinds(), vec!["a", "c"]);
        assert!(!ledger.can_redo());
        assert_eq!(ledger.redo().await.unwrap(), None);
    }

    #[tokio::test]
    async fn eviction_never_removes_redo_targets() {
        let cell = Arc::new(Mutex::new(String::new()));
        let mut ledger = UndoLedger::new(2);
        ledger.record("a", cell_reversal(&cell, "a", "", "op a"));
        ledger.record("b", cell_reversal(&cell, "b", "a", "op b"));
        ledger.record("c", cell_reversal(&cell, "c", "b", "op c"));

        // capacity 2: "a" was strictly before the reachable undo window
        assert_eq!(ledger.kinds(), vec!["b", "c"]);

        ledger.undo().await.unwrap();
        ledger.undo().await.unwrap();
        assert!(ledger.can_redo());
        assert_eq!(ledger.redo_description(), Some("op b"));
    }

    #[tokio::test]
    async fn failed_undo_leaves_the_cursor_in_place() {
        let mut ledger = UndoLedger::new(10);
        let failing: Effect = Arc::new(|| {
            Box::pin(async { Err(ActionError::Failed("effect target missing".into())) })
        });
        let noop: Effect = Arc::new(|| Box::pin(async { Ok(()) }));
        ledger.record(
            "edit",
            ReversibleEffect {
                description: "doomed".to_string(),
                undo: failing,
                redo: noop,
            },
        );

        assert!(ledger.undo().await.is_err());
        assert!(ledger.can_undo());
    }
}
