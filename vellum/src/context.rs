//! Per-conversation state.
//!
//! Everything that used to be tempting to make a process-wide singleton lives
//! here instead: the transcript, the undo ledger, the approval decision store
//! and the invocation id allocator are owned by one [`ConversationContext`]
//! and passed by reference. Each conversation, and each test, constructs a
//! fresh context; conversations share no mutable state with each other. The
//! one deliberate process-wide structure is the circuit breaker.

use uuid::Uuid;

use crate::approval::ApprovalBroker;
use crate::ledger::UndoLedger;
use crate::message::Message;
use crate::normalize::InvocationIdAllocator;

/// State owned by one conversation.
pub struct ConversationContext {
    pub id: String,
    /// Ordered role-tagged transcript; the only state expected to persist
    /// across restarts.
    pub transcript: Vec<Message>,
    pub ledger: UndoLedger,
    pub broker: ApprovalBroker,
    pub ids: InvocationIdAllocator,
    session_seq: u64,
}

impl ConversationContext {
    pub fn new(ledger_capacity: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            transcript: Vec::new(),
            ledger: UndoLedger::new(ledger_capacity),
            broker: ApprovalBroker::new(),
            ids: InvocationIdAllocator::new(),
            session_seq: 0,
        }
    }

    /// Seeds the transcript with a system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.transcript.push(Message::system(prompt));
        self
    }

    /// Allocates the id for the next streaming session of this conversation.
    pub fn next_session_id(&mut self) -> String {
        self.session_seq += 1;
        format!("{}-s{}", self.id, self.session_seq)
    }
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new(100)
    }
}
