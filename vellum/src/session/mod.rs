//! Streaming session: drives one generation turn and detects suspension.
//!
//! A session consumes the finite, single-pass event stream from the generation
//! capability, accumulates text chunks in order, and normalizes action
//! requests into pending invocations. It suspends precisely when the
//! generation pauses awaiting their resolution, and never treats text after an
//! unresolved request as final: a `Completed` event arriving with unresolved
//! invocations is a protocol violation, not a completion.
//!
//! On failure the accumulated partial text is preserved and stays readable
//! through [`StreamingSession::buffered_text`]; it is discarded only when the
//! caller explicitly asks via [`StreamingSession::discard_partial`].

use session_event::ProtocolEvent;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AssistantError;
use crate::generation::{GenerationEvent, GenerationStream, ResumptionToken};
use crate::invocation::ActionInvocation;
use crate::normalize::{normalize_action_event, InvocationIdAllocator};

/// Lifecycle state of one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// One or more invocations await a human decision.
    Suspended,
    Completed,
    Failed,
}

/// One generation turn: ordered text buffer, pending invocations, resumption token.
#[derive(Debug)]
pub struct StreamingSession {
    id: String,
    state: SessionState,
    chunks: Vec<String>,
    pending: Vec<ActionInvocation>,
    token: Option<ResumptionToken>,
    rounds: u32,
    cancel: CancellationToken,
}

impl StreamingSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: SessionState::Active,
            chunks: Vec::new(),
            pending: Vec::new(),
            token: None,
            rounds: 0,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Accumulated text, in production order.
    pub fn buffered_text(&self) -> String {
        self.chunks.concat()
    }

    /// Pending invocations; non-empty only while `Suspended`.
    pub fn pending_invocations(&self) -> &[ActionInvocation] {
        &self.pending
    }

    /// Token for cancelling this session. Cancelling while `Suspended` neither
    /// executes nor rejects pending invocations; it only stops streaming.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drops accumulated partial text. Never called implicitly.
    pub fn discard_partial(&mut self) {
        self.chunks.clear();
    }

    pub(crate) fn take_pending(&mut self) -> Vec<ActionInvocation> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn pending_invocations_mut(&mut self) -> &mut [ActionInvocation] {
        &mut self.pending
    }

    pub(crate) fn take_token(&mut self) -> Option<ResumptionToken> {
        self.token.take()
    }

    pub(crate) fn mark_active(&mut self) {
        self.state = SessionState::Active;
    }

    /// Counts one suspend/resume round; returns the new total.
    pub(crate) fn bump_round(&mut self) -> u32 {
        self.rounds += 1;
        self.rounds
    }

    /// Consumes the event stream until completion, suspension, or failure.
    ///
    /// Text deltas are appended in order and forwarded to the sink. Action
    /// requests are normalized into pending invocations. Returns the resulting
    /// session state; errors leave the partial buffer intact.
    pub async fn drive<F>(
        &mut self,
        stream: &mut GenerationStream,
        ids: &mut InvocationIdAllocator,
        sink: &mut F,
    ) -> Result<SessionState, AssistantError>
    where
        F: FnMut(ProtocolEvent),
    {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(session = %self.id, "session cancelled mid-stream");
                    self.state = SessionState::Failed;
                    return Err(AssistantError::Cancelled);
                }
                event = stream.next_event() => event,
            };

            match event {
                Some(GenerationEvent::TextDelta(text)) => {
                    sink(ProtocolEvent::MessageChunk {
                        content: text.clone(),
                    });
                    self.chunks.push(text);
                }
                Some(GenerationEvent::ActionRequested(raw)) => {
                    match normalize_action_event(&raw, &self.id, ids) {
                        Some(inv) => {
                            sink(ProtocolEvent::ActionRequested {
                                call_id: inv.id.clone(),
                                name: inv.name.clone(),
                                arguments: inv.arguments.clone(),
                            });
                            self.pending.push(inv);
                        }
                        None => {
                            warn!(session = %self.id, "dropping nameless action request");
                        }
                    }
                }
                Some(GenerationEvent::Suspended { token }) => {
                    if self.pending.is_empty() {
                        self.state = SessionState::Failed;
                        return Err(AssistantError::StreamStateInvalid(
                            "generation suspended with no pending invocations".to_string(),
                        ));
                    }
                    debug!(
                        session = %self.id,
                        pending = self.pending.len(),
                        "session suspended awaiting decisions"
                    );
                    self.token = Some(token);
                    self.state = SessionState::Suspended;
                    return Ok(self.state);
                }
                Some(GenerationEvent::Completed { final_text }) => {
                    if !self.pending.is_empty() {
                        self.state = SessionState::Failed;
                        return Err(AssistantError::StreamStateInvalid(
                            "generation completed past unresolved action requests".to_string(),
                        ));
                    }
                    // non-streaming turns deliver all output here
                    if self.chunks.is_empty() && !final_text.is_empty() {
                        sink(ProtocolEvent::MessageChunk {
                            content: final_text.clone(),
                        });
                        self.chunks.push(final_text);
                    }
                    self.state = SessionState::Completed;
                    sink(ProtocolEvent::TurnCompleted {
                        final_text: self.buffered_text(),
                    });
                    return Ok(self.state);
                }
                Some(GenerationEvent::Failed(error)) => {
                    warn!(session = %self.id, error = %error, "generation stream failed");
                    self.state = SessionState::Failed;
                    sink(ProtocolEvent::TurnFailed {
                        message: error.user_message(),
                    });
                    return Err(error);
                }
                None => {
                    self.state = SessionState::Failed;
                    return Err(AssistantError::StreamStateInvalid(
                        "generation stream ended without completion".to_string(),
                    ));
                }
            }
        }
    }
}
