//! Resumable execution coordinator.
//!
//! Drives the full suspend/decide/execute/resume protocol for one
//! conversation turn:
//!
//! ```text
//! Suspended --(decisions complete)--> Executing
//! Executing --(approved actions run)--> Resuming
//! Resuming  --(session streams again)--> Active
//! Active    --(generation ends, nothing pending)--> Completed
//! Active    --(new pending invocations)--> Suspended
//! Executing --(unrecoverable failure)--> Failed
//! ```
//!
//! Invocations whose action is exempt from approval are approved
//! automatically and never surface at the checkpoint; a suspension whose whole
//! batch is exempt executes and resumes without handing control back at all.
//! Rejected invocations are never sent to the registry; the coordinator
//! synthesizes a declined notice that is fed back into the generation exactly
//! like an action result, so the next turn knows the action did not happen.
//! Approved invocations execute sequentially in request order; a batch runs
//! concurrently only when every approved action in it is declared
//! parallel-safe. A missing or invalid resumption token is fatal for the
//! session: restarting it silently could re-run already-approved actions.
//!
//! # Main types
//! - [`Coordinator`]: stateless orchestrator over generation, registry and breaker.
//! - [`Turn`]: result of one drive, either completed or suspended for decisions.
//!
//! Interaction: the caller alternates `run_turn` / `resume` with its decision
//! surface until a turn completes, observing progress through the protocol
//! event sink.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use session_event::{PendingAction, ProtocolEvent};
use tracing::{debug, info, warn};

use crate::actions::{ActionContext, ActionOutcome, ActionRegistry, ExecutionRecord};
use crate::approval::{pending_view, ApprovalOutcome, PendingApproval};
use crate::config::AssistantConfig;
use crate::context::ConversationContext;
use crate::error::AssistantError;
use crate::generation::{GenerationClient, GenerationRequest, GenerationStream};
use crate::invocation::{ActionInvocation, InvocationStatus};
use crate::message::Message;
use crate::resilience::{execute_with_retry, CircuitBreaker};
use crate::session::{SessionState, StreamingSession};

/// Result of driving a session until it settles.
#[derive(Debug)]
pub enum Turn {
    /// The generation finished. `final_text` spans the whole turn, including
    /// text streamed before any suspension.
    Completed { final_text: String },
    /// The generation paused for decisions. `pending` holds only the
    /// invocations that require approval; exempt ones are already approved.
    /// Hand `pending` to the decision surface, then call
    /// [`Coordinator::resume`] with the same session.
    Suspended {
        session: StreamingSession,
        pending: Vec<PendingApproval>,
    },
}

/// Orchestrates generation, approval and execution for one turn at a time.
///
/// Holds no per-conversation state; everything conversation-scoped lives in
/// the [`ConversationContext`]. The breaker is shared across conversations.
pub struct Coordinator {
    generation: Arc<dyn GenerationClient>,
    registry: Arc<ActionRegistry>,
    breaker: Arc<CircuitBreaker>,
    config: AssistantConfig,
}

impl Coordinator {
    pub fn new(
        generation: Arc<dyn GenerationClient>,
        registry: Arc<ActionRegistry>,
        config: AssistantConfig,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(config.breaker.clone()));
        Self {
            generation,
            registry,
            breaker,
            config,
        }
    }

    /// Shares an existing breaker instead of creating one.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        self.breaker.clone()
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Runs one user turn until the generation completes or suspends.
    pub async fn run_turn<F>(
        &self,
        ctx: &mut ConversationContext,
        user_text: impl Into<String>,
        sink: &mut F,
    ) -> Result<Turn, AssistantError>
    where
        F: FnMut(ProtocolEvent),
    {
        ctx.transcript.push(Message::user(user_text));
        let session_id = ctx.next_session_id();
        info!(conversation = %ctx.id, session = %session_id, "starting turn");

        let request = GenerationRequest {
            messages: ctx.transcript.clone(),
            config: self.config.generation_config(&self.registry),
        };
        let mut stream = execute_with_retry(&self.breaker, &self.config.retry, || {
            self.generation.start(request.clone())
        })
        .await?;

        let mut session = StreamingSession::new(session_id);
        self.settle(ctx, &mut session, &mut stream, sink).await?;
        self.advance_past_exempt(ctx, &mut session, sink).await?;
        self.turn_from(ctx, session, sink)
    }

    /// Applies decisions to a suspended session, executes the approved subset,
    /// and resumes streaming. Recursive through the caller: the returned turn
    /// may be suspended again.
    pub async fn resume<F>(
        &self,
        ctx: &mut ConversationContext,
        mut session: StreamingSession,
        decisions: &HashMap<String, bool>,
        sink: &mut F,
    ) -> Result<Turn, AssistantError>
    where
        F: FnMut(ProtocolEvent),
    {
        if session.state() != SessionState::Suspended {
            return Err(AssistantError::StreamStateInvalid(
                "resume called on a session that is not suspended".to_string(),
            ));
        }
        self.check_round(&mut session)?;

        let mut batch = session.take_pending();
        self.auto_approve_exempt(&mut batch);
        let outcome = ctx.broker.decide(&mut batch, decisions);
        debug!(
            session = %session.id(),
            batch = batch.len(),
            outcome = ?outcome,
            "decisions applied"
        );
        if outcome == ApprovalOutcome::Mixed {
            info!(session = %session.id(), "mixed batch: approved subset still executes");
        }

        self.run_decided_batch(ctx, &mut session, batch, sink).await?;
        self.advance_past_exempt(ctx, &mut session, sink).await?;
        self.turn_from(ctx, session, sink)
    }

    /// Approves pending invocations whose action is exempt from the human
    /// checkpoint. Which actions are exempt is registry configuration;
    /// [`ActionRegistry::is_approval_required`] fails closed for unknown names.
    fn auto_approve_exempt(&self, batch: &mut [ActionInvocation]) {
        for inv in batch.iter_mut() {
            if inv.status == InvocationStatus::Pending
                && !self.registry.is_approval_required(&inv.name)
            {
                debug!(call_id = %inv.id, action = %inv.name, "approval not required, auto-approved");
                inv.status = InvocationStatus::Approved;
            }
        }
    }

    fn check_round(&self, session: &mut StreamingSession) -> Result<(), AssistantError> {
        if session.bump_round() > self.config.max_turns {
            return Err(AssistantError::StreamStateInvalid(format!(
                "turn budget of {} suspend/resume rounds exhausted",
                self.config.max_turns
            )));
        }
        Ok(())
    }

    /// Resolves suspensions that need no human input: when every pending
    /// invocation is exempt, the batch executes and streaming continues
    /// without surfacing a checkpoint. Loops because the resumed stream may
    /// suspend again with another all-exempt batch.
    async fn advance_past_exempt<F>(
        &self,
        ctx: &mut ConversationContext,
        session: &mut StreamingSession,
        sink: &mut F,
    ) -> Result<(), AssistantError>
    where
        F: FnMut(ProtocolEvent),
    {
        while session.state() == SessionState::Suspended {
            self.auto_approve_exempt(session.pending_invocations_mut());
            if session
                .pending_invocations()
                .iter()
                .any(|inv| inv.status == InvocationStatus::Pending)
            {
                return Ok(());
            }
            debug!(session = %session.id(), "whole batch exempt from approval, resuming");
            self.check_round(session)?;
            let batch = session.take_pending();
            self.run_decided_batch(ctx, session, batch, sink).await?;
        }
        Ok(())
    }

    /// Executes a fully decided batch, feeds the outcomes back through the
    /// generation, and drives the stream to its next settlement point.
    async fn run_decided_batch<F>(
        &self,
        ctx: &mut ConversationContext,
        session: &mut StreamingSession,
        mut batch: Vec<ActionInvocation>,
        sink: &mut F,
    ) -> Result<(), AssistantError>
    where
        F: FnMut(ProtocolEvent),
    {
        let outcomes = self.execute_batch(ctx, session, &mut batch, sink).await;
        for o in &outcomes {
            ctx.transcript.push(Message::action_result(
                o.call_id.as_str(),
                o.content.as_str(),
                !o.is_error,
            ));
        }

        // The token is the only way to continue this generation; without it the
        // session cannot be restarted, because that could re-run approved actions.
        let token = session.take_token().ok_or_else(|| {
            AssistantError::StreamStateInvalid("resumption token missing".to_string())
        })?;
        let mut stream = execute_with_retry(&self.breaker, &self.config.retry, || {
            self.generation.resume(token.clone(), outcomes.clone())
        })
        .await?;

        session.mark_active();
        self.settle(ctx, session, &mut stream, sink).await
    }

    /// Executes the decided batch in request order. Rejected invocations get a
    /// synthesized declined outcome and never reach the registry. The whole
    /// batch runs concurrently only when every approved action is
    /// parallel-safe.
    async fn execute_batch<F>(
        &self,
        ctx: &mut ConversationContext,
        session: &StreamingSession,
        batch: &mut [ActionInvocation],
        sink: &mut F,
    ) -> Vec<ActionOutcome>
    where
        F: FnMut(ProtocolEvent),
    {
        let actx = ActionContext {
            conversation_id: ctx.id.clone(),
            session_id: session.id().to_string(),
        };

        let approved: Vec<usize> = batch
            .iter()
            .enumerate()
            .filter(|(_, inv)| inv.status == InvocationStatus::Approved)
            .map(|(i, _)| i)
            .collect();
        let run_parallel = approved.len() > 1
            && approved
                .iter()
                .all(|&i| self.registry.is_parallel_safe(&batch[i].name));

        let mut records: HashMap<usize, ExecutionRecord> = HashMap::new();
        if run_parallel {
            debug!(count = approved.len(), "executing parallel-safe batch concurrently");
            for &i in &approved {
                batch[i].status = InvocationStatus::Executing;
                sink(ProtocolEvent::ActionStarted {
                    call_id: batch[i].id.clone(),
                    name: batch[i].name.clone(),
                });
            }
            let futures = approved.iter().map(|&i| {
                let inv = batch[i].clone();
                let actx = actx.clone();
                async move { self.registry.execute(&inv, &actx).await }
            });
            for (&i, record) in approved.iter().zip(join_all(futures).await) {
                records.insert(i, record);
            }
        } else {
            for &i in &approved {
                batch[i].status = InvocationStatus::Executing;
                sink(ProtocolEvent::ActionStarted {
                    call_id: batch[i].id.clone(),
                    name: batch[i].name.clone(),
                });
                let record = self.registry.execute(&batch[i], &actx).await;
                records.insert(i, record);
            }
        }

        let mut outcomes = Vec::with_capacity(batch.len());
        for (i, inv) in batch.iter_mut().enumerate() {
            let outcome = match inv.status {
                InvocationStatus::Rejected => {
                    let outcome = ActionOutcome::declined(&inv.id, &inv.name);
                    sink(ProtocolEvent::ActionFinished {
                        call_id: inv.id.clone(),
                        name: inv.name.clone(),
                        ok: false,
                        summary: outcome.content.clone(),
                    });
                    outcome
                }
                InvocationStatus::Executing => {
                    let Some(record) = records.remove(&i) else {
                        continue;
                    };
                    inv.status = if record.outcome.is_error {
                        InvocationStatus::Failed
                    } else {
                        InvocationStatus::Completed
                    };
                    if let Some(reversal) = record.reversal {
                        ctx.ledger.record(inv.name.clone(), reversal);
                    }
                    sink(ProtocolEvent::ActionFinished {
                        call_id: inv.id.clone(),
                        name: inv.name.clone(),
                        ok: !record.outcome.is_error,
                        summary: record.outcome.content.clone(),
                    });
                    record.outcome
                }
                other => {
                    warn!(call_id = %inv.id, status = ?other, "invocation skipped execution");
                    continue;
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Drives the stream to its next settlement point and updates the
    /// transcript. On failure the partial text is recorded as a partial
    /// assistant message before the error propagates.
    async fn settle<F>(
        &self,
        ctx: &mut ConversationContext,
        session: &mut StreamingSession,
        stream: &mut GenerationStream,
        sink: &mut F,
    ) -> Result<(), AssistantError>
    where
        F: FnMut(ProtocolEvent),
    {
        match session.drive(stream, &mut ctx.ids, sink).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let partial = session.buffered_text();
                if !partial.is_empty() {
                    ctx.transcript.push(Message::assistant_partial(partial));
                }
                Err(e)
            }
        }
    }

    fn turn_from<F>(
        &self,
        ctx: &mut ConversationContext,
        session: StreamingSession,
        sink: &mut F,
    ) -> Result<Turn, AssistantError>
    where
        F: FnMut(ProtocolEvent),
    {
        match session.state() {
            SessionState::Completed => {
                let final_text = session.buffered_text();
                ctx.transcript.push(Message::assistant(final_text.clone()));
                info!(session = %session.id(), "turn completed");
                Ok(Turn::Completed { final_text })
            }
            SessionState::Suspended => {
                let pending = pending_view(session.pending_invocations(), &self.registry);
                sink(approval_event(&pending));
                Ok(Turn::Suspended { session, pending })
            }
            other => Err(AssistantError::StreamStateInvalid(format!(
                "session settled in unexpected state {:?}",
                other
            ))),
        }
    }
}

/// Protocol-event view of a pending batch, for callers forwarding it on a wire.
pub fn approval_event(pending: &[PendingApproval]) -> ProtocolEvent {
    ProtocolEvent::ApprovalRequired {
        pending: pending
            .iter()
            .map(|p| PendingAction {
                call_id: p.id.clone(),
                name: p.name.clone(),
                arguments: p.arguments.clone(),
                description: p.description.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, ActionError, ActionReceipt, ActionSpec};
    use crate::generation::{GenerationEvent, ResumptionToken, ScriptedGeneration};
    use crate::normalize::RawActionEvent;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct NoteAction;

    #[async_trait]
    impl Action for NoteAction {
        fn name(&self) -> &str {
            "create_note"
        }

        fn spec(&self) -> ActionSpec {
            ActionSpec::new("create_note", "Creates a note", json!({"type": "object"}))
                .requires_approval()
        }

        async fn execute(
            &self,
            args: Value,
            _ctx: &ActionContext,
        ) -> Result<ActionReceipt, ActionError> {
            let path = args
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| ActionError::InvalidArguments("missing path".into()))?;
            Ok(ActionReceipt::text(format!("created {}", path)))
        }
    }

    struct LookupAction;

    #[async_trait]
    impl Action for LookupAction {
        fn name(&self) -> &str {
            "read_note"
        }

        fn spec(&self) -> ActionSpec {
            ActionSpec::new("read_note", "Reads a note", json!({"type": "object"}))
        }

        async fn execute(
            &self,
            _args: Value,
            _ctx: &ActionContext,
        ) -> Result<ActionReceipt, ActionError> {
            Ok(ActionReceipt::text("note body"))
        }
    }

    fn coordinator(scripts: Vec<Vec<GenerationEvent>>) -> (Coordinator, Arc<ScriptedGeneration>) {
        let generation = Arc::new(ScriptedGeneration::new(scripts));
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(NoteAction)).unwrap();
        registry.register(Arc::new(LookupAction)).unwrap();
        let coordinator = Coordinator::new(
            generation.clone(),
            Arc::new(registry),
            AssistantConfig::default(),
        );
        (coordinator, generation)
    }

    fn suspension_script() -> Vec<GenerationEvent> {
        vec![
            GenerationEvent::TextDelta("I'll create that note. ".into()),
            GenerationEvent::ActionRequested(RawActionEvent::named(
                "create_note",
                json!({"path": "A.md"}),
            )),
            GenerationEvent::Suspended {
                token: ResumptionToken::new("t-1"),
            },
        ]
    }

    fn completion_script(text: &str) -> Vec<GenerationEvent> {
        vec![
            GenerationEvent::TextDelta(text.to_string()),
            GenerationEvent::Completed {
                final_text: text.to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn approved_invocation_executes_and_turn_completes() {
        let (coordinator, generation) = coordinator(vec![
            suspension_script(),
            completion_script("Created the note."),
        ]);
        let mut ctx = ConversationContext::default();
        let mut sink = |_| {};

        let turn = coordinator
            .run_turn(&mut ctx, "make A.md", &mut sink)
            .await
            .unwrap();
        let Turn::Suspended { session, pending } = turn else {
            panic!("expected suspension");
        };
        assert_eq!(pending.len(), 1);

        let decisions = HashMap::from([(pending[0].id.clone(), true)]);
        let turn = coordinator
            .resume(&mut ctx, session, &decisions, &mut sink)
            .await
            .unwrap();
        let Turn::Completed { final_text } = turn else {
            panic!("expected completion");
        };
        // the buffer is append-only across suspension, so the final text
        // carries the pre-suspension stream too
        assert_eq!(final_text, "I'll create that note. Created the note.");

        let payloads = generation.resume_payloads();
        assert_eq!(payloads[0][0].content, "created A.md");
        assert!(!payloads[0][0].is_error);
    }

    #[tokio::test]
    async fn exempt_invocation_executes_without_a_checkpoint() {
        let (coordinator, generation) = coordinator(vec![
            vec![
                GenerationEvent::ActionRequested(RawActionEvent::named(
                    "read_note",
                    json!({"path": "A.md"}),
                )),
                GenerationEvent::Suspended {
                    token: ResumptionToken::new("t-1"),
                },
            ],
            completion_script("A.md says hi."),
        ]);
        let mut ctx = ConversationContext::default();
        let mut events = Vec::new();

        let turn = coordinator
            .run_turn(&mut ctx, "what does A.md say?", &mut |e| events.push(e))
            .await
            .unwrap();
        let Turn::Completed { final_text } = turn else {
            panic!("expected completion without a checkpoint");
        };
        assert_eq!(final_text, "A.md says hi.");

        // the action ran and its result reached the generation
        let payloads = generation.resume_payloads();
        assert_eq!(payloads[0][0].content, "note body");
        assert!(!payloads[0][0].is_error);
        assert!(!events
            .iter()
            .any(|e| matches!(e, ProtocolEvent::ApprovalRequired { .. })));
    }

    #[tokio::test]
    async fn only_approval_requiring_invocations_surface_in_pending() {
        let (coordinator, generation) = coordinator(vec![
            vec![
                GenerationEvent::ActionRequested(RawActionEvent::named("read_note", json!({}))),
                GenerationEvent::ActionRequested(RawActionEvent::named(
                    "create_note",
                    json!({"path": "A.md"}),
                )),
                GenerationEvent::Suspended {
                    token: ResumptionToken::new("t-1"),
                },
            ],
            completion_script("Done."),
        ]);
        let mut ctx = ConversationContext::default();
        let mut sink = |_| {};

        let Turn::Suspended { session, pending } = coordinator
            .run_turn(&mut ctx, "read then create", &mut sink)
            .await
            .unwrap()
        else {
            panic!("expected suspension");
        };
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "create_note");

        let decisions = HashMap::from([(pending[0].id.clone(), true)]);
        let turn = coordinator
            .resume(&mut ctx, session, &decisions, &mut sink)
            .await
            .unwrap();
        assert!(matches!(turn, Turn::Completed { .. }));

        // outcomes in request order: exempt read first, approved create second
        let payloads = generation.resume_payloads();
        assert_eq!(payloads[0].len(), 2);
        assert_eq!(payloads[0][0].name, "read_note");
        assert!(!payloads[0][0].is_error);
        assert_eq!(payloads[0][1].name, "create_note");
        assert!(!payloads[0][1].is_error);
    }

    #[tokio::test]
    async fn missing_token_is_fatal() {
        let (coordinator, _) = coordinator(vec![suspension_script()]);
        let mut ctx = ConversationContext::default();
        let mut sink = |_| {};

        let turn = coordinator
            .run_turn(&mut ctx, "make A.md", &mut sink)
            .await
            .unwrap();
        let Turn::Suspended { mut session, pending } = turn else {
            panic!("expected suspension");
        };
        // simulate a lost token
        let _ = session.take_token();

        let decisions = HashMap::from([(pending[0].id.clone(), true)]);
        let err = coordinator
            .resume(&mut ctx, session, &decisions, &mut |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::StreamStateInvalid(_)));
    }

    #[tokio::test]
    async fn resume_on_completed_session_is_rejected() {
        let (coordinator, _) = coordinator(vec![completion_script("hi")]);
        let mut ctx = ConversationContext::default();
        let Turn::Completed { .. } = coordinator
            .run_turn(&mut ctx, "hello", &mut |_| {})
            .await
            .unwrap()
        else {
            panic!("expected completion");
        };

        let session = StreamingSession::new(ctx.next_session_id());
        let err = coordinator
            .resume(&mut ctx, session, &HashMap::new(), &mut |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::StreamStateInvalid(_)));
    }
}
