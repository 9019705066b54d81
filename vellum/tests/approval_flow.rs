//! End-to-end flows through the coordinator: suspension, decisions, execution,
//! resumption, and the undo ledger, driven by scripted generation against
//! file-backed note actions in a temp folder.


use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use session_event::ProtocolEvent;
use vellum::{
    Action, ActionContext, ActionError, ActionReceipt, ActionRegistry, ActionSpec, AssistantConfig,
    AssistantError, ConversationContext, Coordinator, Effect, GenerationEvent, RawActionEvent,
    ResumptionToken, ScriptedGeneration, SessionState, Turn, Validation,
};

fn write_effect(path: PathBuf, content: String) -> Effect {
    Arc::new(move || {
        let path = path.clone();
        let content = content.clone();
        Box::pin(async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &content).await?;
            Ok(())
        })
    })
}

fn remove_effect(path: PathBuf) -> Effect {
    Arc::new(move || {
        let path = path.clone();
        Box::pin(async move {
            tokio::fs::remove_file(&path).await?;
            Ok(())
        })
    })
}

fn relative_path(args: &Value) -> Result<&str, ActionError> {
    let path = args
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| ActionError::InvalidArguments("'path' must be a string".into()))?;
    if Path::new(path).is_absolute() || path.contains("..") {
        return Err(ActionError::InvalidArguments(
            "'path' must stay inside the working folder".into(),
        ));
    }
    Ok(path)
}

/// Creates a note file under the working folder; undo removes it.
struct CreateNote {
    root: PathBuf,
}

#[async_trait]
impl Action for CreateNote {
    fn name(&self) -> &str {
        "create_note"
    }

    fn spec(&self) -> ActionSpec {
        ActionSpec::new(
            "create_note",
            "Creates a new note with the given content",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["path"]
            }),
        )
        .requires_approval()
    }

    fn validate(&self, args: &Value) -> Validation {
        match relative_path(args) {
            Ok(_) => Validation::ok(),
            Err(e) => Validation::error(e.to_string()),
        }
    }

    async fn execute(
        &self,
        args: Value,
        _ctx: &ActionContext,
    ) -> Result<ActionReceipt, ActionError> {
        let rel = relative_path(&args)?;
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &content).await?;
        Ok(ActionReceipt::reversible(
            format!("Created note {}", rel),
            format!("Create note {}", rel),
            remove_effect(path.clone()),
            write_effect(path, content),
        ))
    }
}

fn setup(
    scripts: Vec<Vec<GenerationEvent>>,
) -> (
    Coordinator,
    Arc<ScriptedGeneration>,
    ConversationContext,
    tempfile::TempDir,
) {
    let dir = tempfile::tempdir().expect("tempdir");
    let generation = Arc::new(ScriptedGeneration::new(scripts));
    let mut registry = ActionRegistry::new();
    registry
        .register(Arc::new(CreateNote {
            root: dir.path().to_path_buf(),
        }))
        .unwrap();
    let coordinator = Coordinator::new(
        generation.clone(),
        Arc::new(registry),
        AssistantConfig::default(),
    );
    let ctx = ConversationContext::default();
    (coordinator, generation, ctx, dir)
}

fn request_note(path: &str) -> GenerationEvent {
    GenerationEvent::ActionRequested(RawActionEvent::named(
        "create_note",
        json!({"path": path, "content": "hi"}),
    ))
}

fn suspend(token: &str) -> GenerationEvent {
    GenerationEvent::Suspended {
        token: ResumptionToken::new(token),
    }
}

fn complete(text: &str) -> Vec<GenerationEvent> {
    vec![
        GenerationEvent::TextDelta(text.to_string()),
        GenerationEvent::Completed {
            final_text: text.to_string(),
        },
    ]
}

#[tokio::test]
async fn streamed_text_then_action_request_suspends() {
    let (coordinator, _, mut ctx, _dir) = setup(vec![vec![
        GenerationEvent::TextDelta("Hello ".into()),
        GenerationEvent::TextDelta("world".into()),
        request_note("A.md"),
        suspend("t-1"),
    ]]);
    let mut events = Vec::new();

    let turn = coordinator
        .run_turn(&mut ctx, "make a note", &mut |e| events.push(e))
        .await
        .unwrap();

    let Turn::Suspended { session, pending } = turn else {
        panic!("expected suspension");
    };
    assert_eq!(session.state(), SessionState::Suspended);
    assert_eq!(session.buffered_text(), "Hello world");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].name, "create_note");
    assert_eq!(
        pending[0].description,
        "Creates a new note with the given content"
    );

    // chunks arrive in production order, then the request, then the checkpoint
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            ProtocolEvent::MessageChunk { .. } => "chunk",
            ProtocolEvent::ActionRequested { .. } => "requested",
            ProtocolEvent::ApprovalRequired { .. } => "approval",
            other => panic!("unexpected event: {:?}", other),
        })
        .collect();
    assert_eq!(kinds, vec!["chunk", "chunk", "requested", "approval"]);
}

#[tokio::test]
async fn rejecting_the_only_invocation_never_reaches_the_registry() {
    let (coordinator, generation, mut ctx, dir) = setup(vec![
        vec![request_note("A.md"), suspend("t-1")],
        complete("Understood, I won't create it."),
    ]);

    let Turn::Suspended { session, pending } = coordinator
        .run_turn(&mut ctx, "make a note", &mut |_| {})
        .await
        .unwrap()
    else {
        panic!("expected suspension");
    };

    let decisions = HashMap::from([(pending[0].id.clone(), false)]);
    let Turn::Completed { final_text } = coordinator
        .resume(&mut ctx, session, &decisions, &mut |_| {})
        .await
        .unwrap()
    else {
        panic!("expected completion");
    };
    assert_eq!(final_text, "Understood, I won't create it.");

    // the action never executed and the generation saw a declined notice
    assert!(!dir.path().join("A.md").exists());
    let payloads = generation.resume_payloads();
    assert_eq!(payloads.len(), 1);
    assert!(payloads[0][0].is_error);
    assert!(payloads[0][0].content.contains("declined"));
    assert!(ctx.ledger.is_empty());
}

#[tokio::test]
async fn mixed_batch_executes_approved_subset_only() {
    let (coordinator, generation, mut ctx, dir) = setup(vec![
        vec![request_note("A.md"), request_note("B.md"), suspend("t-1")],
        complete("Created A, skipped B."),
    ]);
    let mut events = Vec::new();

    let Turn::Suspended { session, pending } = coordinator
        .run_turn(&mut ctx, "make two notes", &mut |e| events.push(e))
        .await
        .unwrap()
    else {
        panic!("expected suspension");
    };
    assert_eq!(pending.len(), 2);

    let decisions = HashMap::from([
        (pending[0].id.clone(), true),
        (pending[1].id.clone(), false),
    ]);
    let turn = coordinator
        .resume(&mut ctx, session, &decisions, &mut |e| events.push(e))
        .await
        .unwrap();
    assert!(matches!(turn, Turn::Completed { .. }));

    assert!(dir.path().join("A.md").exists());
    assert!(!dir.path().join("B.md").exists());

    // only the approved invocation appears in the ledger
    assert_eq!(ctx.ledger.kinds(), vec!["create_note"]);

    // outcomes fed back in request order: executed result, then declined notice
    let payloads = generation.resume_payloads();
    assert_eq!(payloads[0].len(), 2);
    assert!(!payloads[0][0].is_error);
    assert!(payloads[0][1].is_error);

    let finished: Vec<bool> = events
        .iter()
        .filter_map(|e| match e {
            ProtocolEvent::ActionFinished { ok, .. } => Some(*ok),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![true, false]);
}

#[tokio::test]
async fn repeated_suspension_resolves_recursively() {
    let (coordinator, generation, mut ctx, dir) = setup(vec![
        vec![request_note("A.md"), suspend("t-1")],
        vec![
            GenerationEvent::TextDelta("Now the second one. ".into()),
            request_note("B.md"),
            suspend("t-2"),
        ],
        complete("Both notes created."),
    ]);

    let Turn::Suspended { session, pending } = coordinator
        .run_turn(&mut ctx, "make notes", &mut |_| {})
        .await
        .unwrap()
    else {
        panic!("expected first suspension");
    };
    let decisions = HashMap::from([(pending[0].id.clone(), true)]);
    let Turn::Suspended { session, pending } = coordinator
        .resume(&mut ctx, session, &decisions, &mut |_| {})
        .await
        .unwrap()
    else {
        panic!("expected second suspension");
    };

    let decisions = HashMap::from([(pending[0].id.clone(), true)]);
    let turn = coordinator
        .resume(&mut ctx, session, &decisions, &mut |_| {})
        .await
        .unwrap();
    assert!(matches!(turn, Turn::Completed { .. }));

    assert!(dir.path().join("A.md").exists());
    assert!(dir.path().join("B.md").exists());
    assert_eq!(generation.resume_tokens().len(), 2);
    assert_eq!(ctx.ledger.len(), 2);
}

#[tokio::test]
async fn recorded_effect_round_trips_through_undo_and_redo() {
    let (coordinator, _, mut ctx, dir) = setup(vec![
        vec![request_note("A.md"), suspend("t-1")],
        complete("Done."),
    ]);

    let Turn::Suspended { session, pending } = coordinator
        .run_turn(&mut ctx, "make a note", &mut |_| {})
        .await
        .unwrap()
    else {
        panic!("expected suspension");
    };
    let decisions = HashMap::from([(pending[0].id.clone(), true)]);
    coordinator
        .resume(&mut ctx, session, &decisions, &mut |_| {})
        .await
        .unwrap();

    let note = dir.path().join("A.md");
    assert_eq!(tokio::fs::read_to_string(&note).await.unwrap(), "hi");

    let undone = ctx.ledger.undo().await.unwrap();
    assert_eq!(undone.as_deref(), Some("Create note A.md"));
    assert!(!note.exists());

    ctx.ledger.redo().await.unwrap();
    assert_eq!(tokio::fs::read_to_string(&note).await.unwrap(), "hi");
}

#[tokio::test]
async fn stream_failure_preserves_partial_text_in_transcript() {
    let (coordinator, _, mut ctx, _dir) = setup(vec![vec![
        GenerationEvent::TextDelta("Let me think".into()),
        GenerationEvent::Failed(AssistantError::NetworkTransient("connection reset".into())),
    ]]);

    let err = coordinator
        .run_turn(&mut ctx, "hello", &mut |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, AssistantError::NetworkTransient(_)));

    let last = ctx.transcript.last().unwrap();
    assert_eq!(last.content, "Let me think");
    assert_eq!(last.status, vellum::MessageStatus::Partial);
}

#[tokio::test]
async fn validation_failure_surfaces_as_failed_outcome_without_side_effects() {
    let (coordinator, generation, mut ctx, dir) = setup(vec![
        vec![
            GenerationEvent::ActionRequested(RawActionEvent::named(
                "create_note",
                json!({"path": "../escape.md"}),
            )),
            suspend("t-1"),
        ],
        complete("That path is not allowed."),
    ]);

    let Turn::Suspended { session, pending } = coordinator
        .run_turn(&mut ctx, "escape", &mut |_| {})
        .await
        .unwrap()
    else {
        panic!("expected suspension");
    };
    let decisions = HashMap::from([(pending[0].id.clone(), true)]);
    let turn = coordinator
        .resume(&mut ctx, session, &decisions, &mut |_| {})
        .await
        .unwrap();
    assert!(matches!(turn, Turn::Completed { .. }));

    let payloads = generation.resume_payloads();
    assert!(payloads[0][0].is_error);
    assert!(payloads[0][0].content.contains("Validation failed"));
    assert!(dir.path().read_dir().unwrap().next().is_none());
    assert!(ctx.ledger.is_empty());
}
