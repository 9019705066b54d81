//! Vellum CLI: chat with a document assistant whose mutating actions need
//! your approval before they run.
//!
//! Commands inside the prompt: `:undo`, `:redo`, `:quit`. Pass `--offline` to
//! drive the conversation from a scripted generation without an API key.

mod actions;

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use session_event::{EnvelopeState, ProtocolEvent};
use vellum::{
    ActionRegistry, AssistantConfig, ChatCompletions, ConversationContext, Coordinator,
    GenerationClient, GenerationEvent, PendingApproval, RawActionEvent, ResumptionToken,
    ScriptedGeneration, Turn,
};

#[derive(Parser, Debug)]
#[command(name = "vellum")]
#[command(about = "Vellum — document assistant with approval-gated actions")]
struct Args {
    /// Working folder for note actions
    #[arg(short, long, value_name = "DIR", default_value = "./notes")]
    working_folder: PathBuf,

    /// Model identifier
    #[arg(long, value_name = "NAME", env = "VELLUM_MODEL")]
    model: Option<String>,

    /// OpenAI-compatible base URL (default: api.openai.com)
    #[arg(long, value_name = "URL", env = "OPENAI_BASE_URL")]
    base_url: Option<String>,

    /// Comma-separated action names that skip the approval prompt
    #[arg(long, value_name = "NAMES")]
    auto_approve: Option<String>,

    /// Replay a scripted conversation instead of calling a model (no key needed)
    #[arg(long)]
    offline: bool,

    /// Emit protocol events as JSON lines (with session/event envelope)
    #[arg(long)]
    json: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Scripted two-phase demo: a suspension with one pending create, then a
/// completion, then a few plain turns.
fn demo_generation() -> ScriptedGeneration {
    let mut scripts = vec![
        vec![
            GenerationEvent::TextDelta("I'll set up a welcome note for you. ".into()),
            GenerationEvent::ActionRequested(RawActionEvent::named(
                "create_note",
                json!({"path": "welcome.md", "content": "# Welcome\n\nYour notes live here.\n"}),
            )),
            GenerationEvent::Suspended {
                token: ResumptionToken::new("demo-turn-1"),
            },
        ],
        vec![
            GenerationEvent::TextDelta("All set. Ask me to read or change your notes.".into()),
            GenerationEvent::Completed {
                final_text: "All set. Ask me to read or change your notes.".into(),
            },
        ],
    ];
    for _ in 0..8 {
        scripts.push(vec![
            GenerationEvent::TextDelta(
                "This is the offline demo; run without --offline for a real model.".into(),
            ),
            GenerationEvent::Completed {
                final_text: "This is the offline demo; run without --offline for a real model."
                    .into(),
            },
        ]);
    }
    ScriptedGeneration::new(scripts)
}

fn render_event(event: &ProtocolEvent, as_json: bool, envelope: &mut EnvelopeState) {
    if as_json {
        if let Ok(mut value) = event.to_value() {
            envelope.inject_into(&mut value);
            println!("{}", value);
        }
        return;
    }
    match event {
        ProtocolEvent::MessageChunk { content } => {
            print!("{}", content);
            let _ = std::io::stdout().flush();
        }
        ProtocolEvent::ActionRequested { name, .. } => {
            println!();
            println!("  [requested] {}", name);
        }
        ProtocolEvent::ApprovalRequired { pending } => {
            println!("  {} action(s) awaiting approval", pending.len());
        }
        ProtocolEvent::ActionStarted { name, .. } => {
            println!("  [running]   {}", name);
        }
        ProtocolEvent::ActionFinished { name, ok, summary, .. } => {
            let mark = if *ok { "done" } else { "failed" };
            println!("  [{}]      {}: {}", mark, name, summary);
        }
        ProtocolEvent::TurnCompleted { .. } => {
            println!();
        }
        ProtocolEvent::TurnFailed { message } => {
            println!();
            println!("  turn failed: {}", message);
        }
    }
}

fn read_line(prompt: &str) -> std::io::Result<Option<String>> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn prompt_decisions(pending: &[PendingApproval]) -> std::io::Result<HashMap<String, bool>> {
    let mut decisions = HashMap::new();
    println!();
    for p in pending {
        println!("approval needed: {}", p.description);
        println!("  {}({})", p.name, p.arguments);
        let answer = read_line("  approve? [y/N] ")?.unwrap_or_default();
        decisions.insert(p.id.clone(), matches!(answer.as_str(), "y" | "Y" | "yes"));
    }
    Ok(decisions)
}

async fn run_conversation_turn(
    coordinator: &Coordinator,
    ctx: &mut ConversationContext,
    text: &str,
    as_json: bool,
) {
    let mut envelope = EnvelopeState::new(ctx.id.clone());
    let mut sink = |event: ProtocolEvent| render_event(&event, as_json, &mut envelope);

    let mut turn = match coordinator.run_turn(ctx, text, &mut sink).await {
        Ok(turn) => turn,
        Err(e) => {
            eprintln!("{}", e.user_message());
            return;
        }
    };
    loop {
        match turn {
            Turn::Completed { .. } => return,
            Turn::Suspended { session, pending } => {
                let decisions = match prompt_decisions(&pending) {
                    Ok(d) => d,
                    Err(e) => {
                        eprintln!("could not read decisions: {}", e);
                        return;
                    }
                };
                turn = match coordinator.resume(ctx, session, &decisions, &mut sink).await {
                    Ok(turn) => turn,
                    Err(e) => {
                        eprintln!("{}", e.user_message());
                        return;
                    }
                };
            }
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&args.working_folder)?;

    let mut config = AssistantConfig::from_env();
    if let Some(model) = args.model.clone() {
        config.model = model;
    }
    if let Some(names) = &args.auto_approve {
        config
            .approval_exempt
            .extend(names.split(',').map(|s| s.trim().to_string()));
    }

    let mut registry = ActionRegistry::new();
    actions::register_note_actions(&mut registry, &args.working_folder)?;
    config.apply_approval_overrides(&mut registry);

    let generation: Arc<dyn GenerationClient> = if args.offline {
        Arc::new(demo_generation())
    } else {
        Arc::new(ChatCompletions::from_env()?)
    };

    let coordinator = Coordinator::new(generation, Arc::new(registry), config.clone());
    let mut ctx = ConversationContext::new(config.ledger_capacity).with_system_prompt(
        "You are a note-taking assistant. Use the note actions to create, read, \
         append to and delete notes in the user's working folder. Destructive \
         changes require the user's approval.",
    );

    println!(
        "vellum — notes in {} ({}). :undo, :redo, :quit",
        args.working_folder.display(),
        if args.offline { "offline demo" } else { config.model.as_str() },
    );

    while let Some(line) = read_line("you> ")? {
        match line.as_str() {
            "" => continue,
            ":quit" | ":q" | ":exit" => break,
            ":undo" => match ctx.ledger.undo().await {
                Ok(Some(description)) => println!("undone: {}", description),
                Ok(None) => println!("nothing to undo"),
                Err(e) => println!("undo failed: {}", e),
            },
            ":redo" => match ctx.ledger.redo().await {
                Ok(Some(description)) => println!("redone: {}", description),
                Ok(None) => println!("nothing to redo"),
                Err(e) => println!("redo failed: {}", e),
            },
            text => run_conversation_turn(&coordinator, &mut ctx, text, args.json).await,
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
