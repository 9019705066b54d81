//! Generation capability boundary.
//!
//! The core treats the language model as an opaque capability: it accepts a
//! role-tagged conversation plus configuration (model id, turn budget, sampling
//! parameters, declared actions) and produces a finite, single-pass sequence of
//! [`GenerationEvent`]s. After an interruption it must support being resumed
//! from an opaque [`ResumptionToken`].
//!
//! Implementations: [`ScriptedGeneration`] (fixed event scripts, for tests and
//! offline demos) and [`ChatCompletions`] (OpenAI-compatible HTTP endpoint).

mod chat;
mod scripted;

pub use chat::ChatCompletions;
pub use scripted::ScriptedGeneration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::actions::{ActionOutcome, ActionSpec};
use crate::error::AssistantError;
use crate::message::Message;
use crate::normalize::RawActionEvent;

/// Configuration for one generation turn.
#[derive(Clone, Debug)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: Option<f32>,
    /// Budget on suspend/resume rounds within one turn.
    pub max_turns: u32,
    /// Actions declared available to the model.
    pub actions: Vec<ActionSpec>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: None,
            max_turns: 8,
            actions: vec![],
        }
    }
}

/// One generation request: ordered conversation plus configuration.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub messages: Vec<Message>,
    pub config: GenerationConfig,
}

/// Opaque capability allowing generation to continue from its suspension point.
/// The core stores and passes it back verbatim; only the issuing client
/// interprets it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumptionToken(String);

impl ResumptionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// One event in a generation stream.
#[derive(Clone, Debug)]
pub enum GenerationEvent {
    /// Incremental assistant text.
    TextDelta(String),
    /// The model requested one action invocation (raw shape; normalized by the session).
    ActionRequested(RawActionEvent),
    /// The model paused awaiting resolution of the requested actions.
    Suspended { token: ResumptionToken },
    /// The turn finished; `final_text` is the complete reply.
    Completed { final_text: String },
    /// The turn failed mid-stream.
    Failed(AssistantError),
}

/// Finite, single-pass sequence of generation events. Once exhausted the
/// stream is inert.
#[derive(Debug)]
pub struct GenerationStream {
    rx: mpsc::Receiver<GenerationEvent>,
}

impl GenerationStream {
    /// Builds a stream preloaded with a fixed event sequence.
    pub fn from_events(events: Vec<GenerationEvent>) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            // capacity == len, so try_send cannot fail
            let _ = tx.try_send(event);
        }
        Self { rx }
    }

    /// Builds a live stream; the producer feeds events through the sender.
    pub fn channel(buffer: usize) -> (mpsc::Sender<GenerationEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }

    /// Next event, or `None` when the stream is exhausted.
    pub async fn next_event(&mut self) -> Option<GenerationEvent> {
        self.rx.recv().await
    }
}

/// The generation capability: start a turn, or resume one from its token.
#[async_trait::async_trait]
pub trait GenerationClient: Send + Sync {
    /// Starts one generation turn.
    async fn start(&self, request: GenerationRequest) -> Result<GenerationStream, AssistantError>;

    /// Resumes a suspended turn, feeding back the outcomes of the resolved
    /// invocations (executed results and declined notices alike).
    async fn resume(
        &self,
        token: ResumptionToken,
        outcomes: Vec<ActionOutcome>,
    ) -> Result<GenerationStream, AssistantError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_events_is_single_pass_and_finite() {
        let mut stream = GenerationStream::from_events(vec![
            GenerationEvent::TextDelta("a".into()),
            GenerationEvent::Completed {
                final_text: "a".into(),
            },
        ]);

        assert!(matches!(
            stream.next_event().await,
            Some(GenerationEvent::TextDelta(_))
        ));
        assert!(matches!(
            stream.next_event().await,
            Some(GenerationEvent::Completed { .. })
        ));
        assert!(stream.next_event().await.is_none());
        // exhausted stream stays inert
        assert!(stream.next_event().await.is_none());
    }
}
