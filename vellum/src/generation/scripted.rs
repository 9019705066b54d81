//! Scripted generation client for tests and offline demos.
//!
//! Each call to `start` or `resume` pops the next event script. Resume payloads
//! are recorded so tests can assert exactly which outcomes were fed back.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::actions::ActionOutcome;
use crate::error::AssistantError;

use super::{
    GenerationClient, GenerationEvent, GenerationRequest, GenerationStream, ResumptionToken,
};

/// Generation client that replays fixed event scripts.
#[derive(Default)]
pub struct ScriptedGeneration {
    scripts: Mutex<VecDeque<Vec<GenerationEvent>>>,
    resumes: Mutex<Vec<(ResumptionToken, Vec<ActionOutcome>)>>,
    starts: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGeneration {
    /// One script per expected `start`/`resume` call, in order.
    pub fn new(scripts: Vec<Vec<GenerationEvent>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            resumes: Mutex::new(vec![]),
            starts: Mutex::new(vec![]),
        }
    }

    /// Single turn that streams `text` in one chunk and completes.
    pub fn single_turn(text: &str) -> Self {
        Self::new(vec![vec![
            GenerationEvent::TextDelta(text.to_string()),
            GenerationEvent::Completed {
                final_text: text.to_string(),
            },
        ]])
    }

    /// Outcomes fed back via `resume`, in call order.
    pub fn resume_payloads(&self) -> Vec<Vec<ActionOutcome>> {
        self.resumes
            .lock()
            .map(|r| r.iter().map(|(_, o)| o.clone()).collect())
            .unwrap_or_default()
    }

    /// Tokens passed to `resume`, in call order.
    pub fn resume_tokens(&self) -> Vec<ResumptionToken> {
        self.resumes
            .lock()
            .map(|r| r.iter().map(|(t, _)| t.clone()).collect())
            .unwrap_or_default()
    }

    /// Requests passed to `start`, in call order.
    pub fn start_count(&self) -> usize {
        self.starts.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn pop_script(&self) -> Result<GenerationStream, AssistantError> {
        let script = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .ok_or_else(|| {
                AssistantError::StreamStateInvalid("scripted generation exhausted".to_string())
            })?;
        Ok(GenerationStream::from_events(script))
    }
}

#[async_trait]
impl GenerationClient for ScriptedGeneration {
    async fn start(&self, request: GenerationRequest) -> Result<GenerationStream, AssistantError> {
        if let Ok(mut starts) = self.starts.lock() {
            starts.push(request);
        }
        self.pop_script()
    }

    async fn resume(
        &self,
        token: ResumptionToken,
        outcomes: Vec<ActionOutcome>,
    ) -> Result<GenerationStream, AssistantError> {
        if let Ok(mut resumes) = self.resumes.lock() {
            resumes.push((token, outcomes));
        }
        self.pop_script()
    }
}
