//! OpenAI-compatible chat completions client.
//!
//! Field names match the [OpenAI Chat Completions API](https://platform.openai.com/docs/api-reference/chat);
//! the wire DTOs are modelled here so the rest of the crate never sees them.
//!
//! This adapter runs non-streaming turns: the complete reply is emitted as one
//! `TextDelta` followed by `Completed`, so a turn without tool calls is a
//! session that produces its whole output before ever suspending. Tool calls
//! suspend the turn; the resumption token encodes the serialized conversation
//! including the assistant tool-call message, and `resume` appends the tool
//! results and re-issues the request.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::actions::{ActionOutcome, ActionSpec};
use crate::error::AssistantError;
use crate::message::{Message, Role};
use crate::normalize::RawActionEvent;

use super::{
    GenerationClient, GenerationEvent, GenerationRequest, GenerationStream, ResumptionToken,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Chat message wire shape (request and response sides).
#[derive(Clone, Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded argument object, as the API delivers it.
    arguments: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Clone, Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

/// Everything needed to continue a suspended turn, serialized into the token.
#[derive(Serialize, Deserialize)]
struct TokenState {
    model: String,
    temperature: Option<f32>,
    tools: Option<Vec<WireTool>>,
    messages: Vec<WireMessage>,
}

/// Generation client for any OpenAI-compatible endpoint.
pub struct ChatCompletions {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ChatCompletions {
    pub fn new(base_url: Option<&str>, api_key: impl Into<String>) -> Result<Self, AssistantError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                AssistantError::NetworkTransient(format!("could not build http client: {}", e))
            })?;
        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
        })
    }

    /// Reads `OPENAI_API_KEY` (and optional `OPENAI_BASE_URL`).
    pub fn from_env() -> Result<Self, AssistantError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            AssistantError::CredentialInvalid("OPENAI_API_KEY is not set".to_string())
        })?;
        let base_url = std::env::var("OPENAI_BASE_URL").ok();
        Self::new(base_url.as_deref(), api_key)
    }

    fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Action => "tool",
                }
                .to_string(),
                content: Some(m.content.clone()),
                tool_calls: None,
                tool_call_id: m.call_id.clone(),
            })
            .collect()
    }

    fn to_wire_tools(actions: &[ActionSpec]) -> Option<Vec<WireTool>> {
        if actions.is_empty() {
            return None;
        }
        Some(
            actions
                .iter()
                .map(|a| WireTool {
                    kind: "function".to_string(),
                    function: WireFunction {
                        name: a.name.clone(),
                        description: a.description.clone(),
                        parameters: a.input_schema.clone(),
                    },
                })
                .collect(),
        )
    }

    async fn complete(&self, state: TokenState) -> Result<GenerationStream, AssistantError> {
        let body = ChatRequest {
            model: state.model.clone(),
            messages: state.messages.clone(),
            tools: state.tools.clone(),
            temperature: state.temperature,
        };
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %body.model, messages = body.messages.len(), "chat completion request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::NetworkTransient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let detail = response.text().await.unwrap_or_default();
            return Err(map_http_error(status.as_u16(), retry_after, detail));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::NetworkTransient(format!("malformed response: {}", e)))?;
        let Some(choice) = parsed.choices.into_iter().next() else {
            return Err(AssistantError::NetworkTransient(
                "response contained no choices".to_string(),
            ));
        };

        Ok(self.events_for_reply(state, choice.message))
    }

    fn events_for_reply(&self, mut state: TokenState, reply: WireMessage) -> GenerationStream {
        let mut events = Vec::new();
        let content = reply.content.clone().unwrap_or_default();
        let tool_calls = reply.tool_calls.clone().unwrap_or_default();

        if !content.is_empty() {
            events.push(GenerationEvent::TextDelta(content.clone()));
        }

        if tool_calls.is_empty() {
            events.push(GenerationEvent::Completed {
                final_text: content,
            });
            return GenerationStream::from_events(events);
        }

        for call in &tool_calls {
            events.push(GenerationEvent::ActionRequested(RawActionEvent {
                id: Some(call.id.clone()),
                name: Some(call.function.name.clone()),
                arguments: Some(Value::String(call.function.arguments.clone())),
                ..RawActionEvent::default()
            }));
        }

        // The token carries the whole conversation including this assistant
        // tool-call message; resume appends tool results after it.
        state.messages.push(reply);
        match serde_json::to_string(&state) {
            Ok(encoded) => events.push(GenerationEvent::Suspended {
                token: ResumptionToken::new(encoded),
            }),
            Err(e) => {
                warn!(error = %e, "failed to encode resumption token");
                events.push(GenerationEvent::Failed(AssistantError::StreamStateInvalid(
                    format!("could not encode resumption token: {}", e),
                )));
            }
        }
        GenerationStream::from_events(events)
    }
}

fn map_http_error(status: u16, retry_after: Option<Duration>, detail: String) -> AssistantError {
    match status {
        401 | 403 => AssistantError::CredentialInvalid(format!("HTTP {}: {}", status, detail)),
        429 => AssistantError::RateLimited { retry_after },
        _ => AssistantError::NetworkTransient(format!("HTTP {}: {}", status, detail)),
    }
}

#[async_trait]
impl GenerationClient for ChatCompletions {
    async fn start(&self, request: GenerationRequest) -> Result<GenerationStream, AssistantError> {
        let state = TokenState {
            model: request.config.model.clone(),
            temperature: request.config.temperature,
            tools: Self::to_wire_tools(&request.config.actions),
            messages: Self::to_wire_messages(&request.messages),
        };
        self.complete(state).await
    }

    async fn resume(
        &self,
        token: ResumptionToken,
        outcomes: Vec<ActionOutcome>,
    ) -> Result<GenerationStream, AssistantError> {
        let mut state: TokenState = serde_json::from_str(token.as_str()).map_err(|e| {
            AssistantError::StreamStateInvalid(format!("unreadable resumption token: {}", e))
        })?;
        for outcome in outcomes {
            state.messages.push(WireMessage {
                role: "tool".to_string(),
                content: Some(outcome.content),
                tool_calls: None,
                tool_call_id: Some(outcome.call_id),
            });
        }
        self.complete(state).await
    }
}
