//! Anthropic Messages API.

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};
use crate::provider::{
    CompletionRequest, ProviderAdapter, StreamDelta, StreamParser, join_url, malformed,
    parse_arguments,
};
use crate::types::{Completion, Role, StopReason, ToolCallIntent};

const API_VERSION: &str = "2023-06-01";

/// Adapter for the Messages API.
#[derive(Debug, Clone, Default)]
pub struct Anthropic;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    temperature: f32,
    top_p: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockStart {
        index: usize,
        content_block: ResponseBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDeltaBody,
    },
    Error {
        error: ErrorBody,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Split system-role messages out and merge consecutive turns by the same
/// role, which the API rejects.
fn split_system(request: &CompletionRequest) -> (Option<String>, Vec<WireMessage>) {
    let mut system: Vec<&str> = request.system.iter().map(String::as_str).collect();
    let mut messages: Vec<WireMessage> = Vec::with_capacity(request.messages.len());

    for message in &request.messages {
        let role = match message.role {
            Role::System => {
                system.push(&message.content);
                continue;
            }
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        match messages.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(&message.content);
            }
            _ => messages.push(WireMessage {
                role,
                content: message.content.clone(),
            }),
        }
    }

    let system = system
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    ((!system.is_empty()).then_some(system), messages)
}

impl ProviderAdapter for Anthropic {
    fn id(&self) -> &str {
        "anthropic"
    }

    fn default_base_url(&self) -> &str {
        "https://api.anthropic.com/v1"
    }

    fn supports_system_field(&self) -> bool {
        true
    }

    fn requires_credential(&self) -> bool {
        true
    }

    fn auth_headers(&self, credential: Option<&str>) -> Result<HeaderMap> {
        let key = credential
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ChatError::MissingCredential {
                provider: self.id().to_string(),
            })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(key).map_err(|_| {
                ChatError::Config("API key for 'anthropic' contains invalid characters".to_string())
            })?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }

    fn chat_url(&self, base_url: &str) -> String {
        join_url(base_url, "messages")
    }

    fn models_url(&self, base_url: &str) -> String {
        join_url(base_url, "models")
    }

    fn build_request(&self, request: &CompletionRequest) -> serde_json::Value {
        let (system, messages) = split_system(request);
        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            messages,
            system,
            temperature: request.temperature,
            top_p: request.top_p,
            stream: request.stream,
            tools: request
                .tools
                .iter()
                .map(|t| WireTool {
                    name: &t.name,
                    description: &t.description,
                    input_schema: &t.parameters,
                })
                .collect(),
        };
        serde_json::to_value(body).unwrap_or_default()
    }

    fn parse_completion(&self, body: &serde_json::Value) -> Result<Completion> {
        if let Some(error) = body.get("error") {
            if let Ok(error) = ErrorBody::deserialize(error) {
                return Err(ChatError::Unknown(format!("{}: {}", error.kind, error.message)));
            }
        }
        let response = MessagesResponse::deserialize(body)
            .map_err(|e| malformed("anthropic", &format!("unexpected message shape: {e}")))?;

        let mut completion = Completion {
            stop_reason: response
                .stop_reason
                .as_deref()
                .and_then(StopReason::from_provider),
            ..Completion::default()
        };
        for block in response.content {
            match block {
                ResponseBlock::Text { text } => completion.text.push_str(&text),
                ResponseBlock::ToolUse { id, name, input } => {
                    completion.tool_calls.push(ToolCallIntent {
                        call_id: id,
                        tool_name: name,
                        arguments: input,
                    });
                }
                ResponseBlock::Other => {}
            }
        }
        Ok(completion)
    }

    fn stream_parser(&self) -> Box<dyn StreamParser> {
        Box::new(EventParser::default())
    }

    fn parse_models(&self, body: &serde_json::Value) -> Result<Vec<String>> {
        let list = ModelList::deserialize(body)
            .map_err(|e| malformed("anthropic", &format!("unexpected model list: {e}")))?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

/// A `tool_use` block still receiving input.
#[derive(Debug)]
struct OpenBlock {
    id: String,
    name: String,
    initial_input: serde_json::Value,
    partial_json: String,
}

impl OpenBlock {
    fn into_delta(self) -> StreamDelta {
        let arguments = if self.partial_json.trim().is_empty() {
            self.initial_input
        } else {
            parse_arguments(&self.partial_json)
        };
        StreamDelta::ToolCall(ToolCallIntent {
            call_id: self.id,
            tool_name: self.name,
            arguments,
        })
    }
}

#[derive(Debug, Default)]
struct EventParser {
    open: BTreeMap<usize, OpenBlock>,
}

impl StreamParser for EventParser {
    fn parse(&mut self, payload: &str) -> Result<Vec<StreamDelta>> {
        let event: StreamEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(data = %payload, error = %e, "failed to parse event");
                return Ok(Vec::new());
            }
        };

        let deltas = match event {
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                ResponseBlock::ToolUse { id, name, input } => {
                    self.open.insert(index, OpenBlock {
                        id,
                        name,
                        initial_input: input,
                        partial_json: String::new(),
                    });
                    Vec::new()
                }
                ResponseBlock::Text { text } if !text.is_empty() => vec![StreamDelta::Text(text)],
                _ => Vec::new(),
            },
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } if !text.is_empty() => vec![StreamDelta::Text(text)],
                BlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(block) = self.open.get_mut(&index) {
                        block.partial_json.push_str(&partial_json);
                    }
                    Vec::new()
                }
                _ => Vec::new(),
            },
            StreamEvent::ContentBlockStop { index } => self
                .open
                .remove(&index)
                .map(OpenBlock::into_delta)
                .into_iter()
                .collect(),
            StreamEvent::MessageDelta { delta } => match delta.stop_reason {
                Some(reason) => {
                    let mut deltas = self.finish();
                    deltas.push(StreamDelta::Done(StopReason::from_provider(&reason)));
                    deltas
                }
                None => Vec::new(),
            },
            StreamEvent::Error { error } => {
                if error.kind == "overloaded_error" || error.kind == "rate_limit_error" {
                    return Err(ChatError::RateLimited {
                        message: error.message,
                    });
                }
                return Err(ChatError::Unknown(format!("{}: {}", error.kind, error.message)));
            }
            StreamEvent::Other => Vec::new(),
        };
        Ok(deltas)
    }

    fn finish(&mut self) -> Vec<StreamDelta> {
        std::mem::take(&mut self.open)
            .into_values()
            .map(OpenBlock::into_delta)
            .collect()
    }
}
