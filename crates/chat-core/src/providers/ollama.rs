//! Ollama native chat API.
//!
//! Streams newline-delimited JSON instead of SSE and returns tool arguments as
//! objects rather than encoded strings. Tool calls carry no id, so one is
//! generated per call.

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};
use crate::provider::{
    CompletionRequest, Framing, ProviderAdapter, StreamDelta, StreamParser, bearer_headers,
    join_url, malformed,
};
use crate::types::{Completion, StopReason, ToolCallIntent};

/// Adapter for a local or remote Ollama server.
#[derive(Debug, Clone, Default)]
pub struct Ollama;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    options: Options,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
    presence_penalty: f32,
    frequency_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct ChatLine {
    #[serde(default)]
    message: Option<LineMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<LineToolCall>,
}

#[derive(Debug, Deserialize)]
struct LineToolCall {
    #[serde(default)]
    id: Option<String>,
    function: LineFunction,
}

#[derive(Debug, Deserialize)]
struct LineFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TagList {
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

fn convert_calls(calls: Vec<LineToolCall>) -> Vec<ToolCallIntent> {
    calls
        .into_iter()
        .map(|call| ToolCallIntent {
            call_id: call
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
            tool_name: call.function.name,
            arguments: match call.function.arguments {
                serde_json::Value::Null => serde_json::json!({}),
                serde_json::Value::String(raw) => crate::provider::parse_arguments(&raw),
                other => other,
            },
        })
        .collect()
}

/// Ollama reports `stop` even when the turn ends in tool calls.
fn stop_reason(reason: Option<&str>, has_tool_calls: bool) -> Option<StopReason> {
    if has_tool_calls {
        return Some(StopReason::ToolUse);
    }
    reason.and_then(StopReason::from_provider)
}

impl ProviderAdapter for Ollama {
    fn id(&self) -> &str {
        "ollama"
    }

    fn default_base_url(&self) -> &str {
        "http://localhost:11434"
    }

    fn supports_system_field(&self) -> bool {
        false
    }

    fn requires_credential(&self) -> bool {
        false
    }

    fn framing(&self) -> Framing {
        Framing::JsonLines
    }

    fn auth_headers(&self, credential: Option<&str>) -> Result<HeaderMap> {
        bearer_headers(self.id(), credential, false)
    }

    fn chat_url(&self, base_url: &str) -> String {
        join_url(base_url, "api/chat")
    }

    fn models_url(&self, base_url: &str) -> String {
        join_url(base_url, "api/tags")
    }

    fn build_request(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(request.messages.iter().map(|m| WireMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        let body = ChatRequest {
            model: &request.model,
            messages,
            stream: request.stream,
            options: Options {
                temperature: request.temperature,
                top_p: request.top_p,
                num_predict: request.max_tokens,
                presence_penalty: request.presence_penalty,
                frequency_penalty: request.frequency_penalty,
            },
            tools: request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect(),
        };
        serde_json::to_value(body).unwrap_or_default()
    }

    fn parse_completion(&self, body: &serde_json::Value) -> Result<Completion> {
        let line = ChatLine::deserialize(body)
            .map_err(|e| malformed("ollama", &format!("unexpected chat shape: {e}")))?;
        if let Some(error) = line.error {
            return Err(ChatError::Unknown(error));
        }
        let message = line
            .message
            .ok_or_else(|| malformed("ollama", "response has no message"))?;

        let tool_calls = convert_calls(message.tool_calls);
        Ok(Completion {
            text: message.content,
            stop_reason: stop_reason(line.done_reason.as_deref(), !tool_calls.is_empty()),
            tool_calls,
        })
    }

    fn stream_parser(&self) -> Box<dyn StreamParser> {
        Box::new(LineParser::default())
    }

    fn parse_models(&self, body: &serde_json::Value) -> Result<Vec<String>> {
        let tags = TagList::deserialize(body)
            .map_err(|e| malformed("ollama", &format!("unexpected tag list: {e}")))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[derive(Debug, Default)]
struct LineParser {
    saw_tool_calls: bool,
}

impl StreamParser for LineParser {
    fn parse(&mut self, payload: &str) -> Result<Vec<StreamDelta>> {
        let line: ChatLine = match serde_json::from_str(payload) {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(data = %payload, error = %e, "failed to parse chat line");
                return Ok(Vec::new());
            }
        };
        if let Some(error) = line.error {
            return Err(ChatError::Unknown(error));
        }

        let mut deltas = Vec::new();
        if let Some(message) = line.message {
            if !message.content.is_empty() {
                deltas.push(StreamDelta::Text(message.content));
            }
            let calls = convert_calls(message.tool_calls);
            self.saw_tool_calls |= !calls.is_empty();
            deltas.extend(calls.into_iter().map(StreamDelta::ToolCall));
        }
        if line.done {
            deltas.push(StreamDelta::Done(stop_reason(
                line.done_reason.as_deref(),
                self.saw_tool_calls,
            )));
        }
        Ok(deltas)
    }

    fn finish(&mut self) -> Vec<StreamDelta> {
        Vec::new()
    }
}
