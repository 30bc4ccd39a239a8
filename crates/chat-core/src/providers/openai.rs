//! Chat Completions family.
//!
//! Covers `OpenAI` itself and the services that speak the same API
//! (`OpenRouter`, LM Studio). They differ only in endpoint, whether a key is
//! mandatory, and a few extra headers.

use std::collections::BTreeMap;

use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};
use crate::provider::{
    CompletionRequest, ProviderAdapter, StreamDelta, StreamParser, bearer_headers, join_url,
    malformed, parse_arguments,
};
use crate::types::{Completion, StopReason, ToolCallIntent, ToolDefinition};

/// Adapter for Chat Completions compatible services.
#[derive(Debug, Clone)]
pub struct OpenAiCompatible {
    id: &'static str,
    default_base_url: &'static str,
    requires_credential: bool,
    extra_headers: &'static [(&'static str, &'static str)],
}

impl OpenAiCompatible {
    /// The primary provider.
    #[must_use]
    pub const fn openai() -> Self {
        Self {
            id: "openai",
            default_base_url: "https://api.openai.com/v1",
            requires_credential: true,
            extra_headers: &[],
        }
    }

    #[must_use]
    pub const fn openrouter() -> Self {
        Self {
            id: "openrouter",
            default_base_url: "https://openrouter.ai/api/v1",
            requires_credential: true,
            extra_headers: &[
                ("http-referer", "https://github.com/notechat/notechat"),
                ("x-title", "notechat"),
            ],
        }
    }

    /// Local LM Studio server; the key is optional.
    #[must_use]
    pub const fn lmstudio() -> Self {
        Self {
            id: "lmstudio",
            default_base_url: "http://localhost:1234/v1",
            requires_credential: false,
            extra_headers: &[],
        }
    }

    /// A custom compatible endpoint.
    #[must_use]
    pub const fn custom(
        id: &'static str,
        default_base_url: &'static str,
        requires_credential: bool,
    ) -> Self {
        Self {
            id,
            default_base_url,
            requires_credential,
            extra_headers: &[],
        }
    }
}

// Request types

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    presence_penalty: f32,
    frequency_penalty: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ChatFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ChatFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

// Buffered response types

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

// Streaming chunk types

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<ChatTool<'_>> {
    tools
        .iter()
        .map(|t| ChatTool {
            tool_type: "function",
            function: ChatFunction {
                name: &t.name,
                description: &t.description,
                parameters: &t.parameters,
            },
        })
        .collect()
}

fn call_id(id: Option<String>) -> String {
    id.filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()))
}

/// Upstream error carried inside a 200 stream.
fn stream_error(error: &serde_json::Value) -> ChatError {
    let message = error
        .get("message")
        .and_then(serde_json::Value::as_str)
        .map_or_else(|| error.to_string(), str::to_string);
    ChatError::Unknown(message)
}

impl ProviderAdapter for OpenAiCompatible {
    fn id(&self) -> &str {
        self.id
    }

    fn default_base_url(&self) -> &str {
        self.default_base_url
    }

    fn supports_system_field(&self) -> bool {
        false
    }

    fn requires_credential(&self) -> bool {
        self.requires_credential
    }

    fn auth_headers(&self, credential: Option<&str>) -> Result<reqwest::header::HeaderMap> {
        let mut headers = bearer_headers(self.id, credential, self.requires_credential)?;
        for (name, value) in self.extra_headers {
            headers.insert(
                HeaderName::from_static(*name),
                HeaderValue::from_static(*value),
            );
        }
        Ok(headers)
    }

    fn chat_url(&self, base_url: &str) -> String {
        join_url(base_url, "chat/completions")
    }

    fn models_url(&self, base_url: &str) -> String {
        join_url(base_url, "models")
    }

    fn build_request(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(request.messages.iter().map(|m| ChatMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        let body = ChatRequest {
            model: &request.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            presence_penalty: request.presence_penalty,
            frequency_penalty: request.frequency_penalty,
            stream: request.stream,
            tools: convert_tools(&request.tools),
        };
        serde_json::to_value(body).unwrap_or_default()
    }

    fn parse_completion(&self, body: &serde_json::Value) -> Result<Completion> {
        if let Some(error) = body.get("error") {
            return Err(stream_error(error));
        }
        let response = ChatResponse::deserialize(body)
            .map_err(|e| malformed(self.id, &format!("unexpected completion shape: {e}")))?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| malformed(self.id, "response has no choices"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCallIntent {
                call_id: call_id(tc.id),
                tool_name: tc.function.name,
                arguments: parse_arguments(&tc.function.arguments),
            })
            .collect();

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            stop_reason: choice
                .finish_reason
                .as_deref()
                .and_then(StopReason::from_provider),
        })
    }

    fn stream_parser(&self) -> Box<dyn StreamParser> {
        Box::new(ChunkParser::default())
    }

    fn parse_models(&self, body: &serde_json::Value) -> Result<Vec<String>> {
        let list = ModelList::deserialize(body)
            .map_err(|e| malformed(self.id, &format!("unexpected model list: {e}")))?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

/// A tool call whose arguments are still arriving.
#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Streaming decoder for chat completion chunks.
#[derive(Debug, Default)]
struct ChunkParser {
    pending: BTreeMap<usize, PartialCall>,
}

impl ChunkParser {
    fn drain_calls(&mut self) -> Vec<StreamDelta> {
        std::mem::take(&mut self.pending)
            .into_values()
            .filter(|call| !call.name.is_empty())
            .map(|call| {
                StreamDelta::ToolCall(ToolCallIntent {
                    call_id: call_id(call.id),
                    tool_name: call.name,
                    arguments: parse_arguments(&call.arguments),
                })
            })
            .collect()
    }
}

impl StreamParser for ChunkParser {
    fn parse(&mut self, payload: &str) -> Result<Vec<StreamDelta>> {
        let chunk: ChatChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(data = %payload, error = %e, "failed to parse chat chunk");
                return Ok(Vec::new());
            }
        };
        if let Some(error) = &chunk.error {
            return Err(stream_error(error));
        }

        let mut deltas = Vec::new();
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content {
                if !text.is_empty() {
                    deltas.push(StreamDelta::Text(text));
                }
            }

            for tc in choice.delta.tool_calls {
                let entry = self.pending.entry(tc.index).or_default();
                if let Some(id) = tc.id {
                    entry.id = Some(id);
                }
                if let Some(function) = tc.function {
                    if let Some(name) = function.name {
                        entry.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.arguments.push_str(&arguments);
                    }
                }
            }

            if let Some(reason) = choice.finish_reason {
                deltas.extend(self.drain_calls());
                deltas.push(StreamDelta::Done(StopReason::from_provider(&reason)));
            }
        }
        Ok(deltas)
    }

    fn finish(&mut self) -> Vec<StreamDelta> {
        self.drain_calls()
    }
}
