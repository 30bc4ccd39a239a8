//! Provider adapter abstraction.
//!
//! Every remote service family is one [`ProviderAdapter`]: a set of capability
//! flags plus the functions that translate between [`CompletionRequest`] and
//! the family's wire shapes. Adapters never perform I/O on their own; the
//! orchestrator pairs them with a [`Transport`].

use std::fmt;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tokio_util::sync::CancellationToken;

use crate::config::ProviderConfig;
use crate::error::{ChatError, Result};
use crate::transport::{HttpRequest, Transport};
use crate::types::{Completion, Message, StopReason, ToolCallIntent, ToolDefinition};

/// How a streaming response body is split into payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Server-sent events, one JSON payload per `data:` block.
    Sse,
    /// Newline-delimited JSON objects.
    JsonLines,
}

/// Provider-neutral request built by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model identifier with any `provider@` prefix removed.
    pub model: String,
    /// Conversation history, oldest first.
    pub messages: Vec<Message>,
    /// System instructions for adapters with a dedicated field.
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    /// Tool catalog; empty means no tools are declared.
    pub tools: Vec<ToolDefinition>,
    /// Ask for a chunked response.
    pub stream: bool,
}

impl CompletionRequest {
    /// Build a request from merged configuration.
    #[must_use]
    pub fn from_config(config: &ProviderConfig, model: &str, messages: Vec<Message>) -> Self {
        Self {
            model: model.to_string(),
            messages,
            system: None,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            presence_penalty: config.presence_penalty,
            frequency_penalty: config.frequency_penalty,
            tools: Vec::new(),
            stream: config.stream,
        }
    }
}

/// An event decoded from one streaming payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    /// A chunk of assistant text.
    Text(String),
    /// A tool call whose arguments have been fully received.
    ToolCall(ToolCallIntent),
    /// The provider signalled the end of the response.
    Done(Option<StopReason>),
}

/// Stateful decoder for one streaming response.
///
/// Tool-call arguments arrive in fragments across payloads, so parsers keep
/// partial calls until the provider closes them.
pub trait StreamParser: Send {
    /// Decode one framed payload.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload is an upstream error event.
    fn parse(&mut self, payload: &str) -> Result<Vec<StreamDelta>>;

    /// Emit anything still pending when the body ends without a close marker.
    fn finish(&mut self) -> Vec<StreamDelta>;
}

/// Strategy for one remote service family.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + fmt::Debug {
    /// Registry key, used as the `provider@` prefix.
    fn id(&self) -> &str;

    /// Endpoint used when neither the document nor settings override it.
    fn default_base_url(&self) -> &str;

    /// Whether system instructions go in a dedicated request field.
    fn supports_system_field(&self) -> bool;

    /// Whether the family understands tool declarations.
    fn supports_tool_calling(&self) -> bool {
        true
    }

    /// Whether calls fail without an API key.
    fn requires_credential(&self) -> bool;

    /// Streaming body framing.
    fn framing(&self) -> Framing {
        Framing::Sse
    }

    /// Authentication headers for a call.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::MissingCredential`] when the adapter requires a
    /// key and none was supplied.
    fn auth_headers(&self, credential: Option<&str>) -> Result<HeaderMap>;

    /// Chat endpoint under `base_url`.
    fn chat_url(&self, base_url: &str) -> String;

    /// Model-listing endpoint under `base_url`.
    fn models_url(&self, base_url: &str) -> String;

    /// Translate a request into the family's JSON payload.
    fn build_request(&self, request: &CompletionRequest) -> serde_json::Value;

    /// Decode a buffered response.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::MalformedUpstreamResponse`] when the body does not
    /// have the expected shape.
    fn parse_completion(&self, body: &serde_json::Value) -> Result<Completion>;

    /// Fresh decoder for one streaming response.
    fn stream_parser(&self) -> Box<dyn StreamParser>;

    /// Decode a model-listing response.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::MalformedUpstreamResponse`] when the body does not
    /// have the expected shape.
    fn parse_models(&self, body: &serde_json::Value) -> Result<Vec<String>>;

    /// List models available at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns credential, transport, or decoding errors.
    async fn list_models(
        &self,
        transport: &dyn Transport,
        base_url: &str,
        credential: Option<&str>,
    ) -> Result<Vec<String>> {
        let headers = self.auth_headers(credential)?;
        let request = HttpRequest::get(self.models_url(base_url), headers);
        let body = transport
            .get_json(request, &CancellationToken::new())
            .await?;
        let mut models = self.parse_models(&body)?;
        models.sort();
        models.dedup();
        Ok(models)
    }
}

/// Trim a trailing slash so endpoint paths join cleanly.
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// `Authorization: Bearer` headers shared by several families.
pub(crate) fn bearer_headers(
    provider: &str,
    credential: Option<&str>,
    required: bool,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    match credential.map(str::trim).filter(|key| !key.is_empty()) {
        Some(key) => {
            let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| {
                ChatError::Config(format!("API key for '{provider}' contains invalid characters"))
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        None if required => {
            return Err(ChatError::MissingCredential {
                provider: provider.to_string(),
            });
        }
        None => {}
    }
    Ok(headers)
}

/// Decode tool-call arguments that arrive as a JSON-encoded string.
///
/// Empty input becomes an empty object; undecodable input is kept verbatim as
/// a string so the approval gate can show it.
pub(crate) fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "tool arguments are not valid JSON");
        serde_json::Value::String(raw.to_string())
    })
}

/// Shorthand for shape errors while decoding provider bodies.
pub(crate) fn malformed(provider: &str, what: &str) -> ChatError {
    ChatError::MalformedUpstreamResponse(format!("{provider}: {what}"))
}
