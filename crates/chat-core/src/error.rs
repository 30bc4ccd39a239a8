//! Chat orchestration error types.

use crate::secret;

/// Errors raised while orchestrating a chat request.
///
/// Every variant is cloneable so a finished [`ChatOutcome`](crate::ChatOutcome)
/// can carry the error that shaped it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// The provider needs an API key and none is configured.
    #[error("no API key configured for provider '{provider}'")]
    MissingCredential { provider: String },

    /// The endpoint could not be reached (DNS, connect, TLS, timeout).
    #[error("could not reach {url}: {message}")]
    NetworkUnreachable { url: String, message: String },

    /// The provider rejected the credential (401/403).
    #[error("authentication failed ({status}): {message}")]
    AuthenticationFailed { status: u16, message: String },

    /// Bad model name or endpoint path (404).
    #[error("resource not found: {message}")]
    ResourceNotFound { message: String },

    /// The provider is throttling requests (429).
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    /// The provider answered with something we could not interpret.
    #[error("malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    /// The request was cancelled by the user.
    #[error("request cancelled")]
    Cancelled,

    /// A tool failed while executing.
    #[error("tool execution failed: {0}")]
    ToolExecutionFailed(String),

    /// Another request already targets the same document.
    #[error("a request is already in flight for '{target}'")]
    SurfaceBusy { target: String },

    /// The merged configuration is unusable.
    #[error("config error: {0}")]
    Config(String),

    /// Anything that does not fit the kinds above.
    #[error("{0}")]
    Unknown(String),
}

impl ChatError {
    /// Map a non-success HTTP status and response body to an error kind.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = summarize_body(body);
        match status {
            401 | 403 => Self::AuthenticationFailed { status, message },
            404 => Self::ResourceNotFound { message },
            429 => Self::RateLimited { message },
            _ => Self::Unknown(format!("HTTP {status}: {message}")),
        }
    }

    /// Map a `reqwest` failure that happened before a status was available.
    #[must_use]
    pub fn from_transport(url: &str, error: &reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() || error.is_request() {
            Self::NetworkUnreachable {
                url: url.to_string(),
                message: error.to_string(),
            }
        } else if error.is_decode() || error.is_body() {
            Self::MalformedUpstreamResponse(error.to_string())
        } else {
            Self::Unknown(error.to_string())
        }
    }

    /// Whether this is the non-error cancellation outcome.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Render the error as a message that can be shown in the transcript.
    ///
    /// Includes the model and endpoint so the user can tell which setting to
    /// fix.
    #[must_use]
    pub fn chat_message(&self, model: &str, endpoint: &str) -> String {
        let hint = match self {
            Self::MissingCredential { .. } => {
                "Add an API key for this provider (`notechat auth login`) or pick a local model."
            }
            Self::NetworkUnreachable { .. } => {
                "Check that the service is running and the URL is correct."
            }
            Self::AuthenticationFailed { .. } => "Check that your API key is valid.",
            Self::ResourceNotFound { .. } => "Check the model name and the base URL.",
            Self::RateLimited { .. } => "Wait a moment and try again.",
            Self::MalformedUpstreamResponse(_) => {
                "The service answered in an unexpected format; it may not be compatible."
            }
            Self::SurfaceBusy { .. } => "Stop the running request first.",
            Self::Cancelled
            | Self::ToolExecutionFailed(_)
            | Self::Config(_)
            | Self::Unknown(_) => "",
        };

        let mut message = format!(
            "**Error:** {self}\n\nModel: `{model}`\nEndpoint: {endpoint}\n",
            self = secret::mask(&self.to_string())
        );
        if !hint.is_empty() {
            message.push('\n');
            message.push_str(hint);
            message.push('\n');
        }
        message
    }
}

/// Extract the provider's error message from a JSON body when there is one.
fn summarize_body(body: &str) -> String {
    const MAX_LEN: usize = 500;

    let extracted = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.pointer("/error/message")
                .or_else(|| json.get("error"))
                .or_else(|| json.get("message"))
                .and_then(|v| v.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string());

    if extracted.chars().count() > MAX_LEN {
        let truncated: String = extracted.chars().take(MAX_LEN).collect();
        format!("{truncated}...")
    } else {
        extracted
    }
}

/// Result type for chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_kinds() {
        assert!(matches!(
            ChatError::from_status(401, "nope"),
            ChatError::AuthenticationFailed { status: 401, .. }
        ));
        assert!(matches!(
            ChatError::from_status(404, ""),
            ChatError::ResourceNotFound { .. }
        ));
        assert!(matches!(
            ChatError::from_status(429, ""),
            ChatError::RateLimited { .. }
        ));
        assert!(matches!(
            ChatError::from_status(500, "boom"),
            ChatError::Unknown(msg) if msg.contains("500") && msg.contains("boom")
        ));
    }

    #[test]
    fn error_body_message_is_extracted() {
        let body = r#"{"error":{"message":"The model `gpt-9` does not exist","type":"invalid_request_error"}}"#;
        let ChatError::ResourceNotFound { message } = ChatError::from_status(404, body) else {
            panic!("expected not found");
        };
        assert_eq!(message, "The model `gpt-9` does not exist");
    }

    #[test]
    fn chat_message_names_model_and_endpoint() {
        let err = ChatError::RateLimited {
            message: "slow down".to_string(),
        };
        let msg = err.chat_message("gpt-4o", "https://api.openai.com/v1/chat/completions");
        assert!(msg.contains("`gpt-4o`"));
        assert!(msg.contains("https://api.openai.com/v1/chat/completions"));
        assert!(msg.contains("slow down"));
    }

    #[test]
    fn chat_message_masks_keys() {
        let err = ChatError::AuthenticationFailed {
            status: 401,
            message: "Incorrect API key provided: sk-abcdefghijklmnopqrstuvwxyz123456".to_string(),
        };
        let msg = err.chat_message("gpt-4o", "https://api.openai.com/v1");
        assert!(!msg.contains("sk-abcdefghijklmnopqrstuvwxyz123456"));
        assert!(msg.contains("[MASKED"));
    }
}
