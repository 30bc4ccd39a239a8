//! Core chat types.

use serde::{Deserialize, Serialize};

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who wrote the message.
    pub role: Role,

    /// Message text.
    pub content: String,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name used by every provider family.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Tool definition advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,

    /// What the tool does, written for the model.
    pub description: String,

    /// JSON schema for the arguments object.
    pub parameters: serde_json::Value,
}

/// A model's request to invoke a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallIntent {
    /// Provider-assigned call id (generated when the provider omits one).
    pub call_id: String,

    /// Requested tool name.
    pub tool_name: String,

    /// Arguments as emitted by the model.
    pub arguments: serde_json::Value,
}

/// How a tool call ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ToolOutcome {
    /// The tool ran and produced a payload.
    Success(serde_json::Value),
    /// The tool did not run, or ran and failed.
    Failure(String),
}

/// Result of one tool call, fed back to the model as context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    /// Successful result.
    pub fn success(intent: &ToolCallIntent, payload: serde_json::Value) -> Self {
        Self {
            call_id: intent.call_id.clone(),
            tool_name: intent.tool_name.clone(),
            outcome: ToolOutcome::Success(payload),
        }
    }

    /// Failed result.
    pub fn failure(intent: &ToolCallIntent, reason: impl Into<String>) -> Self {
        Self {
            call_id: intent.call_id.clone(),
            tool_name: intent.tool_name.clone(),
            outcome: ToolOutcome::Failure(reason.into()),
        }
    }

    /// Whether the call failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Failure(_))
    }

    /// Render the result as a conversation message for the continuation call.
    #[must_use]
    pub fn to_message(&self) -> Message {
        let body = match &self.outcome {
            ToolOutcome::Success(payload) => {
                let rendered = match payload {
                    serde_json::Value::String(s) => s.clone(),
                    other => serde_json::to_string_pretty(other).unwrap_or_default(),
                };
                format!("```json\n{rendered}\n```")
            }
            ToolOutcome::Failure(reason) => format!("Error: {reason}"),
        };

        Message::user(format!(
            "[Tool result: {} (call {})]\n{body}",
            self.tool_name, self.call_id
        ))
    }
}

/// Why the response stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

impl StopReason {
    /// Map a provider's finish reason string.
    #[must_use]
    pub fn from_provider(reason: &str) -> Option<Self> {
        match reason {
            "stop" | "end_turn" | "stop_sequence" => Some(Self::EndTurn),
            "tool_calls" | "tool_use" | "function_call" => Some(Self::ToolUse),
            "length" | "max_tokens" => Some(Self::MaxTokens),
            _ => None,
        }
    }
}

/// A fully received model response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Assistant text.
    pub text: String,

    /// Tool calls in the order the provider emitted them.
    pub tool_calls: Vec<ToolCallIntent>,

    /// Why the model stopped.
    pub stop_reason: Option<StopReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Assistant".parse::<Role>(), Ok(Role::Assistant));
        assert_eq!(" system ".parse::<Role>(), Ok(Role::System));
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn failure_result_renders_reason() {
        let intent = ToolCallIntent {
            call_id: "call_1".to_string(),
            tool_name: "search_notes".to_string(),
            arguments: serde_json::json!({}),
        };
        let msg = ToolResult::failure(&intent, "cancelled by user").to_message();
        assert_eq!(msg.role, Role::User);
        assert!(msg.content.contains("search_notes"));
        assert!(msg.content.contains("call_1"));
        assert!(msg.content.contains("Error: cancelled by user"));
    }

    #[test]
    fn stop_reason_maps_provider_strings() {
        assert_eq!(StopReason::from_provider("stop"), Some(StopReason::EndTurn));
        assert_eq!(
            StopReason::from_provider("tool_use"),
            Some(StopReason::ToolUse)
        );
        assert_eq!(
            StopReason::from_provider("length"),
            Some(StopReason::MaxTokens)
        );
        assert_eq!(StopReason::from_provider("content_filter"), None);
    }
}
