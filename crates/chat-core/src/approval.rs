//! Tool approval gate.
//!
//! When the model asks to run a tool, the orchestration suspends on
//! [`ApprovalGate::present`] until a human (or a policy) answers. The
//! [`ApprovalClient`] carries requests to whatever UI owns the receiving end
//! of its channel and waits on a one-shot reply.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

/// Per-tool approval behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalPreset {
    /// Run without prompting.
    Allow,
    /// Never run.
    Deny,
    /// Prompt each time.
    #[default]
    Ask,
}

/// Presets keyed by tool name, with a fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalPolicy {
    /// Preset for tools not listed in `tools`.
    pub default: ApprovalPreset,
    pub tools: HashMap<String, ApprovalPreset>,
}

impl ApprovalPolicy {
    /// Policy that never prompts.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            default: ApprovalPreset::Allow,
            tools: HashMap::new(),
        }
    }

    #[must_use]
    pub fn preset_for(&self, tool: &str) -> ApprovalPreset {
        self.tools.get(tool).copied().unwrap_or(self.default)
    }
}

/// A pending tool invocation shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    /// Model that asked for the call.
    pub model: String,
}

/// The answer to an [`ApprovalRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    /// Arguments to run with; may differ from the request if edited.
    pub arguments: serde_json::Value,
}

impl ApprovalDecision {
    #[must_use]
    pub const fn approve(arguments: serde_json::Value) -> Self {
        Self {
            approved: true,
            arguments,
        }
    }

    #[must_use]
    pub const fn cancel() -> Self {
        Self {
            approved: false,
            arguments: serde_json::Value::Null,
        }
    }
}

/// Human-in-the-loop suspension point.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Show the request and wait for exactly one decision.
    async fn present(&self, request: ApprovalRequest) -> ApprovalDecision;
}

/// Request sent to the approval UI.
#[derive(Debug)]
pub struct ApprovalMessage {
    pub request: ApprovalRequest,
    pub response_tx: oneshot::Sender<ApprovalDecision>,
}

/// Channel-backed gate.
#[derive(Debug, Clone)]
pub struct ApprovalClient {
    request_tx: mpsc::UnboundedSender<ApprovalMessage>,
}

impl ApprovalClient {
    /// Create a client and the receiver the UI reads requests from.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ApprovalMessage>) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        (Self { request_tx }, request_rx)
    }
}

#[async_trait]
impl ApprovalGate for ApprovalClient {
    async fn present(&self, request: ApprovalRequest) -> ApprovalDecision {
        let (response_tx, response_rx) = oneshot::channel();
        let call_id = request.call_id.clone();

        if self
            .request_tx
            .send(ApprovalMessage {
                request,
                response_tx,
            })
            .is_err()
        {
            tracing::warn!(%call_id, "approval channel closed, treating as cancelled");
            return ApprovalDecision::cancel();
        }

        response_rx.await.unwrap_or_else(|_| {
            tracing::warn!(%call_id, "approval dropped without a decision");
            ApprovalDecision::cancel()
        })
    }
}

/// Gate that approves every request unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn present(&self, request: ApprovalRequest) -> ApprovalDecision {
        ApprovalDecision::approve(request.arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ApprovalRequest {
        ApprovalRequest {
            call_id: "call_1".to_string(),
            tool_name: "read_note".to_string(),
            arguments: serde_json::json!({"path": "a.md"}),
            model: "gpt-4o".to_string(),
        }
    }

    #[tokio::test]
    async fn client_round_trips_decision() {
        let (client, mut rx) = ApprovalClient::new();

        let ui = tokio::spawn(async move {
            let msg = rx.recv().await.unwrap();
            assert_eq!(msg.request.tool_name, "read_note");
            msg.response_tx
                .send(ApprovalDecision::approve(serde_json::json!({"path": "b.md"})))
                .unwrap();
        });

        let decision = client.present(request()).await;
        ui.await.unwrap();
        assert!(decision.approved);
        assert_eq!(decision.arguments["path"], "b.md");
    }

    #[tokio::test]
    async fn closed_channel_cancels() {
        let (client, rx) = ApprovalClient::new();
        drop(rx);
        assert_eq!(client.present(request()).await, ApprovalDecision::cancel());
    }

    #[tokio::test]
    async fn dropped_reply_cancels() {
        let (client, mut rx) = ApprovalClient::new();
        tokio::spawn(async move {
            let msg = rx.recv().await.unwrap();
            drop(msg.response_tx);
        });
        assert!(!client.present(request()).await.approved);
    }

    #[tokio::test]
    async fn auto_approve_keeps_arguments() {
        let decision = AutoApprove.present(request()).await;
        assert!(decision.approved);
        assert_eq!(decision.arguments, serde_json::json!({"path": "a.md"}));
    }

    #[test]
    fn policy_falls_back_to_default() {
        let mut policy = ApprovalPolicy::default();
        policy
            .tools
            .insert("search_notes".to_string(), ApprovalPreset::Allow);
        assert_eq!(policy.preset_for("search_notes"), ApprovalPreset::Allow);
        assert_eq!(policy.preset_for("read_note"), ApprovalPreset::Ask);
        assert_eq!(
            ApprovalPolicy::allow_all().preset_for("anything"),
            ApprovalPreset::Allow
        );
    }

    #[test]
    fn presets_deserialize_lowercase() {
        let policy: ApprovalPolicy =
            serde_json::from_str(r#"{"default": "deny", "tools": {"read_note": "allow"}}"#).unwrap();
        assert_eq!(policy.default, ApprovalPreset::Deny);
        assert_eq!(policy.preset_for("read_note"), ApprovalPreset::Allow);
    }
}
