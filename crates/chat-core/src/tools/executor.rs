use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ChatError, Result};
use crate::types::{ToolDefinition, ToolOutcome};

/// What a tool knows about the call it is serving.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub call_id: String,
    pub tool_name: String,
    /// Model that requested the call.
    pub model: String,
    /// Document the request is writing into.
    pub target: String,
    /// Fires when the user cancels the request.
    pub cancel: CancellationToken,
}

/// Backing implementation of one tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name, description, and argument schema advertised to the model.
    fn definition(&self) -> ToolDefinition;

    /// Run the tool.
    ///
    /// # Errors
    ///
    /// Any error becomes a failure result for the model; it never aborts the
    /// request.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<serde_json::Value>;
}

/// Run an approved call and normalize the outcome.
///
/// # Errors
///
/// Returns [`ChatError::Cancelled`] when the context's token fires before the
/// tool finishes. Tool faults are not errors here.
pub async fn execute(
    handler: &dyn ToolHandler,
    arguments: serde_json::Value,
    context: &ToolContext,
) -> Result<ToolOutcome> {
    tracing::info!(tool = %context.tool_name, call_id = %context.call_id, "executing tool");

    let result = tokio::select! {
        biased;
        () = context.cancel.cancelled() => return Err(ChatError::Cancelled),
        result = handler.execute(arguments, context) => result,
    };

    Ok(match result {
        Ok(payload) => ToolOutcome::Success(payload),
        Err(e) => {
            tracing::warn!(tool = %context.tool_name, error = %e, "tool failed");
            ToolOutcome::Failure(ChatError::ToolExecutionFailed(format!("{e:#}")).to_string())
        }
    })
}
