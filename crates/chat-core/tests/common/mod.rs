//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use chat_core::{
    ApprovalDecision, ApprovalGate, ApprovalRequest, ByteStream, ChatError, HttpRequest, Result,
    ToolContext, ToolDefinition, ToolHandler, Transport,
};

/// One scripted upstream reply.
pub enum Reply {
    /// Stream these chunks, then end.
    Chunks(Vec<String>),
    /// Stream these chunks, then stay open forever.
    ChunksThenHang(Vec<String>),
    /// Stream these chunks, then fail mid-body.
    ChunksThenFail(Vec<String>, ChatError),
    /// Buffered JSON body.
    Json(serde_json::Value),
    /// Fail before any body arrives.
    Fail(ChatError),
}

/// Transport that replays scripted replies and records every request.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// JSON body of the `n`th request.
    pub fn body(&self, n: usize) -> serde_json::Value {
        self.requests.lock()[n].body.clone().unwrap_or_default()
    }

    fn next(&self, request: HttpRequest) -> Reply {
        self.requests.lock().push(request);
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Reply::Fail(ChatError::Unknown("no scripted reply".to_string())))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get_json(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        self.post_json(request, cancel).await
    }

    async fn post_json(
        &self,
        request: HttpRequest,
        _cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        match self.next(request) {
            Reply::Json(body) => Ok(body),
            Reply::Fail(error) => Err(error),
            Reply::Chunks(_) | Reply::ChunksThenHang(_) | Reply::ChunksThenFail(..) => {
                Err(ChatError::Unknown("expected a buffered call".to_string()))
            }
        }
    }

    async fn post_stream(
        &self,
        request: HttpRequest,
        _cancel: &CancellationToken,
    ) -> Result<ByteStream> {
        let (chunks, hang, failure) = match self.next(request) {
            Reply::Chunks(chunks) => (chunks, false, None),
            Reply::ChunksThenHang(chunks) => (chunks, true, None),
            Reply::ChunksThenFail(chunks, error) => (chunks, false, Some(error)),
            Reply::Fail(error) => return Err(error),
            Reply::Json(_) => return Err(ChatError::Unknown("expected a streamed call".to_string())),
        };

        Ok(Box::pin(async_stream::stream! {
            for chunk in chunks {
                yield Ok::<_, ChatError>(Bytes::from(chunk));
            }
            if let Some(error) = failure {
                yield Err(error);
            }
            if hang {
                std::future::pending::<()>().await;
            }
        }))
    }
}

/// SSE chunk carrying one text delta in Chat Completions shape.
pub fn text_event(text: &str) -> String {
    let chunk = serde_json::json!({"choices": [{"delta": {"content": text}}]});
    format!("data: {chunk}\n\n")
}

/// SSE chunk closing the response.
pub fn finish_event(reason: &str) -> String {
    let chunk = serde_json::json!({"choices": [{"delta": {}, "finish_reason": reason}]});
    format!("data: {chunk}\n\ndata: [DONE]\n\n")
}

/// SSE chunk announcing a complete tool call.
pub fn tool_call_event(index: usize, id: &str, name: &str, arguments: &str) -> String {
    let chunk = serde_json::json!({"choices": [{"delta": {"tool_calls": [{
        "index": index,
        "id": id,
        "type": "function",
        "function": {"name": name, "arguments": arguments}
    }]}}]});
    format!("data: {chunk}\n\n")
}

/// A streamed reply made of text fragments.
pub fn text_reply(fragments: &[&str]) -> Reply {
    let mut chunks: Vec<String> = fragments.iter().map(|f| text_event(f)).collect();
    chunks.push(finish_event("stop"));
    Reply::Chunks(chunks)
}

/// Gate that answers from a queue and records what it was shown.
#[derive(Default)]
pub struct ScriptedGate {
    decisions: Mutex<VecDeque<ApprovalDecision>>,
    seen: Mutex<Vec<ApprovalRequest>>,
}

impl ScriptedGate {
    pub fn new(decisions: Vec<ApprovalDecision>) -> Arc<Self> {
        Arc::new(Self {
            decisions: Mutex::new(decisions.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<ApprovalRequest> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl ApprovalGate for ScriptedGate {
    async fn present(&self, request: ApprovalRequest) -> ApprovalDecision {
        self.seen.lock().push(request.clone());
        self.decisions
            .lock()
            .pop_front()
            .unwrap_or_else(|| ApprovalDecision::approve(request.arguments))
    }
}

/// Gate that never answers.
pub struct HangingGate;

#[async_trait]
impl ApprovalGate for HangingGate {
    async fn present(&self, _request: ApprovalRequest) -> ApprovalDecision {
        std::future::pending().await
    }
}

/// Tool that records its calls and echoes its arguments.
pub struct EchoTool {
    pub name: &'static str,
    pub calls: Mutex<Vec<String>>,
}

impl EchoTool {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ToolHandler for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.to_string(),
            description: format!("Echo tool {}", self.name),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<serde_json::Value> {
        self.calls.lock().push(context.call_id.clone());
        Ok(serde_json::json!({"echo": arguments}))
    }
}

/// A buffered Chat Completions reply.
pub fn json_reply(text: &str) -> Reply {
    Reply::Json(serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": text}, "finish_reason": "stop"}]
    }))
}

/// A buffered Chat Completions reply asking for one tool call.
pub fn tool_call_json(id: &str, name: &str) -> Reply {
    Reply::Json(serde_json::json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": id,
                    "type": "function",
                    "function": {"name": name, "arguments": "{}"}
                }]
            },
            "finish_reason": "tool_calls"
        }]
    }))
}
