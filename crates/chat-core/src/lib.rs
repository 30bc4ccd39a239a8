//! Streaming chat orchestration over multiple model providers.
//!
//! The crate turns a conversation into a provider call, renders the reply into
//! a live [`DocumentSurface`] as it streams, and routes any tool calls the
//! model makes through an approval gate before running them.

pub mod approval;
pub mod config;
pub mod document;
pub mod error;
pub mod flush;
pub mod framing;
pub mod orchestrator;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod secret;
pub mod tool_cycle;
pub mod tools;
pub mod transport;
pub mod types;

pub use approval::{
    ApprovalClient, ApprovalDecision, ApprovalGate, ApprovalMessage, ApprovalPolicy,
    ApprovalPreset, ApprovalRequest, AutoApprove,
};
pub use config::{ConfigLayer, ProviderConfig};
pub use document::{DocumentSurface, Position, TextDocument};
pub use error::{ChatError, Result};
pub use flush::{FlushEngine, FlushSettings};
pub use orchestrator::{
    ChatOutcome, CredentialStore, ExecuteOptions, Orchestrator, OrchestratorSettings,
    ResponseMode, StaticCredentials,
};
pub use provider::{CompletionRequest, Framing, ProviderAdapter, StreamDelta, StreamParser};
pub use registry::ProviderRegistry;
pub use tokio_util::sync::CancellationToken;
pub use tools::{ToolContext, ToolHandler, ToolRegistry, ToolSettings};
pub use transport::{ByteStream, HttpRequest, Transport, TransportClient};
pub use types::{
    Completion, Message, Role, StopReason, ToolCallIntent, ToolDefinition, ToolOutcome, ToolResult,
};
