//! Request orchestration.
//!
//! [`Orchestrator::execute`] drives one chat request end to end: resolve the
//! provider, open the call, render tokens through the flush engine, run any
//! tool calls through approval and execution, then issue at most one
//! continuation call with the results appended. Failures never escape as
//! errors; they come back inside the [`ChatOutcome`] as displayable text.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::approval::{ApprovalGate, ApprovalPolicy, AutoApprove};
use crate::config::ProviderConfig;
use crate::document::DocumentSurface;
use crate::error::{ChatError, Result};
use crate::flush::{FlushEngine, FlushSettings};
use crate::framing::EventDecoder;
use crate::provider::{CompletionRequest, ProviderAdapter, StreamDelta};
use crate::registry::{ProviderRegistry, qualified_model};
use crate::tool_cycle::{BatchContext, ToolCycle};
use crate::tools::{ToolRegistry, ToolSettings};
use crate::transport::{HttpRequest, Transport};
use crate::types::{Completion, Message, ToolResult};

/// Source of API keys, keyed by provider id.
pub trait CredentialStore: Send + Sync {
    fn credential(&self, provider_id: &str) -> Option<String>;
}

/// Fixed keys, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(HashMap<String, String>);

impl StaticCredentials {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, provider_id: &str, key: &str) -> Self {
        self.0.insert(provider_id.to_string(), key.to_string());
        self
    }
}

impl CredentialStore for StaticCredentials {
    fn credential(&self, provider_id: &str) -> Option<String> {
        self.0.get(provider_id).cloned()
    }
}

/// How the response reached the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Rendered into the surface while it arrived.
    Streamed,
    /// Received in one piece.
    Buffered,
}

/// Result of [`Orchestrator::execute`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    /// Everything the request produced, including a rendered error message.
    pub text: String,
    pub mode: ResponseMode,
    /// The user cancelled; `text` holds what was committed before that.
    pub aborted: bool,
    /// The failure that ended the request, if any.
    pub error: Option<ChatError>,
    /// One result per tool call the model made.
    pub tool_results: Vec<ToolResult>,
}

/// Per-call options.
pub struct ExecuteOptions<'s> {
    /// Offer tools to the model.
    pub tools_enabled: bool,
    /// Live document to render into.
    pub surface: Option<&'s mut dyn DocumentSurface>,
    /// Identifies the document; one request per target at a time.
    pub target: String,
}

impl<'s> ExecuteOptions<'s> {
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            tools_enabled: true,
            surface: None,
            target: target.into(),
        }
    }

    #[must_use]
    pub fn with_surface(mut self, surface: &'s mut dyn DocumentSurface) -> Self {
        self.surface = Some(surface);
        self
    }

    #[must_use]
    pub const fn tools_enabled(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }
}

/// Settings the host loads once and hands to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    /// Stored endpoint overrides keyed by provider id.
    pub base_urls: HashMap<String, String>,
    pub flush: FlushSettings,
    pub tools: ToolSettings,
    pub approval: ApprovalPolicy,
}

/// Per-request streaming state: flush engine, cancellation, abort flag.
struct StreamSession<'s> {
    engine: Option<FlushEngine<'s>>,
    cancel: CancellationToken,
    aborted: bool,
}

impl StreamSession<'_> {
    fn append(&mut self, text: &str) {
        if let Some(engine) = &mut self.engine {
            engine.append(text);
        }
    }

    fn stop(&mut self) {
        if let Some(engine) = &mut self.engine {
            engine.stop();
        }
    }

    fn committed(&self) -> Option<&str> {
        self.engine.as_ref().map(FlushEngine::committed)
    }
}

/// One resolved provider call.
struct Call<'a> {
    adapter: &'a dyn ProviderAdapter,
    /// Model id sent upstream.
    model: &'a str,
    url: String,
    headers: HeaderMap,
    streamed: bool,
}

/// Route decoded stream events into the session and the completion.
fn apply(deltas: Vec<StreamDelta>, session: &mut StreamSession<'_>, completion: &mut Completion) {
    for delta in deltas {
        match delta {
            StreamDelta::Text(text) => {
                session.append(&text);
                completion.text.push_str(&text);
            }
            StreamDelta::ToolCall(intent) => completion.tool_calls.push(intent),
            StreamDelta::Done(reason) => completion.stop_reason = reason,
        }
    }
}

/// Removes the target's entry when the request ends.
struct ActiveGuard<'a> {
    active: &'a Mutex<HashMap<String, CancellationToken>>,
    target: String,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.lock().remove(&self.target);
    }
}

/// Top-level coordinator for chat requests.
pub struct Orchestrator {
    providers: ProviderRegistry,
    transport: Arc<dyn Transport>,
    tools: Arc<ToolRegistry>,
    gate: Arc<dyn ApprovalGate>,
    credentials: Arc<dyn CredentialStore>,
    settings: OrchestratorSettings,
    active: Mutex<HashMap<String, CancellationToken>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("providers", &self.providers)
            .field("tools", &self.tools)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Orchestrator with the built-in providers, no tools, and a gate that
    /// approves everything.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            providers: ProviderRegistry::with_defaults(),
            transport,
            tools: Arc::new(ToolRegistry::new()),
            gate: Arc::new(AutoApprove),
            credentials,
            settings: OrchestratorSettings::default(),
            active: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.gate = gate;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub const fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Cancel the request running for `target`.
    ///
    /// Returns `true` if one was running.
    pub fn cancel(&self, target: &str) -> bool {
        match self.active.lock().get(target) {
            Some(token) => {
                tracing::info!(target, "cancelling request");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every running request.
    pub fn cancel_all(&self) {
        for token in self.active.lock().values() {
            token.cancel();
        }
    }

    /// Whether a request is running for `target`.
    #[must_use]
    pub fn is_active(&self, target: &str) -> bool {
        self.active.lock().contains_key(target)
    }

    /// Endpoint for a provider: document override, stored override, default.
    #[must_use]
    pub fn base_url(&self, adapter: &dyn ProviderAdapter, document_url: Option<&str>) -> String {
        document_url
            .filter(|url| !url.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.settings.base_urls.get(adapter.id()).cloned())
            .unwrap_or_else(|| adapter.default_base_url().to_string())
    }

    /// Run one chat request.
    pub async fn execute(
        &self,
        messages: Vec<Message>,
        config: &ProviderConfig,
        options: ExecuteOptions<'_>,
    ) -> ChatOutcome {
        let ExecuteOptions {
            tools_enabled,
            surface,
            target,
        } = options;
        let mode = if config.stream && surface.is_some() {
            ResponseMode::Streamed
        } else {
            ResponseMode::Buffered
        };

        let resolved = self.providers.resolve(&config.model);
        let adapter = resolved.adapter.as_ref();
        let endpoint = adapter.chat_url(&self.base_url(adapter, config.base_url.as_deref()));

        let Some((cancel, _guard)) = self.begin(&target) else {
            let error = ChatError::SurfaceBusy { target };
            tracing::warn!(%error, "refusing concurrent request");
            return ChatOutcome {
                text: error.chat_message(&config.model, &endpoint),
                mode,
                aborted: false,
                error: Some(error),
                tool_results: Vec::new(),
            };
        };

        let mut session = StreamSession {
            engine: surface.map(|s| FlushEngine::new(s, self.settings.flush)),
            cancel,
            aborted: false,
        };
        let mut outcome = ChatOutcome {
            text: String::new(),
            mode,
            aborted: false,
            error: None,
            tool_results: Vec::new(),
        };

        tracing::info!(model = %config.model, provider = adapter.id(), ?mode, "chat request started");
        let result = self
            .run(
                messages,
                config,
                adapter,
                &resolved.model,
                &endpoint,
                tools_enabled,
                &target,
                &mut session,
                &mut outcome,
            )
            .await;

        if let Err(error) = result {
            tracing::warn!(%error, model = %config.model, "chat request failed");
            let message = error.chat_message(&config.model, &endpoint);
            session.stop();
            if session.committed().is_some_and(|c| !c.is_empty() && !c.ends_with('\n')) {
                session.append("\n\n");
            }
            session.append(&message);
            session.stop();
            if session.engine.is_none() {
                if !outcome.text.is_empty() {
                    outcome.text.push_str("\n\n");
                }
                outcome.text.push_str(&message);
            }
            outcome.error = Some(error);
        }

        session.stop();
        if let Some(committed) = session.committed() {
            outcome.text = committed.to_string();
        }
        outcome.aborted = session.aborted;
        tracing::info!(aborted = outcome.aborted, chars = outcome.text.len(), "chat request finished");
        outcome
    }

    fn begin(&self, target: &str) -> Option<(CancellationToken, ActiveGuard<'_>)> {
        let mut active = self.active.lock();
        if active.contains_key(target) {
            return None;
        }
        let token = CancellationToken::new();
        active.insert(target.to_string(), token.clone());
        Some((token, ActiveGuard {
            active: &self.active,
            target: target.to_string(),
        }))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        messages: Vec<Message>,
        config: &ProviderConfig,
        adapter: &dyn ProviderAdapter,
        model: &str,
        url: &str,
        tools_enabled: bool,
        target: &str,
        session: &mut StreamSession<'_>,
        outcome: &mut ChatOutcome,
    ) -> Result<()> {
        config.validate()?;
        let credential = self.credentials.credential(adapter.id());
        let call = Call {
            adapter,
            model,
            url: url.to_string(),
            headers: adapter.auth_headers(credential.as_deref())?,
            streamed: outcome.mode == ResponseMode::Streamed,
        };

        let mut request = CompletionRequest::from_config(config, call.model, messages);
        if let Some(system) = config.system_instructions() {
            if adapter.supports_system_field() {
                request.system = Some(system);
            } else {
                request.messages.insert(0, Message::system(system));
            }
        }
        let tool_settings = &self.settings.tools;
        if tools_enabled
            && adapter.supports_tool_calling()
            && (tool_settings.allows_model(&config.model) || tool_settings.allows_model(model))
        {
            request.tools = self.tools.enabled_definitions(tool_settings);
        }

        let first = self.call(&call, &request, session).await?;
        outcome.text.push_str(&first.text);
        if session.aborted || first.tool_calls.is_empty() {
            return Ok(());
        }

        tracing::info!(count = first.tool_calls.len(), "model requested tool calls");
        let cycle = ToolCycle::new(&self.tools, self.gate.as_ref(), &self.settings.approval);
        let batch = cycle
            .process_batch(&first.tool_calls, &BatchContext {
                model: config.model.clone(),
                target: target.to_string(),
                cancel: session.cancel.clone(),
                offered: request.tools.iter().map(|t| t.name.clone()).collect(),
            })
            .await;
        outcome.tool_results = batch.results();
        if batch.aborted {
            session.aborted = true;
            return Ok(());
        }

        if !first.text.is_empty() {
            request.messages.push(Message::assistant(first.text.clone()));
        }
        request
            .messages
            .extend(outcome.tool_results.iter().map(ToolResult::to_message));
        request.tools.clear();

        if !first.text.is_empty() && !first.text.ends_with('\n') {
            session.append("\n\n");
            outcome.text.push_str("\n\n");
        }

        let second = self.call(&call, &request, session).await?;
        if !second.tool_calls.is_empty() {
            tracing::warn!(
                count = second.tool_calls.len(),
                "ignoring tool calls in continuation response"
            );
        }
        outcome.text.push_str(&second.text);
        Ok(())
    }

    async fn call(
        &self,
        call: &Call<'_>,
        request: &CompletionRequest,
        session: &mut StreamSession<'_>,
    ) -> Result<Completion> {
        let streamed = call.streamed;
        let mut request = request.clone();
        request.stream = streamed;
        let http = HttpRequest::post(
            call.url.clone(),
            call.headers.clone(),
            call.adapter.build_request(&request),
        );

        let completion = if streamed {
            self.stream_call(call.adapter, http, session).await
        } else {
            self.transport
                .post_json(http, &session.cancel)
                .await
                .and_then(|body| call.adapter.parse_completion(&body))
        };

        match completion {
            Ok(completion) => {
                if !streamed {
                    session.append(&completion.text);
                    session.stop();
                }
                Ok(completion)
            }
            Err(ChatError::Cancelled) => {
                session.aborted = true;
                Ok(Completion::default())
            }
            Err(e) => Err(e),
        }
    }

    async fn stream_call(
        &self,
        adapter: &dyn ProviderAdapter,
        http: HttpRequest,
        session: &mut StreamSession<'_>,
    ) -> Result<Completion> {
        let mut body = self.transport.post_stream(http, &session.cancel).await?;
        let mut decoder = EventDecoder::new(adapter.framing());
        let mut parser = adapter.stream_parser();
        let mut completion = Completion::default();

        let mut ticker = tokio::time::interval(self.settings.flush.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let cancel = session.cancel.clone();
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!("stream cancelled");
                    session.aborted = true;
                    break;
                }
                _ = ticker.tick() => {
                    if let Some(engine) = &mut session.engine {
                        engine.flush();
                    }
                }
                chunk = body.next() => match chunk {
                    Some(Ok(bytes)) => {
                        for payload in decoder.push(&bytes) {
                            apply(parser.parse(&payload)?, session, &mut completion);
                        }
                    }
                    Some(Err(e)) => {
                        session.stop();
                        return Err(e);
                    }
                    None => break,
                },
            }
        }

        if !session.aborted {
            if let Some(payload) = decoder.finish() {
                apply(parser.parse(&payload)?, session, &mut completion);
            }
            apply(parser.finish(), session, &mut completion);
        }
        session.stop();
        Ok(completion)
    }

    /// Models offered by one provider, unprefixed and sorted.
    ///
    /// # Errors
    ///
    /// Returns credential, transport, or decoding errors.
    pub async fn list_models(&self, provider_id: &str) -> Result<Vec<String>> {
        let adapter = self
            .providers
            .get(provider_id)
            .ok_or_else(|| ChatError::Config(format!("unknown provider '{provider_id}'")))?;
        let base_url = self.base_url(adapter.as_ref(), None);
        let credential = self.credentials.credential(provider_id);
        adapter
            .list_models(self.transport.as_ref(), &base_url, credential.as_deref())
            .await
    }

    /// Models across every provider as `provider@model`.
    ///
    /// Providers that cannot be listed are skipped.
    pub async fn list_all_models(&self) -> Vec<String> {
        let ids: Vec<String> = self.providers.ids().map(str::to_string).collect();
        let mut all = Vec::new();
        for id in ids {
            match self.list_models(&id).await {
                Ok(models) => all.extend(models.iter().map(|m| qualified_model(&id, m))),
                Err(error) => tracing::warn!(provider = %id, %error, "skipping provider"),
            }
        }
        all
    }
}
