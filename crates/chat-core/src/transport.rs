//! HTTP transport for provider calls.
//!
//! Adapters describe *what* to send; the transport sends it, maps failures to
//! [`ChatError`] kinds, and hands streaming bodies back as a uniform byte
//! stream regardless of how the underlying client chunks them.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use tokio_util::sync::CancellationToken;

use crate::error::{ChatError, Result};

/// Streaming response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A provider call described by an adapter.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    /// A GET request with no body.
    #[must_use]
    pub const fn get(url: String, headers: HeaderMap) -> Self {
        Self {
            url,
            headers,
            body: None,
        }
    }

    /// A POST request with a JSON body.
    #[must_use]
    pub const fn post(url: String, headers: HeaderMap, body: serde_json::Value) -> Self {
        Self {
            url,
            headers,
            body: Some(body),
        }
    }
}

/// Authenticated HTTP calls, buffered or chunked.
///
/// Every call takes the request's cancellation token; a cancelled token makes
/// pending calls resolve to [`ChatError::Cancelled`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET and decode a JSON body.
    async fn get_json(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value>;

    /// POST and decode a JSON body.
    async fn post_json(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value>;

    /// POST and return the body as a chunk stream.
    async fn post_stream(&self, request: HttpRequest, cancel: &CancellationToken)
    -> Result<ByteStream>;
}

type Slot = Arc<Mutex<Option<(u64, CancellationToken)>>>;

/// `reqwest`-backed transport.
#[derive(Debug)]
pub struct TransportClient {
    http: reqwest::Client,
    in_flight: Slot,
    next_call: AtomicU64,
}

/// Clears the in-flight slot when its call finishes, unless a newer call
/// has replaced it.
#[derive(Debug)]
struct InFlight {
    slot: Slot,
    id: u64,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|(id, _)| *id == self.id) {
            *slot = None;
        }
    }
}

impl Default for TransportClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportClient {
    /// Create a transport with default timeouts.
    #[must_use]
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self::with_client(http)
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            in_flight: Arc::new(Mutex::new(None)),
            next_call: AtomicU64::new(0),
        }
    }

    /// Cancel the call currently in flight, if any.
    ///
    /// Returns `true` when there was something to cancel.
    pub fn abort(&self) -> bool {
        match self.in_flight.lock().take() {
            Some((_, token)) if !token.is_cancelled() => {
                tracing::info!("aborting in-flight request");
                token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Whether a call is currently tracked as in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight
            .lock()
            .as_ref()
            .is_some_and(|(_, token)| !token.is_cancelled())
    }

    fn track(&self, cancel: &CancellationToken) -> InFlight {
        let id = self.next_call.fetch_add(1, Ordering::Relaxed);
        *self.in_flight.lock() = Some((id, cancel.clone()));
        InFlight {
            slot: Arc::clone(&self.in_flight),
            id,
        }
    }

    async fn send(
        &self,
        method: reqwest::Method,
        request: HttpRequest,
        accept: &'static str,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let mut builder = self
            .http
            .request(method, &request.url)
            .headers(request.headers)
            .header(ACCEPT, HeaderValue::from_static(accept));
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .json(body);
        }

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(ChatError::Cancelled),
            response = builder.send() => {
                response.map_err(|e| ChatError::from_transport(&request.url, &e))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(url = %request.url, status = status.as_u16(), "provider returned error status");
            return Err(ChatError::from_status(status.as_u16(), &body));
        }

        Ok(response)
    }

    async fn read_json(
        url: &str,
        response: reqwest::Response,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        let text = tokio::select! {
            () = cancel.cancelled() => return Err(ChatError::Cancelled),
            text = response.text() => text.map_err(|e| ChatError::from_transport(url, &e))?,
        };
        serde_json::from_str(&text).map_err(|e| {
            ChatError::MalformedUpstreamResponse(format!("invalid JSON from {url}: {e}"))
        })
    }
}

#[async_trait]
impl Transport for TransportClient {
    async fn get_json(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        let url = request.url.clone();
        let _flight = self.track(cancel);
        let response = self
            .send(reqwest::Method::GET, request, "application/json", cancel)
            .await?;
        Self::read_json(&url, response, cancel).await
    }

    async fn post_json(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        let url = request.url.clone();
        let _flight = self.track(cancel);
        let response = self
            .send(reqwest::Method::POST, request, "application/json", cancel)
            .await?;
        Self::read_json(&url, response, cancel).await
    }

    async fn post_stream(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<ByteStream> {
        let url = request.url.clone();
        let flight = self.track(cancel);
        let response = self
            .send(
                reqwest::Method::POST,
                request,
                "text/event-stream, application/x-ndjson",
                cancel,
            )
            .await?;

        // The flight guard lives in the stream state, so the slot clears when
        // the body ends or the stream is dropped.
        let body = Box::pin(response.bytes_stream());
        let stream = futures::stream::unfold((body, flight), move |(mut body, flight)| {
            let url = url.clone();
            async move {
                let chunk = body.next().await?;
                let chunk = chunk.map_err(|e| ChatError::from_transport(&url, &e));
                Some((chunk, (body, flight)))
            }
        });
        Ok(Box::pin(stream))
    }
}
