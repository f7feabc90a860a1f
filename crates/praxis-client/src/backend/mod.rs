//! Backends answer the REST surface in `praxis_core::paths`. The networked
//! backend forwards over HTTP; the simulated one answers in memory. The
//! request pipeline and everything above it only see the [`Backend`] trait.

pub mod networked;
pub mod simulated;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::BoxStream;
use praxis_core::request::ApiRequest;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ClientError;
use crate::mode::{BackendMode, ModeSwitch};

pub use networked::NetworkedBackend;
pub use simulated::{SimulatedAccount, SimulatedBackend, SimulatedOptions};

pub const AUTHORIZATION: &str = "Authorization";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const ROLE_OVERRIDE: &str = "X-Role-Override";
pub const JSON: &str = "application/json";

/// Body bytes of a streaming response, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

#[async_trait]
pub trait Backend: Send + Sync {
    fn mode(&self) -> BackendMode;

    /// Perform one request and buffer the whole response.
    async fn execute(&self, request: &OutboundRequest) -> Result<ApiResponse, ClientError>;

    /// Perform one request and hand back the body as it arrives.
    async fn open_stream(&self, request: &OutboundRequest) -> Result<StreamResponse, ClientError>;
}

// ── Requests ─────────────────────────────────────────────────────────────────

/// A request descriptor plus the headers built for this attempt.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub request: ApiRequest,
    pub headers: Vec<(String, String)>,
}

impl OutboundRequest {
    pub fn new(request: ApiRequest) -> Self {
        Self {
            request,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.header(AUTHORIZATION)?.strip_prefix("Bearer ")
    }
}

// ── Responses ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self::new(status, Bytes::new())
    }

    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status, body),
            Err(e) => Self::error(500, &format!("failed to encode response: {e}")),
        }
    }

    /// An error response in the `{ "error": "<message>" }` shape.
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, &serde_json::json!({ "error": message }))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The server's error message: the `error` field of a JSON body, the
    /// raw text otherwise, or a generic description of the status.
    pub fn error_message(&self) -> String {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&self.body)
            && let Some(message) = value.get("error").and_then(|m| m.as_str())
        {
            return message.to_string();
        }
        let text = String::from_utf8_lossy(&self.body).trim().to_string();
        if text.is_empty() {
            format!("HTTP {}", self.status)
        } else {
            text
        }
    }

    pub fn into_error(self) -> ClientError {
        ClientError::from_status(self.status, self.error_message())
    }

    /// Decode a success body; any other status becomes an error.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        if !self.is_success() {
            return Err(self.into_error());
        }
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Like [`decode`](Self::decode), but a 404 is an absent value.
    pub fn decode_optional<T: DeserializeOwned>(self) -> Result<Option<T>, ClientError> {
        if self.status == 404 {
            return Ok(None);
        }
        self.decode().map(Some)
    }

    /// Require a success status and ignore the body.
    pub fn into_unit(self) -> Result<(), ClientError> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self.into_error())
        }
    }
}

/// Status and incrementally delivered body of a streaming call.
pub struct StreamResponse {
    pub status: u16,
    pub chunks: ByteStream,
}

impl StreamResponse {
    /// Wrap an already buffered response as a single-chunk stream.
    pub fn buffered(response: ApiResponse) -> Self {
        let ApiResponse { status, body } = response;
        let chunks: ByteStream = if body.is_empty() {
            futures::stream::empty().boxed()
        } else {
            futures::stream::once(async move { Ok::<_, ClientError>(body) }).boxed()
        };
        Self { status, chunks }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body. Used to read the error message of a failed stream.
    pub async fn collect(mut self) -> Result<ApiResponse, ClientError> {
        let mut body = BytesMut::new();
        while let Some(chunk) = self.chunks.next().await {
            body.extend_from_slice(&chunk?);
        }
        Ok(ApiResponse::new(self.status, body.freeze()))
    }
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

// ── Selection ────────────────────────────────────────────────────────────────

/// Holds both backends and routes each call by the current mode.
#[derive(Clone)]
pub struct BackendSelector {
    simulated: Arc<dyn Backend>,
    networked: Arc<dyn Backend>,
    mode: ModeSwitch,
}

impl BackendSelector {
    pub fn new(simulated: Arc<dyn Backend>, networked: Arc<dyn Backend>, mode: ModeSwitch) -> Self {
        Self {
            simulated,
            networked,
            mode,
        }
    }

    /// The backend for the current mode. Read on every call.
    pub fn current(&self) -> Arc<dyn Backend> {
        match self.mode.get() {
            BackendMode::Simulated => Arc::clone(&self.simulated),
            BackendMode::Networked => Arc::clone(&self.networked),
        }
    }

    pub fn mode(&self) -> BackendMode {
        self.mode.get()
    }

    pub fn switch(&self) -> &ModeSwitch {
        &self.mode
    }
}
