#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method as HttpMethod, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use praxis_auth::jwt::{TokenClaims, encode_unsigned};
use praxis_auth::store::MemoryCredentialStore;
use praxis_client::backend::{
    ApiResponse, Backend, OutboundRequest, SimulatedAccount, SimulatedOptions, StreamResponse,
};
use praxis_client::{
    BackendMode, ClientError, ClientOptions, ModeSwitch, NetworkedBackend, PraxisClient,
    SimulatedBackend,
};
use praxis_core::request::{ApiRequest, Method};

pub const MODES: [BackendMode; 2] = [BackendMode::Simulated, BackendMode::Networked];

pub const CLINICIAN: &str = "dr.okafor";
pub const CLINICIAN_PASSWORD: &str = "correct horse";
pub const MFA_USER: &str = "dr.lind";
pub const MFA_PASSWORD: &str = "second factor";
pub const MFA_CODE: &str = "482913";

/// Neither test backend ever contacts this address.
const UNUSED_URL: &str = "http://127.0.0.1:9";

pub fn simulator() -> SimulatedBackend {
    simulator_with(SimulatedOptions::instant())
}

pub fn simulator_with(options: SimulatedOptions) -> SimulatedBackend {
    SimulatedBackend::new(options)
        .with_account(SimulatedAccount::new(CLINICIAN, CLINICIAN_PASSWORD))
        .with_account(SimulatedAccount::new(MFA_USER, MFA_PASSWORD).with_mfa(MFA_CODE))
}

/// A client in `mode` whose active backend is a fresh simulator: directly
/// in simulated mode, or behind a real HTTP server in networked mode.
pub struct Harness {
    pub mode: BackendMode,
    pub client: PraxisClient,
    /// The simulator answering the active backend's requests.
    pub sim: Arc<SimulatedBackend>,
    pub store: Arc<MemoryCredentialStore>,
}

impl Harness {
    pub async fn new(mode: BackendMode) -> Self {
        Self::with_simulator(mode, simulator()).await
    }

    pub async fn with_simulator(mode: BackendMode, sim: SimulatedBackend) -> Self {
        let sim = Arc::new(sim);
        let store = Arc::new(MemoryCredentialStore::new());

        let active: Arc<dyn Backend> = sim.clone();
        let (simulated, networked): (Arc<dyn Backend>, Arc<dyn Backend>) = match mode {
            BackendMode::Simulated => (active, Arc::new(http_backend(UNUSED_URL))),
            BackendMode::Networked => {
                let url = spawn_server(sim.clone()).await;
                (Arc::new(simulator()), Arc::new(http_backend(&url)))
            }
        };

        let client = PraxisClient::with_backends(
            simulated,
            networked,
            ModeSwitch::new(mode),
            store.clone(),
            ClientOptions {
                prefetch_timeout: Duration::from_secs(2),
                ..ClientOptions::default()
            },
        );

        Self {
            mode,
            client,
            sim,
            store,
        }
    }

    pub async fn sign_in(&self) {
        let result = self
            .client
            .auth()
            .login(CLINICIAN, CLINICIAN_PASSWORD)
            .await
            .unwrap_or_else(|e| panic!("[{}] login failed: {e}", self.mode));
        assert!(!result.requires_mfa(), "[{}] unexpected MFA challenge", self.mode);
    }
}

pub fn http_backend(url: &str) -> NetworkedBackend {
    NetworkedBackend::new(url, Duration::from_secs(2)).unwrap()
}

// ── HTTP front for the simulator ─────────────────────────────────────────────

/// Serve `sim` over HTTP on an ephemeral port and return its base URL.
pub async fn spawn_server(sim: Arc<SimulatedBackend>) -> String {
    let app = Router::new().fallback(proxy).with_state(sim);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn proxy(
    State(sim): State<Arc<SimulatedBackend>>,
    method: HttpMethod,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let method = match method.as_str() {
        "GET" => Method::Get,
        "POST" => Method::Post,
        "PUT" => Method::Put,
        "PATCH" => Method::Patch,
        "DELETE" => Method::Delete,
        _ => return StatusCode::METHOD_NOT_ALLOWED.into_response(),
    };

    let body = if body.is_empty() {
        None
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => Some(value),
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        }
    };

    let request = ApiRequest {
        method,
        path: uri.path().to_string(),
        query: parse_query(uri.query()),
        body,
        requires_auth: true,
        requires_body: true,
    };
    let mut outbound = OutboundRequest::new(request);
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            outbound = outbound.with_header(name.as_str(), value);
        }
    }

    // Non-streaming routes come back as a single buffered chunk.
    match sim.open_stream(&outbound).await {
        Ok(stream) => {
            let status = StatusCode::from_u16(stream.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let content_type = if uri.path().ends_with("/stream") && status.is_success() {
                "text/event-stream"
            } else {
                "application/json"
            };
            (
                status,
                [(header::CONTENT_TYPE, content_type)],
                Body::from_stream(stream.chunks),
            )
                .into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

fn parse_query(query: Option<&str>) -> Vec<(String, String)> {
    query
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key.replace('+', " "), value.replace('+', " "))
        })
        .collect()
}

// ── Scripted backend ─────────────────────────────────────────────────────────

/// Answers with a fixed sequence of responses and records every request.
pub struct ScriptedBackend {
    mode: BackendMode,
    replies: Mutex<VecDeque<ApiResponse>>,
    seen: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedBackend {
    pub fn new(mode: BackendMode, replies: Vec<ApiResponse>) -> Arc<Self> {
        Arc::new(Self {
            mode,
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<OutboundRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn mode(&self) -> BackendMode {
        self.mode
    }

    async fn execute(&self, request: &OutboundRequest) -> Result<ApiResponse, ClientError> {
        self.seen.lock().unwrap().push(request.clone());
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ApiResponse::error(500, "script exhausted")))
    }

    async fn open_stream(&self, request: &OutboundRequest) -> Result<StreamResponse, ClientError> {
        Ok(StreamResponse::buffered(self.execute(request).await?))
    }
}

// ── Tokens ───────────────────────────────────────────────────────────────────

/// An unsigned token expiring `ttl_secs` from now (negative = expired).
pub fn token(label: &str, ttl_secs: i64) -> String {
    encode_unsigned(&TokenClaims {
        sub: "user-1".to_string(),
        exp: jiff::Timestamp::now().as_second() + ttl_secs,
        iat: None,
        token_use: Some("id".to_string()),
        email: None,
        username: None,
        jti: Some(label.to_string()),
    })
    .unwrap()
}
