mod common;

use std::sync::Arc;

use async_trait::async_trait;
use praxis_auth::lifecycle::{SessionStatus, TokenLifecycle};
use praxis_auth::store::{CredentialSlot, CredentialStore, MemoryCredentialStore};
use praxis_client::backend::{ApiResponse, Backend, BackendSelector, OutboundRequest, StreamResponse};
use praxis_client::{BackendMode, ClientError, ModeSwitch, RequestPipeline};
use praxis_core::models::auth::TokenGrant;
use praxis_core::paths;
use praxis_core::request::ApiRequest;
use serde_json::json;

use common::{ScriptedBackend, token};

struct Setup {
    pipeline: RequestPipeline,
    backend: Arc<ScriptedBackend>,
    store: Arc<MemoryCredentialStore>,
    lifecycle: Arc<TokenLifecycle>,
}

fn signed_in_store(id_token: Option<String>) -> Arc<MemoryCredentialStore> {
    let store = Arc::new(MemoryCredentialStore::new());
    if let Some(id_token) = id_token {
        store.set(CredentialSlot::IdToken, &id_token);
        store.set(CredentialSlot::AccessToken, "access-1");
        store.set(CredentialSlot::RefreshToken, "refresh-1");
    }
    store
}

/// A pipeline whose two backend slots are the same scripted backend. Refresh
/// exchanges are answered from the same script as ordinary calls.
fn setup(mode: BackendMode, id_token: Option<String>, replies: Vec<ApiResponse>) -> Setup {
    let store = signed_in_store(id_token);
    let backend = ScriptedBackend::new(mode, replies);
    let active: Arc<dyn Backend> = backend.clone();
    let selector = BackendSelector::new(active.clone(), active, ModeSwitch::new(mode));
    let lifecycle = Arc::new(TokenLifecycle::new(store.clone()));
    let pipeline = RequestPipeline::new(selector, lifecycle.clone())
        .with_role_override(Some("supervisor".to_string()));

    Setup {
        pipeline,
        backend,
        store,
        lifecycle,
    }
}

fn is_refresh(outbound: &OutboundRequest) -> bool {
    outbound.request.path == paths::REFRESH
}

/// Refresh exchanges the backend saw.
fn exchanges(backend: &ScriptedBackend) -> usize {
    backend.seen().iter().filter(|o| is_refresh(o)).count()
}

/// Everything else the backend saw, in order.
fn sent(backend: &ScriptedBackend) -> Vec<OutboundRequest> {
    backend.seen().into_iter().filter(|o| !is_refresh(o)).collect()
}

fn ok_json() -> ApiResponse {
    ApiResponse::json(200, &json!({ "ok": true }))
}

fn unauthorized() -> ApiResponse {
    ApiResponse::error(401, "token expired")
}

fn grant(id_token: &str) -> ApiResponse {
    ApiResponse::json(
        200,
        &TokenGrant {
            id_token: Some(id_token.to_string()),
            access_token: Some("access-2".to_string()),
            refresh_token: None,
        },
    )
}

fn refresh_rejected() -> ApiResponse {
    ApiResponse::error(401, "invalid refresh token")
}

#[tokio::test]
async fn recovered_401_is_invisible_to_the_caller() {
    let fresh = token("fresh", 3600);
    let s = setup(
        BackendMode::Simulated,
        Some(token("stale", 3600)),
        vec![unauthorized(), grant(&fresh), ok_json()],
    );

    let response = s.pipeline.send(ApiRequest::get("/settings")).await.unwrap();
    assert_eq!(response.status, 200);

    let seen = s.backend.seen();
    assert!(is_refresh(&seen[1]));
    assert!(seen[1].bearer_token().is_none());

    let sent = sent(&s.backend);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].request, sent[1].request);
    assert_eq!(sent[1].bearer_token(), Some(fresh.as_str()));
    assert_eq!(exchanges(&s.backend), 1);
    assert_eq!(s.lifecycle.status(), SessionStatus::Active);
}

#[tokio::test]
async fn second_401_ends_the_session() {
    let s = setup(
        BackendMode::Simulated,
        Some(token("stale", 3600)),
        vec![unauthorized(), grant(&token("fresh", 3600)), unauthorized(), ok_json()],
    );

    let err = s.pipeline.send(ApiRequest::get("/settings")).await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired { status: Some(401) }));
    assert_eq!(err.status(), Some(401));

    // Exactly one retry, never a third attempt.
    assert_eq!(sent(&s.backend).len(), 2);
    assert_eq!(exchanges(&s.backend), 1);
    for slot in CredentialSlot::ALL {
        assert!(s.store.get(slot).is_none(), "{slot:?} not cleared");
    }
    assert_eq!(s.lifecycle.status(), SessionStatus::Expired);
}

#[tokio::test]
async fn failed_refresh_after_401_ends_the_session_without_retry() {
    let s = setup(
        BackendMode::Simulated,
        Some(token("stale", 3600)),
        vec![unauthorized(), refresh_rejected(), ok_json()],
    );

    let err = s.pipeline.send(ApiRequest::get("/settings")).await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired { status: Some(401) }));
    assert_eq!(sent(&s.backend).len(), 1);
    assert_eq!(exchanges(&s.backend), 1);
    assert!(s.store.snapshot().id_token.is_none());
}

#[tokio::test]
async fn near_expiry_token_is_refreshed_before_sending() {
    let fresh = token("fresh", 3600);
    let s = setup(
        BackendMode::Simulated,
        Some(token("expiring", 60)),
        vec![grant(&fresh), ok_json()],
    );

    s.pipeline.send(ApiRequest::get("/clients")).await.unwrap();
    assert!(is_refresh(&s.backend.seen()[0]));
    assert_eq!(exchanges(&s.backend), 1);

    let sent = sent(&s.backend);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].bearer_token(), Some(fresh.as_str()));
}

#[tokio::test]
async fn unrefreshable_expired_token_sends_nothing() {
    let s = setup(
        BackendMode::Simulated,
        Some(token("expired", -10)),
        vec![refresh_rejected(), ok_json()],
    );

    let err = s.pipeline.send(ApiRequest::get("/clients")).await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired { status: None }));
    assert!(sent(&s.backend).is_empty());
    assert_eq!(s.lifecycle.status(), SessionStatus::Expired);
}

#[tokio::test]
async fn logged_out_caller_never_attempts_a_refresh() {
    let s = setup(BackendMode::Simulated, None, vec![ok_json()]);

    let err = s.pipeline.send(ApiRequest::get("/clients")).await.unwrap_err();
    assert!(err.is_session_expired());
    assert_eq!(s.backend.calls(), 0);
}

#[tokio::test]
async fn other_statuses_are_left_to_the_operation() {
    let s = setup(
        BackendMode::Simulated,
        Some(token("valid", 3600)),
        vec![
            ApiResponse::error(404, "document not found"),
            ApiResponse::error(500, "boom"),
        ],
    );

    let missing = s.pipeline.send(ApiRequest::get("/clients/c1")).await.unwrap();
    assert_eq!(missing.status, 404);
    let failed = s.pipeline.send(ApiRequest::get("/clients/c1")).await.unwrap();
    assert_eq!(failed.status, 500);
    assert_eq!(failed.error_message(), "boom");
    assert_eq!(exchanges(&s.backend), 0);
}

#[tokio::test]
async fn anonymous_401_is_not_retried() {
    let s = setup(
        BackendMode::Simulated,
        None,
        vec![ApiResponse::error(401, "invalid username or password")],
    );

    let request = ApiRequest::post("/auth/login")
        .anonymous()
        .json(&json!({ "username": "a", "password": "b" }))
        .unwrap();
    let response = s.pipeline.send(request).await.unwrap();

    assert_eq!(response.status, 401);
    assert_eq!(s.backend.calls(), 1);
    assert!(s.backend.seen()[0].bearer_token().is_none());
    assert_eq!(s.lifecycle.status(), SessionStatus::LoggedOut);
}

/// Flips the shared mode right after answering each request.
struct SwitchingBackend {
    inner: Arc<ScriptedBackend>,
    mode: ModeSwitch,
    switch_to: BackendMode,
}

#[async_trait]
impl Backend for SwitchingBackend {
    fn mode(&self) -> BackendMode {
        self.inner.mode()
    }

    async fn execute(&self, request: &OutboundRequest) -> Result<ApiResponse, ClientError> {
        let response = self.inner.execute(request).await;
        self.mode.set(self.switch_to);
        response
    }

    async fn open_stream(&self, request: &OutboundRequest) -> Result<StreamResponse, ClientError> {
        self.inner.open_stream(request).await
    }
}

#[tokio::test]
async fn mode_switch_mid_call_keeps_refresh_and_retry_on_the_same_backend() {
    let fresh = token("fresh", 3600);
    let store = signed_in_store(Some(token("stale", 3600)));
    let mode = ModeSwitch::new(BackendMode::Simulated);

    let simulated = ScriptedBackend::new(
        BackendMode::Simulated,
        vec![unauthorized(), grant(&fresh), ok_json()],
    );
    let networked = ScriptedBackend::new(BackendMode::Networked, vec![]);
    let switching: Arc<dyn Backend> = Arc::new(SwitchingBackend {
        inner: simulated.clone(),
        mode: mode.clone(),
        switch_to: BackendMode::Networked,
    });
    let other: Arc<dyn Backend> = networked.clone();

    let lifecycle = Arc::new(TokenLifecycle::new(store.clone()));
    let pipeline = RequestPipeline::new(
        BackendSelector::new(switching, other, mode.clone()),
        lifecycle.clone(),
    );

    let response = pipeline.send(ApiRequest::get("/settings")).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(mode.get(), BackendMode::Networked);

    assert_eq!(exchanges(&simulated), 1);
    assert_eq!(sent(&simulated).len(), 2);
    assert_eq!(networked.calls(), 0);
    assert_eq!(lifecycle.status(), SessionStatus::Active);
    assert_eq!(store.get(CredentialSlot::IdToken), Some(fresh));
}

#[tokio::test]
async fn content_type_only_with_a_body() {
    let s = setup(
        BackendMode::Simulated,
        Some(token("valid", 3600)),
        vec![ok_json(), ok_json()],
    );

    s.pipeline.send(ApiRequest::get("/settings")).await.unwrap();
    let patch = ApiRequest::patch("/settings")
        .json(&json!({ "temperature": 0.2 }))
        .unwrap();
    s.pipeline.send(patch).await.unwrap();

    let seen = s.backend.seen();
    assert!(seen[0].header("Content-Type").is_none());
    assert_eq!(seen[1].header("content-type"), Some("application/json"));
}

#[tokio::test]
async fn role_override_only_on_networked_calls() {
    let simulated = setup(
        BackendMode::Simulated,
        Some(token("valid", 3600)),
        vec![ok_json()],
    );
    simulated.pipeline.send(ApiRequest::get("/settings")).await.unwrap();
    assert!(simulated.backend.seen()[0].header("X-Role-Override").is_none());

    let networked = setup(
        BackendMode::Networked,
        Some(token("valid", 3600)),
        vec![ok_json()],
    );
    networked.pipeline.send(ApiRequest::get("/settings")).await.unwrap();
    assert_eq!(
        networked.backend.seen()[0].header("X-Role-Override"),
        Some("supervisor")
    );
}

#[tokio::test]
async fn empty_body_where_one_is_required_is_a_decode_error() {
    let s = setup(
        BackendMode::Simulated,
        Some(token("valid", 3600)),
        vec![ApiResponse::empty(200), ApiResponse::empty(204)],
    );

    let err = s.pipeline.send(ApiRequest::get("/settings")).await.unwrap_err();
    assert!(matches!(err, ClientError::Decode(_)));

    let deleted = s
        .pipeline
        .send(ApiRequest::delete("/clients/c1/documents/d1"))
        .await
        .unwrap();
    assert_eq!(deleted.status, 204);
}

#[tokio::test]
async fn failed_stream_open_is_drained_into_an_error() {
    let s = setup(
        BackendMode::Simulated,
        Some(token("valid", 3600)),
        vec![ApiResponse::error(400, "prompt is required")],
    );

    let err = s
        .pipeline
        .open_stream(ApiRequest::post("/narratives/stream"))
        .await
        .unwrap_err();
    match err {
        ClientError::Http { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "prompt is required");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
