//! In-memory backend answering the same REST surface as the real API.
//!
//! Every call sleeps for a configurable latency so callers observe the same
//! asynchronous behavior as over the network. Bearer tokens are unsigned
//! JWTs with a real `exp`, so the token lifecycle applies unchanged.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Display;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use jiff::Timestamp;
use jiff::tz::TimeZone;
use praxis_auth::jwt::{self, TokenClaims};
use praxis_core::models::auth::{
    LoginRequest, LoginResponse, MfaRequest, RefreshRequest, TokenGrant, UserProfile,
};
use praxis_core::models::client::{ClientList, ClientPatch, ClientRecord, NewClient};
use praxis_core::models::document::{
    self, Document, DocumentFilter, DocumentList, DocumentPatch, NewDocument,
};
use praxis_core::models::narrative::{NarrativeRequest, NarrativeResponse};
use praxis_core::models::settings::Settings;
use praxis_core::models::telemetry::UsageEvent;
use praxis_core::paths::{self, Route};
use praxis_core::request::{ApiRequest, Method};
use praxis_narrative::events::NarrativeEvent;
use praxis_narrative::sse::encode_frame;
use praxis_narrative::synth;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ApiResponse, Backend, OutboundRequest, StreamResponse};
use crate::error::ClientError;
use crate::mode::BackendMode;

pub const DEMO_USERNAME: &str = "demo";
pub const DEMO_PASSWORD: &str = "demo-password";

const DEFAULT_MODEL_ID: &str = "praxis-simulated-1";

/// A handler either answers or fails with a ready error response.
type Reply = Result<ApiResponse, ApiResponse>;

#[derive(Debug, Clone)]
pub struct SimulatedOptions {
    /// Delay applied to every call before it is answered.
    pub latency: Duration,
    /// Delay between streamed narrative tokens.
    pub token_delay: Duration,
    /// Lifetime of issued bearer tokens.
    pub token_ttl: Duration,
    pub model_id: String,
}

impl Default for SimulatedOptions {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(150),
            token_delay: Duration::from_millis(30),
            token_ttl: Duration::from_secs(3600),
            model_id: DEFAULT_MODEL_ID.to_string(),
        }
    }
}

impl SimulatedOptions {
    /// No artificial delays. Used by tests.
    pub fn instant() -> Self {
        Self {
            latency: Duration::ZERO,
            token_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedAccount {
    pub password: String,
    /// When set, login answers with an MFA challenge and this code is the
    /// only one accepted.
    pub mfa_code: Option<String>,
    pub profile: UserProfile,
}

impl SimulatedAccount {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            password: password.to_string(),
            mfa_code: None,
            profile: UserProfile {
                sub: format!("sim-{username}"),
                username: username.to_string(),
                email: Some(format!("{username}@praxis.test")),
                display_name: None,
                roles: vec!["clinician".to_string()],
            },
        }
    }

    pub fn with_mfa(mut self, code: &str) -> Self {
        self.mfa_code = Some(code.to_string());
        self
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.profile.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }
}

#[derive(Debug, Default)]
struct SimState {
    accounts: HashMap<String, SimulatedAccount>,
    /// MFA session handle -> username.
    mfa_sessions: HashMap<String, String>,
    /// Refresh token -> username.
    refresh_tokens: HashMap<String, String>,
    /// Bearer tokens still tracked for revocation. Both sets drop a token
    /// once it has expired, since expiry alone rejects it from then on.
    issued: HashSet<String>,
    revoked: HashSet<String>,
    clients: BTreeMap<String, ClientRecord>,
    /// Client id -> document id -> document.
    documents: HashMap<String, BTreeMap<String, Document>>,
    /// Keyed by the caller's `sub`.
    settings: HashMap<String, Settings>,
    usage: Vec<UsageEvent>,
}

impl SimState {
    fn prune_expired(&mut self, now: i64) {
        let before = self.issued.len() + self.revoked.len();
        self.issued.retain(|token| unexpired(token, now));
        self.revoked.retain(|token| unexpired(token, now));

        let pruned = before - self.issued.len() - self.revoked.len();
        if pruned > 0 {
            debug!(pruned, "simulated expired tokens pruned");
        }
    }
}

fn unexpired(token: &str, now: i64) -> bool {
    jwt::decode_claims(token).is_ok_and(|claims| claims.exp > now)
}

#[derive(Debug)]
pub struct SimulatedBackend {
    options: SimulatedOptions,
    state: Mutex<SimState>,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(SimulatedOptions::default())
    }
}

impl SimulatedBackend {
    /// A simulator with one demo account (`demo` / `demo-password`, no MFA).
    pub fn new(options: SimulatedOptions) -> Self {
        let backend = Self {
            options,
            state: Mutex::new(SimState::default()),
        };
        backend.add_account(SimulatedAccount::new(DEMO_USERNAME, DEMO_PASSWORD));
        backend
    }

    pub fn with_account(self, account: SimulatedAccount) -> Self {
        self.add_account(account);
        self
    }

    pub fn add_account(&self, account: SimulatedAccount) {
        self.state()
            .accounts
            .insert(account.profile.username.clone(), account);
    }

    /// Reject every bearer token issued so far. The next privileged call
    /// gets a 401 even though the token has not expired.
    pub fn revoke_issued_tokens(&self) {
        let mut state = self.state();
        let issued: Vec<String> = state.issued.drain().collect();
        state.revoked.extend(issued);
    }

    /// Forget every refresh token, so the next refresh fails.
    pub fn revoke_refresh_tokens(&self) {
        self.state().refresh_tokens.clear();
    }

    pub fn usage_events(&self) -> Vec<UsageEvent> {
        self.state().usage.clone()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn pause(&self) {
        if !self.options.latency.is_zero() {
            tokio::time::sleep(self.options.latency).await;
        }
    }

    /// Answer one request synchronously.
    pub fn handle(&self, outbound: &OutboundRequest) -> ApiResponse {
        self.route(outbound).unwrap_or_else(|error| error)
    }

    fn route(&self, outbound: &OutboundRequest) -> Reply {
        let request = &outbound.request;
        let route = Route::parse(&request.path)
            .ok_or_else(|| ApiResponse::error(404, &format!("no route for {}", request.path)))?;

        match (request.method, &route) {
            (Method::Post, Route::Login) => return self.login(request),
            (Method::Post, Route::Mfa) => return self.verify_mfa(request),
            (Method::Post, Route::Refresh) => return self.refresh(request),
            (_, Route::Login | Route::Mfa | Route::Refresh) => return Err(method_not_allowed()),
            _ => {}
        }

        let caller = self.authenticate(outbound)?;

        match (request.method, route) {
            (Method::Post, Route::Logout) => self.logout(outbound, &caller),
            (Method::Get, Route::Settings) => self.get_settings(&caller),
            (Method::Patch, Route::Settings) => self.update_settings(request, &caller),
            (Method::Get, Route::Clients) => self.list_clients(),
            (Method::Post, Route::Clients) => self.create_client(request),
            (Method::Get, Route::Client(id)) => self.get_client(&id),
            (Method::Patch, Route::Client(id)) => self.update_client(request, &id),
            (Method::Get, Route::Documents(cid)) => self.list_documents(request, &cid),
            (Method::Post, Route::Documents(cid)) => self.create_document(request, &cid),
            (Method::Get, Route::Document(cid, id)) => self.get_document(&cid, &id),
            (Method::Patch, Route::Document(cid, id)) => self.update_document(request, &cid, &id),
            (Method::Delete, Route::Document(cid, id)) => self.delete_document(&cid, &id),
            (Method::Post, Route::Narratives) => self.generate(request),
            (Method::Post, Route::NarrativeStream) => {
                let frames = self.narrative_frames(request)?;
                Ok(ApiResponse::new(200, frames.concat()))
            }
            (Method::Post, Route::TelemetryUsage) => self.record_usage(request),
            _ => Err(method_not_allowed()),
        }
    }

    // ── Auth ─────────────────────────────────────────────────────────────────

    fn authenticate(&self, outbound: &OutboundRequest) -> Result<TokenClaims, ApiResponse> {
        let token = outbound
            .bearer_token()
            .ok_or_else(|| unauthorized("missing bearer token"))?;
        if self.state().revoked.contains(token) {
            return Err(unauthorized("token revoked"));
        }
        let claims = jwt::decode_claims(token).map_err(|_| unauthorized("invalid token"))?;
        if !jwt::is_usable(token, 0) {
            return Err(unauthorized("token expired"));
        }
        Ok(claims)
    }

    fn login(&self, request: &ApiRequest) -> Reply {
        let LoginRequest { username, password } = parse_body(request)?;
        let mut state = self.state();

        let account = state
            .accounts
            .get(&username)
            .filter(|account| account.password == password)
            .cloned()
            .ok_or_else(|| unauthorized("invalid username or password"))?;

        if account.mfa_code.is_some() {
            let session = Uuid::new_v4().to_string();
            state.mfa_sessions.insert(session.clone(), username.clone());
            info!(user = %username, "simulated MFA challenge issued");
            return Ok(ApiResponse::json(
                200,
                &LoginResponse {
                    requires_mfa: true,
                    session: Some(session),
                    ..Default::default()
                },
            ));
        }

        let response = self.sign_in(&mut state, &account)?;
        info!(user = %username, "simulated login succeeded");
        Ok(ApiResponse::json(200, &response))
    }

    fn verify_mfa(&self, request: &ApiRequest) -> Reply {
        let MfaRequest {
            username,
            session,
            code,
        } = parse_body(request)?;
        let mut state = self.state();

        if state.mfa_sessions.get(&session) != Some(&username) {
            return Err(unauthorized("invalid or expired MFA session"));
        }
        let account = state
            .accounts
            .get(&username)
            .cloned()
            .ok_or_else(|| unauthorized("invalid or expired MFA session"))?;
        if account.mfa_code.as_deref() != Some(code.as_str()) {
            return Err(unauthorized("invalid MFA code"));
        }

        state.mfa_sessions.remove(&session);
        let response = self.sign_in(&mut state, &account)?;
        info!(user = %username, "simulated MFA verified");
        Ok(ApiResponse::json(200, &response))
    }

    /// Issues new id and access tokens only. The refresh token stays valid
    /// and is omitted from the response.
    fn refresh(&self, request: &ApiRequest) -> Reply {
        let RefreshRequest { refresh_token } = parse_body(request)?;
        let mut state = self.state();

        let account = state
            .refresh_tokens
            .get(&refresh_token)
            .and_then(|username| state.accounts.get(username))
            .cloned()
            .ok_or_else(|| unauthorized("invalid refresh token"))?;

        let (id_token, access_token) = self.mint_bearer(&mut state, &account)?;
        debug!(user = %account.profile.username, "simulated refresh issued new tokens");
        Ok(ApiResponse::json(
            200,
            &TokenGrant {
                id_token: Some(id_token),
                access_token: Some(access_token),
                refresh_token: None,
            },
        ))
    }

    fn logout(&self, outbound: &OutboundRequest, caller: &TokenClaims) -> Reply {
        let mut state = self.state();
        if let Some(token) = outbound.bearer_token() {
            state.issued.remove(token);
            state.revoked.insert(token.to_string());
        }
        if let Some(username) = &caller.username {
            state.refresh_tokens.retain(|_, owner| owner != username);
        }
        Ok(ApiResponse::empty(204))
    }

    fn sign_in(
        &self,
        state: &mut SimState,
        account: &SimulatedAccount,
    ) -> Result<LoginResponse, ApiResponse> {
        let (id_token, access_token) = self.mint_bearer(state, account)?;
        let refresh_token = Uuid::new_v4().to_string();
        state
            .refresh_tokens
            .insert(refresh_token.clone(), account.profile.username.clone());

        Ok(LoginResponse {
            requires_mfa: false,
            session: None,
            tokens: TokenGrant {
                id_token: Some(id_token),
                access_token: Some(access_token),
                refresh_token: Some(refresh_token),
            },
            user: Some(account.profile.clone()),
        })
    }

    fn mint_bearer(
        &self,
        state: &mut SimState,
        account: &SimulatedAccount,
    ) -> Result<(String, String), ApiResponse> {
        let now = Timestamp::now().as_second();
        let ttl = i64::try_from(self.options.token_ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = |token_use: &str| TokenClaims {
            sub: account.profile.sub.clone(),
            exp: now.saturating_add(ttl),
            iat: Some(now),
            token_use: Some(token_use.to_string()),
            email: account.profile.email.clone(),
            username: Some(account.profile.username.clone()),
            jti: Some(Uuid::new_v4().to_string()),
        };

        let id_token = jwt::encode_unsigned(&claims("id")).map_err(internal)?;
        let access_token = jwt::encode_unsigned(&claims("access")).map_err(internal)?;
        state.prune_expired(now);
        state.issued.insert(id_token.clone());
        state.issued.insert(access_token.clone());
        Ok((id_token, access_token))
    }

    // ── Settings ─────────────────────────────────────────────────────────────

    fn get_settings(&self, caller: &TokenClaims) -> Reply {
        let settings = self
            .state()
            .settings
            .get(&caller.sub)
            .cloned()
            .unwrap_or_default();
        Ok(ApiResponse::json(200, &settings))
    }

    fn update_settings(&self, request: &ApiRequest, caller: &TokenClaims) -> Reply {
        let partial: Settings = parse_body(request)?;
        let mut state = self.state();
        let settings = state.settings.entry(caller.sub.clone()).or_default();
        settings.merge(&partial);
        Ok(ApiResponse::json(200, &*settings))
    }

    // ── Clients ──────────────────────────────────────────────────────────────

    fn list_clients(&self) -> Reply {
        let clients = self.state().clients.values().cloned().collect();
        Ok(ApiResponse::json(200, &ClientList::Envelope { clients }))
    }

    fn create_client(&self, request: &ApiRequest) -> Reply {
        let new: NewClient = parse_body(request)?;
        let name = new.name.trim();
        if name.is_empty() {
            return Err(ApiResponse::error(400, "client name is required"));
        }

        if let Some(id) = &new.id {
            paths::validate_id(id).map_err(bad_request)?;
        }

        let mut state = self.state();
        let id = new.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if state.clients.contains_key(&id) {
            return Err(conflict());
        }

        let now = Timestamp::now();
        let client = ClientRecord {
            id: id.clone(),
            name: name.to_string(),
            archived: false,
            created_at: now,
            updated_at: now,
        };
        state.clients.insert(id, client.clone());
        Ok(ApiResponse::json(201, &client))
    }

    fn get_client(&self, id: &str) -> Reply {
        let state = self.state();
        let client = state
            .clients
            .get(id)
            .ok_or_else(|| ApiResponse::error(404, "client not found"))?;
        Ok(ApiResponse::json(200, client))
    }

    fn update_client(&self, request: &ApiRequest, id: &str) -> Reply {
        let patch: ClientPatch = parse_body(request)?;
        let mut state = self.state();
        let client = state
            .clients
            .get_mut(id)
            .ok_or_else(|| ApiResponse::error(404, "client not found"))?;

        if let Some(name) = patch.name {
            client.name = name;
        }
        if let Some(archived) = patch.archived {
            client.archived = archived;
        }
        client.updated_at = Timestamp::now();
        Ok(ApiResponse::json(200, &*client))
    }

    // ── Documents ────────────────────────────────────────────────────────────

    fn list_documents(&self, request: &ApiRequest, client_id: &str) -> Reply {
        let filter = DocumentFilter::from_query(&request.query).map_err(bad_request)?;
        let mut documents: Vec<Document> = self
            .state()
            .documents
            .get(client_id)
            .map(|docs| docs.values().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default();
        documents.sort_by(Document::newest_first);
        Ok(ApiResponse::json(200, &DocumentList::Envelope { documents }))
    }

    fn create_document(&self, request: &ApiRequest, client_id: &str) -> Reply {
        let new: NewDocument = parse_body(request)?;
        let status = new
            .status
            .unwrap_or_else(|| new.document_type.default_status());
        new.document_type
            .validate_status(status)
            .map_err(bad_request)?;
        document::validate_content(&new.content).map_err(bad_request)?;
        if let Some(id) = &new.id {
            paths::validate_id(id).map_err(bad_request)?;
        }

        let mut state = self.state();
        let docs = state.documents.entry(client_id.to_string()).or_default();
        let id = new.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if docs.contains_key(&id) {
            return Err(conflict());
        }

        let now = Timestamp::now();
        let doc = Document {
            id: id.clone(),
            document_type: new.document_type,
            client_id: client_id.to_string(),
            date: new
                .date
                .unwrap_or_else(|| now.to_zoned(TimeZone::UTC).date()),
            status,
            content: new.content,
            created_at: now,
            updated_at: now,
        };
        docs.insert(id, doc.clone());
        debug!(client_id, document_id = %doc.id, document_type = %doc.document_type, "simulated document created");
        Ok(ApiResponse::json(201, &doc))
    }

    fn get_document(&self, client_id: &str, id: &str) -> Reply {
        let state = self.state();
        let doc = state
            .documents
            .get(client_id)
            .and_then(|docs| docs.get(id))
            .ok_or_else(document_not_found)?;
        Ok(ApiResponse::json(200, doc))
    }

    fn update_document(&self, request: &ApiRequest, client_id: &str, id: &str) -> Reply {
        let patch: DocumentPatch = parse_body(request)?;
        let mut state = self.state();
        let doc = state
            .documents
            .get_mut(client_id)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(document_not_found)?;

        doc.apply(&patch).map_err(bad_request)?;
        doc.updated_at = Timestamp::now();
        Ok(ApiResponse::json(200, &*doc))
    }

    fn delete_document(&self, client_id: &str, id: &str) -> Reply {
        let removed = self
            .state()
            .documents
            .get_mut(client_id)
            .and_then(|docs| docs.remove(id));
        match removed {
            Some(_) => Ok(ApiResponse::empty(204)),
            None => Err(document_not_found()),
        }
    }

    // ── Narratives ───────────────────────────────────────────────────────────

    fn generate(&self, request: &ApiRequest) -> Reply {
        let narrative_request: NarrativeRequest = parse_body(request)?;
        narrative_request.validate().map_err(bad_request)?;
        let narrative = synth::synthesize(&narrative_request);
        Ok(ApiResponse::json(
            200,
            &NarrativeResponse {
                text: narrative.text,
                stop_reason: narrative.stop_reason.as_str().to_string(),
                model_id: Some(self.model_id(&narrative_request)),
            },
        ))
    }

    /// The full event stream for a request: one frame per token, then the
    /// completion frame.
    fn narrative_frames(&self, request: &ApiRequest) -> Result<Vec<String>, ApiResponse> {
        let narrative_request: NarrativeRequest = parse_body(request)?;
        narrative_request.validate().map_err(bad_request)?;
        let narrative = synth::synthesize(&narrative_request);

        let mut events: Vec<NarrativeEvent> = narrative
            .tokens()
            .into_iter()
            .map(|token| NarrativeEvent::Chunk(token.to_string()))
            .collect();
        events.push(NarrativeEvent::Complete(narrative.stop_reason));

        events
            .iter()
            .map(encode_frame)
            .collect::<Result<Vec<_>, _>>()
            .map_err(internal)
    }

    fn model_id(&self, request: &NarrativeRequest) -> String {
        request
            .model_id
            .clone()
            .unwrap_or_else(|| self.options.model_id.clone())
    }

    // ── Telemetry ────────────────────────────────────────────────────────────

    fn record_usage(&self, request: &ApiRequest) -> Reply {
        let event: UsageEvent = parse_body(request)?;
        self.state().usage.push(event);
        Ok(ApiResponse::empty(202))
    }
}

#[async_trait]
impl Backend for SimulatedBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Simulated
    }

    async fn execute(&self, outbound: &OutboundRequest) -> Result<ApiResponse, ClientError> {
        self.pause().await;
        let response = self.handle(outbound);
        debug!(
            method = %outbound.request.method,
            path = %outbound.request.path,
            status = response.status,
            "simulated response"
        );
        Ok(response)
    }

    async fn open_stream(&self, outbound: &OutboundRequest) -> Result<StreamResponse, ClientError> {
        self.pause().await;

        let request = &outbound.request;
        let is_stream = request.method == Method::Post
            && Route::parse(&request.path) == Some(Route::NarrativeStream);
        if !is_stream {
            return Ok(StreamResponse::buffered(self.handle(outbound)));
        }

        let frames = match self
            .authenticate(outbound)
            .and_then(|_| self.narrative_frames(request))
        {
            Ok(frames) => frames,
            Err(error) => return Ok(StreamResponse::buffered(error)),
        };

        debug!(frames = frames.len(), "simulated narrative stream opened");
        let delay = self.options.token_delay;
        let chunks = futures::stream::iter(frames)
            .then(move |frame| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok::<_, ClientError>(Bytes::from(frame))
            })
            .boxed();

        Ok(StreamResponse {
            status: 200,
            chunks,
        })
    }
}

fn parse_body<T: DeserializeOwned>(request: &ApiRequest) -> Result<T, ApiResponse> {
    let value = request.body.clone().unwrap_or(serde_json::Value::Null);
    serde_json::from_value(value).map_err(|e| bad_request(format!("invalid request body: {e}")))
}

fn bad_request(e: impl Display) -> ApiResponse {
    ApiResponse::error(400, &e.to_string())
}

fn internal(e: impl Display) -> ApiResponse {
    ApiResponse::error(500, &e.to_string())
}

fn unauthorized(message: &str) -> ApiResponse {
    ApiResponse::error(401, message)
}

fn conflict() -> ApiResponse {
    ApiResponse::error(409, "identifier already in use")
}

fn document_not_found() -> ApiResponse {
    ApiResponse::error(404, "document not found")
}

fn method_not_allowed() -> ApiResponse {
    ApiResponse::error(405, "method not allowed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use praxis_core::models::document::DocumentType;
    use serde_json::json;

    fn backend() -> SimulatedBackend {
        SimulatedBackend::new(SimulatedOptions::instant())
    }

    fn signed_in(backend: &SimulatedBackend) -> String {
        let request = ApiRequest::post(paths::LOGIN)
            .anonymous()
            .json(&json!({ "username": DEMO_USERNAME, "password": DEMO_PASSWORD }))
            .unwrap();
        let response: LoginResponse = backend.handle(&OutboundRequest::new(request)).decode().unwrap();
        response.tokens.id_token.unwrap()
    }

    fn authed(request: ApiRequest, token: &str) -> OutboundRequest {
        OutboundRequest::new(request).with_header("Authorization", format!("Bearer {token}"))
    }

    #[test]
    fn privileged_routes_require_a_token() {
        let backend = backend();
        let response = backend.handle(&OutboundRequest::new(ApiRequest::get(paths::SETTINGS)));
        assert_eq!(response.status, 401);

        let token = signed_in(&backend);
        let response = backend.handle(&authed(ApiRequest::get(paths::SETTINGS), &token));
        assert_eq!(response.status, 200);
    }

    #[test]
    fn revoked_tokens_are_rejected() {
        let backend = backend();
        let token = signed_in(&backend);
        backend.revoke_issued_tokens();
        let response = backend.handle(&authed(ApiRequest::get(paths::CLIENTS), &token));
        assert_eq!(response.status, 401);
    }

    #[test]
    fn document_status_outside_type_set_is_rejected() {
        let backend = backend();
        let token = signed_in(&backend);
        let request = ApiRequest::post(paths::documents("c1"))
            .json(&json!({ "documentType": "progress_note", "status": "active" }))
            .unwrap();
        let response = backend.handle(&authed(request, &token));
        assert_eq!(response.status, 400);
    }

    #[test]
    fn created_document_gets_defaults() {
        let backend = backend();
        let token = signed_in(&backend);
        let request = ApiRequest::post(paths::documents("c1"))
            .json(&json!({ "documentType": "diagnosis", "content": { "code": "F41.1" } }))
            .unwrap();
        let response = backend.handle(&authed(request, &token));
        assert_eq!(response.status, 201);

        let doc: Document = response.decode().unwrap();
        assert_eq!(doc.document_type, DocumentType::Diagnosis);
        assert_eq!(doc.status, DocumentType::Diagnosis.default_status());
        assert_eq!(doc.date, Timestamp::now().to_zoned(TimeZone::UTC).date());
        assert_eq!(doc.client_id, "c1");
    }

    #[test]
    fn dot_segment_ids_are_rejected() {
        let backend = backend();
        let token = signed_in(&backend);
        for id in [".", ".."] {
            let request = ApiRequest::post(paths::documents("c1"))
                .json(&json!({ "documentType": "intake", "id": id }))
                .unwrap();
            assert_eq!(backend.handle(&authed(request, &token)).status, 400, "{id}");

            let request = ApiRequest::post(paths::CLIENTS)
                .json(&json!({ "name": "Dot", "id": id }))
                .unwrap();
            assert_eq!(backend.handle(&authed(request, &token)).status, 400, "{id}");
        }
    }

    #[test]
    fn encoded_ids_address_the_decoded_record() {
        let backend = backend();
        let token = signed_in(&backend);
        let request = ApiRequest::post(paths::documents("c/1"))
            .json(&json!({ "documentType": "intake", "id": "note?v=2" }))
            .unwrap();
        assert_eq!(backend.handle(&authed(request, &token)).status, 201);

        let response = backend.handle(&authed(ApiRequest::get(paths::document("c/1", "note?v=2")), &token));
        let doc: Document = response.decode().unwrap();
        assert_eq!(doc.id, "note?v=2");
        assert_eq!(doc.client_id, "c/1");
    }

    #[test]
    fn live_tokens_are_kept_across_mints() {
        let backend = backend();
        signed_in(&backend);
        signed_in(&backend);
        assert_eq!(backend.state().issued.len(), 4);
    }

    #[test]
    fn expired_tokens_are_pruned_on_each_mint() {
        let backend = SimulatedBackend::new(SimulatedOptions {
            token_ttl: Duration::ZERO,
            ..SimulatedOptions::instant()
        });
        signed_in(&backend);
        backend.revoke_issued_tokens();
        assert_eq!(backend.state().revoked.len(), 2);

        signed_in(&backend);
        signed_in(&backend);

        let state = backend.state();
        assert!(state.revoked.is_empty());
        assert_eq!(state.issued.len(), 2);
    }

    #[test]
    fn unknown_routes_and_methods() {
        let backend = backend();
        let token = signed_in(&backend);
        assert_eq!(
            backend.handle(&authed(ApiRequest::get("/nowhere"), &token)).status,
            404
        );
        assert_eq!(
            backend.handle(&authed(ApiRequest::delete(paths::SETTINGS), &token)).status,
            405
        );
    }
}
