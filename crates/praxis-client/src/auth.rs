//! Sign-in flows and the refresh exchange.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use praxis_auth::error::AuthError;
use praxis_auth::flows::{self, AuthResult};
use praxis_auth::lifecycle::{SessionStatus, TokenRefresher};
use praxis_core::models::auth::{
    LoginRequest, LoginResponse, MfaRequest, RefreshRequest, TokenGrant, UserProfile,
};
use praxis_core::paths;
use praxis_core::request::ApiRequest;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::backend::{Backend, CONTENT_TYPE, JSON, OutboundRequest};
use crate::error::ClientError;
use crate::pipeline::RequestPipeline;
use crate::settings::SettingsApi;

#[derive(Clone)]
pub struct AuthApi {
    pipeline: Arc<RequestPipeline>,
    settings: SettingsApi,
    prefetch_timeout: Duration,
}

impl AuthApi {
    pub fn new(pipeline: Arc<RequestPipeline>, settings: SettingsApi, prefetch_timeout: Duration) -> Self {
        Self {
            pipeline,
            settings,
            prefetch_timeout,
        }
    }

    /// Sign in with a password. Accounts with MFA answer with a challenge
    /// to be completed by [`verify_mfa`](Self::verify_mfa).
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResult, ClientError> {
        let request = ApiRequest::post(paths::LOGIN).anonymous().json(&LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })?;
        let response: LoginResponse = self.pipeline.send(request).await?.decode()?;
        self.complete(response).await
    }

    /// Submit the six-digit code for an MFA challenge.
    pub async fn verify_mfa(
        &self,
        username: &str,
        session: &str,
        code: &str,
    ) -> Result<AuthResult, ClientError> {
        flows::validate_mfa_code(code).map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

        let request = ApiRequest::post(paths::MFA).anonymous().json(&MfaRequest {
            username: username.to_string(),
            session: session.to_string(),
            code: code.to_string(),
        })?;
        let response: LoginResponse = self.pipeline.send(request).await?.decode()?;
        if response.requires_mfa {
            return Err(ClientError::Decode("MFA response asked for another challenge".to_string()));
        }
        self.complete(response).await
    }

    /// Tell the server (best effort) and clear local credentials.
    pub async fn logout(&self) {
        let lifecycle = self.pipeline.lifecycle();
        if let Some(token) = lifecycle.id_token()
            && lifecycle.is_usable(&token)
        {
            let request = ApiRequest::post(paths::LOGOUT).expect_empty();
            match self.pipeline.send(request).await.and_then(|r| r.into_unit()) {
                Ok(()) => {}
                Err(e) => warn!(error = %e, "server logout failed, clearing local session anyway"),
            }
        }
        self.settings.clear();
        lifecycle.logout();
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.pipeline.lifecycle().store().profile()
    }

    pub fn is_logged_in(&self) -> bool {
        self.pipeline.lifecycle().id_token().is_some()
    }

    pub fn status(&self) -> SessionStatus {
        self.pipeline.lifecycle().status()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.pipeline.lifecycle().subscribe()
    }

    async fn complete(&self, response: LoginResponse) -> Result<AuthResult, ClientError> {
        if response.requires_mfa {
            let session = response
                .session
                .ok_or_else(|| ClientError::Decode("MFA challenge without a session".to_string()))?;
            info!("MFA required");
            return Ok(AuthResult::MfaChallenge { session });
        }

        if response.tokens.id_token.is_none() {
            return Err(ClientError::Decode("sign-in response carried no id token".to_string()));
        }

        self.pipeline
            .lifecycle()
            .establish(&response.tokens, response.user.as_ref());
        self.settings.prefetch(self.prefetch_timeout).await;

        Ok(AuthResult::Success {
            profile: response.user,
        })
    }
}

/// Performs the refresh exchange against one backend: the one the request
/// being authorized is sent to. Goes straight to the backend: refresh must
/// not recurse into the pipeline's own refresh protocol.
pub struct BackendRefresher {
    backend: Arc<dyn Backend>,
}

impl BackendRefresher {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl TokenRefresher for BackendRefresher {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let request = ApiRequest::post(paths::REFRESH)
            .anonymous()
            .json(&RefreshRequest {
                refresh_token: refresh_token.to_string(),
            })
            .map_err(|e| AuthError::Refresh(e.to_string()))?;
        let outbound = OutboundRequest::new(request).with_header(CONTENT_TYPE, JSON);

        let response = self
            .backend
            .execute(&outbound)
            .await
            .map_err(|e| AuthError::Refresh(e.to_string()))?;

        if !response.is_success() {
            return Err(AuthError::Refresh(format!(
                "status {}: {}",
                response.status,
                response.error_message()
            )));
        }
        serde_json::from_slice(&response.body).map_err(|e| AuthError::Refresh(e.to_string()))
    }
}
