//! Token lifecycle: decides whether the stored token is usable, refreshes
//! it, and ends the session when no usable token can be obtained.
//!
//! Retry policy is not decided here. The request pipeline chooses *when*
//! to call [`TokenLifecycle::refresh`] and *where* the exchange goes, by
//! passing the [`TokenRefresher`]; this module performs at most one
//! exchange per call.
//!
//! Refresh attempts are serialized: concurrent callers queue on a mutex,
//! and a caller that finds the id token already replaced by the one ahead
//! of it returns without a second exchange.

use std::sync::Arc;

use async_trait::async_trait;
use praxis_core::models::auth::{TokenGrant, UserProfile};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::jwt;
use crate::store::{CredentialSlot, CredentialStore};

/// Exchanges a refresh credential for new tokens.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant, AuthError>;
}

/// Observable session state. Front ends redirect to the sign-in entry point
/// on anything other than `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    LoggedOut,
    Expired,
}

pub struct TokenLifecycle {
    store: Arc<dyn CredentialStore>,
    refresh_lock: Mutex<()>,
    buffer_seconds: i64,
    status: watch::Sender<SessionStatus>,
}

impl TokenLifecycle {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let initial = if store.get(CredentialSlot::IdToken).is_some() {
            SessionStatus::Active
        } else {
            SessionStatus::LoggedOut
        };
        let (status, _) = watch::channel(initial);
        Self {
            store,
            refresh_lock: Mutex::new(()),
            buffer_seconds: jwt::DEFAULT_REFRESH_BUFFER_SECS,
            status,
        }
    }

    pub fn with_buffer_seconds(mut self, buffer_seconds: i64) -> Self {
        self.buffer_seconds = buffer_seconds;
        self
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn is_usable(&self, token: &str) -> bool {
        jwt::is_usable(token, self.buffer_seconds)
    }

    pub fn id_token(&self) -> Option<String> {
        self.store.get(CredentialSlot::IdToken)
    }

    /// The stored id token if usable; otherwise the token obtained by one
    /// refresh through `refresher`. `None` means the caller must end the
    /// session.
    pub async fn usable_id_token(&self, refresher: &dyn TokenRefresher) -> Option<String> {
        if let Some(token) = self.id_token()
            && self.is_usable(&token)
        {
            return Some(token);
        }

        debug!("id token missing or near expiry, refreshing proactively");
        if self.refresh(refresher).await {
            self.id_token()
        } else {
            None
        }
    }

    /// Exchange the refresh credential for new tokens through `refresher`.
    ///
    /// Returns `false` without any exchange if no refresh credential is
    /// stored. On failure nothing is written. On success only the fields
    /// present in the response are persisted.
    pub async fn refresh(&self, refresher: &dyn TokenRefresher) -> bool {
        if self.store.get(CredentialSlot::RefreshToken).is_none() {
            debug!("no refresh token stored, refresh impossible");
            return false;
        }

        let observed = self.id_token();
        let _guard = self.refresh_lock.lock().await;

        let current = self.id_token();
        if current != observed
            && let Some(token) = &current
            && self.is_usable(token)
        {
            debug!("id token already refreshed by a concurrent caller");
            return true;
        }

        // Re-read: a logout or session end may have landed while we waited.
        let Some(refresh_token) = self.store.get(CredentialSlot::RefreshToken) else {
            debug!("refresh token cleared while waiting, refresh impossible");
            return false;
        };

        match refresher.exchange(&refresh_token).await {
            Ok(grant) => {
                self.apply_grant(&grant);
                self.status.send_replace(SessionStatus::Active);
                info!(
                    id_token = grant.id_token.is_some(),
                    access_token = grant.access_token.is_some(),
                    refresh_token = grant.refresh_token.is_some(),
                    "tokens refreshed"
                );
                true
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                false
            }
        }
    }

    /// Persist a fresh login. Called by the sign-in flows.
    pub fn establish(&self, grant: &TokenGrant, profile: Option<&UserProfile>) {
        self.apply_grant(grant);
        if let Some(profile) = profile {
            self.store.set_profile(profile);
        }
        self.status.send_replace(SessionStatus::Active);
        info!(user = profile.map(|p| p.username.as_str()), "session established");
    }

    /// Clear every credential slot and signal that the session expired.
    pub fn end_session(&self) {
        self.store.clear();
        self.status.send_replace(SessionStatus::Expired);
        info!("session ended, credentials cleared");
    }

    /// Clear every credential slot after a user-initiated sign-out.
    pub fn logout(&self) {
        self.store.clear();
        self.status.send_replace(SessionStatus::LoggedOut);
        info!("signed out, credentials cleared");
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    fn apply_grant(&self, grant: &TokenGrant) {
        if let Some(token) = &grant.id_token {
            self.store.set(CredentialSlot::IdToken, token);
        }
        if let Some(token) = &grant.access_token {
            self.store.set(CredentialSlot::AccessToken, token);
        }
        if let Some(token) = &grant.refresh_token {
            self.store.set(CredentialSlot::RefreshToken, token);
        }
    }
}
