use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use praxis_auth::error::AuthError;
use praxis_auth::jwt::{TokenClaims, encode_unsigned};
use praxis_auth::lifecycle::{SessionStatus, TokenLifecycle, TokenRefresher};
use praxis_auth::store::{CredentialSlot, CredentialStore, MemoryCredentialStore};
use praxis_core::models::auth::TokenGrant;

fn token(sub: &str, ttl_secs: i64) -> String {
    encode_unsigned(&TokenClaims {
        sub: sub.to_string(),
        exp: jiff::Timestamp::now().as_second() + ttl_secs,
        iat: None,
        token_use: Some("id".to_string()),
        email: None,
        username: None,
        jti: None,
    })
    .unwrap()
}

struct FakeRefresher {
    calls: AtomicUsize,
    delay: Duration,
    outcome: Box<dyn Fn() -> Result<TokenGrant, AuthError> + Send + Sync>,
}

impl FakeRefresher {
    fn ok(grant: TokenGrant) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            outcome: Box::new(move || Ok(grant.clone())),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            outcome: Box::new(|| Err(AuthError::Refresh("status 401".to_string()))),
        })
    }

    fn slow(grant: TokenGrant, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            outcome: Box::new(move || Ok(grant.clone())),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for FakeRefresher {
    async fn exchange(&self, _refresh_token: &str) -> Result<TokenGrant, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.outcome)()
    }
}

fn store_with(slots: &[(CredentialSlot, &str)]) -> Arc<MemoryCredentialStore> {
    let store = Arc::new(MemoryCredentialStore::new());
    for (slot, value) in slots {
        store.set(*slot, value);
    }
    store
}

#[tokio::test]
async fn refresh_without_refresh_token_makes_no_call() {
    let refresher = FakeRefresher::ok(TokenGrant::default());
    let store = store_with(&[(CredentialSlot::IdToken, "expired")]);
    let lifecycle = TokenLifecycle::new(store);

    assert!(!lifecycle.refresh(&*refresher).await);
    assert_eq!(refresher.calls(), 0);
}

#[tokio::test]
async fn refresh_persists_only_returned_fields() {
    let new_id = token("u", 3600);
    let refresher = FakeRefresher::ok(TokenGrant {
        id_token: Some(new_id.clone()),
        access_token: None,
        refresh_token: None,
    });
    let store = store_with(&[
        (CredentialSlot::IdToken, "old-id"),
        (CredentialSlot::AccessToken, "old-access"),
        (CredentialSlot::RefreshToken, "refresh-1"),
    ]);
    let lifecycle = TokenLifecycle::new(store.clone());

    assert!(lifecycle.refresh(&*refresher).await);
    assert_eq!(refresher.calls(), 1);
    assert_eq!(store.get(CredentialSlot::IdToken), Some(new_id));
    assert_eq!(store.get(CredentialSlot::AccessToken).as_deref(), Some("old-access"));
    assert_eq!(store.get(CredentialSlot::RefreshToken).as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn refresh_rotates_refresh_token_when_returned() {
    let refresher = FakeRefresher::ok(TokenGrant {
        id_token: Some(token("u", 3600)),
        access_token: Some("access-2".to_string()),
        refresh_token: Some("refresh-2".to_string()),
    });
    let store = store_with(&[(CredentialSlot::RefreshToken, "refresh-1")]);
    let lifecycle = TokenLifecycle::new(store.clone());

    assert!(lifecycle.refresh(&*refresher).await);
    assert_eq!(store.get(CredentialSlot::AccessToken).as_deref(), Some("access-2"));
    assert_eq!(store.get(CredentialSlot::RefreshToken).as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn failed_refresh_leaves_state_untouched() {
    let refresher = FakeRefresher::failing();
    let store = store_with(&[
        (CredentialSlot::IdToken, "old-id"),
        (CredentialSlot::RefreshToken, "refresh-1"),
    ]);
    let before = store.snapshot();
    let lifecycle = TokenLifecycle::new(store.clone());

    assert!(!lifecycle.refresh(&*refresher).await);
    assert_eq!(refresher.calls(), 1);
    assert_eq!(store.snapshot(), before);
    assert_eq!(lifecycle.status(), SessionStatus::Active);
}

#[tokio::test]
async fn usable_token_is_returned_without_refresh() {
    let fresh = token("u", 3600);
    let refresher = FakeRefresher::failing();
    let store = store_with(&[(CredentialSlot::IdToken, &fresh)]);
    let lifecycle = TokenLifecycle::new(store);

    assert_eq!(lifecycle.usable_id_token(&*refresher).await, Some(fresh));
    assert_eq!(refresher.calls(), 0);
}

#[tokio::test]
async fn near_expiry_token_triggers_refresh() {
    let stale = token("u", 120);
    let fresh = token("u", 3600);
    let refresher = FakeRefresher::ok(TokenGrant {
        id_token: Some(fresh.clone()),
        ..Default::default()
    });
    let store = store_with(&[
        (CredentialSlot::IdToken, &stale),
        (CredentialSlot::RefreshToken, "refresh-1"),
    ]);
    let lifecycle = TokenLifecycle::new(store);

    assert_eq!(lifecycle.usable_id_token(&*refresher).await, Some(fresh));
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test]
async fn end_session_clears_everything_and_signals() {
    let store = store_with(&[
        (CredentialSlot::IdToken, "id"),
        (CredentialSlot::AccessToken, "access"),
        (CredentialSlot::RefreshToken, "refresh"),
        (CredentialSlot::Profile, "{}"),
    ]);
    let lifecycle = TokenLifecycle::new(store.clone());
    let mut status = lifecycle.subscribe();
    assert_eq!(*status.borrow(), SessionStatus::Active);

    lifecycle.end_session();

    status.changed().await.unwrap();
    assert_eq!(*status.borrow(), SessionStatus::Expired);
    for slot in CredentialSlot::ALL {
        assert!(store.get(slot).is_none(), "{slot:?} should be cleared");
    }
}

#[tokio::test]
async fn logout_is_distinguished_from_expiry() {
    let store = store_with(&[(CredentialSlot::IdToken, "id")]);
    let lifecycle = TokenLifecycle::new(store.clone());

    lifecycle.logout();

    assert_eq!(lifecycle.status(), SessionStatus::LoggedOut);
    assert!(store.get(CredentialSlot::IdToken).is_none());
}

#[tokio::test]
async fn concurrent_refreshes_are_serialized_into_one_exchange() {
    let refresher = FakeRefresher::slow(
        TokenGrant {
            id_token: Some(token("u", 3600)),
            ..Default::default()
        },
        Duration::from_millis(50),
    );
    let store = store_with(&[
        (CredentialSlot::IdToken, "expired"),
        (CredentialSlot::RefreshToken, "refresh-1"),
    ]);
    let lifecycle = Arc::new(TokenLifecycle::new(store));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let lifecycle = lifecycle.clone();
            let refresher = refresher.clone();
            tokio::spawn(async move { lifecycle.refresh(&*refresher).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap());
    }
    assert_eq!(refresher.calls(), 1);
}
