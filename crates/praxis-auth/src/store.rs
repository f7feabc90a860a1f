//! Persisted credential slots.
//!
//! The store is a thin accessor: get, set, remove, clear. Deciding *when*
//! to mutate it is the lifecycle manager's job.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use praxis_core::models::auth::{CredentialSet, UserProfile};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialSlot {
    #[serde(rename = "idToken")]
    IdToken,
    #[serde(rename = "accessToken")]
    AccessToken,
    #[serde(rename = "refreshToken")]
    RefreshToken,
    #[serde(rename = "user")]
    Profile,
}

impl CredentialSlot {
    pub const ALL: [CredentialSlot; 4] = [
        CredentialSlot::IdToken,
        CredentialSlot::AccessToken,
        CredentialSlot::RefreshToken,
        CredentialSlot::Profile,
    ];
}

pub trait CredentialStore: Send + Sync {
    fn get(&self, slot: CredentialSlot) -> Option<String>;
    fn set(&self, slot: CredentialSlot, value: &str);
    fn remove(&self, slot: CredentialSlot);
    fn clear(&self);

    fn profile(&self) -> Option<UserProfile> {
        let raw = self.get(CredentialSlot::Profile)?;
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "discarding unreadable cached profile");
                None
            }
        }
    }

    fn set_profile(&self, profile: &UserProfile) {
        match serde_json::to_string(profile) {
            Ok(raw) => self.set(CredentialSlot::Profile, &raw),
            Err(e) => warn!(error = %e, "failed to serialize profile"),
        }
    }

    fn snapshot(&self) -> CredentialSet {
        CredentialSet {
            id_token: self.get(CredentialSlot::IdToken),
            access_token: self.get(CredentialSlot::AccessToken),
            refresh_token: self.get(CredentialSlot::RefreshToken),
            profile: self.profile(),
        }
    }
}

// ── In-memory ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slots: RwLock<HashMap<CredentialSlot, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<CredentialSlot, String>> {
        self.slots.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<CredentialSlot, String>> {
        self.slots.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn to_map(&self) -> HashMap<CredentialSlot, String> {
        self.read().clone()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, slot: CredentialSlot) -> Option<String> {
        self.read().get(&slot).cloned()
    }

    fn set(&self, slot: CredentialSlot, value: &str) {
        self.write().insert(slot, value.to_string());
    }

    fn remove(&self, slot: CredentialSlot) {
        self.write().remove(&slot);
    }

    fn clear(&self) {
        self.write().clear();
    }
}

// ── File-backed ──────────────────────────────────────────────────────────────

/// A JSON file of named slots, written through on every mutation.
///
/// Write failures are logged and the in-memory value is kept, so a read-only
/// disk degrades to a session that does not survive restart.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    memory: MemoryCredentialStore,
}

impl FileCredentialStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let path = path.into();
        let memory = MemoryCredentialStore::new();

        if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                AuthError::Storage(format!("failed to read {}: {e}", path.display()))
            })?;
            let slots: HashMap<CredentialSlot, String> = serde_json::from_str(&contents)?;
            for (slot, value) in slots {
                memory.set(slot, &value);
            }
            debug!(path = %path.display(), "loaded credential slots");
        }

        Ok(Self { path, memory })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) {
        if let Err(e) = write_atomically(&self.path, &self.memory.to_map()) {
            warn!(path = %self.path.display(), error = %e, "failed to persist credentials");
        }
    }
}

fn write_atomically(path: &Path, slots: &HashMap<CredentialSlot, String>) -> Result<(), AuthError> {
    let io = |e: std::io::Error| AuthError::Storage(e.to_string());

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(io)?;
    }

    let json = serde_json::to_string_pretty(slots)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json.as_bytes()).map_err(io)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600)).map_err(io)?;
    }

    std::fs::rename(&tmp_path, path).map_err(io)
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, slot: CredentialSlot) -> Option<String> {
        self.memory.get(slot)
    }

    fn set(&self, slot: CredentialSlot, value: &str) {
        self.memory.set(slot, value);
        self.persist();
    }

    fn remove(&self, slot: CredentialSlot) {
        self.memory.remove(slot);
        self.persist();
    }

    fn clear(&self) {
        self.memory.clear();
        if self.path.exists()
            && let Err(e) = std::fs::remove_file(&self.path)
        {
            warn!(path = %self.path.display(), error = %e, "failed to delete credentials file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile {
            sub: "u-1".to_string(),
            username: "dana".to_string(),
            email: Some("dana@example.test".to_string()),
            display_name: None,
            roles: vec!["clinician".to_string()],
        }
    }

    #[test]
    fn memory_store_get_set_clear() {
        let store = MemoryCredentialStore::new();
        assert!(store.get(CredentialSlot::IdToken).is_none());

        store.set(CredentialSlot::IdToken, "id");
        store.set(CredentialSlot::RefreshToken, "refresh");
        store.set_profile(&profile());

        let snapshot = store.snapshot();
        assert!(snapshot.is_logged_in());
        assert_eq!(snapshot.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(snapshot.profile, Some(profile()));

        store.remove(CredentialSlot::RefreshToken);
        assert!(store.get(CredentialSlot::RefreshToken).is_none());

        store.clear();
        assert_eq!(store.snapshot(), CredentialSet::default());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session").join("credentials.json");

        {
            let store = FileCredentialStore::open(&path).unwrap();
            store.set(CredentialSlot::IdToken, "id-1");
            store.set(CredentialSlot::AccessToken, "access-1");
            store.set_profile(&profile());
        }

        let reopened = FileCredentialStore::open(&path).unwrap();
        assert_eq!(reopened.get(CredentialSlot::IdToken).as_deref(), Some("id-1"));
        assert_eq!(reopened.get(CredentialSlot::AccessToken).as_deref(), Some("access-1"));
        assert_eq!(reopened.profile(), Some(profile()));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"idToken\""));
        assert!(raw.contains("\"user\""));
    }

    #[test]
    fn file_store_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = FileCredentialStore::open(&path).unwrap();
        store.set(CredentialSlot::IdToken, "id-1");
        assert!(path.exists());

        store.clear();
        assert!(!path.exists());
        assert!(FileCredentialStore::open(&path).unwrap().get(CredentialSlot::IdToken).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = FileCredentialStore::open(&path).unwrap();
        store.set(CredentialSlot::IdToken, "id-1");

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
