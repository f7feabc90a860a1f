use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::mode::BackendMode;

/// Bump when adding fields or changing shape, with a matching step in
/// [`migrate`].
const CURRENT_VERSION: u32 = 1;

const CONFIG_DIR: &str = "com.praxis.client";
const CONFIG_FILE: &str = "config.json";

pub const ENV_API_URL: &str = "PRAXIS_API_URL";
pub const ENV_MODE: &str = "PRAXIS_MODE";
pub const ENV_ROLE_OVERRIDE: &str = "PRAXIS_ROLE_OVERRIDE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Schema version. Missing or 0 = pre-versioned config.
    #[serde(default)]
    pub config_version: u32,
    pub api_base_url: String,
    #[serde(default)]
    pub mode: BackendMode,
    /// Sent as `X-Role-Override` on networked calls. Test deployments only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_override: Option<String>,
    #[serde(default = "default_prefetch_timeout_ms")]
    pub prefetch_timeout_ms: u64,
    #[serde(default = "default_simulated_latency_ms")]
    pub simulated_latency_ms: u64,
    #[serde(default = "default_stream_token_delay_ms")]
    pub stream_token_delay_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_prefetch_timeout_ms() -> u64 {
    2_000
}

fn default_simulated_latency_ms() -> u64 {
    150
}

fn default_stream_token_delay_ms() -> u64 {
    30
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            config_version: CURRENT_VERSION,
            api_base_url: "http://localhost:8080".to_string(),
            mode: BackendMode::Simulated,
            role_override: None,
            prefetch_timeout_ms: default_prefetch_timeout_ms(),
            simulated_latency_ms: default_simulated_latency_ms(),
            stream_token_delay_ms: default_stream_token_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl ClientConfig {
    pub fn prefetch_timeout(&self) -> Duration {
        Duration::from_millis(self.prefetch_timeout_ms)
    }

    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }

    pub fn stream_token_delay(&self) -> Duration {
        Duration::from_millis(self.stream_token_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Apply `PRAXIS_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ClientError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ClientError> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = lookup(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(mode) = lookup(ENV_MODE) {
            self.mode = mode.parse()?;
        }
        if let Some(role) = lookup(ENV_ROLE_OVERRIDE) {
            self.role_override = Some(role);
        }
        Ok(self)
    }
}

pub fn config_dir() -> Result<PathBuf, ClientError> {
    let base = dirs::config_dir()
        .ok_or_else(|| ClientError::Config("no config directory found".to_string()))?;
    Ok(base.join(CONFIG_DIR))
}

pub fn config_path() -> Result<PathBuf, ClientError> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Load the config from its default location, or defaults if none exists.
pub fn load_or_default() -> Result<ClientConfig, ClientError> {
    let path = config_path()?;
    if path.exists() {
        load_from(&path)
    } else {
        Ok(ClientConfig::default())
    }
}

pub fn load_from(path: &Path) -> Result<ClientConfig, ClientError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        ClientError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;

    // Parse as raw JSON so migrations run before deserializing.
    let json: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| ClientError::Config(format!("config is not valid JSON: {e}")))?;
    let on_disk_version = json
        .get("config_version")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;

    let migrated = migrate(json, on_disk_version)?;
    serde_json::from_value(migrated)
        .map_err(|e| ClientError::Config(format!("invalid config: {e}")))
}

/// Run sequential migrations from `from_version` up to [`CURRENT_VERSION`].
fn migrate(mut json: serde_json::Value, from_version: u32) -> Result<serde_json::Value, ClientError> {
    if from_version > CURRENT_VERSION {
        return Err(ClientError::Config(format!(
            "config_version {from_version} is newer than this build supports ({CURRENT_VERSION})"
        )));
    }

    // v0 → v1: boolean `use_mock` becomes `mode`
    if from_version < 1 {
        let obj = json
            .as_object_mut()
            .ok_or_else(|| ClientError::Config("config is not a JSON object".to_string()))?;
        let use_mock = obj
            .remove("use_mock")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let mode = if use_mock {
            BackendMode::Simulated
        } else {
            BackendMode::Networked
        };
        obj.entry("mode")
            .or_insert(serde_json::Value::String(mode.as_str().to_string()));
        obj.insert(
            "config_version".to_string(),
            serde_json::Value::Number(1.into()),
        );
        tracing::info!(mode = %mode, "migrated config v0 → v1 (use_mock replaced by mode)");
    }

    Ok(json)
}

pub fn save(config: &ClientConfig) -> Result<PathBuf, ClientError> {
    let path = config_path()?;
    save_to(config, &path)?;
    Ok(path)
}

pub fn save_to(config: &ClientConfig, path: &Path) -> Result<(), ClientError> {
    let io = |e: std::io::Error| ClientError::Config(format!("failed to write {}: {e}", path.display()));

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(io)?;
    }

    // Always write the current version, regardless of what was loaded.
    let mut stamped = config.clone();
    stamped.config_version = CURRENT_VERSION;
    let json = serde_json::to_string_pretty(&stamped)
        .map_err(|e| ClientError::Config(format!("failed to encode config: {e}")))?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json.as_bytes()).map_err(io)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600)).map_err(io)?;
    }

    std::fs::rename(&tmp_path, path).map_err(io)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
