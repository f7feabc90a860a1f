use std::sync::{Arc, RwLock};
use std::time::Duration;

use praxis_core::models::settings::Settings;
use praxis_core::paths;
use praxis_core::request::ApiRequest;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::pipeline::RequestPipeline;

/// User settings, with the last fetched value kept in memory.
#[derive(Clone)]
pub struct SettingsApi {
    pipeline: Arc<RequestPipeline>,
    cached: Arc<RwLock<Option<Settings>>>,
}

impl SettingsApi {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self {
            pipeline,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn get(&self) -> Result<Settings, ClientError> {
        let settings: Settings = self
            .pipeline
            .send(ApiRequest::get(paths::SETTINGS))
            .await?
            .decode()?;
        self.remember(&settings);
        Ok(settings)
    }

    /// Merge `partial` into the stored settings and return the result.
    pub async fn update(&self, partial: &Settings) -> Result<Settings, ClientError> {
        let request = ApiRequest::patch(paths::SETTINGS).json(partial)?;
        let settings: Settings = self.pipeline.send(request).await?.decode()?;
        self.remember(&settings);
        Ok(settings)
    }

    /// The last settings seen by `get`, `update` or a prefetch.
    pub fn cached(&self) -> Option<Settings> {
        self.cached
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        *self
            .cached
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    /// Fetch settings in a detached task and wait at most `timeout` for it.
    /// The task keeps running past the deadline and fills the cache when it
    /// lands; failures are only logged.
    pub async fn prefetch(&self, timeout: Duration) {
        let api = self.clone();
        let task = tokio::spawn(async move {
            match api.get().await {
                Ok(_) => debug!("settings prefetched"),
                Err(e) => warn!(error = %e, "settings prefetch failed"),
            }
        });

        if tokio::time::timeout(timeout, task).await.is_err() {
            debug!(timeout_ms = timeout.as_millis() as u64, "settings prefetch still running, continuing");
        }
    }

    fn remember(&self, settings: &Settings) {
        *self
            .cached
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(settings.clone());
    }
}
