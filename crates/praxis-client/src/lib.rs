//! praxis-client
//!
//! The Praxis data-access layer. One [`PraxisClient`] owns the credential
//! store, the token lifecycle and both backends; every operation goes
//! through the same [`RequestPipeline`] whichever backend is active.

pub mod auth;
pub mod backend;
pub mod clients;
pub mod config;
pub mod documents;
pub mod error;
pub mod mode;
pub mod narrative;
pub mod pipeline;
pub mod settings;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use praxis_auth::jwt::DEFAULT_REFRESH_BUFFER_SECS;
use praxis_auth::lifecycle::TokenLifecycle;
use praxis_auth::store::CredentialStore;
use tracing::info;

pub use crate::auth::AuthApi;
pub use crate::backend::{Backend, BackendSelector, NetworkedBackend, SimulatedBackend};
pub use crate::clients::ClientsApi;
pub use crate::config::ClientConfig;
pub use crate::documents::DocumentAccessor;
pub use crate::error::ClientError;
pub use crate::mode::{BackendMode, ModeSwitch};
pub use crate::narrative::{CancelHandle, NarrativeApi, NarrativeHandler, NarrativeStream};
pub use crate::pipeline::RequestPipeline;
pub use crate::settings::SettingsApi;
pub use crate::telemetry::TelemetryApi;

use crate::backend::SimulatedOptions;

/// Tunables that do not come from the backends themselves.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub role_override: Option<String>,
    pub prefetch_timeout: Duration,
    pub refresh_buffer_secs: i64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            role_override: None,
            prefetch_timeout: Duration::from_secs(2),
            refresh_buffer_secs: DEFAULT_REFRESH_BUFFER_SECS,
        }
    }
}

#[derive(Clone)]
pub struct PraxisClient {
    backends: BackendSelector,
    pipeline: Arc<RequestPipeline>,
    auth: AuthApi,
    settings: SettingsApi,
}

impl PraxisClient {
    /// Build both backends from `config` and start in its mode.
    pub fn from_config(
        config: &ClientConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, ClientError> {
        let simulated = SimulatedBackend::new(SimulatedOptions {
            latency: config.simulated_latency(),
            token_delay: config.stream_token_delay(),
            ..SimulatedOptions::default()
        });
        let networked = NetworkedBackend::new(&config.api_base_url, config.connect_timeout())?;

        info!(mode = %config.mode, api = %config.api_base_url, "data-access layer configured");
        Ok(Self::with_backends(
            Arc::new(simulated),
            Arc::new(networked),
            ModeSwitch::new(config.mode),
            store,
            ClientOptions {
                role_override: config.role_override.clone(),
                prefetch_timeout: config.prefetch_timeout(),
                ..ClientOptions::default()
            },
        ))
    }

    pub fn with_backends(
        simulated: Arc<dyn Backend>,
        networked: Arc<dyn Backend>,
        mode: ModeSwitch,
        store: Arc<dyn CredentialStore>,
        options: ClientOptions,
    ) -> Self {
        let backends = BackendSelector::new(simulated, networked, mode);
        let lifecycle =
            Arc::new(TokenLifecycle::new(store).with_buffer_seconds(options.refresh_buffer_secs));
        let pipeline = Arc::new(
            RequestPipeline::new(backends.clone(), lifecycle).with_role_override(options.role_override),
        );
        let settings = SettingsApi::new(Arc::clone(&pipeline));
        let auth = AuthApi::new(Arc::clone(&pipeline), settings.clone(), options.prefetch_timeout);

        Self {
            backends,
            pipeline,
            auth,
            settings,
        }
    }

    pub fn auth(&self) -> &AuthApi {
        &self.auth
    }

    pub fn settings(&self) -> &SettingsApi {
        &self.settings
    }

    pub fn documents(&self) -> DocumentAccessor {
        DocumentAccessor::new(Arc::clone(&self.pipeline))
    }

    pub fn clients(&self) -> ClientsApi {
        ClientsApi::new(Arc::clone(&self.pipeline))
    }

    pub fn narratives(&self) -> NarrativeApi {
        NarrativeApi::new(Arc::clone(&self.pipeline))
    }

    pub fn telemetry(&self) -> TelemetryApi {
        TelemetryApi::new(Arc::clone(&self.pipeline))
    }

    pub fn pipeline(&self) -> &Arc<RequestPipeline> {
        &self.pipeline
    }

    pub fn lifecycle(&self) -> &Arc<TokenLifecycle> {
        self.pipeline.lifecycle()
    }

    pub fn mode(&self) -> BackendMode {
        self.backends.mode()
    }

    /// Switch backends. Takes effect on the next call.
    pub fn set_mode(&self, mode: BackendMode) {
        info!(%mode, "backend mode switched");
        self.backends.switch().set(mode);
    }
}
