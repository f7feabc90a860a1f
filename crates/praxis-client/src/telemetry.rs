use std::sync::Arc;

use praxis_core::models::telemetry::UsageEvent;
use praxis_core::paths;
use praxis_core::request::ApiRequest;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::pipeline::RequestPipeline;

/// Usage telemetry. Failures never reach the caller.
#[derive(Clone)]
pub struct TelemetryApi {
    pipeline: Arc<RequestPipeline>,
}

impl TelemetryApi {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self { pipeline }
    }

    /// Send one event. Returns `false` instead of failing.
    pub async fn report(&self, event: &UsageEvent) -> bool {
        match self.send(event).await {
            Ok(()) => {
                debug!(action = %event.action, "usage event recorded");
                true
            }
            Err(e) => {
                warn!(action = %event.action, error = %e, "usage event not recorded");
                false
            }
        }
    }

    /// Send one event from a detached task. Nobody waits for it.
    pub fn track(&self, event: UsageEvent) {
        let api = self.clone();
        tokio::spawn(async move {
            api.report(&event).await;
        });
    }

    async fn send(&self, event: &UsageEvent) -> Result<(), ClientError> {
        let request = ApiRequest::post(paths::TELEMETRY_USAGE)
            .json(event)?
            .expect_empty();
        self.pipeline.send(request).await?.into_unit()
    }
}
