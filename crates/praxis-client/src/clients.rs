use std::sync::Arc;

use praxis_core::models::client::{ClientList, ClientPatch, ClientRecord, NewClient};
use praxis_core::paths;
use praxis_core::request::ApiRequest;
use tracing::info;

use crate::error::ClientError;
use crate::pipeline::RequestPipeline;

/// Client (patient) records.
#[derive(Clone)]
pub struct ClientsApi {
    pipeline: Arc<RequestPipeline>,
}

impl ClientsApi {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self { pipeline }
    }

    pub async fn list(&self) -> Result<Vec<ClientRecord>, ClientError> {
        let list: ClientList = self
            .pipeline
            .send(ApiRequest::get(paths::CLIENTS))
            .await?
            .decode()?;
        Ok(list.into_vec())
    }

    pub async fn get(&self, id: &str) -> Result<Option<ClientRecord>, ClientError> {
        self.pipeline
            .send(ApiRequest::get(paths::client(id)))
            .await?
            .decode_optional()
    }

    /// A caller-supplied `id` that is already taken fails with `Conflict`.
    pub async fn create(&self, name: &str, id: Option<&str>) -> Result<ClientRecord, ClientError> {
        if let Some(id) = id {
            paths::validate_id(id).map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        }
        let request = ApiRequest::post(paths::CLIENTS).json(&NewClient {
            id: id.map(str::to_string),
            name: name.to_string(),
        })?;
        let client: ClientRecord = self.pipeline.send(request).await?.decode()?;
        info!(client_id = %client.id, "client created");
        Ok(client)
    }

    pub async fn rename(&self, id: &str, name: &str) -> Result<ClientRecord, ClientError> {
        self.update(id, &ClientPatch {
            name: Some(name.to_string()),
            archived: None,
        })
        .await
    }

    pub async fn archive(&self, id: &str) -> Result<ClientRecord, ClientError> {
        self.set_archived(id, true).await
    }

    pub async fn unarchive(&self, id: &str) -> Result<ClientRecord, ClientError> {
        self.set_archived(id, false).await
    }

    async fn set_archived(&self, id: &str, archived: bool) -> Result<ClientRecord, ClientError> {
        let client = self
            .update(id, &ClientPatch {
                name: None,
                archived: Some(archived),
            })
            .await?;
        info!(client_id = id, archived, "client archive state changed");
        Ok(client)
    }

    async fn update(&self, id: &str, patch: &ClientPatch) -> Result<ClientRecord, ClientError> {
        let request = ApiRequest::patch(paths::client(id)).json(patch)?;
        self.pipeline.send(request).await?.decode()
    }
}
