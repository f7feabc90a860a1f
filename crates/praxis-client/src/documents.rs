//! The unified document accessor.
//!
//! Every clinical record type goes through the same five operations. The
//! derived views ("latest note", "current diagnosis", ...) are recomputed
//! from `list` on every call; nothing is cached here.

use std::sync::Arc;

use praxis_core::models::document::{
    Document, DocumentFilter, DocumentList, DocumentPatch, DocumentStatus, DocumentType,
    NewDocument,
};
use praxis_core::paths;
use praxis_core::request::ApiRequest;
use tracing::debug;

use crate::error::ClientError;
use crate::pipeline::RequestPipeline;

#[derive(Clone)]
pub struct DocumentAccessor {
    pipeline: Arc<RequestPipeline>,
}

impl DocumentAccessor {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self { pipeline }
    }

    /// A client's documents matching `filter`, newest first. An unknown
    /// client has no documents.
    pub async fn list(
        &self,
        client_id: &str,
        filter: DocumentFilter,
    ) -> Result<Vec<Document>, ClientError> {
        let request = ApiRequest::get(paths::documents(client_id)).query(filter.to_query());
        let list: Option<DocumentList> = self.pipeline.send(request).await?.decode_optional()?;

        let mut documents: Vec<Document> = list
            .map(DocumentList::into_vec)
            .unwrap_or_default()
            .into_iter()
            .filter(|doc| filter.matches(doc))
            .collect();
        documents.sort_by(Document::newest_first);

        debug!(client_id, count = documents.len(), "listed documents");
        Ok(documents)
    }

    /// `None` when the document does not exist.
    pub async fn get(&self, client_id: &str, id: &str) -> Result<Option<Document>, ClientError> {
        self.pipeline
            .send(ApiRequest::get(paths::document(client_id, id)))
            .await?
            .decode_optional()
    }

    /// Like [`get`](Self::get), but absence is a `NotFound` error.
    pub async fn fetch(&self, client_id: &str, id: &str) -> Result<Document, ClientError> {
        self.pipeline
            .send(ApiRequest::get(paths::document(client_id, id)))
            .await?
            .decode()
    }

    /// Create a document. A caller-supplied id that is already taken fails
    /// with `Conflict`, which makes retries with the same id safe.
    pub async fn create(&self, client_id: &str, new: &NewDocument) -> Result<Document, ClientError> {
        if let Some(id) = &new.id {
            paths::validate_id(id).map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        }
        let request = ApiRequest::post(paths::documents(client_id)).json(new)?;
        let doc: Document = self.pipeline.send(request).await?.decode()?;
        debug!(client_id, document_id = %doc.id, document_type = %doc.document_type, "created document");
        Ok(doc)
    }

    /// Apply a partial update. The document must exist.
    pub async fn update(
        &self,
        client_id: &str,
        id: &str,
        patch: &DocumentPatch,
    ) -> Result<Document, ClientError> {
        let request = ApiRequest::patch(paths::document(client_id, id)).json(patch)?;
        self.pipeline.send(request).await?.decode()
    }

    /// Hard delete. The document must exist.
    pub async fn delete(&self, client_id: &str, id: &str) -> Result<(), ClientError> {
        self.pipeline
            .send(ApiRequest::delete(paths::document(client_id, id)))
            .await?
            .into_unit()?;
        debug!(client_id, document_id = id, "deleted document");
        Ok(())
    }

    // ── Derived views ────────────────────────────────────────────────────────

    pub async fn latest_of_type(
        &self,
        client_id: &str,
        document_type: DocumentType,
    ) -> Result<Option<Document>, ClientError> {
        let documents = self
            .list(client_id, DocumentFilter::of_type(document_type))
            .await?;
        Ok(latest(&documents, DocumentFilter::of_type(document_type)).cloned())
    }

    pub async fn active_of_type(
        &self,
        client_id: &str,
        document_type: DocumentType,
    ) -> Result<Option<Document>, ClientError> {
        let filter = DocumentFilter::of_type(document_type).with_status(DocumentStatus::Active);
        let documents = self.list(client_id, filter).await?;
        Ok(latest(&documents, filter).cloned())
    }

    pub async fn latest_note(&self, client_id: &str) -> Result<Option<Document>, ClientError> {
        self.latest_of_type(client_id, DocumentType::ProgressNote).await
    }

    pub async fn current_diagnosis(&self, client_id: &str) -> Result<Option<Document>, ClientError> {
        self.active_of_type(client_id, DocumentType::Diagnosis).await
    }

    pub async fn active_treatment_plan(
        &self,
        client_id: &str,
    ) -> Result<Option<Document>, ClientError> {
        self.active_of_type(client_id, DocumentType::TreatmentPlan).await
    }
}

/// The newest document matching `filter`.
pub fn latest(documents: &[Document], filter: DocumentFilter) -> Option<&Document> {
    documents
        .iter()
        .filter(|doc| filter.matches(doc))
        .min_by(|a, b| Document::newest_first(a, b))
}
