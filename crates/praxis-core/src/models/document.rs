//! The unified clinical document.
//!
//! Every clinical record subtype (progress note, diagnosis, treatment plan,
//! ...) shares one schema distinguished by [`DocumentType`]. `date` and
//! `status` always live at the top level; `content` carries only the
//! type-specific clinical fields.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;

/// Type-specific clinical fields.
pub type DocumentContent = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DocumentType {
    ProgressNote,
    Diagnosis,
    TreatmentPlan,
    Intake,
    Consultation,
    Discharge,
}

impl DocumentType {
    pub const ALL: [DocumentType; 6] = [
        DocumentType::ProgressNote,
        DocumentType::Diagnosis,
        DocumentType::TreatmentPlan,
        DocumentType::Intake,
        DocumentType::Consultation,
        DocumentType::Discharge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::ProgressNote => "progress_note",
            DocumentType::Diagnosis => "diagnosis",
            DocumentType::TreatmentPlan => "treatment_plan",
            DocumentType::Intake => "intake",
            DocumentType::Consultation => "consultation",
            DocumentType::Discharge => "discharge",
        }
    }

    /// Statuses valid for this document type. The first entry is the
    /// default assigned on create.
    pub fn allowed_statuses(&self) -> &'static [DocumentStatus] {
        use DocumentStatus::*;
        match self {
            DocumentType::ProgressNote => &[Draft, Complete, Amended],
            DocumentType::Diagnosis => &[Provisional, Active, Resolved],
            DocumentType::TreatmentPlan => &[Draft, Active, Completed, Discontinued],
            DocumentType::Intake | DocumentType::Consultation | DocumentType::Discharge => {
                &[Draft, Complete, Amended]
            }
        }
    }

    pub fn default_status(&self) -> DocumentStatus {
        self.allowed_statuses()[0]
    }

    pub fn validate_status(&self, status: DocumentStatus) -> Result<(), CoreError> {
        if self.allowed_statuses().contains(&status) {
            Ok(())
        } else {
            Err(CoreError::InvalidStatus {
                doc_type: self.as_str().to_string(),
                status: status.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::InvalidDocType(s.to_string()))
    }
}

/// Union of every type-scoped status. Which values are legal depends on the
/// document type; see [`DocumentType::allowed_statuses`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DocumentStatus {
    Draft,
    Complete,
    Amended,
    Provisional,
    Active,
    Resolved,
    Completed,
    Discontinued,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Complete => "complete",
            DocumentStatus::Amended => "amended",
            DocumentStatus::Provisional => "provisional",
            DocumentStatus::Active => "active",
            DocumentStatus::Resolved => "resolved",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Discontinued => "discontinued",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(|_| {
            CoreError::InvalidStatus {
                doc_type: "any".to_string(),
                status: s.to_string(),
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Document {
    pub id: String,
    pub document_type: DocumentType,
    pub client_id: String,
    pub date: jiff::civil::Date,
    pub status: DocumentStatus,
    #[serde(default)]
    pub content: DocumentContent,
    pub created_at: jiff::Timestamp,
    pub updated_at: jiff::Timestamp,
}

impl Document {
    /// Apply a partial update: `date`/`status` are replaced, `content` keys
    /// are merged (a `null` value removes the key).
    pub fn apply(&mut self, patch: &DocumentPatch) -> Result<(), CoreError> {
        if let Some(content) = &patch.content {
            validate_content(content)?;
        }
        if let Some(status) = patch.status {
            self.document_type.validate_status(status)?;
            self.status = status;
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(content) = &patch.content {
            for (key, value) in content {
                if value.is_null() {
                    self.content.remove(key);
                } else {
                    self.content.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    /// Newest-first ordering: `date` desc, then `updated_at` desc, then `id`.
    pub fn newest_first(a: &Document, b: &Document) -> Ordering {
        b.date
            .cmp(&a.date)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// `date` and `status` live at the top level only.
pub fn validate_content(content: &DocumentContent) -> Result<(), CoreError> {
    match ["date", "status"].into_iter().find(|key| content.contains_key(*key)) {
        Some(key) => Err(CoreError::InvalidField(format!(
            "{key} is a top-level document field, not content"
        ))),
        None => Ok(()),
    }
}

/// Body of a create request. `id` is optional; a caller-supplied id makes
/// retries idempotent (a duplicate yields 409 instead of a second record).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub document_type: DocumentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<jiff::civil::Date>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DocumentStatus>,
    #[serde(default)]
    pub content: DocumentContent,
}

impl NewDocument {
    pub fn new(document_type: DocumentType, content: DocumentContent) -> Self {
        Self {
            id: None,
            document_type,
            date: None,
            status: None,
            content,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_status(mut self, status: DocumentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_date(mut self, date: jiff::civil::Date) -> Self {
        self.date = Some(date);
        self
    }
}

/// Partial update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<jiff::civil::Date>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DocumentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<DocumentContent>,
}

/// Query filter for listing a client's documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    pub document_type: Option<DocumentType>,
    pub status: Option<DocumentStatus>,
}

impl DocumentFilter {
    pub fn of_type(document_type: DocumentType) -> Self {
        Self {
            document_type: Some(document_type),
            status: None,
        }
    }

    pub fn with_status(mut self, status: DocumentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.document_type.is_none_or(|t| t == doc.document_type)
            && self.status.is_none_or(|s| s == doc.status)
    }

    /// Query-string pairs in wire form.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(t) = self.document_type {
            query.push(("type".to_string(), t.as_str().to_string()));
        }
        if let Some(s) = self.status {
            query.push(("status".to_string(), s.as_str().to_string()));
        }
        query
    }

    pub fn from_query(pairs: &[(String, String)]) -> Result<Self, CoreError> {
        let mut filter = DocumentFilter::default();
        for (key, value) in pairs {
            match key.as_str() {
                "type" => filter.document_type = Some(value.parse()?),
                "status" => filter.status = Some(value.parse()?),
                _ => {}
            }
        }
        Ok(filter)
    }
}

/// A list response: servers may answer with a bare array or with a
/// `{ "documents": [...] }` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentList {
    Envelope { documents: Vec<Document> },
    Bare(Vec<Document>),
}

impl DocumentList {
    pub fn into_vec(self) -> Vec<Document> {
        match self {
            DocumentList::Envelope { documents } => documents,
            DocumentList::Bare(documents) => documents,
        }
    }
}
