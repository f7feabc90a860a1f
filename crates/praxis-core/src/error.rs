use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid document type: {0}")]
    InvalidDocType(String),

    #[error("invalid status {status} for document type {doc_type}")]
    InvalidStatus { doc_type: String, status: String },

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid field: {0}")]
    InvalidField(String),
}
