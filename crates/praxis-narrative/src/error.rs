use thiserror::Error;

#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("malformed stream event: {0}")]
    Malformed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
