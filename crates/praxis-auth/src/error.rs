use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("MFA verification failed: {0}")]
    MfaFailed(String),

    #[error("MFA code must be exactly 6 digits")]
    InvalidMfaCode,

    #[error("token refresh failed: {0}")]
    Refresh(String),

    #[error("credential storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
