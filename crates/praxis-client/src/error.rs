use praxis_auth::error::AuthError;
use praxis_core::error::CoreError;
use thiserror::Error;

/// Failures surfaced by the data-access layer.
///
/// A 401 that is recovered by one refresh and retry never reaches the
/// caller. When recovery is impossible the caller sees `SessionExpired`
/// and every credential slot has already been cleared.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("session expired; sign in again")]
    SessionExpired { status: Option<u16> },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("response decoding failed: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ClientError {
    /// Map a non-success status to the error taxonomy. 404 becomes
    /// `NotFound` here; callers that treat absence as a valid outcome check
    /// for 404 before converting.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            404 => ClientError::NotFound { message },
            409 => ClientError::Conflict { message },
            _ => ClientError::Http { status, message },
        }
    }

    /// The status-like code carried by this failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::SessionExpired { status } => *status,
            ClientError::Conflict { .. } => Some(409),
            ClientError::NotFound { .. } => Some(404),
            ClientError::Http { status, .. } => Some(*status),
            ClientError::InvalidRequest(_) => Some(400),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, ClientError::SessionExpired { .. })
    }
}
