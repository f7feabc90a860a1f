use praxis_core::models::auth::UserProfile;

use crate::error::AuthError;

/// Result of a login or MFA attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthResult {
    /// Authentication succeeded; credentials have been persisted.
    Success { profile: Option<UserProfile> },
    /// MFA challenge required; the caller must submit a TOTP code with this session.
    MfaChallenge { session: String },
}

impl AuthResult {
    pub fn requires_mfa(&self) -> bool {
        matches!(self, AuthResult::MfaChallenge { .. })
    }
}

/// TOTP codes are exactly six ASCII digits.
pub fn validate_mfa_code(code: &str) -> Result<(), AuthError> {
    if code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AuthError::InvalidMfaCode)
    }
}
