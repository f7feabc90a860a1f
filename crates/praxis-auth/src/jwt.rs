use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AuthError;

/// Refresh this many seconds before the token's `exp`.
pub const DEFAULT_REFRESH_BUFFER_SECS: i64 = 300;

/// Claims read from a bearer token. Only `exp` is needed for lifecycle
/// decisions; the rest is carried for the simulator and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// Decode the payload segment of a JWT without verifying its signature.
///
/// Signature verification is the server's job; the client only needs the
/// embedded expiry to decide when to refresh.
pub fn decode_claims(token: &str) -> Result<TokenClaims, AuthError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::InvalidToken("expected three segments".to_string()));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidToken(format!("payload is not base64url: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::InvalidToken(format!("payload is not a claims object: {e}")))
}

/// True only if `now` is more than `buffer_seconds` before the token's expiry.
/// Undecodable tokens are unusable.
pub fn is_usable(token: &str, buffer_seconds: i64) -> bool {
    is_usable_at(token, buffer_seconds, jiff::Timestamp::now())
}

pub fn is_usable_at(token: &str, buffer_seconds: i64, now: jiff::Timestamp) -> bool {
    match decode_claims(token) {
        Ok(claims) => now.as_second().saturating_add(buffer_seconds) < claims.exp,
        Err(e) => {
            debug!(error = %e, "treating undecodable token as unusable");
            false
        }
    }
}

/// Encode claims as an unsigned (`alg: none`) JWT. Used by the simulated
/// backend so simulated sessions expire under the same rules as real ones.
pub fn encode_unsigned(claims: &TokenClaims) -> Result<String, AuthError> {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    Ok(format!("{header}.{payload}."))
}
