//! REST path conventions.
//!
//! Pure string functions shared by the networked and simulated backends so
//! both speak exactly the same surface.

use std::borrow::Cow;

use crate::error::CoreError;

pub const LOGIN: &str = "/auth/login";
pub const MFA: &str = "/auth/mfa";
pub const REFRESH: &str = "/auth/refresh";
pub const LOGOUT: &str = "/auth/logout";
pub const SETTINGS: &str = "/settings";
pub const CLIENTS: &str = "/clients";
pub const NARRATIVES: &str = "/narratives";
pub const NARRATIVE_STREAM: &str = "/narratives/stream";
pub const TELEMETRY_USAGE: &str = "/telemetry/usage";

pub fn client(client_id: &str) -> String {
    format!("/clients/{}", encode(client_id))
}

pub fn documents(client_id: &str) -> String {
    format!("/clients/{}/documents", encode(client_id))
}

pub fn document(client_id: &str, document_id: &str) -> String {
    format!(
        "/clients/{}/documents/{}",
        encode(client_id),
        encode(document_id)
    )
}

/// Ids are opaque text, so every id becomes exactly one percent-encoded
/// path segment.
fn encode(id: &str) -> Cow<'_, str> {
    urlencoding::encode(id)
}

fn decode(segment: &str) -> Option<Cow<'_, str>> {
    urlencoding::decode(segment).ok().filter(|id| !id.is_empty())
}

/// Ids that cannot survive as a path segment. `.` and `..` are dot
/// segments, which URL parsers collapse even when percent-encoded.
pub fn validate_id(id: &str) -> Result<(), CoreError> {
    match id {
        "" => Err(CoreError::InvalidField("id must not be empty".to_string())),
        "." | ".." => Err(CoreError::InvalidField(format!("{id:?} is not a valid id"))),
        _ => Ok(()),
    }
}

/// A parsed resource path. Ids are decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<'a> {
    Login,
    Mfa,
    Refresh,
    Logout,
    Settings,
    Clients,
    Client(Cow<'a, str>),
    Documents(Cow<'a, str>),
    Document(Cow<'a, str>, Cow<'a, str>),
    Narratives,
    NarrativeStream,
    TelemetryUsage,
}

impl<'a> Route<'a> {
    /// Match a path (without query string) against the known surface.
    pub fn parse(path: &'a str) -> Option<Route<'a>> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let route = match segments[..] {
            ["auth", "login"] => Route::Login,
            ["auth", "mfa"] => Route::Mfa,
            ["auth", "refresh"] => Route::Refresh,
            ["auth", "logout"] => Route::Logout,
            ["settings"] => Route::Settings,
            ["clients"] => Route::Clients,
            ["clients", id] => Route::Client(decode(id)?),
            ["clients", cid, "documents"] => Route::Documents(decode(cid)?),
            ["clients", cid, "documents", id] => Route::Document(decode(cid)?, decode(id)?),
            ["narratives"] => Route::Narratives,
            ["narratives", "stream"] => Route::NarrativeStream,
            ["telemetry", "usage"] => Route::TelemetryUsage,
            _ => return None,
        };
        Some(route)
    }
}
