use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::NarrativeError;

/// Why a generation stream ended.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    /// The caller cancelled the stream.
    UserCancelled,
    /// Any other reason reported by the model, preserved verbatim.
    Other(String),
}

impl StopReason {
    pub fn as_str(&self) -> &str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::MaxTokens => "max_tokens",
            StopReason::StopSequence => "stop_sequence",
            StopReason::UserCancelled => "user_cancelled",
            StopReason::Other(reason) => reason,
        }
    }
}

impl From<&str> for StopReason {
    fn from(value: &str) -> Self {
        match value {
            "end_turn" => StopReason::EndTurn,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            "user_cancelled" => StopReason::UserCancelled,
            other => StopReason::Other(other.to_string()),
        }
    }
}

impl From<String> for StopReason {
    fn from(value: String) -> Self {
        StopReason::from(value.as_str())
    }
}

impl From<StopReason> for String {
    fn from(value: StopReason) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded stream event. `Complete` and `Error` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrativeEvent {
    Chunk(String),
    Complete(StopReason),
    Error(String),
}

impl NarrativeEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NarrativeEvent::Chunk(_))
    }
}

/// JSON payload of a `data:` line. Exactly one of the three shapes is
/// valid: `{text}`, `{done: true, stopReason}`, `{error}`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    done: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub(crate) fn parse_payload(data: &str) -> Result<NarrativeEvent, NarrativeError> {
    let payload: WirePayload = serde_json::from_str(data)
        .map_err(|e| NarrativeError::Malformed(format!("invalid JSON ({e}): {data}")))?;

    match payload {
        WirePayload {
            text: Some(text),
            done: None,
            error: None,
            ..
        } => Ok(NarrativeEvent::Chunk(text)),
        WirePayload {
            text: None,
            done: Some(true),
            error: None,
            stop_reason,
        } => Ok(NarrativeEvent::Complete(
            stop_reason.map(StopReason::from).unwrap_or(StopReason::EndTurn),
        )),
        WirePayload {
            text: None,
            done: None,
            error: Some(message),
            ..
        } => Ok(NarrativeEvent::Error(message)),
        _ => Err(NarrativeError::Malformed(format!(
            "expected exactly one of text, done, error: {data}"
        ))),
    }
}

pub(crate) fn payload_json(event: &NarrativeEvent) -> Result<String, NarrativeError> {
    let payload = match event {
        NarrativeEvent::Chunk(text) => WirePayload {
            text: Some(text.clone()),
            ..Default::default()
        },
        NarrativeEvent::Complete(reason) => WirePayload {
            done: Some(true),
            stop_reason: Some(reason.as_str().to_string()),
            ..Default::default()
        },
        NarrativeEvent::Error(message) => WirePayload {
            error: Some(message.clone()),
            ..Default::default()
        },
    };
    Ok(serde_json::to_string(&payload)?)
}
