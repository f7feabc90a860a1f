use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A usage event sent fire-and-forget to `/telemetry/usage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub occurred_at: jiff::Timestamp,
}

impl UsageEvent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            client_id: None,
            attributes: BTreeMap::new(),
            occurred_at: jiff::Timestamp::now(),
        }
    }

    pub fn for_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}
