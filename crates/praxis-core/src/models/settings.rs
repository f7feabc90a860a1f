use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Per-user settings. Updates merge: absent fields keep their value and
/// `preferences` keys are merged one by one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_template: Option<String>,
    #[serde(default)]
    pub preferences: BTreeMap<String, serde_json::Value>,
}

impl Settings {
    pub fn merge(&mut self, partial: &Settings) {
        if partial.default_model_id.is_some() {
            self.default_model_id = partial.default_model_id.clone();
        }
        if partial.temperature.is_some() {
            self.temperature = partial.temperature;
        }
        if partial.max_tokens.is_some() {
            self.max_tokens = partial.max_tokens;
        }
        if partial.note_template.is_some() {
            self.note_template = partial.note_template.clone();
        }
        for (key, value) in &partial.preferences {
            self.preferences.insert(key.clone(), value.clone());
        }
    }
}
