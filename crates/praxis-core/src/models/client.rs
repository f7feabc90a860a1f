use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A client (patient) record. Archiving is a client-level flag; the
/// client's documents are untouched by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ClientRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub archived: bool,
    pub created_at: jiff::Timestamp,
    pub updated_at: jiff::Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientList {
    Envelope { clients: Vec<ClientRecord> },
    Bare(Vec<ClientRecord>),
}

impl ClientList {
    pub fn into_vec(self) -> Vec<ClientRecord> {
        match self {
            ClientList::Envelope { clients } => clients,
            ClientList::Bare(clients) => clients,
        }
    }
}
