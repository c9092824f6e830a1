use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::Result;

/// A full message received or sent over the WebSocket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    pub message_ref: Option<String>,
}

/// Phoenix protocol event names
pub(crate) mod events {
    pub const JOIN: &str = "phx_join";
    pub const LEAVE: &str = "phx_leave";
    pub const REPLY: &str = "phx_reply";
    pub const ERROR: &str = "phx_error";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const POSTGRES_CHANGES: &str = "postgres_changes";
}

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "*")]
    All,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
            ChangeKind::All => "*",
        }
    }

    /// Whether a subscription for `self` receives a change of `kind`
    pub fn accepts(&self, kind: ChangeKind) -> bool {
        *self == ChangeKind::All || *self == kind
    }
}

/// A row change delivered by the realtime service
#[derive(Debug, Clone, Deserialize)]
pub struct RowChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
    #[serde(default)]
    pub record: serde_json::Value,
    #[serde(default)]
    pub old_record: serde_json::Value,
}

/// A row change decoded into the table's row type
///
/// Deletes only carry the replica identity columns, so the old row stays
/// untyped.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedChange<T> {
    Inserted(T),
    Updated(T),
    Deleted(serde_json::Value),
}

impl RowChange {
    /// Decode the changed row
    pub fn decode<T: DeserializeOwned>(&self) -> Result<TypedChange<T>> {
        Ok(match self.kind {
            ChangeKind::Insert => TypedChange::Inserted(serde_json::from_value(self.record.clone())?),
            ChangeKind::Update | ChangeKind::All => {
                TypedChange::Updated(serde_json::from_value(self.record.clone())?)
            }
            ChangeKind::Delete => TypedChange::Deleted(self.old_record.clone()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostgresChangesPayload {
    pub data: RowChange,
}
