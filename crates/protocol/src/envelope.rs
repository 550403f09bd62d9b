//! Keepalive socket message envelope.

use serde::{Deserialize, Serialize};

/// Envelope for all keepalive socket traffic.
///
/// On the wire: `{"messageType": "keepAlive" | "error", "data": "<string>"}`.
/// Any other `messageType` fails to decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "messageType", content = "data")]
pub enum KeepAliveMessage {
    /// Heartbeat; `data` is the participant id being reported alive.
    #[serde(rename = "keepAlive")]
    KeepAlive(String),
    /// Error reported by the hub; `data` is a human-readable message.
    #[serde(rename = "error")]
    Error(String),
}

impl KeepAliveMessage {
    /// Creates a heartbeat for the given participant.
    pub fn keep_alive(participant_id: impl Into<String>) -> Self {
        Self::KeepAlive(participant_id.into())
    }

    /// Serializes the message to its JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes a message from raw socket bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
