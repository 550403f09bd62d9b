use serde::{Deserialize, Serialize};

use crate::constants::LOCAL_API_PREFIX;

/// Configuration snapshot reported by a hub for one transport path.
///
/// Immutable once received; a re-fetch replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubConfiguration {
    pub keep_alive_address: String,
    pub presenting_address: String,
    pub voice_dialer_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_presenting_address: Option<String>,
    pub hub_name: String,
    pub sip_state: SipState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_address: Option<String>,
    pub hub_ip: String,
    pub hub_port: String,
    pub version: String,
    #[serde(rename = "hubMicMuted")]
    pub microphone_muted: bool,
    #[serde(rename = "hubSpeakerMuted")]
    pub speaker_muted: bool,
    #[serde(rename = "hubVolumeState")]
    pub volume: f32,
    pub camera_state: CameraState,
    pub presenting_state: PresentingState,
}

impl HubConfiguration {
    /// Base address of the hub's local REST API, e.g. `http://10.0.0.5:8080/api/v1/`.
    pub fn hub_address(&self) -> String {
        format!("http://{}:{}{LOCAL_API_PREFIX}", self.hub_ip, self.hub_port)
    }
}

/// Telephony state of the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SipState {
    #[serde(rename = "InCall")]
    InCall,
    #[serde(rename = "HangUp")]
    HangUp,
    #[serde(rename = "Calling")]
    Outgoing,
    #[serde(rename = "Ringing")]
    Incoming,
    #[serde(rename = "Registered")]
    Registered,
    #[serde(rename = "Unregistered")]
    Unregistered,
}

/// Camera state of the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraState {
    #[serde(rename = "Inactive")]
    Inactive,
    #[serde(rename = "Active")]
    Active,
}

/// Screen-sharing state of the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresentingState {
    #[serde(rename = "Inactive")]
    Inactive,
    #[serde(rename = "ActiveWebRTC")]
    ActiveWebRtc,
    #[serde(rename = "ActiveByBrowser")]
    ActiveByBrowser,
}

/// Result of a pairing-code lookup on the cloud service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubLocalInfo {
    pub hub_id: String,
    pub hub_ip: String,
}

impl HubLocalInfo {
    /// Base address of the hub's local REST API on the given port.
    pub fn local_address(&self, port: u16) -> String {
        format!("http://{}:{port}{LOCAL_API_PREFIX}", self.hub_ip)
    }
}

/// Result of a hub-name lookup on the cloud service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubNameInfo {
    pub id: String,
    pub name: String,
}

/// A participant registered with a hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub user_name: String,
}

/// Request body for creating a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParticipant {
    pub user_name: String,
}
