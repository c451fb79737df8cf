//! Video-call signaling payloads exchanged over the channel and the token endpoint

use serde::{Deserialize, Serialize};

/// Outbound `video:call-user` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInvite {
    pub room_name: String,
    pub caller_id: String,
    pub caller_name: String,
    pub receiver_id: String,
}

/// Inbound `video:incoming-call` payload as seen by the callee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCall {
    pub room_name: String,
    pub caller_id: String,
    #[serde(default)]
    pub caller_name: Option<String>,
}

/// Outbound `video:accept-call` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptCall {
    pub room_name: String,
    pub caller_id: String,
    pub receiver_id: String,
}

/// Outbound `video:reject-call` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectCall {
    pub room_name: String,
    pub caller_id: String,
    pub reason: String,
}

/// Outbound `video:end-call` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndCall {
    pub room_name: String,
    pub user_id: String,
}

/// Remote call-signaling event delivered through the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    Incoming(IncomingCall),
    Accepted { room_name: Option<String> },
    Rejected { reason: Option<String> },
    Ended,
}

/// Body of `POST /video/token`. The issued credential is scoped to exactly this triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub room_name: String,
    pub user_id: String,
    pub user_name: String,
}

/// Response of `POST /video/token`.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub success: bool,
    pub token: Option<String>,
    pub message: Option<String>,
}
