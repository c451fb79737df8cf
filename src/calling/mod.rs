//! Call signaling: call lifecycle state and the room naming convention.
//!
//! Signaling rides the message channel; media happens in a named room that
//! both parties join with their own short-lived credential.

pub mod room;
pub mod signaling;

pub use room::HeadlessConnector;
pub use signaling::CallController;

/// Prefix shared by every appointment room.
pub const ROOM_PREFIX: &str = "appointment_";

/// Media room of a conversation. Caller and callee derive the same name.
pub fn room_name(conversation_id: &str) -> String {
    format!("{}{}", ROOM_PREFIX, conversation_id)
}

/// Conversation id encoded in a room name, if it follows the convention.
pub fn conversation_of(room_name: &str) -> Option<&str> {
    room_name
        .strip_prefix(ROOM_PREFIX)
        .filter(|id| !id.is_empty())
}

/// Call lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    /// Invite sent, waiting for the callee.
    Outgoing,
    /// Invite received, waiting for a local decision.
    Incoming,
    /// Credential requested or room join in progress.
    Connecting,
    Connected,
    Ended,
    Error,
}

impl CallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::Outgoing => "outgoing",
            CallState::Incoming => "incoming",
            CallState::Connecting => "connecting",
            CallState::Connected => "connected",
            CallState::Ended => "ended",
            CallState::Error => "error",
        }
    }

    /// States that hold, or are about to hold, room membership.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CallState::Outgoing | CallState::Connecting | CallState::Connected
        )
    }

    /// A new call may start from here.
    pub fn is_free(&self) -> bool {
        matches!(self, CallState::Idle | CallState::Ended)
    }
}

/// The other party of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub user_id: String,
    pub name: Option<String>,
}

/// Snapshot of the one call an identity may have at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSession {
    pub state: CallState,
    pub room_name: Option<String>,
    /// True when the remote side rang us.
    pub incoming: bool,
    pub peer: Option<Peer>,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub remote_participant_count: usize,
    /// Shown until dismissed.
    pub error: Option<String>,
    pub end_reason: Option<String>,
}

impl Default for CallSession {
    fn default() -> Self {
        Self {
            state: CallState::Idle,
            room_name: None,
            incoming: false,
            peer: None,
            audio_enabled: true,
            video_enabled: true,
            remote_participant_count: 0,
            error: None,
            end_reason: None,
        }
    }
}
