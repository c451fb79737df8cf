//! Error taxonomy shared by the channel, chat and calling layers.

use thiserror::Error;

/// Failure kinds surfaced by the client core.
///
/// Transport and signaling errors are recovered locally to a degraded state;
/// none of them should take the process down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Token rejected by the channel or a REST call.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Channel dropped, network failure or undecodable payload.
    #[error("transport error: {0}")]
    Transport(String),
    /// Credential request or media-room join failed.
    #[error("call signaling failed: {0}")]
    Signaling(String),
    /// Local precondition failed; no request was made.
    #[error("invalid request: {0}")]
    Validation(String),
}

impl ClientError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Auth(_))
    }

    /// Message without the kind prefix, for inline display.
    pub fn message(&self) -> &str {
        match self {
            ClientError::Auth(m)
            | ClientError::Transport(m)
            | ClientError::Signaling(m)
            | ClientError::Validation(m) => m,
        }
    }
}
