//! Media room seam
//!
//! Media transport lives behind `MediaConnector`; this crate only decides
//! when to join and leave and which local tracks are enabled.

use std::future::Future;

use crate::error::ClientError;

/// Short-lived authorization to join exactly one media room.
#[derive(Clone, PartialEq, Eq)]
pub struct RoomCredential {
    pub token: String,
    pub room_name: String,
}

impl std::fmt::Debug for RoomCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomCredential")
            .field("token", &"<redacted>")
            .field("room_name", &self.room_name)
            .finish()
    }
}

/// Membership change reported by the media layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    ParticipantConnected(String),
    ParticipantDisconnected(String),
}

/// A joined media room.
pub trait MediaRoom: Send {
    fn room_name(&self) -> &str;
    fn set_audio_enabled(&mut self, enabled: bool);
    fn set_video_enabled(&mut self, enabled: bool);
    /// Leave the room and release local capture.
    fn disconnect(&mut self);
    /// Next remote membership change. `None` once the room is left.
    fn next_event(&mut self) -> impl Future<Output = Option<RoomEvent>> + Send;
}

/// Joins media rooms with a credential.
pub trait MediaConnector: Send + Sync {
    type Room: MediaRoom;

    fn join(
        &self,
        room_name: &str,
        credential: &RoomCredential,
    ) -> impl Future<Output = Result<Self::Room, ClientError>> + Send;
}

/// Credentials are scoped to one room; reuse elsewhere is refused.
pub fn check_scope(room_name: &str, credential: &RoomCredential) -> Result<(), ClientError> {
    if credential.room_name != room_name {
        return Err(ClientError::Signaling(format!(
            "credential for {} cannot join {}",
            credential.room_name, room_name
        )));
    }
    Ok(())
}

/// Connector for terminals without media: joins are logged, nothing is captured.
#[derive(Debug, Default, Clone)]
pub struct HeadlessConnector;

#[derive(Debug)]
pub struct HeadlessRoom {
    name: String,
    connected: bool,
}

impl MediaConnector for HeadlessConnector {
    type Room = HeadlessRoom;

    async fn join(
        &self,
        room_name: &str,
        credential: &RoomCredential,
    ) -> Result<HeadlessRoom, ClientError> {
        check_scope(room_name, credential)?;
        if credential.token.is_empty() {
            return Err(ClientError::Signaling("empty room credential".into()));
        }
        tracing::info!("Joined media room {} (headless)", room_name);
        Ok(HeadlessRoom {
            name: room_name.to_string(),
            connected: true,
        })
    }
}

impl MediaRoom for HeadlessRoom {
    fn room_name(&self) -> &str {
        &self.name
    }

    fn set_audio_enabled(&mut self, enabled: bool) {
        tracing::info!("Audio {} in {}", if enabled { "on" } else { "muted" }, self.name);
    }

    fn set_video_enabled(&mut self, enabled: bool) {
        tracing::info!("Video {} in {}", if enabled { "on" } else { "off" }, self.name);
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            tracing::info!("Left media room {}", self.name);
        }
    }

    // Without media nobody is ever seen joining.
    async fn next_event(&mut self) -> Option<RoomEvent> {
        if !self.connected {
            return None;
        }
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(room: &str) -> RoomCredential {
        RoomCredential {
            token: "jwt".into(),
            room_name: room.into(),
        }
    }

    #[tokio::test]
    async fn test_headless_join_checks_scope() {
        let connector = HeadlessConnector;
        let room = connector
            .join("appointment_a", &credential("appointment_a"))
            .await
            .unwrap();
        assert_eq!(room.room_name(), "appointment_a");

        let err = connector
            .join("appointment_b", &credential("appointment_a"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Signaling(_)));
    }

    #[tokio::test]
    async fn test_headless_room_reports_no_members() {
        let mut room = HeadlessConnector
            .join("appointment_a", &credential("appointment_a"))
            .await
            .unwrap();
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(20), room.next_event()).await;
        assert!(waited.is_err());

        room.disconnect();
        assert_eq!(room.next_event().await, None);
    }

    #[test]
    fn test_debug_redacts_token() {
        let text = format!("{:?}", credential("appointment_a"));
        assert!(!text.contains("jwt"));
        assert!(text.contains("appointment_a"));
    }
}
