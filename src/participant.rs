//! Role-specific chat participants
//!
//! The patient and doctor portals speak slightly different dialects on the
//! channel. Both share one synchronization core; the adapter decides how to
//! join, how to send, which messages count as the user's own and how to
//! address a call.

use crate::calling::room_name;
use crate::channel::{OutboundEvent, SendMessage};
use crate::error::ClientError;
use crate::models::{CallInvite, Identity, Message, Role};

pub trait ChatParticipantAdapter: Send + Sync {
    fn identity(&self) -> &Identity;

    fn role(&self) -> Role {
        self.identity().role
    }

    /// Event that joins the room of `conversation_id`.
    fn join_event(&self, conversation_id: &str) -> OutboundEvent;

    /// Event that sends `body` into `conversation_id`.
    fn send_event(&self, conversation_id: &str, body: &str) -> OutboundEvent;

    /// Whether `message` was authored by the local user.
    ///
    /// Uses the sender id when the payload carries one, otherwise the sender role.
    fn is_own(&self, message: &Message) -> bool {
        match (&message.sender_id, message.sender_role) {
            (Some(sender), _) => sender == &self.identity().user_id,
            (None, Some(role)) => role == self.role(),
            (None, None) => false,
        }
    }

    /// Read policy: only messages from the other party trigger a receipt.
    fn should_mark_read(&self, message: &Message) -> bool {
        !self.is_own(message)
    }

    /// `video:call-user` payload for ringing `receiver_id` about `conversation_id`.
    fn call_invite(&self, conversation_id: &str, receiver_id: &str) -> CallInvite {
        let me = self.identity();
        CallInvite {
            room_name: room_name(conversation_id),
            caller_id: me.user_id.clone(),
            caller_name: me.name.clone(),
            receiver_id: receiver_id.to_string(),
        }
    }
}

/// Patient portal: announces itself on join and tags outgoing messages.
#[derive(Debug, Clone)]
pub struct PatientAdapter {
    identity: Identity,
}

impl PatientAdapter {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }
}

impl ChatParticipantAdapter for PatientAdapter {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn join_event(&self, conversation_id: &str) -> OutboundEvent {
        OutboundEvent::JoinAppointmentChat {
            appointment_id: conversation_id.to_string(),
            user_id: self.identity.user_id.clone(),
            user_role: "user".to_string(),
        }
    }

    fn send_event(&self, conversation_id: &str, body: &str) -> OutboundEvent {
        OutboundEvent::SendMessage(SendMessage {
            appointment_id: conversation_id.to_string(),
            message: body.to_string(),
            sender: Some(self.identity.user_id.clone()),
            sender_model: Some("User".to_string()),
        })
    }
}

/// Doctor portal: the server derives the sender from the authenticated socket.
#[derive(Debug, Clone)]
pub struct DoctorAdapter {
    identity: Identity,
}

impl DoctorAdapter {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }
}

impl ChatParticipantAdapter for DoctorAdapter {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn join_event(&self, conversation_id: &str) -> OutboundEvent {
        OutboundEvent::JoinAppointment {
            appointment_id: conversation_id.to_string(),
        }
    }

    fn send_event(&self, conversation_id: &str, body: &str) -> OutboundEvent {
        OutboundEvent::SendMessage(SendMessage {
            appointment_id: conversation_id.to_string(),
            message: body.to_string(),
            sender: None,
            sender_model: None,
        })
    }
}

/// Pick the adapter for the logged-in identity.
pub fn adapter_for(identity: Identity) -> Result<Box<dyn ChatParticipantAdapter>, ClientError> {
    match identity.role {
        Role::Patient => Ok(Box::new(PatientAdapter::new(identity))),
        Role::Doctor => Ok(Box::new(DoctorAdapter::new(identity))),
        Role::Admin => Err(ClientError::Validation(
            "admin accounts do not take part in appointment chat".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn message(sender_id: Option<&str>, role: Option<Role>) -> Message {
        Message {
            id: "m1".into(),
            conversation_id: Some("apt_1".into()),
            sender_id: sender_id.map(String::from),
            sender_role: role,
            body: "hi".into(),
            created_at: Utc::now(),
            is_read: false,
        }
    }

    #[test]
    fn test_patient_dialect() {
        let p = PatientAdapter::new(Identity::new("u1", "Ann", Role::Patient));
        assert_eq!(
            p.join_event("apt_1").payload(),
            json!({"appointmentId": "apt_1", "userId": "u1", "userRole": "user"})
        );
        assert_eq!(
            p.send_event("apt_1", "hello").payload(),
            json!({"appointmentId": "apt_1", "message": "hello", "sender": "u1", "senderModel": "User"})
        );
    }

    #[test]
    fn test_doctor_dialect() {
        let d = DoctorAdapter::new(Identity::new("doc_1", "Dr. Grey", Role::Doctor));
        assert_eq!(d.join_event("apt_1").name(), "join-appointment");
        assert_eq!(
            d.send_event("apt_1", "hello").payload(),
            json!({"appointmentId": "apt_1", "message": "hello"})
        );
    }

    #[test]
    fn test_own_message_detection() {
        let d = DoctorAdapter::new(Identity::new("doc_1", "Dr. Grey", Role::Doctor));
        assert!(d.is_own(&message(Some("doc_1"), Some(Role::Patient))));
        assert!(!d.is_own(&message(Some("u1"), Some(Role::Doctor))));
        assert!(d.is_own(&message(None, Some(Role::Doctor))));
        assert!(d.should_mark_read(&message(None, Some(Role::Patient))));
        assert!(d.should_mark_read(&message(None, None)));
    }

    #[test]
    fn test_call_invite_uses_room_convention() {
        let p = PatientAdapter::new(Identity::new("u1", "Ann", Role::Patient));
        let invite = p.call_invite("apt_9", "doc_1");
        assert_eq!(invite.room_name, "appointment_apt_9");
        assert_eq!(invite.caller_id, "u1");
        assert_eq!(invite.caller_name, "Ann");
        assert_eq!(invite.receiver_id, "doc_1");
    }

    #[test]
    fn test_admin_has_no_adapter() {
        assert!(adapter_for(Identity::new("a", "Admin", Role::Admin)).is_err());
        let adapter = adapter_for(Identity::new("u1", "Ann", Role::Patient)).unwrap();
        assert_eq!(adapter.role(), Role::Patient);
    }
}
