//! Typed channel events: outbound emits and decoded inbound events

use serde::Serialize;
use serde_json::{json, Value};

use super::ConnectionState;
use crate::error::ClientError;
use crate::models::{
    AcceptCall, CallEvent, CallInvite, EndCall, IncomingCall, Message, ReadReceipt, RejectCall,
};

/// `send-message` payload. Optional fields depend on the sender's portal dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub appointment_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_model: Option<String>,
}

/// Events the client emits on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// Doctor-portal join: `join-appointment{appointmentId}`.
    JoinAppointment { appointment_id: String },
    /// Patient-portal join: `join-appointment-chat{appointmentId, userId, userRole}`.
    JoinAppointmentChat {
        appointment_id: String,
        user_id: String,
        user_role: String,
    },
    LeaveAppointment { appointment_id: String },
    SendMessage(SendMessage),
    CallUser(CallInvite),
    AcceptCall(AcceptCall),
    RejectCall(RejectCall),
    EndCall(EndCall),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::JoinAppointment { .. } => "join-appointment",
            OutboundEvent::JoinAppointmentChat { .. } => "join-appointment-chat",
            OutboundEvent::LeaveAppointment { .. } => "leave-appointment",
            OutboundEvent::SendMessage(_) => "send-message",
            OutboundEvent::CallUser(_) => "video:call-user",
            OutboundEvent::AcceptCall(_) => "video:accept-call",
            OutboundEvent::RejectCall(_) => "video:reject-call",
            OutboundEvent::EndCall(_) => "video:end-call",
        }
    }

    pub fn payload(&self) -> Value {
        let encoded = match self {
            OutboundEvent::JoinAppointment { appointment_id }
            | OutboundEvent::LeaveAppointment { appointment_id } => {
                Ok(json!({ "appointmentId": appointment_id }))
            }
            OutboundEvent::JoinAppointmentChat {
                appointment_id,
                user_id,
                user_role,
            } => Ok(json!({
                "appointmentId": appointment_id,
                "userId": user_id,
                "userRole": user_role,
            })),
            OutboundEvent::SendMessage(m) => serde_json::to_value(m),
            OutboundEvent::CallUser(c) => serde_json::to_value(c),
            OutboundEvent::AcceptCall(c) => serde_json::to_value(c),
            OutboundEvent::RejectCall(c) => serde_json::to_value(c),
            OutboundEvent::EndCall(c) => serde_json::to_value(c),
        };
        // Plain string/struct payloads cannot fail to serialize.
        encoded.unwrap_or(Value::Null)
    }

    /// Wire frame for this event.
    pub fn encode(&self) -> String {
        super::frame::encode_event(self.name(), &self.payload())
    }
}

/// Inbound events delivered to the registered handler set.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Room join acknowledged (`chat-joined` / `joined`).
    Joined(Value),
    Message(Message),
    ReadReceipt(ReadReceipt),
    Call(CallEvent),
    Error(ClientError),
    State(ConnectionState),
}

/// Map a socket.io event to a typed channel event. Unknown names yield `None`.
pub fn decode_event(name: &str, data: Value) -> Option<ChannelEvent> {
    let event = match name {
        "chat-joined" | "joined" => ChannelEvent::Joined(data),
        "new-message" => match serde_json::from_value::<Message>(data) {
            Ok(msg) => ChannelEvent::Message(msg),
            Err(e) => ChannelEvent::Error(ClientError::Transport(format!(
                "undecodable new-message: {}",
                e
            ))),
        },
        "messages-read" => match ReadReceipt::from_payload(&data) {
            Some(receipt) => ChannelEvent::ReadReceipt(receipt),
            None => {
                tracing::debug!("messages-read without ids or appointment: {}", data);
                return None;
            }
        },
        "error" => ChannelEvent::Error(ClientError::Transport(format!(
            "server error: {}",
            data.get("message")
                .and_then(|m| m.as_str())
                .map(String::from)
                .unwrap_or_else(|| data.to_string())
        ))),
        "video:incoming-call" => match serde_json::from_value::<IncomingCall>(data) {
            Ok(call) => ChannelEvent::Call(CallEvent::Incoming(call)),
            Err(e) => ChannelEvent::Error(ClientError::Transport(format!(
                "undecodable incoming call: {}",
                e
            ))),
        },
        "video:call-accepted" => ChannelEvent::Call(CallEvent::Accepted {
            room_name: data
                .get("roomName")
                .and_then(|r| r.as_str())
                .map(String::from),
        }),
        "video:call-rejected" => ChannelEvent::Call(CallEvent::Rejected {
            reason: data
                .get("reason")
                .and_then(|r| r.as_str())
                .map(String::from),
        }),
        "video:call-ended" => ChannelEvent::Call(CallEvent::Ended),
        other => {
            tracing::debug!("Ignoring channel event '{}'", other);
            return None;
        }
    };
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_skips_absent_fields() {
        let ev = OutboundEvent::SendMessage(SendMessage {
            appointment_id: "apt_1".into(),
            message: "hi".into(),
            sender: None,
            sender_model: None,
        });
        assert_eq!(ev.payload(), json!({"appointmentId": "apt_1", "message": "hi"}));
        assert_eq!(ev.encode(), r#"42["send-message",{"appointmentId":"apt_1","message":"hi"}]"#);
    }

    #[test]
    fn test_decode_call_events() {
        let ev = decode_event(
            "video:incoming-call",
            json!({"roomName": "appointment_apt_2", "callerId": "u1", "callerName": "Ann"}),
        );
        assert_eq!(
            ev,
            Some(ChannelEvent::Call(CallEvent::Incoming(IncomingCall {
                room_name: "appointment_apt_2".into(),
                caller_id: "u1".into(),
                caller_name: Some("Ann".into()),
            })))
        );
        assert_eq!(
            decode_event("video:call-rejected", json!({"reason": "busy"})),
            Some(ChannelEvent::Call(CallEvent::Rejected {
                reason: Some("busy".into())
            }))
        );
        assert_eq!(
            decode_event("video:call-ended", Value::Null),
            Some(ChannelEvent::Call(CallEvent::Ended))
        );
    }

    #[test]
    fn test_decode_chat_events() {
        let ev = decode_event(
            "new-message",
            json!({"_id": "m1", "senderRole": "doctor", "message": "Hello"}),
        );
        assert!(matches!(ev, Some(ChannelEvent::Message(ref m)) if m.id == "m1"));

        let ev = decode_event("messages-read", json!({"messageIds": ["m1"]}));
        assert_eq!(
            ev,
            Some(ChannelEvent::ReadReceipt(ReadReceipt::Messages(vec!["m1".into()])))
        );

        assert!(matches!(
            decode_event("error", json!({"message": "Not allowed"})),
            Some(ChannelEvent::Error(ClientError::Transport(ref m))) if m.contains("Not allowed")
        ));
        assert!(matches!(decode_event("chat-joined", json!({})), Some(ChannelEvent::Joined(_))));
        assert_eq!(decode_event("typing", json!({})), None);
    }

    #[test]
    fn test_undecodable_message_surfaces_error() {
        let ev = decode_event("new-message", json!({"message": "no id"}));
        assert!(matches!(ev, Some(ChannelEvent::Error(ClientError::Transport(_)))));
    }
}
