//! Chat message and read-receipt models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Role;

/// A chat message within one appointment conversation.
///
/// Everything except `is_read` is immutable once the server has accepted the
/// message. `is_read` only ever moves from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "WireMessage")]
pub struct Message {
    pub id: String,
    pub conversation_id: Option<String>,
    pub sender_id: Option<String>,
    pub sender_role: Option<Role>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

/// Loose wire shape of a message.
///
/// The patient and doctor backends disagree on field names (`_id`/`id`,
/// `message`/`content`, `sender`/`senderId`, `createdAt`/`timestamp`) and
/// sometimes populate references as objects, so everything is optional here
/// and normalised in `TryFrom`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(rename = "_id")]
    underscore_id: Option<Value>,
    id: Option<Value>,
    appointment_id: Option<Value>,
    conversation_id: Option<Value>,
    sender: Option<Value>,
    sender_id: Option<Value>,
    sender_role: Option<String>,
    message: Option<String>,
    content: Option<String>,
    body: Option<String>,
    created_at: Option<DateTime<Utc>>,
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    is_read: bool,
}

/// Extract an identifier from a plain string/number or a populated `{_id}`/`{id}` object.
pub(crate) fn id_ref(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map
            .get("_id")
            .or_else(|| map.get("id"))
            .and_then(id_ref),
        _ => None,
    }
}

impl TryFrom<WireMessage> for Message {
    type Error = String;

    fn try_from(w: WireMessage) -> Result<Self, Self::Error> {
        let id = w
            .underscore_id
            .as_ref()
            .and_then(id_ref)
            .or_else(|| w.id.as_ref().and_then(id_ref))
            .ok_or_else(|| "message without id".to_string())?;

        let conversation_id = w
            .appointment_id
            .as_ref()
            .and_then(id_ref)
            .or_else(|| w.conversation_id.as_ref().and_then(id_ref));

        let sender_id = w
            .sender_id
            .as_ref()
            .and_then(id_ref)
            .or_else(|| w.sender.as_ref().and_then(id_ref));

        let body = w.message.or(w.content).or(w.body).unwrap_or_default();

        Ok(Message {
            id,
            conversation_id,
            sender_id,
            sender_role: w.sender_role.as_deref().and_then(Role::parse_lenient),
            body,
            // Missing timestamps fall back to arrival time.
            created_at: w.created_at.or(w.timestamp).unwrap_or_else(Utc::now),
            is_read: w.is_read,
        })
    }
}

/// Read-receipt event from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadReceipt {
    /// Explicit list of message ids now read.
    Messages(Vec<String>),
    /// Every message of the conversation is read.
    Conversation(String),
}

impl ReadReceipt {
    /// Decode a `messages-read` payload: `{messageIds: [...]}` or `{appointmentId}`.
    pub fn from_payload(v: &Value) -> Option<Self> {
        if let Some(ids) = v.get("messageIds").and_then(|ids| ids.as_array()) {
            return Some(ReadReceipt::Messages(
                ids.iter().filter_map(id_ref).collect(),
            ));
        }
        v.get("appointmentId")
            .or_else(|| v.get("conversationId"))
            .and_then(id_ref)
            .map(ReadReceipt::Conversation)
    }
}

/// Response body of `GET /chat/appointment/{id}/messages`.
#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub messages: Option<Vec<Message>>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doctor_portal_shape() {
        let json = r#"{
            "_id": "m1",
            "appointmentId": "apt_1",
            "sender": {"_id": "doc_9", "name": "Dr. Who"},
            "senderRole": "doctor",
            "message": "Hello",
            "createdAt": "2024-03-01T10:00:00Z",
            "isRead": true
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.conversation_id.as_deref(), Some("apt_1"));
        assert_eq!(msg.sender_id.as_deref(), Some("doc_9"));
        assert_eq!(msg.sender_role, Some(Role::Doctor));
        assert_eq!(msg.body, "Hello");
        assert!(msg.is_read);
    }

    #[test]
    fn test_patient_portal_shape() {
        let json = r#"{
            "id": "m2",
            "sender": "u1",
            "senderRole": "user",
            "content": "Hi doc",
            "timestamp": "2024-03-01T10:05:00Z"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, "m2");
        assert_eq!(msg.sender_role, Some(Role::Patient));
        assert_eq!(msg.body, "Hi doc");
        assert!(!msg.is_read);
        assert!(msg.conversation_id.is_none());
    }

    #[test]
    fn test_message_without_id_is_rejected() {
        let res: Result<Message, _> = serde_json::from_str(r#"{"message": "orphan"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_unknown_role_is_dropped() {
        let msg: Message =
            serde_json::from_str(r#"{"_id": "m3", "senderRole": "nurse", "message": "x"}"#)
                .unwrap();
        assert!(msg.sender_role.is_none());
    }

    #[test]
    fn test_read_receipt_variants() {
        let ids = serde_json::json!({"messageIds": ["a", "b"]});
        assert_eq!(
            ReadReceipt::from_payload(&ids),
            Some(ReadReceipt::Messages(vec!["a".into(), "b".into()]))
        );
        let conv = serde_json::json!({"appointmentId": "apt_1"});
        assert_eq!(
            ReadReceipt::from_payload(&conv),
            Some(ReadReceipt::Conversation("apt_1".into()))
        );
        assert_eq!(ReadReceipt::from_payload(&serde_json::json!({})), None);
    }
}
