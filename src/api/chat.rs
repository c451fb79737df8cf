//! Appointment chat REST endpoints
//!
//! History fetch, conversation read-marking and the REST send path used by
//! one of the portal variants in place of the channel send.

use serde_json::json;

use super::client::{path_segment, ApiClient};
use crate::chat::ChatBackend;
use crate::error::ClientError;
use crate::models::{Message, MessagesResponse};

/// Fetch the stored history of one appointment conversation.
pub async fn fetch_messages(
    client: &ApiClient,
    appointment_id: &str,
) -> Result<Vec<Message>, ClientError> {
    let id = path_segment(appointment_id)?;
    let resp = client
        .get(&format!("/chat/appointment/{}/messages", id))
        .await?;

    let body: MessagesResponse = resp
        .json()
        .await
        .map_err(|e| ClientError::Transport(format!("Failed to parse messages response: {}", e)))?;

    if !body.success {
        return Err(ClientError::Transport(format!(
            "history fetch rejected: {}",
            body.message.as_deref().unwrap_or("no reason given")
        )));
    }

    Ok(body.messages.unwrap_or_default())
}

/// Mark all unread inbound messages of the conversation as read.
pub async fn mark_read(client: &ApiClient, appointment_id: &str) -> Result<(), ClientError> {
    let id = path_segment(appointment_id)?;
    client
        .put(&format!("/chat/appointment/{}/read", id), &json!({}))
        .await?;
    Ok(())
}

/// Send a message through REST instead of the channel.
pub async fn post_message(
    client: &ApiClient,
    appointment_id: &str,
    body: &str,
) -> Result<(), ClientError> {
    let id = path_segment(appointment_id)?;
    let text = body.trim();
    if text.is_empty() {
        return Err(ClientError::Validation("message body is empty".into()));
    }

    tracing::debug!("Posting message to appointment {}", id);
    client
        .post(
            &format!("/chat/appointment/{}/message", id),
            &json!({ "message": text }),
        )
        .await?;
    Ok(())
}

impl ChatBackend for ApiClient {
    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>, ClientError> {
        fetch_messages(self, conversation_id).await
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<(), ClientError> {
        mark_read(self, conversation_id).await
    }

    async fn post_message(&self, conversation_id: &str, body: &str) -> Result<(), ClientError> {
        post_message(self, conversation_id, body).await
    }
}
