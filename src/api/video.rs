//! Media-room credential endpoint

use super::client::ApiClient;
use crate::calling::room::RoomCredential;
use crate::calling::signaling::CredentialProvider;
use crate::error::ClientError;
use crate::models::{TokenRequest, TokenResponse};

// Auth failures stay auth failures; anything else failed the call setup.
fn as_signaling(e: ClientError) -> ClientError {
    match e {
        ClientError::Auth(_) | ClientError::Signaling(_) => e,
        other => ClientError::Signaling(other.message().to_string()),
    }
}

/// Request a short-lived credential for `{roomName, userId, userName}`.
pub async fn request_token(
    client: &ApiClient,
    request: &TokenRequest,
) -> Result<RoomCredential, ClientError> {
    tracing::info!(
        "Requesting media credential for room {} (user {})",
        request.room_name,
        request.user_id
    );

    let resp = client
        .post("/video/token", request)
        .await
        .map_err(as_signaling)?;

    let body: TokenResponse = resp
        .json()
        .await
        .map_err(|e| ClientError::Signaling(format!("Failed to parse token response: {}", e)))?;

    match body.token {
        Some(token) if body.success && !token.is_empty() => Ok(RoomCredential {
            token,
            room_name: request.room_name.clone(),
        }),
        _ => Err(ClientError::Signaling(
            body.message
                .unwrap_or_else(|| "Failed to get video token".to_string()),
        )),
    }
}

impl CredentialProvider for ApiClient {
    async fn request_credential(
        &self,
        request: &TokenRequest,
    ) -> Result<RoomCredential, ClientError> {
        request_token(self, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_map_to_signaling_without_double_prefix() {
        let mapped = as_signaling(ClientError::Transport("HTTP 500 for /video/token: boom".into()));
        assert_eq!(
            mapped,
            ClientError::Signaling("HTTP 500 for /video/token: boom".into())
        );
        assert_eq!(
            mapped.to_string(),
            "call signaling failed: HTTP 500 for /video/token: boom"
        );

        let auth = as_signaling(ClientError::Auth("HTTP 401".into()));
        assert!(auth.is_auth());
    }
}
