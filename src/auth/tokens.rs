//! Token and session storage

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::Identity;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Stored bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub expires_at: Option<u64>,
}

impl StoredToken {
    pub fn new(token: String, expires_in_secs: Option<u64>) -> Self {
        let expires_at = expires_in_secs.map(|secs| now_secs() + secs);
        Self { token, expires_at }
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            // Consider expired if less than 5 minutes remaining
            Some(exp) => now_secs() + 300 >= exp,
            None => false,
        }
    }
}

/// Authenticated session: who we are plus the bearer token proving it.
///
/// The identity comes from the login response; it is never re-derived from
/// the token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub identity: Identity,
    pub token: StoredToken,
}

/// Session store trait for different storage backends
pub trait SessionStore {
    fn get_session(&self) -> Option<StoredSession>;
    fn set_session(&mut self, session: StoredSession);
    fn clear_session(&mut self);

    fn identity(&self) -> Option<Identity> {
        self.get_session().map(|s| s.identity)
    }

    /// Bearer token, if present and not expired.
    fn bearer_token(&self) -> Option<String> {
        self.get_session()
            .map(|s| s.token)
            .filter(|t| !t.is_expired())
            .map(|t| t.token)
    }
}
