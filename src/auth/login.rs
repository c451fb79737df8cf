//! Password login against the clinic backend

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{SessionStore, StoredSession, StoredToken};
use crate::config::Config;
use crate::models::{id_ref, Identity, Role};

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    success: bool,
    token: Option<String>,
    user: Option<Value>,
    message: Option<String>,
}

/// Turn a login response into a stored session.
///
/// The identity comes from the `user` object of the response; the token is
/// stored as an opaque string and never decoded.
fn session_from_response(body: LoginResponse, role_override: Option<Role>) -> Result<StoredSession> {
    let reason = body.message.as_deref().unwrap_or("login rejected");
    let token = match body.token {
        Some(t) if body.success && !t.is_empty() => t,
        _ => bail!("Login failed: {}", reason),
    };
    let user = body.user.context("Login response has no user")?;

    let user_id = user
        .get("_id")
        .or_else(|| user.get("id"))
        .and_then(id_ref)
        .context("Login response user has no id")?;
    let name = ["name", "username", "email"]
        .iter()
        .find_map(|k| user.get(*k).and_then(|v| v.as_str()))
        .unwrap_or(&user_id)
        .to_string();
    let role = match role_override {
        Some(role) => role,
        None => user
            .get("role")
            .and_then(|r| r.as_str())
            .and_then(Role::parse_lenient)
            .context("Login response has no usable role; pass --role")?,
    };

    Ok(StoredSession {
        identity: Identity::new(user_id, name, role),
        token: StoredToken::new(token, None),
    })
}

/// Log in with identifier and password and persist the session.
pub async fn login(identifier: &str, password: &str, role_override: Option<Role>) -> Result<()> {
    if identifier.trim().is_empty() || password.is_empty() {
        bail!("Identifier and password are required");
    }

    let mut config = Config::load()?;
    let url = format!("{}/auth/login", config.api_url.trim_end_matches('/'));
    tracing::info!("Logging in as {} at {}", identifier, url);

    let resp = reqwest::Client::new()
        .post(&url)
        .json(&json!({ "identifier": identifier.trim(), "password": password }))
        .send()
        .await
        .context("Login request failed")?;

    let status = resp.status();
    let body: LoginResponse = resp
        .json()
        .await
        .with_context(|| format!("Failed to parse login response (HTTP {})", status))?;

    let session = session_from_response(body, role_override)?;
    let who = format!("{} ({})", session.identity.name, session.identity.role);
    config.set_session(session);
    config.save()?;

    println!("Logged in as {}.", who);
    Ok(())
}

/// Clear stored credentials
pub async fn logout() -> Result<()> {
    let mut config = Config::load()?;
    config.clear_session();
    config.save()?;
    println!("Logged out.");
    Ok(())
}

/// Display current session status
pub async fn status() -> Result<()> {
    let config = Config::load()?;

    println!("API:     {}", config.api_url);
    println!("Socket:  {}", config.socket_url);

    match config.get_session() {
        Some(session) => {
            let id = &session.identity;
            println!("User:    {} <{}>", id.name, id.user_id);
            println!("Role:    {}", id.role);
            if session.token.is_expired() {
                println!("Token:   expired");
            } else {
                println!("Token:   present");
            }
        }
        None => println!("Not logged in."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(v: Value) -> LoginResponse {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_session_from_patient_response() {
        let body = parse(json!({
            "success": true,
            "token": "jwt",
            "user": {"_id": "u1", "name": "Ann", "role": "user"}
        }));
        let session = session_from_response(body, None).unwrap();
        assert_eq!(session.identity, Identity::new("u1", "Ann", Role::Patient));
        assert_eq!(session.token.token, "jwt");
    }

    #[test]
    fn test_role_override_and_username_fallback() {
        let body = parse(json!({
            "success": true,
            "token": "jwt",
            "user": {"id": "d1", "username": "grey"}
        }));
        let session = session_from_response(body, Some(Role::Doctor)).unwrap();
        assert_eq!(session.identity, Identity::new("d1", "grey", Role::Doctor));
    }

    #[test]
    fn test_rejected_login_carries_server_message() {
        let body = parse(json!({"success": false, "message": "Invalid credentials"}));
        let err = session_from_response(body, None).unwrap_err();
        assert!(err.to_string().contains("Invalid credentials"));
    }

    #[test]
    fn test_missing_role_is_an_error() {
        let body = parse(json!({"success": true, "token": "t", "user": {"_id": "x"}}));
        assert!(session_from_response(body, None).is_err());
    }
}
