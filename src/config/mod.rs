//! Configuration and credential storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::auth::{SessionStore, StoredSession};

const DEFAULT_API_URL: &str = "http://localhost:5001/api";
const DEFAULT_SOCKET_URL: &str = "http://localhost:5001";

/// Application configuration
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// REST API base URL (e.g. `http://host:5001/api`)
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Socket.io server origin (e.g. `http://host:5001`)
    #[serde(default = "default_socket_url")]
    pub socket_url: String,
    /// Auto-decline incoming calls left unanswered this long. Disabled when unset.
    pub ringing_timeout_secs: Option<u64>,
    /// Authenticated identity and bearer token (from last login)
    pub session: Option<StoredSession>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_socket_url() -> String {
    DEFAULT_SOCKET_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            socket_url: default_socket_url(),
            ringing_timeout_secs: None,
            session: None,
        }
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "consult-cli", "consult-cli")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path).context("Failed to read config file")?;
            Self::parse(&content)?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// `CONSULT_API_URL` / `CONSULT_SOCKET_URL` win over the file.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("CONSULT_API_URL").filter(|s| !s.is_empty()) {
            self.api_url = url;
        }
        if let Some(url) = var("CONSULT_SOCKET_URL").filter(|s| !s.is_empty()) {
            self.socket_url = url;
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }
}

impl SessionStore for Config {
    fn get_session(&self) -> Option<StoredSession> {
        self.session.clone()
    }

    fn set_session(&mut self, session: StoredSession) {
        self.session = Some(session);
    }

    fn clear_session(&mut self) {
        self.session = None;
    }
}
