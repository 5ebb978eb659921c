//! Configuration loading and persistence.
//!
//! Handles reading and writing the pushlink configuration file. The push
//! token itself is never written here; it lives in the token store.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;

/// Configuration for pushlink.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the backend.
    pub server_url: String,
    /// Project identifier required for token issuance.
    ///
    /// When unset, the platform is asked for one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Per-request timeout in seconds for backend calls.
    pub request_timeout_secs: u64,
    /// Token handed out by the static platform (hosts without a native push
    /// service). NOT serialized to disk.
    #[serde(skip)]
    pub push_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: constants::DEFAULT_SERVER_URL.to_string(),
            project_id: None,
            request_timeout_secs: constants::HTTP_REQUEST_TIMEOUT.as_secs(),
            push_token: None,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `PUSHLINK_CONFIG_DIR` env var: explicit override
    /// 2. Default: platform config dir (macOS: ~/Library/Application Support/pushlink)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("PUSHLINK_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("pushlink")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file().unwrap_or_else(|e| {
            log::debug!("Using default configuration: {e}");
            Self::default()
        });
        config.apply_env_overrides();
        Ok(config)
    }

    /// Path of the configuration file.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    fn load_from_file() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Reads a configuration file, without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Config file not found");
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(server_url) = std::env::var("PUSHLINK_SERVER_URL") {
            self.server_url = server_url;
        }

        if let Ok(project_id) = std::env::var("PUSHLINK_PROJECT_ID") {
            self.project_id = Some(project_id).filter(|p| !p.is_empty());
        }

        if let Ok(timeout) = std::env::var("PUSHLINK_REQUEST_TIMEOUT") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.request_timeout_secs = secs;
            }
        }

        if let Ok(token) = std::env::var("PUSHLINK_PUSH_TOKEN") {
            self.push_token = Some(token).filter(|t| !t.is_empty());
        }
    }

    /// Persists the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Writes the configuration to `path` (owner read/write only).
    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Per-request timeout as a [`Duration`]. Zero falls back to the default.
    pub fn request_timeout(&self) -> Duration {
        if self.request_timeout_secs == 0 {
            constants::HTTP_REQUEST_TIMEOUT
        } else {
            Duration::from_secs(self.request_timeout_secs)
        }
    }
}
