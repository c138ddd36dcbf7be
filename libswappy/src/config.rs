//! Configuration management for Swappy
//!
//! Configuration comes from an optional TOML file plus environment
//! overrides. The hosted backend URL and public key are required: a
//! half-configured client is never started.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

pub const ENV_CONFIG_PATH: &str = "SWAPPY_CONFIG";
pub const ENV_BACKEND_URL: &str = "SWAPPY_BACKEND_URL";
pub const ENV_BACKEND_ANON_KEY: &str = "SWAPPY_BACKEND_ANON_KEY";
pub const ENV_STORAGE_PATH: &str = "SWAPPY_STORAGE_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Hosted auth/database service coordinates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub url: String,
    /// Public (anon) API key sent with every request
    #[serde(default)]
    pub anon_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
    /// Upper bound on the browser round trip, e.g. "15s"
    #[serde(default = "default_oauth_timeout")]
    pub oauth_timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_provider() -> String {
    "google".to_string()
}

fn default_redirect_url() -> String {
    "swappy://oauth-callback".to_string()
}

fn default_oauth_timeout() -> String {
    "15s".to_string()
}

fn default_storage_path() -> String {
    "~/.local/share/swappy/session.json".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            redirect_url: default_redirect_url(),
            oauth_timeout: default_oauth_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl StorageConfig {
    /// Storage path with `~` expanded
    pub fn expand_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

impl Config {
    /// Load configuration from the default location, apply environment
    /// overrides and validate.
    ///
    /// A missing config file is fine as long as the environment supplies
    /// the backend settings.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            tracing::debug!("No config file at {:?}, using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path (no env overrides, no validation)
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Overlay `SWAPPY_BACKEND_URL`, `SWAPPY_BACKEND_ANON_KEY` and
    /// `SWAPPY_STORAGE_PATH` when they are set and non-empty
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env(ENV_BACKEND_URL) {
            self.backend.url = url;
        }
        if let Some(key) = non_empty_env(ENV_BACKEND_ANON_KEY) {
            self.backend.anon_key = key;
        }
        if let Some(path) = non_empty_env(ENV_STORAGE_PATH) {
            self.storage.path = path;
        }
    }

    /// Check required fields and value formats
    pub fn validate(&self) -> Result<()> {
        let url = self.backend.url.trim();
        if url.is_empty() {
            return Err(ConfigError::MissingField(format!(
                "backend.url (or {})",
                ENV_BACKEND_URL
            ))
            .into());
        }
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::InvalidValue {
                field: "backend.url".to_string(),
                reason: format!("'{}' is not an http(s) URL", url),
            }
            .into());
        }
        if self.backend.anon_key.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "backend.anon_key (or {})",
                ENV_BACKEND_ANON_KEY
            ))
            .into());
        }
        if self.auth.redirect_url.trim().is_empty() {
            return Err(ConfigError::MissingField("auth.redirect_url".to_string()).into());
        }
        self.oauth_timeout()?;
        Ok(())
    }

    /// Parsed `auth.oauth_timeout`
    pub fn oauth_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.auth.oauth_timeout).map_err(|e| {
            ConfigError::InvalidValue {
                field: "auth.oauth_timeout".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve the configuration file path under the XDG config directory
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("swappy").join("config.toml"))
}
