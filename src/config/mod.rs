use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable holding the base64 token encryption key
pub const ENCRYPTION_KEY_ENV: &str = "SOCIAL_CONNECT_ENCRYPTION_KEY";

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub oauth: OAuthFlowConfig,
}

/// Connection store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "connections.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Public base URL providers redirect back to
    #[serde(default = "default_callback_base_url")]
    pub callback_base_url: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3100".to_string()
}

fn default_callback_base_url() -> String {
    "http://localhost:3100".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            callback_base_url: default_callback_base_url(),
        }
    }
}

/// Authorization flow configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthFlowConfig {
    /// How long a CSRF state parameter stays valid (seconds)
    #[serde(default = "default_state_expiry")]
    pub state_expiry_seconds: i64,
    /// How often expired states are purged (seconds)
    #[serde(default = "default_state_cleanup_interval")]
    pub state_cleanup_interval_seconds: u64,
}

fn default_state_expiry() -> i64 {
    600
}

fn default_state_cleanup_interval() -> u64 {
    60
}

impl Default for OAuthFlowConfig {
    fn default() -> Self {
        Self {
            state_expiry_seconds: default_state_expiry(),
            state_cleanup_interval_seconds: default_state_cleanup_interval(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<ConnectConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config {}", path))?;
    let config: ConnectConfig =
        toml::from_str(&contents).with_context(|| format!("failed to parse config {}", path))?;
    Ok(config)
}

/// Token encryption key from `SOCIAL_CONNECT_ENCRYPTION_KEY`, if set and non-empty.
pub fn encryption_key_from_env() -> Option<String> {
    std::env::var(ENCRYPTION_KEY_ENV)
        .ok()
        .filter(|key| !key.trim().is_empty())
}
