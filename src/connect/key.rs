use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a remote account uniquely within a provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionKey {
    provider_id: String,
    provider_user_id: String,
}

impl ConnectionKey {
    pub fn new(provider_id: impl Into<String>, provider_user_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            provider_user_id: provider_user_id.into(),
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn provider_user_id(&self) -> &str {
        &self.provider_user_id
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider_id, self.provider_user_id)
    }
}

/// Profile of the remote account as reported by the provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProfile {
    /// The provider's stable identifier for the account
    pub provider_user_id: String,
    pub display_name: Option<String>,
    pub profile_url: Option<String>,
    pub image_url: Option<String>,
}

/// Serializable snapshot of a connection.
///
/// Token fields are plain text here. The repository encrypts them on write
/// and decrypts them on read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionData {
    pub provider_id: String,
    pub provider_user_id: String,
    pub display_name: Option<String>,
    pub profile_url: Option<String>,
    pub image_url: Option<String>,

    /// Access token (OAuth1 and OAuth2)
    pub access_token: String,

    /// Token secret (OAuth1 only)
    pub secret: Option<String>,

    /// Refresh token (OAuth2 only)
    pub refresh_token: Option<String>,

    /// When the access token expires (OAuth2 only)
    pub expire_time: Option<DateTime<Utc>>,
}

impl ConnectionData {
    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new(&self.provider_id, &self.provider_user_id)
    }
}
