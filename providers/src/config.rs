use anyhow::{Context, Result};

/// OAuth client credentials for one provider application.
///
/// Loaded from environment variables:
/// - `SOCIAL_OAUTH_<PROVIDER>_CLIENT_ID`
/// - `SOCIAL_OAUTH_<PROVIDER>_CLIENT_SECRET`
///
/// For OAuth1 providers these hold the consumer key and secret.
#[derive(Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ProviderCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Load credentials for a provider from environment variables.
    pub fn from_env(provider_id: &str) -> Result<Self> {
        let (id_var, secret_var) = env_var_names(provider_id);
        let client_id = std::env::var(&id_var).with_context(|| format!("{} not set", id_var))?;
        let client_secret =
            std::env::var(&secret_var).with_context(|| format!("{} not set", secret_var))?;
        Ok(Self {
            client_id,
            client_secret,
        })
    }
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Environment variable names holding a provider's client ID and secret.
pub fn env_var_names(provider_id: &str) -> (String, String) {
    let upper = provider_id.to_uppercase();
    (
        format!("SOCIAL_OAUTH_{}_CLIENT_ID", upper),
        format!("SOCIAL_OAUTH_{}_CLIENT_SECRET", upper),
    )
}
