use crate::config::ProviderCredentials;
use crate::{facebook, gowalla, twitter};
use anyhow::{Context, Result};
use social_connect::connect::{ConnectionFactoryRegistry, RegistryBuilder};
use tracing::{info, warn};

/// Provider IDs this crate knows how to connect to.
pub const PROVIDER_IDS: &[&str] = &[facebook::PROVIDER_ID, gowalla::PROVIDER_ID, twitter::PROVIDER_ID];

/// Registry of every provider with client credentials in the environment.
///
/// Providers without credentials are skipped with a warning.
pub fn default_registry() -> Result<ConnectionFactoryRegistry> {
    registry_with(|provider_id| match ProviderCredentials::from_env(provider_id) {
        Ok(credentials) => Some(credentials),
        Err(e) => {
            warn!(provider_id = %provider_id, error = %e, "Provider not configured, skipping");
            None
        }
    })
}

/// Registry built from a credentials lookup.
pub fn registry_with<F>(credentials_for: F) -> Result<ConnectionFactoryRegistry>
where
    F: Fn(&str) -> Option<ProviderCredentials>,
{
    let mut builder = RegistryBuilder::new();

    if let Some(credentials) = credentials_for(facebook::PROVIDER_ID) {
        builder = builder
            .register(facebook::connection_factory(&credentials))
            .context("Failed to register Facebook")?;
    }
    if let Some(credentials) = credentials_for(gowalla::PROVIDER_ID) {
        builder = builder
            .register(gowalla::connection_factory(&credentials))
            .context("Failed to register Gowalla")?;
    }
    if let Some(credentials) = credentials_for(twitter::PROVIDER_ID) {
        builder = builder
            .register(twitter::connection_factory(&credentials))
            .context("Failed to register Twitter")?;
    }

    let registry = builder.build();
    info!(providers = ?registry.registered_provider_ids(), "Connection factory registry built");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facebook::FacebookApi;
    use crate::twitter::TwitterApi;
    use social_connect::connect::AuthProtocol;

    fn credentials() -> ProviderCredentials {
        ProviderCredentials::new("id", "secret")
    }

    #[test]
    fn test_registry_with_all_providers() {
        let registry = registry_with(|_| Some(credentials())).unwrap();
        assert_eq!(registry.registered_provider_ids(), vec!["facebook", "gowalla", "twitter"]);

        assert_eq!(registry.provider_id_for_api::<FacebookApi>().unwrap(), "facebook");
        assert_eq!(
            registry.lookup_by_api_type::<TwitterApi>().unwrap().protocol(),
            AuthProtocol::OAuth1
        );
        assert_eq!(
            registry.lookup_by_provider_id("gowalla").unwrap().protocol(),
            AuthProtocol::OAuth2
        );
    }

    #[test]
    fn test_registry_skips_unconfigured() {
        let registry = registry_with(|id| (id == "twitter").then(credentials)).unwrap();
        assert_eq!(registry.registered_provider_ids(), vec!["twitter"]);
        assert!(registry.lookup_by_provider_id("facebook").is_err());
    }

    #[test]
    fn test_provider_ids() {
        assert_eq!(PROVIDER_IDS, &["facebook", "gowalla", "twitter"]);
    }
}
