//! Fake providers shared by the connect and repository tests.

use super::factory::{
    OAuth1ConnectionFactory, OAuth1ServiceProvider, OAuth2ConnectionFactory, OAuth2ServiceProvider,
    ServiceApiAdapter,
};
use super::key::ServiceProfile;
use super::registry::ConnectionFactoryRegistry;
use crate::oauth::{OAuth1Operations, OAuth2Operations};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// OAuth2 test API: remembers the token it was built with.
#[derive(Debug)]
pub struct AlphaApi {
    pub access_token: String,
}

pub struct AlphaProvider {
    operations: OAuth2Operations,
}

impl OAuth2ServiceProvider<AlphaApi> for AlphaProvider {
    fn oauth_operations(&self) -> &OAuth2Operations {
        &self.operations
    }

    fn api(&self, access_token: &str) -> AlphaApi {
        AlphaApi {
            access_token: access_token.to_string(),
        }
    }
}

/// Reads `user_id` from the grant extras; `fail` makes it error.
pub struct AlphaAdapter;

#[async_trait]
impl ServiceApiAdapter<AlphaApi> for AlphaAdapter {
    async fn resolve_profile(
        &self,
        _api: &AlphaApi,
        extra: &HashMap<String, String>,
    ) -> Result<ServiceProfile> {
        if extra.contains_key("fail") {
            return Err(anyhow!("profile endpoint unavailable"));
        }
        let user_id = extra.get("user_id").cloned().unwrap_or_default();
        Ok(ServiceProfile {
            display_name: Some(format!("User {}", user_id)),
            profile_url: Some(format!("https://alpha.example/{}", user_id)),
            image_url: None,
            provider_user_id: user_id,
        })
    }
}

/// OAuth1 test API.
#[derive(Debug)]
pub struct BetaApi {
    pub access_token: String,
    pub secret: String,
}

pub struct BetaProvider {
    operations: OAuth1Operations,
}

impl OAuth1ServiceProvider<BetaApi> for BetaProvider {
    fn oauth_operations(&self) -> &OAuth1Operations {
        &self.operations
    }

    fn api(&self, access_token: &str, secret: &str) -> BetaApi {
        BetaApi {
            access_token: access_token.to_string(),
            secret: secret.to_string(),
        }
    }
}

pub struct BetaAdapter;

#[async_trait]
impl ServiceApiAdapter<BetaApi> for BetaAdapter {
    async fn resolve_profile(
        &self,
        _api: &BetaApi,
        extra: &HashMap<String, String>,
    ) -> Result<ServiceProfile> {
        let user_id = extra.get("user_id").cloned().unwrap_or_default();
        Ok(ServiceProfile {
            display_name: Some(format!("beta{}", user_id)),
            profile_url: None,
            image_url: None,
            provider_user_id: user_id,
        })
    }
}

pub fn oauth2_factory(provider_id: &str) -> OAuth2ConnectionFactory<AlphaApi> {
    oauth2_factory_with_token_url(provider_id, "https://alpha.example/oauth/token")
}

pub fn oauth2_factory_with_token_url(
    provider_id: &str,
    token_url: &str,
) -> OAuth2ConnectionFactory<AlphaApi> {
    let operations = OAuth2Operations::new(
        "alpha_client",
        "alpha_secret",
        "https://alpha.example/oauth/authorize",
        token_url,
    );
    OAuth2ConnectionFactory::new(provider_id, AlphaProvider { operations }, AlphaAdapter)
}

pub fn oauth1_factory(provider_id: &str) -> OAuth1ConnectionFactory<BetaApi> {
    let operations = OAuth1Operations::new(
        "beta_key",
        "beta_secret",
        "https://beta.example/oauth/request_token",
        "https://beta.example/oauth/authorize",
        "https://beta.example/oauth/access_token",
    );
    OAuth1ConnectionFactory::new(provider_id, BetaProvider { operations }, BetaAdapter)
}

/// Registry with `p1` (OAuth2, [`AlphaApi`]) and `beta` (OAuth1, [`BetaApi`]).
pub fn test_registry() -> ConnectionFactoryRegistry {
    ConnectionFactoryRegistry::builder()
        .register(oauth2_factory("p1"))
        .and_then(|b| b.register(oauth1_factory("beta")))
        .expect("test factories are distinct")
        .build()
}
