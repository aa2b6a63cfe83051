//! Facebook (OAuth2, Graph API).

pub mod api;

pub use api::{Album, Checkin, FacebookApi, FacebookProfile, Reference};

use crate::config::ProviderCredentials;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use social_connect::connect::{
    OAuth2ConnectionFactory, OAuth2ServiceProvider, ServiceApiAdapter, ServiceProfile,
};
use social_connect::oauth::OAuth2Operations;
use std::collections::HashMap;

pub const PROVIDER_ID: &str = "facebook";
pub const BASE_URL: &str = "https://graph.facebook.com";
pub const AUTH_URL: &str = "https://graph.facebook.com/oauth/authorize";
pub const TOKEN_URL: &str = "https://graph.facebook.com/oauth/access_token";
pub const SCOPES: &[&str] = &["email", "user_photos", "user_checkins"];

/// Builds [`FacebookApi`] clients for the configured application.
pub struct FacebookServiceProvider {
    operations: OAuth2Operations,
    http_client: Client,
    base_url: String,
}

impl FacebookServiceProvider {
    pub fn new(credentials: &ProviderCredentials) -> Self {
        let operations = OAuth2Operations::new(
            credentials.client_id.as_str(),
            credentials.client_secret.as_str(),
            AUTH_URL,
            TOKEN_URL,
        )
        .with_scopes(SCOPES.iter().copied());
        Self::with_operations(operations, BASE_URL.to_string())
    }

    /// Custom endpoints (for testing with a mock server).
    pub fn with_operations(operations: OAuth2Operations, base_url: String) -> Self {
        Self {
            operations,
            http_client: Client::new(),
            base_url,
        }
    }
}

impl OAuth2ServiceProvider<FacebookApi> for FacebookServiceProvider {
    fn oauth_operations(&self) -> &OAuth2Operations {
        &self.operations
    }

    fn api(&self, access_token: &str) -> FacebookApi {
        FacebookApi::new(
            access_token.to_string(),
            self.http_client.clone(),
            self.base_url.clone(),
        )
    }
}

/// Resolves the remote account through `/me`.
pub struct FacebookAdapter;

#[async_trait]
impl ServiceApiAdapter<FacebookApi> for FacebookAdapter {
    async fn resolve_profile(
        &self,
        api: &FacebookApi,
        _extra: &HashMap<String, String>,
    ) -> Result<ServiceProfile> {
        let profile = api.user_profile().await?;
        Ok(ServiceProfile {
            display_name: profile.name,
            profile_url: Some(
                profile
                    .link
                    .unwrap_or_else(|| format!("http://www.facebook.com/profile.php?id={}", profile.id)),
            ),
            image_url: Some(format!("{}/{}/picture", BASE_URL, profile.id)),
            provider_user_id: profile.id,
        })
    }
}

/// Connection factory for Facebook.
pub fn connection_factory(credentials: &ProviderCredentials) -> OAuth2ConnectionFactory<FacebookApi> {
    OAuth2ConnectionFactory::new(
        PROVIDER_ID,
        FacebookServiceProvider::new(credentials),
        FacebookAdapter,
    )
}
