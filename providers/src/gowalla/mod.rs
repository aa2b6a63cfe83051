//! Gowalla (OAuth2).

pub mod api;

pub use api::{profile_page_url, Checkin, GowallaApi, GowallaProfile};

use crate::config::ProviderCredentials;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use social_connect::connect::{
    OAuth2ConnectionFactory, OAuth2ServiceProvider, ServiceApiAdapter, ServiceProfile,
};
use social_connect::oauth::OAuth2Operations;
use std::collections::HashMap;

pub const PROVIDER_ID: &str = "gowalla";
pub const BASE_URL: &str = "https://api.gowalla.com";
pub const AUTH_URL: &str = "https://gowalla.com/api/oauth/new";
pub const TOKEN_URL: &str = "https://api.gowalla.com/api/oauth/token";

/// Builds [`GowallaApi`] clients for the configured application.
pub struct GowallaServiceProvider {
    operations: OAuth2Operations,
    http_client: Client,
    base_url: String,
}

impl GowallaServiceProvider {
    pub fn new(credentials: &ProviderCredentials) -> Self {
        let operations = OAuth2Operations::new(
            credentials.client_id.as_str(),
            credentials.client_secret.as_str(),
            AUTH_URL,
            TOKEN_URL,
        );
        Self::with_operations(operations, BASE_URL.to_string())
    }

    pub fn with_operations(operations: OAuth2Operations, base_url: String) -> Self {
        Self {
            operations,
            http_client: Client::new(),
            base_url,
        }
    }
}

impl OAuth2ServiceProvider<GowallaApi> for GowallaServiceProvider {
    fn oauth_operations(&self) -> &OAuth2Operations {
        &self.operations
    }

    fn api(&self, access_token: &str) -> GowallaApi {
        GowallaApi::new(
            access_token.to_string(),
            self.http_client.clone(),
            self.base_url.clone(),
        )
    }
}

/// Resolves the remote account from the `me` profile.
pub struct GowallaAdapter;

#[async_trait]
impl ServiceApiAdapter<GowallaApi> for GowallaAdapter {
    async fn resolve_profile(
        &self,
        api: &GowallaApi,
        _extra: &HashMap<String, String>,
    ) -> Result<ServiceProfile> {
        let profile = api.user_profile("me").await?;
        Ok(ServiceProfile {
            display_name: profile.full_name(),
            profile_url: Some(profile_page_url(&profile.username)),
            image_url: profile.large_image_url,
            provider_user_id: profile.username,
        })
    }
}

/// Connection factory for Gowalla.
pub fn connection_factory(credentials: &ProviderCredentials) -> OAuth2ConnectionFactory<GowallaApi> {
    OAuth2ConnectionFactory::new(
        PROVIDER_ID,
        GowallaServiceProvider::new(credentials),
        GowallaAdapter,
    )
}
