//! Twitter (OAuth1).
//!
//! Twitter's access token response already identifies the account
//! (`user_id`, `screen_name`), so connecting makes no API call.

use crate::config::ProviderCredentials;
use anyhow::Result;
use async_trait::async_trait;
use social_connect::connect::{
    OAuth1ConnectionFactory, OAuth1ServiceProvider, ServiceApiAdapter, ServiceProfile,
};
use social_connect::oauth::OAuth1Operations;
use std::collections::HashMap;

pub const PROVIDER_ID: &str = "twitter";
pub const API_URL_BASE: &str = "https://api.twitter.com/1/";
pub const REQUEST_TOKEN_URL: &str = "https://api.twitter.com/oauth/request_token";
pub const AUTH_URL: &str = "https://api.twitter.com/oauth/authorize";
pub const ACCESS_TOKEN_URL: &str = "https://api.twitter.com/oauth/access_token";

/// Token material for signed Twitter API requests.
pub struct TwitterApi {
    consumer_key: String,
    consumer_secret: String,
    access_token: String,
    access_token_secret: String,
}

impl TwitterApi {
    pub fn new(
        consumer_key: String,
        consumer_secret: String,
        access_token: String,
        access_token_secret: String,
    ) -> Self {
        Self {
            consumer_key,
            consumer_secret,
            access_token,
            access_token_secret,
        }
    }

    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    pub fn consumer_secret(&self) -> &str {
        &self.consumer_secret
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn access_token_secret(&self) -> &str {
        &self.access_token_secret
    }

    /// True when both halves of the access token are present.
    pub fn is_authorized(&self) -> bool {
        !self.access_token.is_empty() && !self.access_token_secret.is_empty()
    }

    pub fn profile_url(screen_name: &str) -> String {
        format!("http://twitter.com/{}", screen_name)
    }
}

/// Builds [`TwitterApi`] values for the configured consumer.
pub struct TwitterServiceProvider {
    operations: OAuth1Operations,
}

impl TwitterServiceProvider {
    pub fn new(credentials: &ProviderCredentials) -> Self {
        Self {
            operations: OAuth1Operations::new(
                credentials.client_id.as_str(),
                credentials.client_secret.as_str(),
                REQUEST_TOKEN_URL,
                AUTH_URL,
                ACCESS_TOKEN_URL,
            ),
        }
    }
}

impl OAuth1ServiceProvider<TwitterApi> for TwitterServiceProvider {
    fn oauth_operations(&self) -> &OAuth1Operations {
        &self.operations
    }

    fn api(&self, access_token: &str, secret: &str) -> TwitterApi {
        TwitterApi::new(
            self.operations.consumer_key().to_string(),
            self.operations.consumer_secret().to_string(),
            access_token.to_string(),
            secret.to_string(),
        )
    }
}

/// Reads `user_id` and `screen_name` from the access token response.
pub struct TwitterAdapter;

#[async_trait]
impl ServiceApiAdapter<TwitterApi> for TwitterAdapter {
    async fn resolve_profile(
        &self,
        _api: &TwitterApi,
        extra: &HashMap<String, String>,
    ) -> Result<ServiceProfile> {
        let screen_name = extra.get("screen_name").cloned();
        Ok(ServiceProfile {
            provider_user_id: extra.get("user_id").cloned().unwrap_or_default(),
            display_name: screen_name.as_ref().map(|name| format!("@{}", name)),
            profile_url: screen_name.as_deref().map(TwitterApi::profile_url),
            image_url: None,
        })
    }
}

/// Connection factory for Twitter.
pub fn connection_factory(credentials: &ProviderCredentials) -> OAuth1ConnectionFactory<TwitterApi> {
    OAuth1ConnectionFactory::new(
        PROVIDER_ID,
        TwitterServiceProvider::new(credentials),
        TwitterAdapter,
    )
}
