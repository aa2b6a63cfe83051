//! OAuth endpoint operations for a provider application.
//!
//! OAuth2 covers the whole authorization code flow (authorize URL, code
//! exchange, refresh). OAuth1 only builds the authorize URL; request signing
//! for the token endpoints is handled outside this crate.

use super::grant::AccessGrant;
use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use std::collections::HashMap;

/// OAuth2 client configuration and token endpoint calls for one provider.
#[derive(Clone)]
pub struct OAuth2Operations {
    client_id: String,
    client_secret: String,
    authorize_url: String,
    access_token_url: String,
    scopes: Vec<String>,
    http_client: reqwest::Client,
}

impl OAuth2Operations {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        authorize_url: impl Into<String>,
        access_token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorize_url: authorize_url.into(),
            access_token_url: access_token_url.into(),
            scopes: Vec::new(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Sets the scopes requested on the authorize URL.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn access_token_url(&self) -> &str {
        &self.access_token_url
    }

    /// Build authorization URL with state and redirect_uri
    pub fn build_authorize_url(&self, state: &str, redirect_uri: &str) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&scope={}&state={}&response_type=code",
            self.authorize_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }

    /// Exchange an authorization code for an access grant.
    pub async fn exchange_for_access(&self, code: &str, redirect_uri: &str) -> Result<AccessGrant> {
        let mut form_data = HashMap::new();
        form_data.insert("grant_type", "authorization_code");
        form_data.insert("code", code);
        form_data.insert("redirect_uri", redirect_uri);
        form_data.insert("client_id", self.client_id.as_str());
        form_data.insert("client_secret", self.client_secret.as_str());

        tracing::debug!("Exchanging authorization code for token at {}", self.access_token_url);
        self.post_for_access(&form_data).await
    }

    /// Exchange a refresh token for a new access grant.
    pub async fn refresh_access(&self, refresh_token: &str) -> Result<AccessGrant> {
        let mut form_data = HashMap::new();
        form_data.insert("grant_type", "refresh_token");
        form_data.insert("refresh_token", refresh_token);
        form_data.insert("client_id", self.client_id.as_str());
        form_data.insert("client_secret", self.client_secret.as_str());

        tracing::debug!("Refreshing access token at {}", self.access_token_url);
        self.post_for_access(&form_data).await
    }

    async fn post_for_access(&self, form_data: &HashMap<&str, &str>) -> Result<AccessGrant> {
        let response = self
            .http_client
            .post(&self.access_token_url)
            .header("Accept", "application/json")
            .form(form_data)
            .send()
            .await
            .context("Failed to send token request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("Token request failed with status {}: {}", status, body));
        }

        let body = response
            .text()
            .await
            .context("Failed to read token response")?;
        let grant = parse_token_response(&body)?;

        tracing::debug!(
            "Token request successful, has_refresh_token={}, expires={:?}",
            grant.refresh_token.is_some(),
            grant.expire_time
        );

        Ok(grant)
    }
}

/// Parse a token endpoint response into an access grant.
///
/// Accepts standard JSON bodies as well as the form-encoded bodies some
/// providers (Facebook) still return. Fields other than the standard ones are
/// kept in `extra`.
fn parse_token_response(body: &str) -> Result<AccessGrant> {
    let mut fields: HashMap<String, String> =
        match serde_json::from_str::<HashMap<String, serde_json::Value>>(body) {
            Ok(json) => json
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| {
                    let value = match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (k, value)
                })
                .collect(),
            Err(_) => serde_urlencoded::from_str(body).context("Failed to parse token response")?,
        };

    let access_token = fields
        .remove("access_token")
        .ok_or_else(|| anyhow!("Token response does not contain an access_token"))?;
    let refresh_token = fields.remove("refresh_token");
    let scope = fields.remove("scope");
    fields.remove("token_type");

    let expires_in = fields
        .remove("expires_in")
        .or_else(|| fields.remove("expires"))
        .map(|s| s.parse::<i64>())
        .transpose()
        .context("Token response expires_in is not a number")?;
    let expire_time = expires_in.map(|seconds| Utc::now() + Duration::seconds(seconds));

    Ok(AccessGrant {
        access_token,
        refresh_token,
        expire_time,
        scope,
        extra: fields,
    })
}

/// OAuth1 consumer configuration for one provider.
#[derive(Clone, Debug)]
pub struct OAuth1Operations {
    consumer_key: String,
    consumer_secret: String,
    request_token_url: String,
    authorize_url: String,
    access_token_url: String,
}

impl OAuth1Operations {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        request_token_url: impl Into<String>,
        authorize_url: impl Into<String>,
        access_token_url: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            request_token_url: request_token_url.into(),
            authorize_url: authorize_url.into(),
            access_token_url: access_token_url.into(),
        }
    }

    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    pub fn consumer_secret(&self) -> &str {
        &self.consumer_secret
    }

    pub fn request_token_url(&self) -> &str {
        &self.request_token_url
    }

    pub fn access_token_url(&self) -> &str {
        &self.access_token_url
    }

    /// Build the URL the user is sent to for authorizing a request token.
    pub fn build_authorize_url(&self, request_token: &str, callback_url: Option<&str>) -> String {
        let mut url = format!(
            "{}?oauth_token={}",
            self.authorize_url,
            urlencoding::encode(request_token)
        );
        if let Some(callback) = callback_url {
            url.push_str("&oauth_callback=");
            url.push_str(&urlencoding::encode(callback));
        }
        url
    }
}
