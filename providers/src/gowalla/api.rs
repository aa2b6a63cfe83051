use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Public profile page prefix; the username is appended.
pub const PROFILE_PAGE_URL: &str = "http://www.gowalla.com/users/";

/// A Gowalla user profile.
#[derive(Debug, Clone, Deserialize)]
pub struct GowallaProfile {
    /// Username, which is also the user ID in API paths
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub hometown: Option<String>,
    #[serde(default)]
    pub pins_count: u32,
    #[serde(default)]
    pub stamps_count: u32,
    pub large_image_url: Option<String>,
}

impl GowallaProfile {
    /// "First Last", whichever parts are present.
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// A spot and how often the user checked in there.
#[derive(Debug, Clone, Deserialize)]
pub struct Checkin {
    pub name: String,
    #[serde(rename = "user_checkins_count", default)]
    pub count: u32,
}

#[derive(Deserialize)]
struct TopSpots {
    top_spots: Vec<Checkin>,
}

/// HTTP client for the Gowalla API, bound to one access token.
pub struct GowallaApi {
    access_token: String,
    http_client: Client,
    base_url: String,
}

impl GowallaApi {
    pub fn new(access_token: String, http_client: Client, base_url: String) -> Self {
        Self {
            access_token,
            http_client,
            base_url,
        }
    }

    /// Fetch a user's profile; `"me"` is the authenticated user.
    pub async fn user_profile(&self, user_id: &str) -> Result<GowallaProfile> {
        self.get(&format!("users/{}", user_id)).await
    }

    /// Fetch the spots a user checks in at most.
    pub async fn top_checkins(&self, user_id: &str) -> Result<Vec<Checkin>> {
        let spots: TopSpots = self.get(&format!("users/{}/top_spots", user_id)).await?;
        Ok(spots.top_spots)
    }

    /// Public profile page of the authenticated user.
    pub async fn profile_url(&self) -> Result<String> {
        let profile = self.user_profile("me").await?;
        Ok(profile_page_url(&profile.username))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .http_client
            .get(&url)
            .header("Accept", "application/json")
            .header("Authorization", format!("OAuth {}", self.access_token))
            .send()
            .await
            .with_context(|| format!("Failed to send Gowalla request for {}", path))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                return Err(anyhow!("Gowalla auth error: token expired or invalid"))
            }
            s if !s.is_success() => return Err(anyhow!("Gowalla API error: {}", s)),
            _ => {}
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse Gowalla response for {}", path))
    }
}

pub fn profile_page_url(username: &str) -> String {
    format!("{}{}", PROFILE_PAGE_URL, username)
}
