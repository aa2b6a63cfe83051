use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// The authenticated user's Graph API profile.
#[derive(Debug, Clone, Deserialize)]
pub struct FacebookProfile {
    pub id: String,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub link: Option<String>,
}

/// Another Graph object referenced by ID and name.
#[derive(Debug, Clone, Deserialize)]
pub struct Reference {
    pub id: String,
    pub name: Option<String>,
}

/// A photo album.
#[derive(Debug, Clone, Deserialize)]
pub struct Album {
    pub id: String,
    pub from: Option<Reference>,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub link: Option<String>,
    pub privacy: Option<String>,
    #[serde(default)]
    pub count: u32,
    #[serde(rename = "type")]
    pub album_type: Option<String>,
    pub created_time: Option<String>,
    pub updated_time: Option<String>,
}

/// A check-in at a place.
#[derive(Debug, Clone, Deserialize)]
pub struct Checkin {
    pub id: String,
    pub from: Option<Reference>,
    pub place: Option<Reference>,
    pub message: Option<String>,
    pub created_time: Option<String>,
}

/// Graph API list responses wrap their items in `data`.
#[derive(Deserialize)]
struct DataList<T> {
    data: Vec<T>,
}

/// HTTP client for the Facebook Graph API, bound to one access token.
pub struct FacebookApi {
    access_token: String,
    http_client: Client,
    base_url: String,
}

impl FacebookApi {
    pub fn new(access_token: String, http_client: Client, base_url: String) -> Self {
        Self {
            access_token,
            http_client,
            base_url,
        }
    }

    /// Fetch the authenticated user's profile (`/me`).
    pub async fn user_profile(&self) -> Result<FacebookProfile> {
        self.get("me").await
    }

    /// Fetch the authenticated user's photo albums.
    pub async fn albums(&self) -> Result<Vec<Album>> {
        let list: DataList<Album> = self.get("me/albums").await?;
        Ok(list.data)
    }

    /// Fetch the authenticated user's check-ins.
    pub async fn checkins(&self) -> Result<Vec<Checkin>> {
        let list: DataList<Checkin> = self.get("me/checkins").await?;
        Ok(list.data)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .with_context(|| format!("Failed to send Facebook request for {}", path))?;

        check_response_status(&response)?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse Facebook response for {}", path))
    }
}

fn check_response_status(response: &reqwest::Response) -> Result<()> {
    match response.status() {
        StatusCode::UNAUTHORIZED => Err(anyhow!("Facebook auth error: token expired or invalid")),
        s if !s.is_success() => Err(anyhow!("Facebook API error: {}", s)),
        _ => Ok(()),
    }
}
