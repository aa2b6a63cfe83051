use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Token material issued by an OAuth2 provider after authorization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expire_time: Option<DateTime<Utc>>,
    pub scope: Option<String>,

    /// Provider-specific fields of the token response (e.g. `user_id`)
    pub extra: HashMap<String, String>,
}

impl AccessGrant {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expire_time: None,
            scope: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expires_in(mut self, seconds: i64) -> Self {
        self.expire_time = Some(Utc::now() + Duration::seconds(seconds));
        self
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }
}

/// Token material issued by an OAuth1 provider (token value plus secret).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuth1Token {
    pub value: String,
    pub secret: String,

    /// Extra parameters of the access token response (Twitter sends `user_id`, `screen_name`)
    pub extra: HashMap<String, String>,
}

impl OAuth1Token {
    pub fn new(value: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            secret: secret.into(),
            extra: HashMap::new(),
        }
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }
}

/// A grant of either protocol version, as handed to a connection factory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthorizationGrant {
    OAuth1(OAuth1Token),
    OAuth2(AccessGrant),
}

impl From<AccessGrant> for AuthorizationGrant {
    fn from(grant: AccessGrant) -> Self {
        AuthorizationGrant::OAuth2(grant)
    }
}

impl From<OAuth1Token> for AuthorizationGrant {
    fn from(token: OAuth1Token) -> Self {
        AuthorizationGrant::OAuth1(token)
    }
}
