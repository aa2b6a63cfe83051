use super::key::{ConnectionData, ConnectionKey, ServiceProfile};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;

/// Token material held by a live connection.
#[derive(Clone, PartialEq, Eq)]
pub enum ConnectionCredentials {
    OAuth1 {
        access_token: String,
        secret: String,
    },
    OAuth2 {
        access_token: String,
        refresh_token: Option<String>,
        expire_time: Option<DateTime<Utc>>,
    },
}

impl ConnectionCredentials {
    pub fn access_token(&self) -> &str {
        match self {
            ConnectionCredentials::OAuth1 { access_token, .. } => access_token,
            ConnectionCredentials::OAuth2 { access_token, .. } => access_token,
        }
    }
}

impl fmt::Debug for ConnectionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionCredentials::OAuth1 { .. } => f
                .debug_struct("OAuth1")
                .field("access_token", &"<redacted>")
                .field("secret", &"<redacted>")
                .finish(),
            ConnectionCredentials::OAuth2 {
                refresh_token,
                expire_time,
                ..
            } => f
                .debug_struct("OAuth2")
                .field("access_token", &"<redacted>")
                .field("has_refresh_token", &refresh_token.is_some())
                .field("expire_time", expire_time)
                .finish(),
        }
    }
}

/// A live link between a local user and one remote provider account.
///
/// Wraps the provider API client `A`, already bound to the decrypted tokens.
pub struct Connection<A> {
    key: ConnectionKey,
    display_name: Option<String>,
    profile_url: Option<String>,
    image_url: Option<String>,
    credentials: ConnectionCredentials,
    api: A,
}

impl<A> Connection<A> {
    pub fn new(
        key: ConnectionKey,
        profile: ServiceProfile,
        credentials: ConnectionCredentials,
        api: A,
    ) -> Self {
        Self {
            key,
            display_name: profile.display_name,
            profile_url: profile.profile_url,
            image_url: profile.image_url,
            credentials,
            api,
        }
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn profile_url(&self) -> Option<&str> {
        self.profile_url.as_deref()
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub fn credentials(&self) -> &ConnectionCredentials {
        &self.credentials
    }

    /// The provider API client bound to this connection.
    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn into_api(self) -> A {
        self.api
    }

    /// True when an OAuth2 access token has passed its expire time.
    pub fn has_expired(&self) -> bool {
        match &self.credentials {
            ConnectionCredentials::OAuth2 {
                expire_time: Some(expire_time),
                ..
            } => *expire_time <= Utc::now(),
            _ => false,
        }
    }

    /// Replace the display fields with a freshly fetched profile.
    ///
    /// The provider user ID is part of the key and is never changed.
    pub fn sync_profile(&mut self, profile: ServiceProfile) {
        self.display_name = profile.display_name;
        self.profile_url = profile.profile_url;
        self.image_url = profile.image_url;
    }

    pub(crate) fn rebind(&mut self, credentials: ConnectionCredentials, api: A) {
        self.credentials = credentials;
        self.api = api;
    }

    /// Flatten into the serializable form the repository persists.
    pub fn create_data(&self) -> ConnectionData {
        let (access_token, secret, refresh_token, expire_time) = match &self.credentials {
            ConnectionCredentials::OAuth1 {
                access_token,
                secret,
            } => (access_token.clone(), Some(secret.clone()), None, None),
            ConnectionCredentials::OAuth2 {
                access_token,
                refresh_token,
                expire_time,
            } => (access_token.clone(), None, refresh_token.clone(), *expire_time),
        };

        ConnectionData {
            provider_id: self.key.provider_id().to_string(),
            provider_user_id: self.key.provider_user_id().to_string(),
            display_name: self.display_name.clone(),
            profile_url: self.profile_url.clone(),
            image_url: self.image_url.clone(),
            access_token,
            secret,
            refresh_token,
            expire_time,
        }
    }
}

impl<A> fmt::Debug for Connection<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("key", &self.key)
            .field("display_name", &self.display_name)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

/// A connection whose API type has been erased.
///
/// Returned by provider-agnostic repository queries. Use
/// [`downcast`](trait.AnyConnection.html#method.downcast) to recover the typed
/// connection.
pub trait AnyConnection: Send + Sync {
    fn key(&self) -> &ConnectionKey;
    fn display_name(&self) -> Option<&str>;
    fn profile_url(&self) -> Option<&str>;
    fn image_url(&self) -> Option<&str>;
    fn has_expired(&self) -> bool;
    fn create_data(&self) -> ConnectionData;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<A: Send + Sync + 'static> AnyConnection for Connection<A> {
    fn key(&self) -> &ConnectionKey {
        Connection::key(self)
    }

    fn display_name(&self) -> Option<&str> {
        Connection::display_name(self)
    }

    fn profile_url(&self) -> Option<&str> {
        Connection::profile_url(self)
    }

    fn image_url(&self) -> Option<&str> {
        Connection::image_url(self)
    }

    fn has_expired(&self) -> bool {
        Connection::has_expired(self)
    }

    fn create_data(&self) -> ConnectionData {
        Connection::create_data(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

impl dyn AnyConnection {
    /// True if this connection is bound to API type `A`.
    pub fn is<A: 'static>(&self) -> bool {
        self.as_any().is::<Connection<A>>()
    }

    pub fn downcast_ref<A: 'static>(&self) -> Option<&Connection<A>> {
        self.as_any().downcast_ref::<Connection<A>>()
    }

    /// Recover the typed connection, or `None` for another API type.
    pub fn downcast<A: 'static>(self: Box<Self>) -> Option<Connection<A>> {
        self.into_any()
            .downcast::<Connection<A>>()
            .ok()
            .map(|connection| *connection)
    }
}

impl fmt::Debug for dyn AnyConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyConnection")
            .field("key", self.key())
            .field("display_name", &self.display_name())
            .finish_non_exhaustive()
    }
}
