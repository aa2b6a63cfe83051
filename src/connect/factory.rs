//! Connection factories.
//!
//! A factory turns either a fresh grant or persisted [`ConnectionData`] into a
//! [`Connection`] bound to the provider's API client. The protocol version is
//! selected by the [`ConnectionFactory`] variant:
//!
//! ```text
//! AuthorizationGrant ──► ConnectionFactory::{OAuth1, OAuth2}
//!                          │  service provider: tokens → API client
//!                          │  api adapter:      API client → ServiceProfile
//!                          ▼
//!                     Connection<A>  ◄── ConnectionData (no network call)
//! ```

use super::connection::{AnyConnection, Connection, ConnectionCredentials};
use super::key::{ConnectionData, ConnectionKey, ServiceProfile};
use crate::error::{ConnectError, Result};
use crate::oauth::{AccessGrant, AuthorizationGrant, OAuth1Operations, OAuth1Token, OAuth2Operations};
use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Builds API clients for an OAuth2 provider.
pub trait OAuth2ServiceProvider<A>: Send + Sync {
    fn oauth_operations(&self) -> &OAuth2Operations;

    /// Create an API client authorized with the access token.
    fn api(&self, access_token: &str) -> A;
}

/// Builds API clients for an OAuth1 provider.
pub trait OAuth1ServiceProvider<A>: Send + Sync {
    fn oauth_operations(&self) -> &OAuth1Operations;

    /// Create an API client authorized with the access token and its secret.
    fn api(&self, access_token: &str, secret: &str) -> A;
}

/// Provider-specific hook that identifies the remote account behind a grant.
#[async_trait]
pub trait ServiceApiAdapter<A>: Send + Sync {
    /// Resolve the remote profile.
    ///
    /// `extra` holds the provider-specific fields of the token response.
    /// Implementations read the user ID from there when the provider sends
    /// it, and otherwise call the provider's profile endpoint through `api`.
    async fn resolve_profile(
        &self,
        api: &A,
        extra: &HashMap<String, String>,
    ) -> anyhow::Result<ServiceProfile>;
}

/// OAuth protocol version a provider speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthProtocol {
    OAuth1,
    OAuth2,
}

impl AuthProtocol {
    fn grant_name(self) -> &'static str {
        match self {
            AuthProtocol::OAuth1 => "OAuth1 token",
            AuthProtocol::OAuth2 => "OAuth2 access grant",
        }
    }
}

/// Factory for connections to an OAuth2 provider.
pub struct OAuth2ConnectionFactory<A> {
    provider_id: String,
    service_provider: Arc<dyn OAuth2ServiceProvider<A>>,
    api_adapter: Arc<dyn ServiceApiAdapter<A>>,
}

impl<A: Send + Sync + 'static> OAuth2ConnectionFactory<A> {
    pub fn new(
        provider_id: impl Into<String>,
        service_provider: impl OAuth2ServiceProvider<A> + 'static,
        api_adapter: impl ServiceApiAdapter<A> + 'static,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            service_provider: Arc::new(service_provider),
            api_adapter: Arc::new(api_adapter),
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn oauth_operations(&self) -> &OAuth2Operations {
        self.service_provider.oauth_operations()
    }

    /// Create a connection from a grant obtained at the end of the OAuth dance.
    pub async fn create_connection(&self, grant: &AccessGrant) -> Result<Connection<A>> {
        let api = self.service_provider.api(&grant.access_token);
        let profile = resolve_profile(&self.provider_id, &*self.api_adapter, &api, &grant.extra).await?;

        debug!(
            provider_id = %self.provider_id,
            provider_user_id = %profile.provider_user_id,
            "Created OAuth2 connection from access grant"
        );

        Ok(Connection::new(
            ConnectionKey::new(&self.provider_id, &profile.provider_user_id),
            profile,
            ConnectionCredentials::OAuth2 {
                access_token: grant.access_token.clone(),
                refresh_token: grant.refresh_token.clone(),
                expire_time: grant.expire_time,
            },
            api,
        ))
    }

    /// Rebuild a connection from persisted data. No network call is made.
    pub fn create_connection_from_data(&self, data: &ConnectionData) -> Result<Connection<A>> {
        check_data(&self.provider_id, data)?;
        let api = self.service_provider.api(&data.access_token);

        Ok(Connection::new(
            data.key(),
            profile_from_data(data),
            ConnectionCredentials::OAuth2 {
                access_token: data.access_token.clone(),
                refresh_token: data.refresh_token.clone(),
                expire_time: data.expire_time,
            },
            api,
        ))
    }

    /// Exchange the connection's refresh token for a new access token and
    /// rebind its API client.
    ///
    /// The previous refresh token is kept if the provider does not issue a
    /// new one.
    pub async fn refresh(&self, connection: &mut Connection<A>) -> Result<()> {
        let refresh_token = match connection.credentials() {
            ConnectionCredentials::OAuth2 {
                refresh_token: Some(token),
                ..
            } => token.clone(),
            _ => return Err(ConnectError::RefreshUnavailable(connection.key().clone())),
        };

        let grant = self
            .oauth_operations()
            .refresh_access(&refresh_token)
            .await
            .map_err(ConnectError::Provider)?;

        let api = self.service_provider.api(&grant.access_token);
        connection.rebind(
            ConnectionCredentials::OAuth2 {
                access_token: grant.access_token,
                refresh_token: grant.refresh_token.or(Some(refresh_token)),
                expire_time: grant.expire_time,
            },
            api,
        );

        debug!(key = %connection.key(), "Refreshed OAuth2 connection");
        Ok(())
    }
}

/// Factory for connections to an OAuth1 provider.
pub struct OAuth1ConnectionFactory<A> {
    provider_id: String,
    service_provider: Arc<dyn OAuth1ServiceProvider<A>>,
    api_adapter: Arc<dyn ServiceApiAdapter<A>>,
}

impl<A: Send + Sync + 'static> OAuth1ConnectionFactory<A> {
    pub fn new(
        provider_id: impl Into<String>,
        service_provider: impl OAuth1ServiceProvider<A> + 'static,
        api_adapter: impl ServiceApiAdapter<A> + 'static,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            service_provider: Arc::new(service_provider),
            api_adapter: Arc::new(api_adapter),
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn oauth_operations(&self) -> &OAuth1Operations {
        self.service_provider.oauth_operations()
    }

    /// Create a connection from an access token obtained at the end of the OAuth dance.
    pub async fn create_connection(&self, token: &OAuth1Token) -> Result<Connection<A>> {
        let api = self.service_provider.api(&token.value, &token.secret);
        let profile = resolve_profile(&self.provider_id, &*self.api_adapter, &api, &token.extra).await?;

        debug!(
            provider_id = %self.provider_id,
            provider_user_id = %profile.provider_user_id,
            "Created OAuth1 connection from access token"
        );

        Ok(Connection::new(
            ConnectionKey::new(&self.provider_id, &profile.provider_user_id),
            profile,
            ConnectionCredentials::OAuth1 {
                access_token: token.value.clone(),
                secret: token.secret.clone(),
            },
            api,
        ))
    }

    /// Rebuild a connection from persisted data. No network call is made.
    pub fn create_connection_from_data(&self, data: &ConnectionData) -> Result<Connection<A>> {
        check_data(&self.provider_id, data)?;
        let secret = data.secret.as_deref().ok_or_else(|| {
            ConnectError::InvalidConnectionData(format!("OAuth1 connection {} has no secret", data.key()))
        })?;
        let api = self.service_provider.api(&data.access_token, secret);

        Ok(Connection::new(
            data.key(),
            profile_from_data(data),
            ConnectionCredentials::OAuth1 {
                access_token: data.access_token.clone(),
                secret: secret.to_string(),
            },
            api,
        ))
    }
}

/// Connection factory for one provider, tagged by OAuth protocol version.
pub enum ConnectionFactory<A> {
    OAuth1(OAuth1ConnectionFactory<A>),
    OAuth2(OAuth2ConnectionFactory<A>),
}

impl<A: Send + Sync + 'static> ConnectionFactory<A> {
    pub fn provider_id(&self) -> &str {
        match self {
            ConnectionFactory::OAuth1(f) => f.provider_id(),
            ConnectionFactory::OAuth2(f) => f.provider_id(),
        }
    }

    pub fn protocol(&self) -> AuthProtocol {
        match self {
            ConnectionFactory::OAuth1(_) => AuthProtocol::OAuth1,
            ConnectionFactory::OAuth2(_) => AuthProtocol::OAuth2,
        }
    }

    /// Create a connection from a grant of the matching protocol.
    pub async fn create_connection(&self, grant: &AuthorizationGrant) -> Result<Connection<A>> {
        match (self, grant) {
            (ConnectionFactory::OAuth1(f), AuthorizationGrant::OAuth1(token)) => {
                f.create_connection(token).await
            }
            (ConnectionFactory::OAuth2(f), AuthorizationGrant::OAuth2(grant)) => {
                f.create_connection(grant).await
            }
            _ => Err(ConnectError::GrantMismatch {
                provider_id: self.provider_id().to_string(),
                expected: self.protocol().grant_name(),
            }),
        }
    }

    pub fn create_connection_from_data(&self, data: &ConnectionData) -> Result<Connection<A>> {
        match self {
            ConnectionFactory::OAuth1(f) => f.create_connection_from_data(data),
            ConnectionFactory::OAuth2(f) => f.create_connection_from_data(data),
        }
    }
}

impl<A: Send + Sync + 'static> From<OAuth1ConnectionFactory<A>> for ConnectionFactory<A> {
    fn from(factory: OAuth1ConnectionFactory<A>) -> Self {
        ConnectionFactory::OAuth1(factory)
    }
}

impl<A: Send + Sync + 'static> From<OAuth2ConnectionFactory<A>> for ConnectionFactory<A> {
    fn from(factory: OAuth2ConnectionFactory<A>) -> Self {
        ConnectionFactory::OAuth2(factory)
    }
}

/// A connection factory with its API type erased.
///
/// This is what the registry hands out for provider-ID lookups and what the
/// repository uses to rebuild rows of any provider.
#[async_trait]
pub trait DynConnectionFactory: Send + Sync {
    fn provider_id(&self) -> &str;
    fn protocol(&self) -> AuthProtocol;
    fn api_type(&self) -> TypeId;
    fn api_type_name(&self) -> &'static str;
    fn oauth2_operations(&self) -> Option<&OAuth2Operations>;
    fn oauth1_operations(&self) -> Option<&OAuth1Operations>;

    async fn create_any_connection(
        &self,
        grant: &AuthorizationGrant,
    ) -> Result<Box<dyn AnyConnection>>;

    fn create_any_connection_from_data(&self, data: &ConnectionData) -> Result<Box<dyn AnyConnection>>;

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

#[async_trait]
impl<A: Send + Sync + 'static> DynConnectionFactory for ConnectionFactory<A> {
    fn provider_id(&self) -> &str {
        ConnectionFactory::provider_id(self)
    }

    fn protocol(&self) -> AuthProtocol {
        ConnectionFactory::protocol(self)
    }

    fn api_type(&self) -> TypeId {
        TypeId::of::<A>()
    }

    fn api_type_name(&self) -> &'static str {
        std::any::type_name::<A>()
    }

    fn oauth2_operations(&self) -> Option<&OAuth2Operations> {
        match self {
            ConnectionFactory::OAuth2(f) => Some(f.oauth_operations()),
            ConnectionFactory::OAuth1(_) => None,
        }
    }

    fn oauth1_operations(&self) -> Option<&OAuth1Operations> {
        match self {
            ConnectionFactory::OAuth1(f) => Some(f.oauth_operations()),
            ConnectionFactory::OAuth2(_) => None,
        }
    }

    async fn create_any_connection(
        &self,
        grant: &AuthorizationGrant,
    ) -> Result<Box<dyn AnyConnection>> {
        let connection = self.create_connection(grant).await?;
        Ok(Box::new(connection))
    }

    fn create_any_connection_from_data(&self, data: &ConnectionData) -> Result<Box<dyn AnyConnection>> {
        let connection = self.create_connection_from_data(data)?;
        Ok(Box::new(connection))
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

async fn resolve_profile<A: Send + Sync>(
    provider_id: &str,
    adapter: &dyn ServiceApiAdapter<A>,
    api: &A,
    extra: &HashMap<String, String>,
) -> Result<ServiceProfile> {
    let profile = adapter
        .resolve_profile(api, extra)
        .await
        .map_err(ConnectError::Provider)?;

    // Every persisted connection must carry a provider user id
    if profile.provider_user_id.trim().is_empty() {
        return Err(ConnectError::MissingProviderUserId(provider_id.to_string()));
    }

    Ok(profile)
}

fn check_data(provider_id: &str, data: &ConnectionData) -> Result<()> {
    if data.provider_id != provider_id {
        return Err(ConnectError::InvalidConnectionData(format!(
            "data for provider '{}' passed to the '{}' factory",
            data.provider_id, provider_id
        )));
    }
    if data.provider_user_id.trim().is_empty() {
        return Err(ConnectError::InvalidConnectionData(format!(
            "connection to '{}' has an empty provider user id",
            provider_id
        )));
    }
    Ok(())
}

fn profile_from_data(data: &ConnectionData) -> ServiceProfile {
    ServiceProfile {
        provider_user_id: data.provider_user_id.clone(),
        display_name: data.display_name.clone(),
        profile_url: data.profile_url.clone(),
        image_url: data.image_url.clone(),
    }
}
