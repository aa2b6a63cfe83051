//! Connection model, factories and the factory registry.
//!
//! # Core Types
//!
//! - [`ConnectionKey`] - (provider ID, provider user ID) pair
//! - [`ConnectionData`] - serializable connection snapshot
//! - [`Connection`] - live connection bound to a provider API client
//! - [`ConnectionFactory`] - OAuth1 or OAuth2 factory for one provider
//! - [`ConnectionFactoryRegistry`] - immutable provider ID / API type lookup
//!
//! # Wiring a Provider
//!
//! ```no_run
//! use social_connect::connect::{
//!     ConnectionFactoryRegistry, OAuth2ConnectionFactory, OAuth2ServiceProvider,
//!     ServiceApiAdapter, ServiceProfile,
//! };
//! use social_connect::oauth::{AccessGrant, OAuth2Operations};
//! use async_trait::async_trait;
//! use std::collections::HashMap;
//!
//! struct MyApi { token: String }
//!
//! struct MyProvider { operations: OAuth2Operations }
//!
//! impl OAuth2ServiceProvider<MyApi> for MyProvider {
//!     fn oauth_operations(&self) -> &OAuth2Operations { &self.operations }
//!     fn api(&self, access_token: &str) -> MyApi { MyApi { token: access_token.to_string() } }
//! }
//!
//! struct MyAdapter;
//!
//! #[async_trait]
//! impl ServiceApiAdapter<MyApi> for MyAdapter {
//!     async fn resolve_profile(
//!         &self,
//!         _api: &MyApi,
//!         extra: &HashMap<String, String>,
//!     ) -> anyhow::Result<ServiceProfile> {
//!         Ok(ServiceProfile {
//!             provider_user_id: extra.get("user_id").cloned().unwrap_or_default(),
//!             ..Default::default()
//!         })
//!     }
//! }
//!
//! # async fn run() -> social_connect::Result<()> {
//! let operations = OAuth2Operations::new(
//!     "client_id",
//!     "client_secret",
//!     "https://example.com/oauth/authorize",
//!     "https://example.com/oauth/token",
//! );
//! let registry = ConnectionFactoryRegistry::builder()
//!     .register(OAuth2ConnectionFactory::new("example", MyProvider { operations }, MyAdapter))?
//!     .build();
//!
//! let factory = registry.lookup_by_api_type::<MyApi>()?;
//! let grant = AccessGrant::new("token").with_extra("user_id", "42");
//! let connection = factory.create_connection(&grant.into()).await?;
//! assert_eq!(connection.key().provider_user_id(), "42");
//! # Ok(())
//! # }
//! ```

mod connection;
mod factory;
mod key;
mod registry;

#[cfg(test)]
pub(crate) mod test_support;

pub use connection::{AnyConnection, Connection, ConnectionCredentials};
pub use factory::{
    AuthProtocol, ConnectionFactory, DynConnectionFactory, OAuth1ConnectionFactory,
    OAuth1ServiceProvider, OAuth2ConnectionFactory, OAuth2ServiceProvider, ServiceApiAdapter,
};
pub use key::{ConnectionData, ConnectionKey, ServiceProfile};
pub use registry::{ConnectionFactoryRegistry, IntoConnectionFactory, RegistryBuilder};
