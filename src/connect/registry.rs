use super::factory::{
    ConnectionFactory, DynConnectionFactory, OAuth1ConnectionFactory, OAuth2ConnectionFactory,
};
use crate::error::{ConnectError, Result};
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Conversion accepted by [`RegistryBuilder::register`].
pub trait IntoConnectionFactory {
    type Api: Send + Sync + 'static;

    fn into_connection_factory(self) -> ConnectionFactory<Self::Api>;
}

impl<A: Send + Sync + 'static> IntoConnectionFactory for ConnectionFactory<A> {
    type Api = A;

    fn into_connection_factory(self) -> ConnectionFactory<A> {
        self
    }
}

impl<A: Send + Sync + 'static> IntoConnectionFactory for OAuth1ConnectionFactory<A> {
    type Api = A;

    fn into_connection_factory(self) -> ConnectionFactory<A> {
        ConnectionFactory::OAuth1(self)
    }
}

impl<A: Send + Sync + 'static> IntoConnectionFactory for OAuth2ConnectionFactory<A> {
    type Api = A;

    fn into_connection_factory(self) -> ConnectionFactory<A> {
        ConnectionFactory::OAuth2(self)
    }
}

/// Collects connection factories before the registry is frozen.
pub struct RegistryBuilder {
    /// Primary storage: provider_id -> factory
    factories: HashMap<String, Arc<dyn DynConnectionFactory>>,
    /// Secondary index: API type -> provider_id (for uniqueness and typed lookup)
    api_types: HashMap<TypeId, String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            api_types: HashMap::new(),
        }
    }

    /// Add a factory.
    ///
    /// Fails if a factory with the same provider ID, or for the same service
    /// API type, is already registered.
    pub fn register<F: IntoConnectionFactory>(mut self, factory: F) -> Result<Self> {
        let factory = factory.into_connection_factory();
        let provider_id = factory.provider_id().to_string();
        let api_type = TypeId::of::<F::Api>();

        if self.factories.contains_key(&provider_id) {
            return Err(ConnectError::DuplicateProviderId(provider_id));
        }
        if self.api_types.contains_key(&api_type) {
            return Err(ConnectError::DuplicateApiType(type_name::<F::Api>()));
        }

        debug!(
            provider_id = %provider_id,
            api_type = type_name::<F::Api>(),
            "Registered connection factory"
        );

        self.api_types.insert(api_type, provider_id.clone());
        self.factories.insert(provider_id, Arc::new(factory));
        Ok(self)
    }

    pub fn build(self) -> ConnectionFactoryRegistry {
        ConnectionFactoryRegistry {
            factories: self.factories,
            api_types: self.api_types,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable lookup of connection factories by provider ID or API type.
///
/// Built once at startup and shared by `Arc`; there is no way to add or
/// remove factories afterwards.
pub struct ConnectionFactoryRegistry {
    factories: HashMap<String, Arc<dyn DynConnectionFactory>>,
    api_types: HashMap<TypeId, String>,
}

impl ConnectionFactoryRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up the factory for a provider.
    pub fn lookup_by_provider_id(&self, provider_id: &str) -> Result<Arc<dyn DynConnectionFactory>> {
        self.factories
            .get(provider_id)
            .cloned()
            .ok_or_else(|| ConnectError::FactoryNotFound(provider_id.to_string()))
    }

    /// Look up the factory producing connections of API type `A`.
    pub fn lookup_by_api_type<A: Send + Sync + 'static>(&self) -> Result<Arc<ConnectionFactory<A>>> {
        let provider_id = self.provider_id_for_api::<A>()?;
        let factory = self.lookup_by_provider_id(provider_id)?;
        factory
            .as_any()
            .downcast::<ConnectionFactory<A>>()
            .map_err(|_| ConnectError::ApiTypeNotFound(type_name::<A>()))
    }

    /// Provider ID registered for API type `A`.
    pub fn provider_id_for_api<A: 'static>(&self) -> Result<&str> {
        self.api_types
            .get(&TypeId::of::<A>())
            .map(String::as_str)
            .ok_or_else(|| ConnectError::ApiTypeNotFound(type_name::<A>()))
    }

    /// Registered provider IDs in sorted order.
    pub fn registered_provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect::test_support::{oauth1_factory, oauth2_factory, test_registry, AlphaApi, BetaApi};
    use crate::connect::factory::AuthProtocol;

    #[test]
    fn test_lookups_return_same_instance() {
        let registry = test_registry();

        for provider_id in ["p1", "beta"] {
            let by_id = registry.lookup_by_provider_id(provider_id).unwrap();
            assert_eq!(by_id.provider_id(), provider_id);
        }

        let alpha_by_id = registry.lookup_by_provider_id("p1").unwrap();
        let alpha_by_type = registry.lookup_by_api_type::<AlphaApi>().unwrap();
        assert_eq!(
            Arc::as_ptr(&alpha_by_id) as *const (),
            Arc::as_ptr(&alpha_by_type) as *const ()
        );

        let beta_by_id = registry.lookup_by_provider_id("beta").unwrap();
        let beta_by_type = registry.lookup_by_api_type::<BetaApi>().unwrap();
        assert_eq!(
            Arc::as_ptr(&beta_by_id) as *const (),
            Arc::as_ptr(&beta_by_type) as *const ()
        );
        assert_eq!(beta_by_type.protocol(), AuthProtocol::OAuth1);
    }

    #[test]
    fn test_duplicate_provider_id_rejected() {
        let result = ConnectionFactoryRegistry::builder()
            .register(oauth2_factory("p1"))
            .unwrap()
            .register(oauth1_factory("p1"));

        assert!(matches!(result, Err(ConnectError::DuplicateProviderId(ref id)) if id == "p1"));
    }

    #[test]
    fn test_duplicate_api_type_rejected() {
        let result = ConnectionFactoryRegistry::builder()
            .register(oauth2_factory("p1"))
            .unwrap()
            .register(oauth2_factory("p2"));

        match result {
            Err(ConnectError::DuplicateApiType(name)) => assert!(name.contains("AlphaApi")),
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("duplicate API type should be rejected"),
        }
    }

    #[test]
    fn test_lookup_not_found() {
        let registry = test_registry();

        let err = registry.lookup_by_provider_id("myspace").err().unwrap();
        assert!(matches!(err, ConnectError::FactoryNotFound(ref id) if id == "myspace"));
        assert!(err.is_not_found());

        let err = registry.lookup_by_api_type::<String>().err().unwrap();
        assert!(matches!(err, ConnectError::ApiTypeNotFound(_)));
    }

    #[test]
    fn test_registered_provider_ids_sorted() {
        let registry = test_registry();
        assert_eq!(registry.registered_provider_ids(), vec!["beta", "p1"]);
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
        assert!(ConnectionFactoryRegistry::builder().build().is_empty());
    }
}
