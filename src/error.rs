//! Error type shared by the registry, factories and repositories.

use crate::connect::ConnectionKey;
use std::fmt;

/// Result alias for connect operations.
pub type Result<T> = std::result::Result<T, ConnectError>;

/// Errors raised by the connect framework.
///
/// Registry errors are configuration mistakes and surface at startup.
/// Lookup errors (`FactoryNotFound`, `ApiTypeNotFound`, `NoSuchConnection`,
/// `NotConnected`) report absence and can be told apart with
/// [`ConnectError::is_not_found`].
#[derive(Debug)]
pub enum ConnectError {
    /// A factory for this provider ID is already registered
    DuplicateProviderId(String),
    /// A factory for this service API type is already registered
    DuplicateApiType(&'static str),
    /// No factory registered for the provider ID
    FactoryNotFound(String),
    /// No factory registered for the service API type
    ApiTypeNotFound(&'static str),
    /// No stored connection for the key
    NoSuchConnection(ConnectionKey),
    /// The local user has no connection to the provider
    NotConnected(String),
    /// The key is already bound to a local user
    DuplicateConnection(ConnectionKey),
    /// The provider user ID could not be determined from the grant
    MissingProviderUserId(String),
    /// The grant does not match the provider's OAuth protocol version
    GrantMismatch {
        provider_id: String,
        expected: &'static str,
    },
    /// The connection carries no refresh token
    RefreshUnavailable(ConnectionKey),
    /// Persisted data cannot be turned into a connection
    InvalidConnectionData(String),
    /// Encryption key is malformed
    InvalidKey(String),
    /// Token encryption failed
    Encryption(String),
    /// Stored ciphertext could not be decrypted (wrong key or tampered data)
    Decryption(String),
    /// SQLite failure
    Storage(rusqlite::Error),
    /// Provider API or OAuth endpoint failure
    Provider(anyhow::Error),
}

impl ConnectError {
    /// True for lookup misses, false for failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ConnectError::FactoryNotFound(_)
                | ConnectError::ApiTypeNotFound(_)
                | ConnectError::NoSuchConnection(_)
                | ConnectError::NotConnected(_)
        )
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::DuplicateProviderId(id) => write!(
                f,
                "a connection factory for provider '{}' has already been registered",
                id
            ),
            ConnectError::DuplicateApiType(api) => write!(
                f,
                "a connection factory for service API [{}] has already been registered",
                api
            ),
            ConnectError::FactoryNotFound(id) => {
                write!(f, "no connection factory for provider '{}' is registered", id)
            }
            ConnectError::ApiTypeNotFound(api) => write!(
                f,
                "no connection factory for service API [{}] is registered",
                api
            ),
            ConnectError::NoSuchConnection(key) => write!(f, "no connection found for {}", key),
            ConnectError::NotConnected(provider_id) => {
                write!(f, "not connected to provider '{}'", provider_id)
            }
            ConnectError::DuplicateConnection(key) => {
                write!(f, "connection {} already exists", key)
            }
            ConnectError::MissingProviderUserId(provider_id) => write!(
                f,
                "unable to determine provider user id for '{}' from access grant",
                provider_id
            ),
            ConnectError::GrantMismatch {
                provider_id,
                expected,
            } => write!(
                f,
                "provider '{}' expects an {} grant",
                provider_id, expected
            ),
            ConnectError::RefreshUnavailable(key) => {
                write!(f, "connection {} has no refresh token", key)
            }
            ConnectError::InvalidConnectionData(msg) => {
                write!(f, "invalid connection data: {}", msg)
            }
            ConnectError::InvalidKey(msg) => write!(f, "invalid encryption key: {}", msg),
            ConnectError::Encryption(msg) => write!(f, "token encryption failed: {}", msg),
            ConnectError::Decryption(msg) => write!(f, "token decryption failed: {}", msg),
            ConnectError::Storage(e) => write!(f, "connection storage error: {}", e),
            ConnectError::Provider(e) => write!(f, "provider request failed: {:#}", e),
        }
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectError::Storage(e) => Some(e),
            ConnectError::Provider(e) => Some(&**e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for ConnectError {
    fn from(e: rusqlite::Error) -> Self {
        ConnectError::Storage(e)
    }
}
