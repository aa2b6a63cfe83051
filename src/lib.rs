// Connection model, factories and registry
pub mod connect;

// Service configuration
pub mod config;

// Token encryption
pub mod credentials;

// Error type shared by every module
pub mod error;

// OAuth grants, token endpoints and CSRF state
pub mod oauth;

// SQLite connection repositories
pub mod repository;

pub use error::{ConnectError, Result};
