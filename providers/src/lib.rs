//! Concrete social providers and the connect HTTP service.
//!
//! Each provider module exposes its API client, service provider and
//! `connection_factory` constructor. [`registry::default_registry`] wires the
//! configured ones together.

pub mod api;
pub mod config;
pub mod facebook;
pub mod gowalla;
pub mod registry;
pub mod twitter;

pub use config::ProviderCredentials;
