use anyhow::{Context, Result};
use social_connect::config::{encryption_key_from_env, load_config, ConnectConfig, ENCRYPTION_KEY_ENV};
use social_connect::credentials::TokenCipher;
use social_connect::oauth::{run_state_cleanup, StateManager};
use social_connect::repository::UsersConnectionRepository;
use social_providers::api::{create_connect_router, ConnectAppState};
use social_providers::registry::default_registry;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "social_connect=info,social_providers=info".into()),
        )
        .init();

    info!("Social connect server starting...");

    let config_path =
        std::env::var("SOCIAL_CONNECT_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        load_config(&config_path)?
    } else {
        info!(path = %config_path, "Config file not found, using defaults");
        ConnectConfig::default()
    };

    let encryption_key = encryption_key_from_env().with_context(|| {
        format!("{} is required (base64-encoded 32-byte key)", ENCRYPTION_KEY_ENV)
    })?;
    let cipher = TokenCipher::from_base64_key(&encryption_key)
        .context("Failed to initialize token cipher")?;

    let registry = Arc::new(default_registry()?);

    info!(
        database_path = %config.storage.database_path,
        bind_addr = %config.server.bind_addr,
        callback_base_url = %config.server.callback_base_url,
        providers = registry.len(),
        "Configuration loaded"
    );

    let repository = Arc::new(
        UsersConnectionRepository::new(&config.storage.database_path, registry, cipher)
            .context("Failed to initialize connection repository")?,
    );
    info!("Connection repository initialized");

    let state_manager = StateManager::new(config.oauth.state_expiry_seconds);
    let cleanup_handle = tokio::spawn(run_state_cleanup(
        state_manager.clone(),
        config.oauth.state_cleanup_interval_seconds,
    ));

    let router = create_connect_router(ConnectAppState {
        repository,
        state_manager,
        callback_base_url: config.server.callback_base_url.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .context("Failed to bind connect API address")?;
    info!(bind_addr = %config.server.bind_addr, "Connect API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Connect API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    cleanup_handle.abort();
    info!("Social connect server stopped");

    Ok(())
}
