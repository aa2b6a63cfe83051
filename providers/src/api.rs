//! HTTP API for connecting and disconnecting provider accounts.
//!
//! Implements the OAuth2 authorization code flow:
//! 1. GET /api/users/:user_id/connect/:provider → Redirect to provider
//! 2. User authorizes on provider's site
//! 3. Provider redirects to /api/connect/:provider/callback
//! 4. Exchange code for access grant, build the connection, store it encrypted
//!
//! The local user ID in the path is trusted; authentication happens in front
//! of this service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Redirect, Response},
    routing::{delete, get},
    Router,
};
use serde::{Deserialize, Serialize};
use social_connect::connect::ConnectionKey;
use social_connect::oauth::{AuthorizationGrant, StateManager, StateRejection};
use social_connect::repository::UsersConnectionRepository;
use social_connect::ConnectError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for connect endpoints
enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    NotImplemented(String),
    BadGateway(String),
    ServerError(String),
}

impl From<ConnectError> for AppError {
    fn from(e: ConnectError) -> Self {
        match e {
            e if e.is_not_found() => AppError::NotFound(e.to_string()),
            e @ ConnectError::DuplicateConnection(_) => AppError::Conflict(e.to_string()),
            e @ (ConnectError::Provider(_)
            | ConnectError::MissingProviderUserId(_)
            | ConnectError::GrantMismatch { .. }) => AppError::BadGateway(e.to_string()),
            e => {
                error!(error = %e, "Connection repository failure");
                AppError::ServerError(e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::NotImplemented(msg) => (StatusCode::NOT_IMPLEMENTED, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

/// Shared application state for the connect API
#[derive(Clone)]
pub struct ConnectAppState {
    pub repository: Arc<UsersConnectionRepository>,
    pub state_manager: StateManager,
    pub callback_base_url: String,
}

impl ConnectAppState {
    fn redirect_uri(&self, provider_id: &str) -> String {
        format!("{}/api/connect/{}/callback", self.callback_base_url, provider_id)
    }
}

/// OAuth callback query parameters
#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Returned once a connection has been stored
#[derive(Serialize)]
pub struct ConnectedResponse {
    success: bool,
    local_user_id: String,
    provider_id: String,
    provider_user_id: String,
    display_name: Option<String>,
}

/// A stored connection, without token material
#[derive(Serialize)]
pub struct ConnectionSummary {
    provider_user_id: String,
    display_name: Option<String>,
    profile_url: Option<String>,
    image_url: Option<String>,
    expired: bool,
}

#[derive(Serialize)]
pub struct ConnectionsResponse {
    local_user_id: String,
    /// Every registered provider, mapped to this user's connections to it
    connections: BTreeMap<String, Vec<ConnectionSummary>>,
}

#[derive(Serialize)]
pub struct RemovedResponse {
    removed: usize,
}

/// Create connect API router
pub fn create_connect_router(state: ConnectAppState) -> Router {
    Router::new()
        .route("/api/users/:user_id/connect/:provider", get(connect_start))
        .route("/api/connect/:provider/callback", get(connect_callback))
        .route("/api/users/:user_id/connections", get(list_connections))
        .route(
            "/api/users/:user_id/connections/:provider",
            delete(remove_provider_connections),
        )
        .route(
            "/api/users/:user_id/connections/:provider/:provider_user_id",
            delete(remove_connection),
        )
        .with_state(Arc::new(state))
}

/// GET /api/users/:user_id/connect/:provider
///
/// Redirects the user to the provider's authorization page with a fresh
/// single-use state parameter.
async fn connect_start(
    State(state): State<Arc<ConnectAppState>>,
    Path((user_id, provider_id)): Path<(String, String)>,
) -> Result<Redirect, AppError> {
    debug!(provider_id = %provider_id, local_user_id = %user_id, "Connect requested");

    let factory = state.repository.registry().lookup_by_provider_id(&provider_id)?;
    let operations = factory.oauth2_operations().ok_or_else(|| {
        warn!(provider_id = %provider_id, "OAuth1 connect requested");
        AppError::NotImplemented(format!(
            "Connecting to '{}' requires OAuth1 request signing, which this service does not provide",
            provider_id
        ))
    })?;

    let csrf_state = state.state_manager.create_state(&provider_id, &user_id);
    let auth_url = operations.build_authorize_url(&csrf_state, &state.redirect_uri(&provider_id));

    info!(provider_id = %provider_id, local_user_id = %user_id, "Redirecting to OAuth provider");
    Ok(Redirect::temporary(&auth_url))
}

/// GET /api/connect/:provider/callback
///
/// Exchanges the authorization code, resolves the remote account and stores
/// the connection for the user that started the flow.
async fn connect_callback(
    State(state): State<Arc<ConnectAppState>>,
    Path(provider_id): Path<String>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Json<ConnectedResponse>, AppError> {
    debug!(provider_id = %provider_id, "OAuth callback received");

    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(
            provider_id = %provider_id,
            error = %error,
            description = %description,
            "OAuth authorization failed"
        );
        return Err(AppError::BadRequest(format!(
            "OAuth authorization failed: {} - {}",
            error, description
        )));
    }

    let code = callback
        .code
        .ok_or_else(|| AppError::BadRequest("Missing 'code' parameter".to_string()))?;
    let csrf_state = callback
        .state
        .ok_or_else(|| AppError::BadRequest("Missing 'state' parameter".to_string()))?;

    let entry = state
        .state_manager
        .validate_and_consume(&csrf_state, &provider_id)
        .map_err(|rejection| {
            warn!(provider_id = %provider_id, reason = %rejection, "OAuth state rejected");
            match rejection {
                StateRejection::ProviderMismatch { .. } => {
                    AppError::BadRequest(format!("Provider mismatch: {}", rejection))
                }
                StateRejection::Unknown | StateRejection::Expired => AppError::Unauthorized(
                    "Invalid or expired OAuth state (possible CSRF attack)".to_string(),
                ),
            }
        })?;

    let factory = state.repository.registry().lookup_by_provider_id(&provider_id)?;
    let operations = factory
        .oauth2_operations()
        .ok_or_else(|| AppError::NotImplemented(format!("'{}' is not an OAuth2 provider", provider_id)))?;

    let grant = operations
        .exchange_for_access(&code, &state.redirect_uri(&provider_id))
        .await
        .map_err(|e| {
            error!(provider_id = %provider_id, error = %e, "Token exchange failed");
            AppError::BadGateway(format!("Token exchange failed: {}", e))
        })?;

    let connection = factory
        .create_any_connection(&AuthorizationGrant::OAuth2(grant))
        .await?;

    state
        .repository
        .scope_to_user(&entry.local_user_id)
        .add_connection(connection.as_ref())
        .map_err(|e| {
            warn!(key = %connection.key(), local_user_id = %entry.local_user_id, error = %e, "Failed to store connection");
            AppError::from(e)
        })?;

    info!(
        key = %connection.key(),
        local_user_id = %entry.local_user_id,
        "Connection stored"
    );

    Ok(Json(ConnectedResponse {
        success: true,
        local_user_id: entry.local_user_id,
        provider_id,
        provider_user_id: connection.key().provider_user_id().to_string(),
        display_name: connection.display_name().map(str::to_string),
    }))
}

/// GET /api/users/:user_id/connections
async fn list_connections(
    State(state): State<Arc<ConnectAppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<ConnectionsResponse>, AppError> {
    let all = state.repository.scope_to_user(&user_id).find_all_connections()?;

    let connections = all
        .into_iter()
        .map(|(provider_id, connections)| {
            let summaries = connections
                .iter()
                .map(|c| ConnectionSummary {
                    provider_user_id: c.key().provider_user_id().to_string(),
                    display_name: c.display_name().map(str::to_string),
                    profile_url: c.profile_url().map(str::to_string),
                    image_url: c.image_url().map(str::to_string),
                    expired: c.has_expired(),
                })
                .collect();
            (provider_id, summaries)
        })
        .collect();

    Ok(Json(ConnectionsResponse {
        local_user_id: user_id,
        connections,
    }))
}

/// DELETE /api/users/:user_id/connections/:provider
async fn remove_provider_connections(
    State(state): State<Arc<ConnectAppState>>,
    Path((user_id, provider_id)): Path<(String, String)>,
) -> Result<Json<RemovedResponse>, AppError> {
    let removed = state
        .repository
        .scope_to_user(&user_id)
        .remove_connections_to_provider(&provider_id)?;

    info!(provider_id = %provider_id, local_user_id = %user_id, removed = removed, "Disconnected provider");
    Ok(Json(RemovedResponse { removed }))
}

/// DELETE /api/users/:user_id/connections/:provider/:provider_user_id
async fn remove_connection(
    State(state): State<Arc<ConnectAppState>>,
    Path((user_id, provider_id, provider_user_id)): Path<(String, String, String)>,
) -> Result<Json<RemovedResponse>, AppError> {
    let key = ConnectionKey::new(provider_id, provider_user_id);

    if !state.repository.scope_to_user(&user_id).remove_connection(&key)? {
        return Err(ConnectError::NoSuchConnection(key).into());
    }

    info!(key = %key, local_user_id = %user_id, "Disconnected account");
    Ok(Json(RemovedResponse { removed: 1 }))
}
