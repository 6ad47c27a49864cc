//! API Handlers

use super::middleware::CurrentUser;
use super::types::*;
use crate::auth::{
    AuthManager, LoginRequest, RegisterRequest, TokenResponse, UserResponse, UserStore,
};
use crate::config::Config;
use crate::error::AuthError;
use crate::metrics::Metrics;
use crate::security::RateLimiter;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::info;

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<AuthManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
    pub start_time: SystemTime,
}

impl AppState {
    /// Build the shared state for a validated configuration
    pub fn from_config(config: Config) -> crate::Result<Self> {
        let auth = AuthManager::new(&config.auth, Arc::new(UserStore::new()))?;

        Ok(Self {
            auth: Arc::new(auth),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limiting.clone())),
            metrics: Arc::new(Metrics::new()?),
            config: Arc::new(config),
            start_time: SystemTime::now(),
        })
    }
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let uptime = SystemTime::now()
        .duration_since(state.start_time)
        .unwrap_or_default()
        .as_secs();

    Json(HealthStatus {
        status: "OK".to_string(),
        message: "Tech Blog Platform API is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
    })
}

/// Register a new account
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AuthError> {
    let Json(request) = payload?;

    let user = state.auth.register(request).await?;
    state.metrics.record_registration();

    Ok(Json(user))
}

/// Exchange credentials for a bearer token
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AuthError> {
    let Json(request) = payload?;

    let result = state.auth.login(request).await;
    state.metrics.record_login(result.is_ok());

    Ok(Json(result?))
}

/// Current user profile
pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<UserResponse> {
    Json(UserResponse::from(&user))
}

/// Tokens are not revoked server side; the client discards its copy
pub async fn logout(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Json<MessageResponse> {
    info!(user_id = %user.id, "User logged out");
    Json(MessageResponse::new("Successfully logged out"))
}

/// Prometheus text exposition
pub async fn export_metrics(State(state): State<AppState>) -> impl IntoResponse {
    state
        .metrics
        .set_tracked_clients(state.rate_limiter.stats().tracked_clients);

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
}
