//! API Routes

use super::{
    handlers::*,
    middleware::{rate_limit_middleware, require_auth},
};
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::{predicate::SizeAbove, CompressionLayer},
    cors::CorsLayer,
};
use tracing::warn;

/// Responses smaller than this are sent uncompressed
const MIN_COMPRESS_SIZE: u16 = 1000;

/// Blog API router
pub struct BlogApi;

impl BlogApi {
    /// Create the API router
    pub fn create_router(state: AppState) -> Router {
        // Public routes (no authentication required)
        let mut public_routes = Router::new()
            .route("/health", get(health_check))
            .route("/auth/register", post(register))
            .route("/auth/login", post(login));

        if state.config.monitoring.prometheus_enabled {
            public_routes = public_routes.route("/metrics", get(export_metrics));
        }

        // Protected routes (bearer token required)
        let protected_routes = Router::new()
            .route("/auth/me", get(me))
            .route("/auth/logout", post(logout))
            .layer(middleware::from_fn_with_state(state.clone(), require_auth));

        let cors = Self::cors_layer(&state.config.cors.allowed_origins);

        Router::new()
            .nest("/api", public_routes.merge(protected_routes))
            .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
            .layer(CompressionLayer::new().compress_when(SizeAbove::new(MIN_COMPRESS_SIZE)))
            .layer(cors)
            .with_state(state)
    }

    fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
    }
}
