//! HTTP API Module
//!
//! Axum routes for registration, login and the current-user endpoints,
//! wrapped by per-IP rate limiting.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod types;

pub use handlers::AppState;
pub use middleware::CurrentUser;
pub use routes::BlogApi;
pub use server::ApiServer;
pub use types::*;
