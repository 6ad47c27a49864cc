//! TechBlog Library
//!
//! Authentication and admission core of the tech blog platform backend:
//! bcrypt credentials, signed session tokens and a per-IP sliding-window
//! rate limiter, served over an axum HTTP API.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod security;
pub mod shutdown;

pub use config::Config;
pub use error::AuthError;
pub use shutdown::ShutdownCoordinator;

/// Common error type for setup and server lifecycle
pub type Result<T> = anyhow::Result<T>;
