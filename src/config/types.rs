//! Configuration Types

use crate::security::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Secret shipped in sample configs. The server refuses to start with it.
pub const PLACEHOLDER_JWT_SECRET: &str = "your_super_secret_jwt_key_here_change_in_production";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub rate_limiting: RateLimitConfig,
    pub cors: CorsConfig,
    pub monitoring: MonitoringConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_algorithm: String,
    #[serde(with = "humantime_serde")]
    pub token_ttl: Duration,
    pub bcrypt_cost: u32,
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub prometheus_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 5000)),
                shutdown_timeout: Duration::from_secs(30),
            },
            auth: AuthConfig {
                jwt_secret: PLACEHOLDER_JWT_SECRET.to_string(),
                jwt_algorithm: "HS256".to_string(),
                token_ttl: Duration::from_secs(7 * 24 * 60 * 60),
                bcrypt_cost: bcrypt::DEFAULT_COST,
            },
            rate_limiting: RateLimitConfig::default(),
            cors: CorsConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
            },
            monitoring: MonitoringConfig {
                log_level: "info".to_string(),
                prometheus_enabled: true,
            },
        }
    }
}
