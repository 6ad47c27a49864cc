//! Configuration Manager

use super::{Config, PLACEHOLDER_JWT_SECRET};
use crate::Result;
use anyhow::{bail, Context};
use axum::http::HeaderValue;
use jsonwebtoken::Algorithm;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

const MIN_SECRET_LENGTH: usize = 32;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from a file, then apply `BLOG_*` environment
    /// overrides. Validation is left to the caller so that CLI overrides can
    /// be merged first.
    pub fn load(path: &Path) -> Result<Config> {
        let mut config = Self::load_from_file(path)?;
        Self::apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Load configuration from file, falling back to defaults if it is missing.
    /// Runs before logging is set up, so the caller reports which source won.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Override configuration values from the process environment
    pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
        Self::apply_overrides(config, |key| std::env::var(key).ok())
    }

    /// Override configuration values from an arbitrary variable source
    pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind_addr) = lookup("BLOG_BIND_ADDR") {
            config.server.bind_addr = bind_addr
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid BLOG_BIND_ADDR: {}", bind_addr))?;
        }

        if let Some(port) = lookup("BLOG_PORT") {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("Invalid BLOG_PORT: {}", port))?;
            config.server.bind_addr.set_port(port);
        }

        if let Some(secret) = lookup("BLOG_JWT_SECRET") {
            config.auth.jwt_secret = secret;
        }

        if let Some(algorithm) = lookup("BLOG_JWT_ALGORITHM") {
            config.auth.jwt_algorithm = algorithm;
        }

        if let Some(ttl) = lookup("BLOG_JWT_EXPIRES_IN") {
            config.auth.token_ttl = humantime::parse_duration(&ttl)
                .with_context(|| format!("Invalid BLOG_JWT_EXPIRES_IN: {}", ttl))?;
        }

        if let Some(cost) = lookup("BLOG_BCRYPT_COST") {
            config.auth.bcrypt_cost = cost
                .parse::<u32>()
                .with_context(|| format!("Invalid BLOG_BCRYPT_COST: {}", cost))?;
        }

        if let Some(enabled) = lookup("BLOG_RATE_LIMIT_ENABLED") {
            config.rate_limiting.enabled = enabled
                .parse::<bool>()
                .with_context(|| format!("Invalid BLOG_RATE_LIMIT_ENABLED: {}", enabled))?;
        }

        if let Some(window) = lookup("BLOG_RATE_LIMIT_WINDOW") {
            config.rate_limiting.window = humantime::parse_duration(&window)
                .with_context(|| format!("Invalid BLOG_RATE_LIMIT_WINDOW: {}", window))?;
        }

        if let Some(max) = lookup("BLOG_RATE_LIMIT_MAX_REQUESTS") {
            config.rate_limiting.max_requests = max
                .parse::<u32>()
                .with_context(|| format!("Invalid BLOG_RATE_LIMIT_MAX_REQUESTS: {}", max))?;
        }

        if let Some(origins) = lookup("BLOG_CORS_ORIGINS") {
            config.cors.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(log_level) = lookup("BLOG_LOG_LEVEL") {
            config.monitoring.log_level = log_level;
        }

        Ok(())
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_auth_config()
            .with_context(|| "Authentication configuration validation failed")?;

        self.validate_rate_limit_config()
            .with_context(|| "Rate limiting configuration validation failed")?;

        self.validate_cors_config()
            .with_context(|| "CORS configuration validation failed")?;

        self.validate_monitoring_config()
            .with_context(|| "Monitoring configuration validation failed")?;

        Ok(())
    }

    /// Validate authentication configuration
    fn validate_auth_config(&self) -> Result<()> {
        let secret = self.auth.jwt_secret.trim();
        if secret.is_empty() {
            bail!("auth.jwt_secret must be set");
        }

        if secret == PLACEHOLDER_JWT_SECRET {
            bail!("auth.jwt_secret is still the sample placeholder; set BLOG_JWT_SECRET or edit the config file");
        }

        if secret.len() < MIN_SECRET_LENGTH {
            tracing::warn!(
                "auth.jwt_secret is shorter than {} bytes; consider a longer secret",
                MIN_SECRET_LENGTH
            );
        }

        let algorithm = Algorithm::from_str(&self.auth.jwt_algorithm)
            .with_context(|| format!("Unknown auth.jwt_algorithm: {}", self.auth.jwt_algorithm))?;
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            bail!("auth.jwt_algorithm must be one of HS256, HS384, HS512");
        }

        if self.auth.token_ttl.as_secs() == 0 {
            bail!("auth.token_ttl must be at least one second");
        }

        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            bail!("auth.bcrypt_cost must be between 4 and 31");
        }

        Ok(())
    }

    /// Validate rate limiting configuration
    fn validate_rate_limit_config(&self) -> Result<()> {
        let limits = &self.rate_limiting;
        if !limits.enabled {
            return Ok(());
        }

        if limits.window.is_zero() {
            bail!("rate_limiting.window must be greater than 0");
        }

        if limits.max_requests == 0 {
            bail!("rate_limiting.max_requests must be greater than 0");
        }

        if limits.max_tracked_clients == 0 {
            bail!("rate_limiting.max_tracked_clients must be greater than 0");
        }

        if limits.cleanup_interval.is_zero() {
            bail!("rate_limiting.cleanup_interval must be greater than 0");
        }

        Ok(())
    }

    /// Validate CORS configuration
    fn validate_cors_config(&self) -> Result<()> {
        for origin in &self.cors.allowed_origins {
            if origin == "*" {
                bail!("cors.allowed_origins cannot contain '*' when credentials are allowed");
            }

            if !(origin.starts_with("http://") || origin.starts_with("https://")) {
                bail!("CORS origin {} must start with http:// or https://", origin);
            }

            HeaderValue::from_str(origin)
                .with_context(|| format!("CORS origin {} is not a valid header value", origin))?;
        }

        Ok(())
    }

    /// Validate monitoring configuration
    fn validate_monitoring_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.monitoring.log_level.as_str()) {
            bail!("monitoring.log_level must be one of: {}", valid_log_levels.join(", "));
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        bind: Option<&str>,
        port: Option<u16>,
        log_level: Option<&str>,
        no_rate_limit: bool,
    ) -> Result<()> {
        if let Some(bind_str) = bind {
            self.server.bind_addr = bind_str
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid --bind address: {}", bind_str))?;
        }

        if let Some(port) = port {
            self.server.bind_addr.set_port(port);
        }

        if let Some(level) = log_level {
            self.monitoring.log_level = level.to_string();
        }

        if no_rate_limit {
            self.rate_limiting.enabled = false;
        }

        Ok(())
    }
}
