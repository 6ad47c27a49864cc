//! TechBlog - Blog Platform API Server
//!
//! Accounts, bearer-token sessions and per-IP rate limiting over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use techblog::{
    api::{ApiServer, AppState},
    config::ConfigManager,
    ShutdownCoordinator,
};

/// CLI arguments for TechBlog
#[derive(Parser, Debug)]
#[command(name = "techblog")]
#[command(about = "TechBlog - Blog Platform API Server")]
#[command(version)]
#[command(long_about = "
TechBlog - Blog Platform API Server

Configuration priority (highest to lowest):
1. Command-line arguments
2. Environment variables
3. Configuration file
4. Built-in defaults

Environment variables:
  BLOG_BIND_ADDR                - Bind address (e.g., 0.0.0.0:5000)
  BLOG_PORT                     - Port to bind to
  BLOG_JWT_SECRET               - Token signing secret (required)
  BLOG_JWT_ALGORITHM            - HS256, HS384 or HS512
  BLOG_JWT_EXPIRES_IN           - Token lifetime (e.g., 7d, 12h)
  BLOG_BCRYPT_COST              - bcrypt work factor (4-31)
  BLOG_RATE_LIMIT_ENABLED       - Enable rate limiting (true/false)
  BLOG_RATE_LIMIT_WINDOW        - Sliding window length (e.g., 15m)
  BLOG_RATE_LIMIT_MAX_REQUESTS  - Requests allowed per window
  BLOG_CORS_ORIGINS             - Comma-separated allowed origins
  BLOG_LOG_LEVEL                - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "config.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Bind address (overrides config file)
    #[arg(short, long, help = "Bind address (e.g., 127.0.0.1:5000)")]
    pub bind: Option<String>,

    /// Port to bind to (overrides config file)
    #[arg(short, long, help = "Port to bind to")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Disable rate limiting (overrides config file)
    #[arg(long, help = "Disable rate limiting")]
    pub no_rate_limit: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration: file or defaults, then environment, then CLI
    let mut config = ConfigManager::load(&args.config)?;

    let cli_level = if args.verbose {
        Some("debug")
    } else {
        args.log_level.as_deref()
    };
    config.merge_with_cli_args(
        args.bind.as_deref(),
        args.port,
        cli_level,
        args.no_rate_limit,
    )?;

    init_tracing(&config.monitoring.log_level)?;

    info!("Starting TechBlog API v{}", env!("CARGO_PKG_VERSION"));
    if args.config.exists() {
        info!("Configuration loaded from {}", args.config.display());
    } else {
        warn!(
            "Configuration file {} not found, using defaults and environment",
            args.config.display()
        );
    }
    if args.no_rate_limit {
        info!("CLI override: rate limiting disabled");
    }

    // Final validation after all overrides
    config
        .validate()
        .context("Final configuration validation failed")?;

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Bind address: {}", config.server.bind_addr);
        info!("  Token algorithm: {}", config.auth.jwt_algorithm);
        info!("  Token lifetime: {}", humantime::format_duration(config.auth.token_ttl));
        info!(
            "  Rate limiting: {}",
            if config.rate_limiting.enabled {
                format!(
                    "{} requests per {}",
                    config.rate_limiting.max_requests,
                    humantime::format_duration(config.rate_limiting.window)
                )
            } else {
                "disabled".to_string()
            }
        );
        info!("  CORS origins: {}", config.cors.allowed_origins.join(", "));
        return Ok(());
    }

    let bind_addr = config.server.bind_addr;
    let shutdown_coordinator = ShutdownCoordinator::new(config.server.shutdown_timeout);

    let state = AppState::from_config(config).context("Failed to initialize application state")?;

    let cleanup_handle = state
        .rate_limiter
        .clone()
        .start_cleanup_task(shutdown_coordinator.subscribe());

    let server = ApiServer::new(bind_addr, state);
    let mut server_handle = tokio::spawn(server.start(shutdown_coordinator.subscribe()));

    info!("TechBlog API started on {}", bind_addr);
    info!("Press Ctrl+C or send SIGTERM/SIGINT to shutdown gracefully");

    tokio::select! {
        result = shutdown_coordinator.listen_for_signals() => {
            if let Err(e) = result {
                error!("Error setting up signal handlers: {}", e);
                shutdown_coordinator.trigger();
            }
        }
        result = &mut server_handle => {
            // The server stopped without being asked to, e.g. the bind failed
            shutdown_coordinator.trigger();
            return result.context("Server task panicked")?;
        }
    }

    info!("Initiating graceful shutdown...");

    match tokio::time::timeout(shutdown_coordinator.timeout(), server_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!("Server error: {:#}", e),
        Ok(Err(e)) => error!("Server task failed: {}", e),
        Err(_) => warn!(
            "In-flight requests did not finish within {:?}",
            shutdown_coordinator.timeout()
        ),
    }

    if tokio::time::timeout(Duration::from_secs(1), cleanup_handle)
        .await
        .is_err()
    {
        warn!("Rate limiter cleanup task did not stop in time");
    }

    info!("Server shutdown complete");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
