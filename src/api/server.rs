//! API Server

use super::{handlers::AppState, routes::BlogApi};
use crate::shutdown::wait_for_shutdown;
use crate::Result;
use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info};

/// HTTP server for the blog API
pub struct ApiServer {
    bind_addr: SocketAddr,
    app_state: AppState,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(bind_addr: SocketAddr, app_state: AppState) -> Self {
        Self {
            bind_addr,
            app_state,
        }
    }

    /// Bind and serve until `shutdown` fires, then drain in-flight requests
    pub async fn start(self, shutdown: broadcast::Receiver<()>) -> Result<()> {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind API server to {}", self.bind_addr))?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<()> {
        let local_addr = listener
            .local_addr()
            .context("Failed to read listener address")?;
        info!("API server listening on {}", local_addr);

        let app = BlogApi::create_router(self.app_state);

        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await
        {
            error!("API server error: {}", e);
            return Err(e.into());
        }

        info!("API server stopped");
        Ok(())
    }

    /// Create a router for testing
    pub fn create_test_router(&self) -> Router {
        BlogApi::create_router(self.app_state.clone())
    }
}
