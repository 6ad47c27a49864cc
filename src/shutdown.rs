//! Graceful Shutdown Handling
//!
//! This module provides utilities for handling graceful shutdown of the blog API server.
//! It supports SIGTERM and SIGINT signals and lets in-flight requests finish before exit.

use crate::Result;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Shutdown coordinator that manages graceful shutdown process
pub struct ShutdownCoordinator {
    /// Broadcast sender for shutdown signal
    shutdown_tx: broadcast::Sender<()>,
    /// How long in-flight requests get to drain
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shutdown_tx,
            timeout,
        }
    }

    /// Get a shutdown receiver for components to listen for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Notify every subscriber that shutdown has begun
    pub fn trigger(&self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            // No subscribers left
            debug!("Shutdown signal had no receivers: {}", e);
        }
    }

    /// Start listening for shutdown signals (SIGTERM, SIGINT)
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                }
            }
        }

        #[cfg(windows)]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        if self.shutdown_tx.receiver_count() == 0 {
            warn!("Shutdown requested but no components are listening");
        }
        self.trigger();

        Ok(())
    }
}

/// Resolves once the coordinator broadcasts shutdown. Suitable for
/// `axum::serve(..).with_graceful_shutdown(..)`.
pub async fn wait_for_shutdown(mut shutdown_rx: broadcast::Receiver<()>) {
    // A closed channel means the coordinator is gone, which is also a shutdown
    let _ = shutdown_rx.recv().await;
    debug!("Shutdown signal received");
}
