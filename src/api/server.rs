//! Subscription server using Axum
//!
//! Serves the `/ws` snapshot feed plus the health and status endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::broadcast::ConnectionRegistry;
use crate::config::ServerConfig;
use crate::error::{Result, VisualizerError};
use crate::models::{ClusterState, CycleSummary};

use super::middleware::cors_layer;
use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub cluster_state: watch::Receiver<ClusterState>,
    pub last_cycle: watch::Receiver<Option<CycleSummary>>,
    pub started_at: Instant,
    /// Deadline for writing one frame to a subscriber socket
    pub send_timeout: Duration,
}

impl AppState {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        cluster_state: watch::Receiver<ClusterState>,
        last_cycle: watch::Receiver<Option<CycleSummary>>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            cluster_state,
            last_cycle,
            started_at: Instant::now(),
            send_timeout,
        }
    }
}

/// Subscription server
pub struct ApiServer {
    config: ServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Create a new subscription server
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Build the router
    pub fn build_router(&self) -> Router {
        let cors = cors_layer(&self.config.cors_origins);

        routes::create_router(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until shutdown
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| {
                VisualizerError::InvalidConfig(format!(
                    "Invalid server address {}:{}: {}",
                    self.config.host, self.config.port, e
                ))
            })?;

        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let router = self.build_router();

        info!("Subscription server listening on {}", listener.local_addr()?);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| VisualizerError::Internal(e.to_string()))?;

        info!("Subscription server shut down");
        Ok(())
    }
}
