//! `BridgeServer`: Axum HTTP and WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::connections::ConnectionTracker;
use crate::errors::{BridgeError, Result};
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::upgrade::upgrade_handler;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<BridgeConfig>,
    /// Open pairs.
    pub connections: Arc<ConnectionTracker>,
    /// Shutdown signal observed by every pair.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
}

/// The order-stream bridge server.
pub struct BridgeServer {
    config: Arc<BridgeConfig>,
    connections: Arc<ConnectionTracker>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl BridgeServer {
    /// Create a new server.
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: Arc::new(config),
            connections: Arc::new(ConnectionTracker::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router: the upgrade path plus `/health`.
    pub fn router(&self) -> Router {
        let state = AppState {
            config: self.config.clone(),
            connections: self.connections.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route(&self.config.path, get(upgrade_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address and the server task. The task ends once
    /// [`ShutdownCoordinator::shutdown`] is called and open requests drain.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| BridgeError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| BridgeError::Bind { addr, source })?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                warn!(error = %e, "bridge server stopped with error");
            }
        });

        info!(
            %local_addr,
            path = %self.config.path,
            upstream = %self.config.upstream_url,
            "bridge listening"
        );
        Ok((local_addr, handle))
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Open-pair registry.
    pub fn connections(&self) -> &Arc<ConnectionTracker> {
        &self.connections
    }

    /// Server configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.connections.count()))
}
