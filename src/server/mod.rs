//! HTTP server components for global-registry-gateway
//!
//! This module provides the HTTP server infrastructure including:
//! - Router configuration and route handlers
//! - Logging and tracing middleware
//! - Server lifecycle management

pub mod middleware;
pub mod router;

pub use middleware::{logging_middleware, tracing_middleware};
pub use router::{build_router, AppState, HealthResponse, ReposResponse};

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::config::ServerConfig;

/// HTTP Server for global-registry-gateway
///
/// Manages the axum server lifecycle, including:
/// - Binding to configured address
/// - Applying middleware layers
/// - Graceful shutdown handling
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.config.host.parse().unwrap_or([0, 0, 0, 0].into()),
            self.config.port,
        )
    }

    /// Run the server until shutdown signal is received
    ///
    /// # Arguments
    ///
    /// * `shutdown` - Future that resolves when the server should shut down
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = self.bind_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        // No compression layer: registry bodies must pass through byte for byte
        let app = build_router(self.state)
            .layer(axum::middleware::from_fn(logging_middleware))
            .layer(axum::middleware::from_fn(tracing_middleware))
            .layer(tower_http::trace::TraceLayer::new_for_http());

        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::Bind(e.to_string()))?;
        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    /// Failed to serve requests
    #[error("Server error: {0}")]
    Serve(String),
}
