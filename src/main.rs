//! global-registry-gateway - Global repository semantics in front of a container registry
//!
//! This is the main entry point for the global-registry-gateway application.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use global_registry_gateway::config::Config;
use global_registry_gateway::gateway::{Gateway, RepoStateRegistry};
use global_registry_gateway::otel::{init_tracing, Metrics, OtelProvider};
use global_registry_gateway::plugins::directory::{DirectoryService, HttpDirectoryService};
use global_registry_gateway::server::{AppState, Server};

/// global-registry-gateway - Global repository semantics in front of a container registry
#[derive(Parser, Debug)]
#[command(name = "global-registry-gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "GLOBAL_REGISTRY_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let otel_provider = OtelProvider::new(&config.otel)?;
    init_tracing(&otel_provider, &config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting global-registry-gateway"
    );

    let directory: Arc<dyn DirectoryService> = Arc::new(HttpDirectoryService::new(&config.directory)?);
    info!(
        url = %config.directory.url,
        max_retries = config.directory.retry.max_retries,
        "Directory service client initialized"
    );

    let metrics = Arc::new(Metrics::new(&otel_provider.meter()));
    let registry = Arc::new(RepoStateRegistry::new());
    let gateway = Gateway::new(&config, directory, registry, metrics)?;
    info!(
        upstream = %config.upstream.url,
        name_mode = ?config.classifier.name_mode,
        deadline_secs = config.server.request_deadline().as_secs(),
        "Gateway initialized"
    );

    let state = AppState {
        gateway: Arc::new(gateway),
    };

    let server = Server::new(config.server.clone(), state);

    info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting HTTP server"
    );

    let result = server.run(shutdown_signal()).await;

    if let Err(e) = otel_provider.shutdown() {
        error!(error = %e, "Failed to shutdown OpenTelemetry");
    }

    info!("global-registry-gateway shutdown complete");

    result.map_err(Into::into)
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
