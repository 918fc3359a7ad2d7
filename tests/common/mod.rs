//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use global_registry_gateway::config::{
    ClassifierConfig, Config, DirectoryConfig, NameMode, RetryConfig, ServerConfig,
    UpstreamConfig,
};
use global_registry_gateway::error::DirectoryError;
use global_registry_gateway::gateway::{Gateway, RepoStateRegistry};
use global_registry_gateway::models::{PublishState, RepoRecord};
use global_registry_gateway::otel::Metrics;
use global_registry_gateway::plugins::directory::DirectoryService;
use global_registry_gateway::server::{AppState, Server};

/// In-memory directory that counts calls
#[derive(Debug, Default)]
pub struct FakeDirectory {
    /// Repositories reported as pull-only
    pub pull_only: Vec<String>,
    /// How long a clone takes
    pub clone_delay: Duration,
    /// Whether clones fail
    pub fail_clone: bool,
    pub pull_only_queries: AtomicUsize,
    pub clones: AtomicUsize,
    pub publishes: AtomicUsize,
}

impl FakeDirectory {
    pub fn clone_count(&self) -> usize {
        self.clones.load(Ordering::SeqCst)
    }

    pub fn publish_count(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    pub fn pull_only_query_count(&self) -> usize {
        self.pull_only_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryService for FakeDirectory {
    fn name(&self) -> &str {
        "fake"
    }

    async fn is_pull_only(&self, repo: &str) -> Result<bool, DirectoryError> {
        self.pull_only_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.pull_only.iter().any(|r| r == repo))
    }

    async fn clone_repo(&self, _repo: &str) -> Result<(), DirectoryError> {
        self.clones.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.clone_delay).await;
        if self.fail_clone {
            Err(DirectoryError::ServerError(500))
        } else {
            Ok(())
        }
    }

    async fn publish_repo(&self, _repo: &str) -> Result<(), DirectoryError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Gateway configuration pointing at test doubles
pub fn test_config(upstream_url: &str, directory_url: &str, name_mode: NameMode) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            read_timeout_secs: 10,
            write_timeout_secs: 10,
            idle_timeout_secs: 10,
        },
        upstream: UpstreamConfig {
            url: upstream_url.to_string(),
            connect_timeout_secs: 5,
        },
        directory: DirectoryConfig {
            url: directory_url.to_string(),
            request_timeout_secs: 5,
            clone_timeout_secs: 10,
            publish_timeout_secs: 10,
            retry: RetryConfig {
                max_retries: 1,
                initial_backoff_secs: 0,
                max_backoff_secs: 0,
                backoff_multiplier: 2.0,
                jitter: false,
            },
        },
        classifier: ClassifierConfig { name_mode },
        ..Default::default()
    }
}

/// Create a test application state
pub fn create_test_state(config: &Config, directory: Arc<dyn DirectoryService>) -> AppState {
    let gateway = Gateway::new(
        config,
        directory,
        Arc::new(RepoStateRegistry::new()),
        Arc::new(Metrics::global()),
    )
    .expect("Failed to build gateway");

    AppState {
        gateway: Arc::new(gateway),
    }
}

/// Run a test server in the background and return the address
/// The server will be shut down when the returned shutdown sender is dropped or sent
pub async fn run_test_server(
    config: &Config,
    state: AppState,
) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let server = Server::new(config.server.clone(), state);
    tokio::spawn(async move {
        server
            .serve(listener, async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("Server error");
    });

    // Give the server a moment to start (100ms is sufficient for slow CI systems)
    tokio::time::sleep(Duration::from_millis(100)).await;

    (addr, shutdown_tx)
}

/// Poll the state API until the repository's publish has settled
pub async fn wait_for_publish(addr: SocketAddr, repo: &str) -> RepoRecord {
    let client = reqwest::Client::new();
    for _ in 0..100 {
        let response = client
            .get(format!("http://{}/api/repos/{}", addr, repo))
            .send()
            .await
            .expect("Failed to query repo state");
        if response.status().is_success() {
            let record: RepoRecord = response.json().await.expect("Failed to parse record");
            if matches!(
                record.publish_state,
                PublishState::Published | PublishState::PublishFailed
            ) {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("publish of {} did not settle", repo);
}
