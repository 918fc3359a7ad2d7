//! Publish coordinator
//!
//! After a write to `latest` has been accepted upstream, the repository is
//! published to the directory in a background task. At most one publish per
//! repository is in flight; a trigger that finds one running is dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{DirectoryError, GatewayError};
use crate::otel::Metrics;
use crate::plugins::directory::DirectoryService;

use super::state::RepoStateRegistry;

/// Background publisher
pub struct PublishCoordinator {
    directory: Arc<dyn DirectoryService>,
    registry: Arc<RepoStateRegistry>,
    metrics: Arc<Metrics>,
    publish_timeout: Duration,
}

impl PublishCoordinator {
    pub fn new(
        directory: Arc<dyn DirectoryService>,
        registry: Arc<RepoStateRegistry>,
        metrics: Arc<Metrics>,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            registry,
            metrics,
            publish_timeout,
        }
    }

    /// Start publishing `repo` in the background
    ///
    /// Returns the task handle, or `None` when a publish for `repo` is
    /// already running. The task is not tied to the calling request; its
    /// failures only reach the log.
    pub fn publish_after_write(
        &self,
        repo: &str,
    ) -> Option<JoinHandle<Result<(), GatewayError>>> {
        let Some(ticket) = self.registry.begin_publish(repo) else {
            debug!(repo, "Publish already in flight, skipping");
            self.metrics.record_publish("skipped");
            return None;
        };

        let directory = Arc::clone(&self.directory);
        let metrics = Arc::clone(&self.metrics);
        let publish_timeout = self.publish_timeout;
        let repo = repo.to_string();

        Some(tokio::spawn(async move {
            info!(repo = %repo, directory = directory.name(), "Publishing repository");
            let started = Instant::now();

            let result = tokio::time::timeout(publish_timeout, directory.publish_repo(&repo))
                .await
                .unwrap_or(Err(DirectoryError::NetworkTimeout));

            ticket.finish(&result);

            match result {
                Ok(()) => {
                    info!(
                        repo = %repo,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Publish finished"
                    );
                    metrics.record_publish("success");
                    Ok(())
                }
                Err(e) => {
                    error!(repo = %repo, error = %e, "Publish failed");
                    metrics.record_publish("failure");
                    Err(GatewayError::PublishFailed(e))
                }
            }
        }))
    }
}
