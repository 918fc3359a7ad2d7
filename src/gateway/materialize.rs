//! Materialization coordinator
//!
//! Makes sure a repository has been cloned from the directory before a read
//! of `latest` is forwarded, running at most one clone per repository at a
//! time.
//!
//! The clone itself runs in a spawned task that owns the repository's clone
//! section. A caller whose deadline elapses stops waiting for it, but the
//! clone keeps going and later readers pick up its result.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{DirectoryError, GatewayError};
use crate::models::CloneState;
use crate::otel::Metrics;
use crate::plugins::directory::DirectoryService;

use super::state::{CloneSection, RepoStateRegistry};

/// Single-flight clone driver
pub struct Materializer {
    directory: Arc<dyn DirectoryService>,
    registry: Arc<RepoStateRegistry>,
    metrics: Arc<Metrics>,
    clone_timeout: Duration,
}

impl Materializer {
    pub fn new(
        directory: Arc<dyn DirectoryService>,
        registry: Arc<RepoStateRegistry>,
        metrics: Arc<Metrics>,
        clone_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            registry,
            metrics,
            clone_timeout,
        }
    }

    /// Return once `repo` is cloned, cloning it first if needed
    pub async fn ensure_cloned(&self, repo: &str, deadline: Duration) -> Result<(), GatewayError> {
        // Cloned is terminal, so it can be read without the section
        if self
            .registry
            .get(repo)
            .is_some_and(|r| r.clone_state == CloneState::Cloned)
        {
            debug!(repo, "Repository already cloned");
            return Ok(());
        }

        let started = Instant::now();
        let section = self.registry.enter_clone_section(repo, deadline).await?;

        if let Some(outcome) = section.completed_while_waiting() {
            debug!(repo, ok = outcome.is_ok(), "Clone finished while waiting");
            return outcome.map_err(GatewayError::CloneFailed);
        }

        if !section.state().needs_clone() {
            return Ok(());
        }

        let remaining = deadline.saturating_sub(started.elapsed());
        let handle = self.spawn_clone(repo, section);

        match tokio::time::timeout(remaining, handle).await {
            Ok(Ok(result)) => result.map_err(GatewayError::CloneFailed),
            Ok(Err(e)) => Err(GatewayError::CloneFailed(DirectoryError::Network(
                e.to_string(),
            ))),
            Err(_) => {
                info!(repo, "Request deadline elapsed, clone continues in background");
                Err(GatewayError::DeadlineExceeded)
            }
        }
    }

    fn spawn_clone(
        &self,
        repo: &str,
        mut section: CloneSection,
    ) -> JoinHandle<Result<(), DirectoryError>> {
        let directory = Arc::clone(&self.directory);
        let metrics = Arc::clone(&self.metrics);
        let clone_timeout = self.clone_timeout;
        let repo = repo.to_string();

        section.mark_cloning();

        tokio::spawn(async move {
            info!(repo = %repo, directory = directory.name(), "Cloning repository");
            let started = Instant::now();

            let result = tokio::time::timeout(clone_timeout, directory.clone_repo(&repo))
                .await
                .unwrap_or(Err(DirectoryError::NetworkTimeout));

            let elapsed = started.elapsed();
            match &result {
                Ok(()) => {
                    info!(repo = %repo, duration_ms = elapsed.as_millis() as u64, "Clone finished");
                    metrics.record_clone("success", elapsed.as_secs_f64());
                }
                Err(e) => {
                    error!(repo = %repo, error = %e, "Clone failed");
                    metrics.record_clone("failure", elapsed.as_secs_f64());
                }
            }

            section.finish(&result);
            result
        })
    }
}
