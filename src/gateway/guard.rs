//! Overwrite guard
//!
//! Refuses writes to `latest` on repositories the directory reports as
//! pull-only. Runs strictly before the request is forwarded.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::otel::Metrics;
use crate::plugins::directory::DirectoryService;

use super::state::RepoStateRegistry;

/// Protection check for writes to `latest`
pub struct OverwriteGuard {
    directory: Arc<dyn DirectoryService>,
    registry: Arc<RepoStateRegistry>,
    metrics: Arc<Metrics>,
}

impl OverwriteGuard {
    pub fn new(
        directory: Arc<dyn DirectoryService>,
        registry: Arc<RepoStateRegistry>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            directory,
            registry,
            metrics,
        }
    }

    /// Allow or reject a write to `repo`
    ///
    /// The protection status is queried on every write; the last answer is
    /// kept on the record for inspection only. A query that fails or outlives
    /// `deadline` fails the write closed.
    pub async fn check_write(&self, repo: &str, deadline: Duration) -> Result<(), GatewayError> {
        let pull_only = tokio::time::timeout(deadline, self.directory.is_pull_only(repo))
            .await
            .map_err(|_| GatewayError::DeadlineExceeded)?
            .map_err(|e| {
                warn!(repo, error = %e, "Protection status query failed");
                GatewayError::ProtectionCheckFailed(e)
            })?;

        self.registry.record_pull_only(repo, pull_only);

        if pull_only {
            warn!(repo, "Rejected overwrite of pull-only repository");
            self.metrics.record_overwrite_rejected();
            return Err(GatewayError::RejectedOverwrite(repo.to_string()));
        }

        debug!(repo, "Write allowed");
        Ok(())
    }
}
