//! Directory service trait definition
//!
//! This module defines the `DirectoryService` trait the gateway's coordinators
//! call into. Implementations do the actual clone and publish I/O.

use async_trait::async_trait;

use crate::error::DirectoryError;

/// Trait for the global repository directory
///
/// All three operations may block on network I/O. `clone_repo` and
/// `publish_repo` must be safe to call repeatedly for the same repository.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Returns the service name used in logs
    fn name(&self) -> &str;

    /// Whether the repository's mutable tag must not be overwritten locally
    async fn is_pull_only(&self, repo: &str) -> Result<bool, DirectoryError>;

    /// Materialize the global repository into local registry storage
    async fn clone_repo(&self, repo: &str) -> Result<(), DirectoryError>;

    /// Publish the local repository to the global directory
    async fn publish_repo(&self, repo: &str) -> Result<(), DirectoryError>;
}
