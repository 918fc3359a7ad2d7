//! Domain models for global-registry-gateway
//!
//! This module contains the core domain models used throughout the application.

pub mod intent;
pub mod manifest;
pub mod repo;

// Re-export commonly used types
pub use intent::{ActionClass, RequestIntent, RequestMethod};
pub use manifest::{ManifestPath, LATEST_TAG};
pub use repo::{CloneState, PublishState, RepoRecord};
