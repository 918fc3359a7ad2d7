//! Repository coordination state
//!
//! These models describe how far a repository has progressed through
//! materialization and publication. They carry no image data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Materialization state of a repository
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneState {
    #[default]
    NotCloned,
    Cloning,
    Cloned,
    CloneFailed,
}

impl CloneState {
    /// Whether a clone has to run before the repository can be served
    ///
    /// Only meaningful while holding the repository's clone section, where a
    /// leftover `Cloning` means the previous attempt never finished.
    pub fn needs_clone(self) -> bool {
        self != CloneState::Cloned
    }
}

/// Publication state of a repository
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    #[default]
    NotPublished,
    Publishing,
    Published,
    PublishFailed,
}

/// Point-in-time view of one repository's coordination state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRecord {
    /// Repository name (case-sensitive)
    pub name: String,

    /// Materialization state
    pub clone_state: CloneState,

    /// Publication state
    pub publish_state: PublishState,

    /// Protection status as last reported by the directory, if ever queried
    pub pull_only: Option<bool>,

    /// When the last successful clone finished
    pub last_cloned_at: Option<DateTime<Utc>>,

    /// When the last successful publish finished
    pub last_published_at: Option<DateTime<Utc>>,
}

impl RepoRecord {
    /// Create a record in its initial state
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clone_state: CloneState::NotCloned,
            publish_state: PublishState::NotPublished,
            pull_only: None,
            last_cloned_at: None,
            last_published_at: None,
        }
    }
}
