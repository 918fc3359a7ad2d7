//! Manifest path model
//!
//! Registry manifest paths have the shape
//! `/<namespace…>/<name>/manifests/<reference>`.

use serde::{Deserialize, Serialize};

use crate::config::NameMode;

/// The mutable tag this gateway intercepts
pub const LATEST_TAG: &str = "latest";

const MANIFESTS_SEGMENT: &str = "manifests";

/// A request path that matched the manifest shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestPath {
    /// Segments in front of `manifests`, starting with the API prefix
    pub segments: Vec<String>,

    /// Tag or digest after `manifests`
    pub reference: String,
}

impl ManifestPath {
    /// Parse a raw request path, returning `None` when it is not a manifest path
    pub fn parse(path: &str) -> Option<Self> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let parts: Vec<&str> = trimmed.split('/').collect();

        // prefix, name, "manifests", reference
        if parts.len() < 4 {
            return None;
        }

        let manifests_idx = parts.len() - 2;
        if parts[manifests_idx] != MANIFESTS_SEGMENT {
            return None;
        }

        let reference = parts[manifests_idx + 1];
        if reference.is_empty() || parts[1].is_empty() {
            return None;
        }

        Some(Self {
            segments: parts[..manifests_idx].iter().map(|s| s.to_string()).collect(),
            reference: reference.to_string(),
        })
    }

    /// Repository name according to the configured extraction mode
    pub fn repo_name(&self, mode: NameMode) -> String {
        match mode {
            NameMode::Segment => self.segments[1].clone(),
            NameMode::FullPath => self.segments[1..].join("/"),
        }
    }

    /// Check if the reference is the `latest` tag
    pub fn is_latest(&self) -> bool {
        self.reference == LATEST_TAG
    }
}
