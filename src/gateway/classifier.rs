//! Path classifier
//!
//! Maps `(method, path)` to a [`RequestIntent`]. Pure: no state, no I/O.

use axum::http::Method;

use crate::config::{ClassifierConfig, NameMode};
use crate::models::{ActionClass, ManifestPath, RequestIntent, RequestMethod};

/// Classifies inbound registry requests
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier {
    name_mode: NameMode,
}

impl Classifier {
    /// Create a classifier using the configured name extraction rule
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            name_mode: config.name_mode,
        }
    }

    /// Classify a request by method and raw path
    ///
    /// Paths that are not manifest paths yield a passthrough intent with no
    /// repository name. Manifest paths for other references or methods keep
    /// their name and tag but are still passthrough.
    pub fn classify(&self, method: &Method, path: &str) -> RequestIntent {
        let method = RequestMethod::from(method);

        let Some(manifest) = ManifestPath::parse(path) else {
            return RequestIntent::passthrough(method);
        };

        let action = match (method, manifest.is_latest()) {
            (RequestMethod::Get, true) => ActionClass::LazyReadMaterialize,
            (RequestMethod::Put, true) => ActionClass::ProtectedWriteCheck,
            _ => ActionClass::Passthrough,
        };

        RequestIntent {
            repo_name: Some(manifest.repo_name(self.name_mode)),
            tag: Some(manifest.reference),
            method,
            action,
        }
    }
}
