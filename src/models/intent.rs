//! Request intent model
//!
//! A `RequestIntent` is derived fresh for every inbound request and decides
//! which pipeline stages the request goes through.

use axum::http::Method;
use serde::{Deserialize, Serialize};

/// HTTP method as far as classification cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    Get,
    Put,
    Other,
}

impl From<&Method> for RequestMethod {
    fn from(method: &Method) -> Self {
        if *method == Method::GET {
            RequestMethod::Get
        } else if *method == Method::PUT {
            RequestMethod::Put
        } else {
            RequestMethod::Other
        }
    }
}

/// What the gateway does with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    /// Write to `latest`: consult protection status before forwarding
    ProtectedWriteCheck,
    /// Read of `latest`: materialize the repository before forwarding
    LazyReadMaterialize,
    /// Accepted write to `latest`: publish the repository after forwarding
    PublishOnWrite,
    /// Forward untouched
    Passthrough,
}

impl ActionClass {
    /// Action to run once the request has been forwarded
    pub fn after_forward(self) -> Option<ActionClass> {
        match self {
            ActionClass::ProtectedWriteCheck => Some(ActionClass::PublishOnWrite),
            _ => None,
        }
    }

    /// Short label used in logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            ActionClass::ProtectedWriteCheck => "protected_write_check",
            ActionClass::LazyReadMaterialize => "lazy_read_materialize",
            ActionClass::PublishOnWrite => "publish_on_write",
            ActionClass::Passthrough => "passthrough",
        }
    }
}

/// Classification result for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIntent {
    /// Repository name, absent when the path is not a manifest path
    pub repo_name: Option<String>,

    /// Manifest reference (tag or digest)
    pub tag: Option<String>,

    /// Request method
    pub method: RequestMethod,

    /// Action class
    pub action: ActionClass,
}

impl RequestIntent {
    /// Intent for a request this layer does not intercept
    pub fn passthrough(method: RequestMethod) -> Self {
        Self {
            repo_name: None,
            tag: None,
            method,
            action: ActionClass::Passthrough,
        }
    }

    /// Check if the request is forwarded without interception
    pub fn is_passthrough(&self) -> bool {
        self.action == ActionClass::Passthrough
    }
}
