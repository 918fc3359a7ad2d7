//! Application error types for global-registry-gateway
//!
//! This module defines common error types used throughout the application.
//! All error types use `thiserror` for ergonomic error handling.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors returned by the directory service collaborator
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DirectoryError {
    /// Network timeout
    #[error("Network timeout")]
    NetworkTimeout,

    /// Connection refused
    #[error("Connection refused")]
    ConnectionRefused,

    /// Server error
    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    /// Repository not known to the directory
    #[error("Repository not found: {0}")]
    NotFound(String),

    /// Invalid data received
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Generic network error
    #[error("Network error: {0}")]
    Network(String),
}

/// Errors produced while running a request through the gateway pipeline
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    /// Client tried to overwrite `latest` on a pull-only repository
    #[error("Refusing to overwrite pull-only repository: {0}")]
    RejectedOverwrite(String),

    /// Materializing the repository from the directory failed
    #[error("Clone failed: {0}")]
    CloneFailed(DirectoryError),

    /// Publishing the repository to the directory failed
    #[error("Publish failed: {0}")]
    PublishFailed(DirectoryError),

    /// The protection status of the repository could not be determined
    #[error("Protection check failed: {0}")]
    ProtectionCheckFailed(DirectoryError),

    /// The request deadline elapsed while waiting on a coordination step
    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    /// Forwarding to the upstream registry failed
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl GatewayError {
    /// HTTP status sent to the client for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RejectedOverwrite(_) => StatusCode::UNAUTHORIZED,
            GatewayError::CloneFailed(_)
            | GatewayError::PublishFailed(_)
            | GatewayError::ProtectionCheckFailed(_)
            | GatewayError::DeadlineExceeded => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if the error is retryable
    fn is_retryable(&self) -> bool;
}

impl RetryableError for DirectoryError {
    fn is_retryable(&self) -> bool {
        match self {
            // Retryable errors
            DirectoryError::NetworkTimeout => true,
            DirectoryError::ConnectionRefused => true,
            DirectoryError::ServerError(code) if *code >= 500 => true,
            DirectoryError::Network(_) => true,

            // Non-retryable errors
            DirectoryError::InvalidData(_) => false,
            DirectoryError::NotFound(_) => false,
            DirectoryError::ServerError(_) => false, // 4xx errors
        }
    }
}
