//! HTTP router for global-registry-gateway
//!
//! This module defines the axum router that handles all HTTP requests.
//! It provides routes for:
//! - Health checks
//! - Repository state inspection
//! - Everything else, which goes through the gateway pipeline

use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::gateway::Gateway;
use crate::models::RepoRecord;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Request pipeline
    pub gateway: Arc<Gateway>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Repository listing response
#[derive(Debug, Serialize, Deserialize)]
pub struct ReposResponse {
    pub repos: Vec<RepoRecord>,
    pub total: usize,
}

/// Build the main application router
///
/// Registry traffic has no explicit route: it falls through to the gateway.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/repos", get(api_list_repos_handler))
        .route("/api/repos/*name", get(api_get_repo_handler))
        .fallback(gateway_handler)
        .with_state(state)
}

/// Health check endpoint handler
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List every repository the gateway has seen
async fn api_list_repos_handler(State(state): State<AppState>) -> impl IntoResponse {
    let repos = state.gateway.registry().records();
    Json(ReposResponse {
        total: repos.len(),
        repos,
    })
}

/// Show one repository's coordination state
async fn api_get_repo_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    match state.gateway.registry().get(&name) {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("Repository not found: {}", name) })),
        )
            .into_response(),
    }
}

/// Registry traffic
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    state.gateway.handle(request).await
}
