//! HTTP middleware for global-registry-gateway
//!
//! This module provides middleware for:
//! - Request/response logging
//! - OpenTelemetry tracing

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Logging middleware function
///
/// Logs method, path, status code and response time of every request.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        path = %uri.path(),
        status = %status.as_u16(),
        duration_ms = %elapsed.as_millis(),
        "Request completed"
    );

    response
}

/// Tracing middleware function
///
/// Opens an `http_request` span covering the whole request, including the
/// time spent waiting on clones and the upstream.
pub async fn tracing_middleware(request: Request, next: Next) -> Response {
    use tracing::Instrument;

    let method = request.method().clone();
    let uri = request.uri().clone();

    let span = tracing::info_span!(
        "http_request",
        http.method = %method,
        http.url = %uri,
        http.status_code = tracing::field::Empty,
    );

    async move {
        let response = next.run(request).await;
        tracing::Span::current().record("http.status_code", response.status().as_u16());
        response
    }
    .instrument(span)
    .await
}
