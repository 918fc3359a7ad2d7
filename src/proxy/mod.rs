//! Upstream registry passthrough
//!
//! Forwards requests to the upstream registry and streams the response back.
//! Method, path, query, status, body and end-to-end headers are carried over
//! unchanged; hop-by-hop headers are dropped in both directions.

use axum::{
    body::{Body, HttpBody},
    http::{header, HeaderMap, HeaderName, Request, Response},
};
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{redirect, Client};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::config::UpstreamConfig;
use crate::error::GatewayError;
use crate::otel::Metrics;

/// Request body chunks buffered between the client and upstream connections
const BODY_CHANNEL_CAPACITY: usize = 16;

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHENTICATE,
];

/// Reverse proxy to the upstream registry
pub struct UpstreamProxy {
    base_url: String,
    client: Client,
    metrics: Arc<Metrics>,
}

impl UpstreamProxy {
    /// Create a proxy for the configured upstream registry
    pub fn new(config: &UpstreamConfig, metrics: Arc<Metrics>) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
            metrics,
        })
    }

    /// Forward a request and return the upstream response as a stream
    ///
    /// `timeout` bounds the wait for the upstream response headers only; the
    /// response body streams back afterwards without a limit.
    pub async fn forward(
        &self,
        request: Request<Body>,
        timeout: Duration,
    ) -> Result<Response<Body>, GatewayError> {
        let (parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", self.base_url, path_and_query);

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        let mut upstream = self
            .client
            .request(parts.method.clone(), &url)
            .headers(headers);
        if body.size_hint().exact() != Some(0) {
            upstream = upstream.body(stream_body(body));
        }

        debug!(method = %parts.method, url = %url, "Forwarding to upstream");
        let started = Instant::now();

        let response = tokio::time::timeout(timeout, upstream.send())
            .await
            .map_err(|_| {
                warn!(method = %parts.method, url = %url, "Upstream did not answer before the deadline");
                GatewayError::DeadlineExceeded
            })?
            .map_err(|e| {
                warn!(method = %parts.method, url = %url, error = %e, "Upstream request failed");
                GatewayError::Upstream(e.to_string())
            })?;

        self.metrics
            .record_upstream_duration(parts.method.as_str(), started.elapsed().as_secs_f64());

        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut forwarded = Response::new(Body::from_stream(response.bytes_stream()));
        *forwarded.status_mut() = status;
        *forwarded.headers_mut() = headers;
        Ok(forwarded)
    }
}

/// Pipe an inbound body into an outbound one without buffering it whole
fn stream_body(body: Body) -> reqwest::Body {
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(BODY_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut stream = body.into_data_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(std::io::Error::other);
            let failed = chunk.is_err();
            if tx.send(chunk).await.is_err() || failed {
                break;
            }
        }
    });

    reqwest::Body::wrap_stream(ReceiverStream::new(rx))
}

/// Remove hop-by-hop headers, including any named by `Connection`
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove(header::PROXY_AUTHORIZATION);
}
