//! Gateway request pipeline
//!
//! Every inbound request runs through the same ordered stages:
//!
//! 1. classify: derive a [`RequestIntent`] from method and path
//! 2. admit: overwrite guard or materialization, depending on the intent
//! 3. forward: pass the request to the upstream registry
//! 4. after forward: trigger a background publish for accepted writes
//!
//! Forwarding takes an [`Admitted`] value that only the admission stage can
//! produce, and the publish trigger takes a [`Forwarded`] value that only the
//! forward stage can produce.

pub mod classifier;
pub mod guard;
pub mod materialize;
pub mod publish;
pub mod state;

pub use classifier::Classifier;
pub use guard::OverwriteGuard;
pub use materialize::Materializer;
pub use publish::PublishCoordinator;
pub use state::{CloneSection, PublishTicket, RepoStateRegistry};

use axum::{
    body::Body,
    http::{Request, Response},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::GatewayError;
use crate::models::{ActionClass, RequestIntent};
use crate::otel::Metrics;
use crate::plugins::directory::DirectoryService;
use crate::proxy::UpstreamProxy;

/// A request that passed admission and may be forwarded
#[derive(Debug)]
pub struct Admitted {
    intent: RequestIntent,
    expires_at: Instant,
}

impl Admitted {
    pub fn intent(&self) -> &RequestIntent {
        &self.intent
    }

    /// Time left of the request deadline
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// A request the upstream registry has answered
#[derive(Debug)]
pub struct Forwarded {
    intent: RequestIntent,
    response: Response<Body>,
}

impl Forwarded {
    pub fn intent(&self) -> &RequestIntent {
        &self.intent
    }

    pub fn into_response(self) -> Response<Body> {
        self.response
    }
}

/// The interception layer in front of the upstream registry
pub struct Gateway {
    classifier: Classifier,
    registry: Arc<RepoStateRegistry>,
    guard: OverwriteGuard,
    materializer: Materializer,
    publisher: PublishCoordinator,
    proxy: UpstreamProxy,
    metrics: Arc<Metrics>,
    deadline: Duration,
}

impl Gateway {
    /// Build the pipeline from configuration and a directory service
    pub fn new(
        config: &Config,
        directory: Arc<dyn DirectoryService>,
        registry: Arc<RepoStateRegistry>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, GatewayError> {
        let proxy = UpstreamProxy::new(&config.upstream, Arc::clone(&metrics))?;

        Ok(Self {
            classifier: Classifier::new(&config.classifier),
            guard: OverwriteGuard::new(
                Arc::clone(&directory),
                Arc::clone(&registry),
                Arc::clone(&metrics),
            ),
            materializer: Materializer::new(
                Arc::clone(&directory),
                Arc::clone(&registry),
                Arc::clone(&metrics),
                Duration::from_secs(config.directory.clone_timeout_secs),
            ),
            publisher: PublishCoordinator::new(
                directory,
                Arc::clone(&registry),
                Arc::clone(&metrics),
                Duration::from_secs(config.directory.publish_timeout_secs),
            ),
            registry,
            proxy,
            metrics,
            deadline: config.server.request_deadline(),
        })
    }

    /// Shared repository state
    pub fn registry(&self) -> &Arc<RepoStateRegistry> {
        &self.registry
    }

    /// Run one request through the pipeline
    ///
    /// Gateway errors become empty-bodied responses; upstream responses are
    /// returned untouched.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let intent = self
            .classifier
            .classify(request.method(), request.uri().path());
        let action = intent.action;

        let response = match self.run(intent, request).await {
            Ok(response) => response,
            Err(e) => error_response(&e),
        };

        self.metrics
            .record_request(action.as_str(), response.status().as_u16());
        response
    }

    async fn run(
        &self,
        intent: RequestIntent,
        request: Request<Body>,
    ) -> Result<Response<Body>, GatewayError> {
        let admitted = self.admit(intent).await?;
        let forwarded = self.forward(admitted, request).await?;
        self.after_forward(&forwarded);
        Ok(forwarded.into_response())
    }

    /// Guard writes and materialize reads before anything is forwarded
    ///
    /// The request deadline starts here and also bounds the forward stage.
    pub async fn admit(&self, intent: RequestIntent) -> Result<Admitted, GatewayError> {
        let expires_at = Instant::now() + self.deadline;

        if let Some(repo) = intent.repo_name.as_deref().filter(|_| !intent.is_passthrough()) {
            self.registry.touch(repo);
            debug!(repo, action = intent.action.as_str(), "Admitting request");

            match intent.action {
                ActionClass::ProtectedWriteCheck => {
                    self.guard.check_write(repo, self.deadline).await?
                }
                ActionClass::LazyReadMaterialize => {
                    self.materializer.ensure_cloned(repo, self.deadline).await?
                }
                ActionClass::PublishOnWrite | ActionClass::Passthrough => {}
            }
        }

        Ok(Admitted { intent, expires_at })
    }

    /// Forward an admitted request to the upstream registry
    pub async fn forward(
        &self,
        admitted: Admitted,
        request: Request<Body>,
    ) -> Result<Forwarded, GatewayError> {
        let response = self.proxy.forward(request, admitted.remaining()).await?;
        Ok(Forwarded {
            intent: admitted.intent,
            response,
        })
    }

    /// Trigger follow-up work once the upstream has answered
    pub fn after_forward(&self, forwarded: &Forwarded) {
        let intent = forwarded.intent();
        if intent.action.after_forward() != Some(ActionClass::PublishOnWrite) {
            return;
        }
        let Some(repo) = intent.repo_name.as_deref() else {
            return;
        };

        let status = forwarded.response.status();
        if !status.is_success() {
            debug!(repo, status = status.as_u16(), "Upstream did not accept write, not publishing");
            return;
        }

        // Detach: the publish task outlives this request
        drop(self.publisher.publish_after_write(repo));
    }
}

fn error_response(e: &GatewayError) -> Response<Body> {
    match e {
        GatewayError::RejectedOverwrite(_) => {}
        GatewayError::DeadlineExceeded => warn!(error = %e, "Request deadline exceeded"),
        _ => error!(error = %e, "Request failed"),
    }

    let mut response = Response::new(Body::empty());
    *response.status_mut() = e.status_code();
    response
}
