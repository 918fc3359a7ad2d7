//! OpenTelemetry integration for global-registry-gateway
//!
//! This module provides observability through OpenTelemetry, including
//! tracing, metrics, and optional export to OTLP endpoints.

use crate::config::{LoggingConfig, OtelConfig};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter, MeterProvider as _},
    trace::TracerProvider as TracerProviderTrait,
    KeyValue,
};
use opentelemetry_sdk::{metrics::SdkMeterProvider, trace::TracerProvider, Resource};
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// OpenTelemetry error types
#[derive(Debug, Error)]
pub enum OtelError {
    /// Failed to initialize tracer
    #[error("Failed to initialize tracer: {0}")]
    TracerInit(String),

    /// Failed to initialize meter
    #[error("Failed to initialize meter: {0}")]
    MeterInit(String),

    /// Failed to shutdown
    #[error("Failed to shutdown: {0}")]
    Shutdown(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// OpenTelemetry provider for global-registry-gateway
///
/// Manages tracing and metrics providers with OTLP export capability.
pub struct OtelProvider {
    tracer_provider: Option<TracerProvider>,
    meter_provider: SdkMeterProvider,
    config: OtelConfig,
}

impl OtelProvider {
    /// Create a new OtelProvider with the given configuration
    pub fn new(config: &OtelConfig) -> Result<Self, OtelError> {
        let resource = Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]);

        let (tracer_provider, meter_provider) = if config.enabled {
            let endpoint = config.endpoint.as_ref().ok_or_else(|| {
                OtelError::Config("OTLP endpoint is required when enabled".into())
            })?;

            let tracer_provider = Self::init_tracer_provider(endpoint, &resource)?;
            let meter_provider = Self::init_meter_provider(endpoint, &resource)?;

            (Some(tracer_provider), meter_provider)
        } else {
            // No reader: instruments record into nothing
            let meter_provider = SdkMeterProvider::builder().with_resource(resource).build();
            (None, meter_provider)
        };

        if let Some(ref tp) = tracer_provider {
            global::set_tracer_provider(tp.clone());
        }

        Ok(Self {
            tracer_provider,
            meter_provider,
            config: config.clone(),
        })
    }

    fn init_tracer_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<TracerProvider, OtelError> {
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::runtime;
        use opentelemetry_sdk::trace::{Config, Sampler};

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint)
            .build_span_exporter()
            .map_err(|e| OtelError::TracerInit(e.to_string()))?;

        let trace_config = Config::default()
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(resource.clone());

        Ok(TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_config(trace_config)
            .build())
    }

    fn init_meter_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<SdkMeterProvider, OtelError> {
        use opentelemetry_otlp::{MetricsExporterBuilder, WithExportConfig};
        use opentelemetry_sdk::metrics::reader::{
            DefaultAggregationSelector, DefaultTemporalitySelector,
        };
        use opentelemetry_sdk::{metrics::PeriodicReader, runtime};

        let exporter = MetricsExporterBuilder::from(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .build_metrics_exporter(
            Box::new(DefaultTemporalitySelector::new()),
            Box::new(DefaultAggregationSelector::new()),
        )
        .map_err(|e| OtelError::MeterInit(e.to_string()))?;

        let reader = PeriodicReader::builder(exporter, runtime::Tokio).build();

        Ok(SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(reader)
            .build())
    }

    /// Get a tracer from the provider
    pub fn tracer(&self, name: &'static str) -> opentelemetry_sdk::trace::Tracer {
        if let Some(ref tp) = self.tracer_provider {
            tp.tracer(name)
        } else {
            TracerProvider::builder().build().tracer(name)
        }
    }

    /// Get the meter for creating metrics
    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(self.config.service_name.clone())
    }

    /// Check if OpenTelemetry is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Shutdown the OpenTelemetry providers gracefully
    pub fn shutdown(&self) -> Result<(), OtelError> {
        if let Err(e) = self.meter_provider.shutdown() {
            return Err(OtelError::Shutdown(format!(
                "Meter shutdown failed: {:?}",
                e
            )));
        }

        if let Some(ref tp) = self.tracer_provider {
            for result in tp.force_flush() {
                if let Err(e) = result {
                    return Err(OtelError::Shutdown(format!("Tracer flush failed: {:?}", e)));
                }
            }
        }

        Ok(())
    }
}

impl Drop for OtelProvider {
    fn drop(&mut self) {
        // Best-effort shutdown on drop
        let _ = self.shutdown();
    }
}

/// Gateway metrics
///
/// Instruments for request outcomes and the two directory coordinators.
pub struct Metrics {
    /// Requests handled, by action class and status
    pub requests_total: Counter<u64>,

    /// Writes refused because the repository is pull-only
    pub overwrite_rejections_total: Counter<u64>,

    /// Clone attempts, by outcome
    pub clones_total: Counter<u64>,

    /// Publish attempts, by outcome
    pub publishes_total: Counter<u64>,

    /// Clone duration in seconds
    pub clone_duration: Histogram<f64>,

    /// Upstream request duration in seconds
    pub upstream_duration: Histogram<f64>,
}

impl Metrics {
    /// Create new metrics with the given meter
    pub fn new(meter: &Meter) -> Self {
        let requests_total = meter
            .u64_counter("gateway_requests_total")
            .with_description("Total number of requests handled")
            .init();

        let overwrite_rejections_total = meter
            .u64_counter("gateway_overwrite_rejections_total")
            .with_description("Total number of writes rejected on pull-only repositories")
            .init();

        let clones_total = meter
            .u64_counter("gateway_clones_total")
            .with_description("Total number of clone attempts")
            .init();

        let publishes_total = meter
            .u64_counter("gateway_publishes_total")
            .with_description("Total number of publish attempts")
            .init();

        let clone_duration = meter
            .f64_histogram("gateway_clone_duration_seconds")
            .with_description("Clone duration in seconds")
            .init();

        let upstream_duration = meter
            .f64_histogram("gateway_upstream_duration_seconds")
            .with_description("Upstream request duration in seconds")
            .init();

        Self {
            requests_total,
            overwrite_rejections_total,
            clones_total,
            publishes_total,
            clone_duration,
            upstream_duration,
        }
    }

    /// Metrics backed by the global meter provider
    ///
    /// Records nothing unless a global provider has been installed.
    pub fn global() -> Self {
        Self::new(&global::meter("global-registry-gateway"))
    }

    /// Record a handled request
    pub fn record_request(&self, action: &str, status: u16) {
        self.requests_total.add(
            1,
            &[
                KeyValue::new("action", action.to_string()),
                KeyValue::new("status", i64::from(status)),
            ],
        );
    }

    /// Record a rejected overwrite
    pub fn record_overwrite_rejected(&self) {
        self.overwrite_rejections_total.add(1, &[]);
    }

    /// Record the outcome and duration of a clone
    pub fn record_clone(&self, outcome: &str, duration_secs: f64) {
        let attrs = [KeyValue::new("outcome", outcome.to_string())];
        self.clones_total.add(1, &attrs);
        self.clone_duration.record(duration_secs, &attrs);
    }

    /// Record the outcome of a publish
    pub fn record_publish(&self, outcome: &str) {
        self.publishes_total
            .add(1, &[KeyValue::new("outcome", outcome.to_string())]);
    }

    /// Record upstream request duration
    pub fn record_upstream_duration(&self, method: &str, duration_secs: f64) {
        self.upstream_duration.record(
            duration_secs,
            &[KeyValue::new("method", method.to_string())],
        );
    }
}

fn parse_level(log_level: &str) -> Level {
    match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize tracing subscriber with optional OpenTelemetry integration
pub fn init_tracing(otel: &OtelProvider, logging: &LoggingConfig) -> Result<(), OtelError> {
    let filter = tracing_subscriber::filter::LevelFilter::from_level(parse_level(&logging.level));

    let otel_layer = otel
        .is_enabled()
        .then(|| tracing_opentelemetry::layer().with_tracer(otel.tracer("global-registry-gateway")));

    let fmt_layer = match logging.format.as_str() {
        "pretty" => tracing_subscriber::fmt::layer().pretty().boxed(),
        _ => tracing_subscriber::fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| OtelError::TracerInit(e.to_string()))
}
