//! Configuration management for global-registry-gateway
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream registry configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Directory service configuration
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Request classification configuration
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// OpenTelemetry configuration
    #[serde(default)]
    pub otel: OtelConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // First, expand environment variables in the YAML string
        let expanded = expand_env_vars(yaml);
        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables with prefix GLOBAL_REGISTRY_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Server config from env
        if let Ok(host) = std::env::var("GLOBAL_REGISTRY_SERVER_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("GLOBAL_REGISTRY_SERVER_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid port number".to_string()))?;
        }

        // Upstream and directory endpoints from env
        if let Ok(url) = std::env::var("GLOBAL_REGISTRY_UPSTREAM_URL") {
            config.upstream.url = url;
        }
        if let Ok(url) = std::env::var("GLOBAL_REGISTRY_DIRECTORY_URL") {
            config.directory.url = url;
        }

        // Logging config from env
        if let Ok(level) = std::env::var("GLOBAL_REGISTRY_LOG_LEVEL") {
            config.logging.level = level;
        }

        // OTEL config from env
        if let Ok(enabled) = std::env::var("GLOBAL_REGISTRY_OTEL_ENABLED") {
            config.otel.enabled = enabled.parse().unwrap_or(false);
        }
        if let Ok(endpoint) = std::env::var("GLOBAL_REGISTRY_OTEL_ENDPOINT") {
            config.otel.endpoint = Some(endpoint);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the gateway unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("upstream.url".to_string()));
        }
        if self.directory.url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("directory.url".to_string()));
        }
        if self.server.request_deadline().is_zero() {
            return Err(ConfigError::InvalidValue(
                "server timeouts must not all be zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Read timeout in seconds
    #[serde(default = "default_timeout")]
    pub read_timeout_secs: u64,

    /// Write timeout in seconds
    #[serde(default = "default_timeout")]
    pub write_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_timeout")]
    pub idle_timeout_secs: u64,
}

impl ServerConfig {
    /// Deadline applied to every coordination wait a request performs
    pub fn request_deadline(&self) -> Duration {
        let secs = self
            .read_timeout_secs
            .max(self.write_timeout_secs)
            .max(self.idle_timeout_secs);
        Duration::from_secs(secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_timeout_secs: default_timeout(),
            write_timeout_secs: default_timeout(),
            idle_timeout_secs: default_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5050
}

fn default_timeout() -> u64 {
    30
}

/// Upstream registry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    /// Base URL of the registry requests are forwarded to
    #[serde(default = "default_upstream_url")]
    pub url: String,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_upstream_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

/// Directory service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectoryConfig {
    /// Base URL of the directory daemon
    #[serde(default = "default_directory_url")]
    pub url: String,

    /// Timeout for a single protection-status query, in seconds
    #[serde(default = "default_directory_request_timeout")]
    pub request_timeout_secs: u64,

    /// Budget for one clone, in seconds
    #[serde(default = "default_clone_timeout")]
    pub clone_timeout_secs: u64,

    /// Budget for one background publish, in seconds
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,

    /// Retry configuration
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: default_directory_url(),
            request_timeout_secs: default_directory_request_timeout(),
            clone_timeout_secs: default_clone_timeout(),
            publish_timeout_secs: default_publish_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_directory_url() -> String {
    "http://localhost:5080".to_string()
}

fn default_directory_request_timeout() -> u64 {
    30
}

fn default_clone_timeout() -> u64 {
    600
}

fn default_publish_timeout() -> u64 {
    300
}

/// Retry configuration for directory calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff duration in seconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: u64,

    /// Maximum backoff duration in seconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Whether to add jitter to backoff
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_secs: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    1
}

fn default_max_backoff() -> u64 {
    30
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

/// How the repository name is pulled out of a manifest path
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NameMode {
    /// Second path segment only, matching the registry's own convention
    #[default]
    Segment,
    /// Every segment between the API prefix and `/manifests/`
    FullPath,
}

/// Request classification configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClassifierConfig {
    /// Repository name extraction mode
    #[serde(default)]
    pub name_mode: NameMode,
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtelConfig {
    /// Whether OpenTelemetry is enabled
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint URL
    pub endpoint: Option<String>,

    /// Whether to use insecure connection
    #[serde(default)]
    pub insecure: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            insecure: false,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "global-registry-gateway".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format ("json" or "pretty")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
