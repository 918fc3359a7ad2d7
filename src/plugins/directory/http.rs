//! HTTP client for the directory daemon
//!
//! Endpoints:
//! - `GET  {base}/repos/{name}/pull-only` returns `{"pull_only": bool}`
//! - `POST {base}/repos/{name}/clone`
//! - `POST {base}/repos/{name}/publish`

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::DirectoryConfig;
use crate::error::DirectoryError;

use super::retry::RetryManager;
use super::traits::DirectoryService;

/// Body of the pull-only endpoint
#[derive(Debug, Deserialize)]
struct PullOnlyResponse {
    pull_only: bool,
}

/// Directory service backed by the directory daemon's HTTP API
#[derive(Debug, Clone)]
pub struct HttpDirectoryService {
    base_url: Url,
    client: Client,
    retry: RetryManager,
    request_timeout: Duration,
}

impl HttpDirectoryService {
    /// Create a client for the configured directory daemon
    pub fn new(config: &DirectoryConfig) -> Result<Self, DirectoryError> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| DirectoryError::InvalidData(format!("Invalid directory URL: {}", e)))?;

        // No client-wide timeout: clone and publish are bounded by their callers.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| DirectoryError::Network(e.to_string()))?;

        Ok(Self {
            base_url,
            client,
            retry: RetryManager::new(config.retry.clone()),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// Build `{base}/repos/{repo}/{action}`, escaping the repo name as one segment
    fn repo_url(&self, repo: &str, action: &str) -> Result<Url, DirectoryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DirectoryError::InvalidData("Directory URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(["repos", repo, action]);
        Ok(url)
    }

    async fn query_pull_only(&self, repo: &str) -> Result<bool, DirectoryError> {
        let url = self.repo_url(repo, "pull-only")?;
        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => {
                let body: PullOnlyResponse = response
                    .json()
                    .await
                    .map_err(|e| DirectoryError::InvalidData(e.to_string()))?;
                Ok(body.pull_only)
            }
            status => Err(DirectoryError::ServerError(status.as_u16())),
        }
    }

    async fn post_action(&self, repo: &str, action: &str) -> Result<(), DirectoryError> {
        let url = self.repo_url(repo, action)?;
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(DirectoryError::NotFound(repo.to_string())),
            status => Err(DirectoryError::ServerError(status.as_u16())),
        }
    }
}

#[async_trait]
impl DirectoryService for HttpDirectoryService {
    fn name(&self) -> &str {
        "http"
    }

    async fn is_pull_only(&self, repo: &str) -> Result<bool, DirectoryError> {
        if is_content_addressed(repo) {
            debug!(repo, "Content-addressed repository is pull-only");
            return Ok(true);
        }
        self.retry
            .execute("pull_only", || self.query_pull_only(repo))
            .await
    }

    async fn clone_repo(&self, repo: &str) -> Result<(), DirectoryError> {
        self.retry
            .execute("clone", || self.post_action(repo, "clone"))
            .await
    }

    async fn publish_repo(&self, repo: &str) -> Result<(), DirectoryError> {
        self.retry
            .execute("publish", || self.post_action(repo, "publish"))
            .await
    }
}

fn map_reqwest_error(e: reqwest::Error) -> DirectoryError {
    if e.is_timeout() {
        DirectoryError::NetworkTimeout
    } else if e.is_connect() {
        DirectoryError::ConnectionRefused
    } else {
        DirectoryError::Network(e.to_string())
    }
}

/// Whether a repository name is a content address (CIDv1 or sha256 digest)
///
/// Such repositories are immutable by construction and therefore pull-only.
pub fn is_content_addressed(name: &str) -> bool {
    is_cid_v1(name) || is_sha256_digest(name)
}

/// CIDv1 in its default multibase form: base32 lower-case, `b` prefix
fn is_cid_v1(name: &str) -> bool {
    name.len() >= 59
        && name.starts_with('b')
        && name
            .bytes()
            .all(|c| c.is_ascii_lowercase() || (b'2'..=b'7').contains(&c))
}

fn is_sha256_digest(name: &str) -> bool {
    let hex = name.strip_prefix("sha256:").unwrap_or(name);
    hex.len() == 64
        && hex
            .bytes()
            .all(|c| c.is_ascii_digit() || (b'a'..=b'f').contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CID: &str = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";

    fn config_for(server: &MockServer) -> DirectoryConfig {
        DirectoryConfig {
            url: server.uri(),
            request_timeout_secs: 5,
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff_secs: 0,
                max_backoff_secs: 0,
                backoff_multiplier: 2.0,
                jitter: false,
            },
            ..Default::default()
        }
    }

    // Test 1: Content-addressed names are recognized
    #[test]
    fn test_is_content_addressed() {
        assert!(is_content_addressed(CID));
        assert!(is_content_addressed(&"a".repeat(64)));
        assert!(is_content_addressed(&format!("sha256:{}", "0f".repeat(32))));

        assert!(!is_content_addressed("widget"));
        assert!(!is_content_addressed("bafy"));
        assert!(!is_content_addressed(&"g".repeat(64)));
        assert!(!is_content_addressed(&CID.to_uppercase()));
    }

    // Test 2: Repo URLs escape slashes in namespaced names
    #[test]
    fn test_repo_url_escapes_name() {
        let service = HttpDirectoryService::new(&DirectoryConfig {
            url: "http://disco:5080/api/".to_string(),
            ..Default::default()
        })
        .unwrap();

        let url = service.repo_url("acme/widget", "clone").unwrap();
        assert_eq!(url.as_str(), "http://disco:5080/api/repos/acme%2Fwidget/clone");
    }

    // Test 3: Invalid base URL is rejected at construction
    #[test]
    fn test_invalid_base_url() {
        let result = HttpDirectoryService::new(&DirectoryConfig {
            url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(DirectoryError::InvalidData(_))));
    }

    // Test 4: Pull-only flag is read from the directory
    #[tokio::test]
    async fn test_is_pull_only_queries_directory() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/widget/pull-only"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "pull_only": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let service = HttpDirectoryService::new(&config_for(&server)).unwrap();
        assert_eq!(service.is_pull_only("widget").await, Ok(true));
    }

    // Test 5: Unknown repository is not pull-only
    #[tokio::test]
    async fn test_unknown_repo_is_not_pull_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/fresh/pull-only"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let service = HttpDirectoryService::new(&config_for(&server)).unwrap();
        assert_eq!(service.is_pull_only("fresh").await, Ok(false));
    }

    // Test 6: Content-addressed names never hit the network
    #[tokio::test]
    async fn test_content_addressed_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let service = HttpDirectoryService::new(&config_for(&server)).unwrap();
        assert_eq!(service.is_pull_only(CID).await, Ok(true));
    }

    // Test 7: Clone retries a 503 and then succeeds
    #[tokio::test]
    async fn test_clone_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/widget/clone"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/widget/clone"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let service = HttpDirectoryService::new(&config_for(&server)).unwrap();
        assert_eq!(service.clone_repo("widget").await, Ok(()));
    }

    // Test 8: Publish of an unknown repository surfaces NotFound without retry
    #[tokio::test]
    async fn test_publish_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/ghost/publish"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let service = HttpDirectoryService::new(&config_for(&server)).unwrap();
        assert_eq!(
            service.publish_repo("ghost").await,
            Err(DirectoryError::NotFound("ghost".to_string()))
        );
    }

    // Test 9: Malformed pull-only body is invalid data
    #[tokio::test]
    async fn test_malformed_pull_only_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/widget/pull-only"))
            .respond_with(ResponseTemplate::new(200).set_body_string("yes"))
            .mount(&server)
            .await;

        let service = HttpDirectoryService::new(&config_for(&server)).unwrap();
        assert!(matches!(
            service.is_pull_only("widget").await,
            Err(DirectoryError::InvalidData(_))
        ));
    }
}
