//! Directory daemon integration tests
//!
//! Runs the server with the HTTP directory client against a fake directory
//! daemon and a fake upstream registry.

mod common;

use std::sync::Arc;

use common::*;
use global_registry_gateway::config::NameMode;
use global_registry_gateway::models::PublishState;
use global_registry_gateway::plugins::directory::HttpDirectoryService;
use reqwest::StatusCode;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CID: &str = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";

async fn start(
    upstream: &MockServer,
    directory: &MockServer,
) -> (std::net::SocketAddr, tokio::sync::oneshot::Sender<()>) {
    let config = test_config(&upstream.uri(), &directory.uri(), NameMode::Segment);
    let client = HttpDirectoryService::new(&config.directory).expect("Failed to build client");
    let state = create_test_state(&config, Arc::new(client));
    run_test_server(&config, state).await
}

/// Test 1: Push of latest queries protection, forwards, then publishes
#[tokio::test]
async fn test_push_round_trip() {
    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v2/widget/manifests/latest"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&upstream)
        .await;

    let directory = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/widget/pull-only"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&directory)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/widget/publish"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&directory)
        .await;

    let (addr, _shutdown) = start(&upstream, &directory).await;

    let response = reqwest::Client::new()
        .put(format!("http://{}/v2/widget/manifests/latest", addr))
        .body("manifest")
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let record = wait_for_publish(addr, "widget").await;
    assert_eq!(record.publish_state, PublishState::Published);
    assert_eq!(record.pull_only, Some(false));
}

/// Test 2: Pull of latest clones through the directory daemon first
#[tokio::test]
async fn test_pull_clones_through_directory() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/widget/manifests/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_string("manifest"))
        .expect(2)
        .mount(&upstream)
        .await;

    let directory = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/widget/clone"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&directory)
        .await;

    let (addr, _shutdown) = start(&upstream, &directory).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let response = client
            .get(format!("http://{}/v2/widget/manifests/latest", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "manifest");
    }
}

/// Test 3: Content-addressed repositories are pull-only without asking the daemon
#[tokio::test]
async fn test_content_addressed_repo_is_protected() {
    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&upstream)
        .await;

    let directory = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&directory)
        .await;

    let (addr, _shutdown) = start(&upstream, &directory).await;

    let response = reqwest::Client::new()
        .put(format!("http://{}/v2/{}/manifests/latest", addr, CID))
        .body("manifest")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Test 4: An unreachable directory fails closed on writes
#[tokio::test]
async fn test_directory_outage_fails_closed() {
    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&upstream)
        .await;

    let directory = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/widget/pull-only"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&directory)
        .await;

    let (addr, _shutdown) = start(&upstream, &directory).await;

    let response = reqwest::Client::new()
        .put(format!("http://{}/v2/widget/manifests/latest", addr))
        .body("manifest")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
