//! Integration tests for document downloads
//!
//! The coordinator runs against a wiremock server through the real HTTP
//! client, so content types, statuses and bodies travel over the wire.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::config::{DownloadConfig, UserAgentConfig};
use sumi_harvest::crawler::{build_http_client, HttpFetchClient};
use sumi_harvest::downloads::{DownloadCoordinator, DownloadRequest, DownloadSettings};
use sumi_harvest::events::NullSink;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_coordinator(root: &Path, configure: impl FnOnce(&mut DownloadConfig)) -> DownloadCoordinator {
    let mut config = DownloadConfig::default();
    configure(&mut config);

    let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(5))
        .expect("Failed to build client");
    let client = HttpFetchClient::with_client(client, 0);

    DownloadCoordinator::configure(
        DownloadSettings::from_config(&config, root),
        Arc::new(client),
        Arc::new(NullSink),
    )
    .expect("Failed to configure coordinator")
}

async fn wait_until_idle(coordinator: &DownloadCoordinator) {
    for _ in 0..500 {
        if !coordinator.is_busy() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Downloads never drained: {}", coordinator.stats());
}

#[tokio::test]
async fn test_downloads_land_in_directory() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(&b"0123456789"[..])
                .insert_header("content-type", "application/pdf"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rules"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html>rules</html>")
                .insert_header("content-type", "text/html; charset=UTF-8"),
        )
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let coordinator = create_coordinator(output.path(), |_| {});

    coordinator.enqueue(vec![
        DownloadRequest::new("1", format!("{}/a.pdf", server.uri())),
        DownloadRequest::new("2", format!("{}/rules", server.uri())),
    ]);
    wait_until_idle(&coordinator).await;

    let root = output.path().join("regulamente");
    assert_eq!(std::fs::read(root.join("1.pdf")).unwrap().len(), 10);
    assert_eq!(
        std::fs::read_to_string(root.join("2.html")).unwrap(),
        "<html>rules</html>"
    );
    assert_eq!(coordinator.stats().completed, 2);
}

#[tokio::test]
async fn test_wrong_content_type_is_retried_then_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/image"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(&b"\x89PNG"[..])
                .insert_header("content-type", "image/png"),
        )
        .expect(3)
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let coordinator = create_coordinator(output.path(), |config| config.max_retries = 3);

    coordinator.enqueue(vec![DownloadRequest::new("img", format!("{}/image", server.uri()))]);
    wait_until_idle(&coordinator).await;

    let failed = coordinator.failed_downloads();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].retries, 3);
    assert!(failed[0].error.contains("image/png"));
    assert_eq!(
        std::fs::read_dir(output.path().join("regulamente")).unwrap().count(),
        0
    );
}

#[tokio::test]
async fn test_missing_document_fails_after_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let coordinator = create_coordinator(output.path(), |config| config.max_retries = 2);

    coordinator.enqueue(vec![DownloadRequest::new("gone", format!("{}/gone.pdf", server.uri()))]);
    wait_until_idle(&coordinator).await;

    let stats = coordinator.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.total, 1);
    assert!(coordinator.failed_downloads()[0].error.contains("404"));
}

#[tokio::test]
async fn test_oversized_document_is_discarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![b'x'; 4096])
                .insert_header("content-type", "application/pdf"),
        )
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let coordinator = create_coordinator(output.path(), |config| {
        config.max_retries = 1;
        config.max_file_size = 1024;
    });

    coordinator.enqueue(vec![DownloadRequest::new("big", format!("{}/big.pdf", server.uri()))]);
    wait_until_idle(&coordinator).await;

    assert_eq!(coordinator.stats().failed, 1);
    assert!(!output.path().join("regulamente").join("big.pdf").exists());
}
