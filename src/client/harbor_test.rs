use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use super::*;
use crate::watch::TagCoordinates;
use crate::EndpointConfig;
use crate::Error;
use crate::FetchError;

fn coords() -> TagCoordinates {
    TagCoordinates::new("helix-saga", "go-all", "latest")
}

fn fetcher_for(url: &str) -> HarborFetcher {
    HarborFetcher::new(&EndpointConfig::new(url, "admin", "pwd"), Duration::from_secs(2)).unwrap()
}

/// Answers a single request with `status_line` and `body`; the raw request is sent back on the channel
async fn serve_once(
    status_line: &'static str,
    body: &'static str,
) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let n = socket.read(&mut buf).await.unwrap();
        let _ = tx.send(String::from_utf8_lossy(&buf[..n]).to_string());

        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });

    (format!("http://{addr}"), rx)
}

#[test]
fn test_tag_url_layout() {
    let fetcher = fetcher_for("http://harbor.domain.com/");

    assert_eq!(fetcher.endpoint(), "http://harbor.domain.com");
    assert_eq!(
        fetcher.tag_url(&coords()),
        "http://harbor.domain.com/api/repositories/helix-saga/go-all/tags/latest"
    );
}

#[test]
fn test_debug_hides_password() {
    let fetcher = fetcher_for("http://harbor.domain.com");
    let printed = format!("{fetcher:?}");

    assert!(printed.contains("admin"));
    assert!(!printed.contains("pwd"));
}

#[tokio::test]
async fn test_fetch_fingerprint_returns_digest() {
    let (url, request) = serve_once(
        "200 OK",
        r#"{"digest":"sha256:abc","name":"latest","size":1024}"#,
    )
    .await;
    let fetcher = fetcher_for(&url);

    let digest = fetcher.fetch_fingerprint(&coords()).await.unwrap();
    assert_eq!(digest, "sha256:abc");

    let raw = request.await.unwrap();
    assert!(raw.starts_with("GET /api/repositories/helix-saga/go-all/tags/latest "));
    // admin:pwd
    assert!(raw.to_ascii_lowercase().contains("authorization: basic ywrtaw46chdk"));
}

#[tokio::test]
async fn test_anonymous_fetch_sends_no_credentials() {
    let (url, request) = serve_once("200 OK", r#"{"digest":"sha256:abc"}"#).await;
    let fetcher = HarborFetcher::new(&EndpointConfig::new(&url, "", ""), Duration::from_secs(2)).unwrap();

    fetcher.fetch_fingerprint(&coords()).await.unwrap();

    let raw = request.await.unwrap();
    assert!(!raw.to_ascii_lowercase().contains("authorization:"));
}

#[tokio::test]
async fn test_not_found_status_is_an_error() {
    let (url, _request) = serve_once("404 Not Found", r#"{"errors":[]}"#).await;
    let fetcher = fetcher_for(&url);

    let err = fetcher.fetch_fingerprint(&coords()).await.unwrap_err();
    assert!(matches!(err, Error::Fetch(FetchError::Status { status: 404, .. })));
}

#[tokio::test]
async fn test_missing_digest_is_a_decode_error() {
    let (url, _request) = serve_once("200 OK", r#"{"name":"latest"}"#).await;
    let fetcher = fetcher_for(&url);

    let err = fetcher.fetch_fingerprint(&coords()).await.unwrap_err();
    assert!(matches!(err, Error::Fetch(FetchError::Decode { .. })));
}

#[tokio::test]
async fn test_malformed_body_is_a_decode_error() {
    let (url, _request) = serve_once("200 OK", "not json").await;
    let fetcher = fetcher_for(&url);

    let err = fetcher.tag_detail(&coords()).await.unwrap_err();
    assert!(matches!(err, Error::Fetch(FetchError::Decode { .. })));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_a_transport_error() {
    // Bind then drop to get a port nobody listens on
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let fetcher = fetcher_for(&format!("http://{addr}"));

    let err = fetcher.fetch_fingerprint(&coords()).await.unwrap_err();
    assert!(matches!(err, Error::Fetch(FetchError::Http { .. })));
}
