//! HTTP gateway backend against a loopback responder.

use reelhouse_client::http::{PRINCIPAL_HEADER, REQUEST_ID_HEADER};
use reelhouse_client::{Backend, ClientConfig, HttpBackendFactory};
use reelhouse_core::{Identity, Principal, ReelError, RemoteError};
use reelhouse_test_utils::fixtures;
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[derive(Debug)]
struct Recorded {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: String,
}

/// Accept one connection, record the request and answer with `status`/`body`.
async fn respond_once(status: u16, body: String) -> (String, oneshot::Receiver<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default().to_string();
        let mut parts = request_line.split(' ');
        let method = parts.next().unwrap_or_default().to_string();
        let path = parts.next().unwrap_or_default().to_string();
        let headers: HashMap<String, String> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect();

        let length: usize = headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        while buf.len() < header_end + length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let request_body = String::from_utf8_lossy(&buf[header_end..]).to_string();

        let response = format!(
            "HTTP/1.1 {status} Status\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();

        let _ = tx.send(Recorded {
            method,
            path,
            headers,
            body: request_body,
        });
    });

    (format!("http://{addr}"), rx)
}

fn factory(base_url: &str) -> HttpBackendFactory {
    HttpBackendFactory::new(&ClientConfig::for_gateway(base_url)).unwrap()
}

#[tokio::test]
async fn test_call_posts_arguments_as_principal_and_decodes_result() {
    let video = fixtures::video("vid-1", "chan-1");
    let (base_url, recorded) = respond_once(200, serde_json::to_string(&video).unwrap()).await;
    let alice = Identity::new(Principal::from_text("alice"));
    let backend = factory(&base_url).bind(Some(&alice));

    let fetched = backend.get_video("vid-1").await.unwrap();
    assert_eq!(fetched, Some(video));

    let request = recorded.await.unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/api/v1/call/getVideo");
    assert_eq!(request.body, r#"["vid-1"]"#);
    assert_eq!(request.headers.get(PRINCIPAL_HEADER).map(String::as_str), Some("alice"));
    assert!(request.headers.contains_key(REQUEST_ID_HEADER));
    assert!(!request.headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_anonymous_call_omits_principal() {
    let (base_url, recorded) = respond_once(200, "[]".to_string()).await;
    let backend = factory(&base_url).bind(None);

    let channels = backend.get_user_channels().await.unwrap();
    assert!(channels.is_empty());

    let request = recorded.await.unwrap();
    assert_eq!(request.path, "/api/v1/call/getUserChannels");
    assert_eq!(request.body, "[]");
    assert!(!request.headers.contains_key(PRINCIPAL_HEADER));
}

#[tokio::test]
async fn test_api_key_is_sent_as_bearer_token() {
    let (base_url, recorded) = respond_once(200, String::new()).await;
    let mut config = ClientConfig::for_gateway(base_url);
    config.api_key = Some("gateway-key".to_string());
    let backend = HttpBackendFactory::new(&config).unwrap().bind(None);

    backend.like_video("vid-1").await.unwrap();

    let request = recorded.await.unwrap();
    assert_eq!(
        request.headers.get("authorization").map(String::as_str),
        Some("Bearer gateway-key")
    );
}

#[tokio::test]
async fn test_error_status_becomes_rejection_with_message() {
    let body = r#"{"message":"Unauthorized: only channel owner can upload"}"#.to_string();
    let (base_url, _recorded) = respond_once(403, body).await;
    let backend = factory(&base_url).bind(Some(&Identity::new(Principal::from_text("bob"))));

    let err = backend
        .upload_video(&fixtures::video("vid-1", "chan-1"))
        .await
        .unwrap_err();

    match err {
        ReelError::Remote(RemoteError::Rejected { operation, message }) => {
            assert_eq!(operation, "uploadVideo");
            assert_eq!(message, "Unauthorized: only channel owner can upload");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_success_body_is_a_decode_error() {
    let (base_url, _recorded) = respond_once(200, "{not json".to_string()).await;
    let backend = factory(&base_url).bind(None);

    let err = backend.get_followed_channels().await.unwrap_err();
    assert!(matches!(
        err,
        ReelError::Remote(RemoteError::Decode { ref operation, .. }) if operation == "getFollowedChannels"
    ));
}

#[tokio::test]
async fn test_unreachable_gateway_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let backend = factory(&format!("http://{addr}")).bind(None);

    let err = backend.get_public_playlists().await.unwrap_err();
    assert!(matches!(
        err,
        ReelError::Remote(RemoteError::Transport { ref operation, .. }) if operation == "getPublicPlaylists"
    ));
}
