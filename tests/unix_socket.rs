//! Admin API over a Unix domain socket, authorized by peer credentials.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use router_admin::net::ListenAddress;
use router_admin::observability::LogLevel;

mod common;

async fn exchange(path: &std::path::Path, request: &str) -> String {
    let mut stream = UnixStream::connect(path).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();
    response
}

#[tokio::test]
async fn test_same_user_needs_no_token() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("admin.sock");
    let server = common::start_server_on(ListenAddress::Unix(socket.clone()), common::test_settings()).await;

    let response = exchange(
        &socket,
        "GET /ping.json HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert!(response.contains("\"status\": \"ok\""));

    let body = r#"{"level":"info"}"#;
    let request = format!(
        "PUT /config.json HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let response = exchange(&socket, &request).await;
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert_eq!(server.logging.config().level, LogLevel::Info);

    server.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(!socket.exists());
}
