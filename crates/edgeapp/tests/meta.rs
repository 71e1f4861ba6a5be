//! Integration tests for [`MetaClient`] against a canned HTTP responder.

use edgeapp::{EdgeError, EndpointInfo, MetaClient};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// =========================================================================
// Helpers
// =========================================================================

/// Serves one HTTP response, returning the base URL and the request line
/// the client sent.
async fn serve_once(
    status: &'static str,
    body: String,
) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).await.unwrap();
        let request = String::from_utf8_lossy(&buf[..n]).to_string();
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\n\
             content-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
        request.lines().next().unwrap_or_default().to_string()
    });
    (format!("http://{addr}"), handle)
}

// =========================================================================
// Child devices
// =========================================================================

#[tokio::test]
async fn test_list_child_devices_parses_records() {
    let record = json!({
        "deviceId": "iotd-1",
        "deviceName": "sensor",
        "thingId": "iott-sub",
        "token": "t0k"
    })
    .to_string();
    let body = json!({"/iotd-1": record, "/broken": "nope"}).to_string();
    let (base, server) = serve_once("200 OK", body).await;
    let client = MetaClient::with_base_url(&base).unwrap();

    let devices = client.list_child_devices().await.unwrap();

    assert_eq!(
        devices,
        vec![EndpointInfo {
            device_id: "iotd-1".into(),
            device_name: "sensor".into(),
            thing_id: "iott-sub".into(),
            token: "t0k".into(),
        }]
    );
    assert_eq!(
        server.await.unwrap(),
        "GET /internal/data/childDevice HTTP/1.1"
    );
}

#[tokio::test]
async fn test_list_child_devices_empty_object() {
    let (base, _server) = serve_once("200 OK", "{}".into()).await;
    let client = MetaClient::with_base_url(&base).unwrap();
    assert!(client.list_child_devices().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_child_devices_error_status_fails() {
    let (base, _server) =
        serve_once("500 Internal Server Error", "{}".into()).await;
    let client = MetaClient::with_base_url(&base).unwrap();
    assert!(matches!(
        client.list_child_devices().await,
        Err(EdgeError::Meta(_))
    ));
}

#[tokio::test]
async fn test_list_child_devices_non_object_body_fails() {
    let (base, _server) = serve_once("200 OK", "[1,2,3]".into()).await;
    let client = MetaClient::with_base_url(&base).unwrap();
    assert!(matches!(
        client.list_child_devices().await,
        Err(EdgeError::Meta(_))
    ));
}

#[tokio::test]
async fn test_list_child_devices_unreachable_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client = MetaClient::with_base_url(&format!("http://{addr}")).unwrap();
    assert!(matches!(
        client.list_child_devices().await,
        Err(EdgeError::Meta(_))
    ));
}
