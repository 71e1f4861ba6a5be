//! Integration tests for [`EdgeClient`] over the in-memory transport.
//!
//! Configuration comes from a temporary JSON file, so these tests exercise
//! the standalone runtime path end to end.

use std::io::Write;

use edgeapp::{
    ClientOptions, EdgeClient, EdgeError, EdgeLocalInfo, MemoryTransport,
    MessageKind, Published, RuntimeKind, ServiceCall, SessionError,
    SessionEvent, SessionState,
};
use serde_json::{Value, json};
use tempfile::NamedTempFile;

// =========================================================================
// Helpers
// =========================================================================

const CONFIG: &str = r#"{
    "protocol": "tcp",
    "hubAddr": "127.0.0.1",
    "hubPort": 1883,
    "appId": "app-1",
    "deviceId": "iotd-Y",
    "thingId": "iott-X"
}"#;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn client(file: &NamedTempFile) -> EdgeClient<MemoryTransport> {
    let options =
        ClientOptions::new(RuntimeKind::Standalone(file.path().to_path_buf()))
            .service_ids(["test_app_call"])
            .endpoint_thing_ids(["iott-sub"]);
    EdgeClient::with_transport(options, |_config, status| {
        Ok(MemoryTransport::new(status))
    })
}

async fn transport(client: &EdgeClient<MemoryTransport>) -> MemoryTransport {
    client.session().await.unwrap().transport().clone()
}

async fn wait_for_published(
    transport: &MemoryTransport,
    count: usize,
) -> Vec<Published> {
    for _ in 0..100 {
        let published = transport.published().await;
        if published.len() >= count {
            return published;
        }
        tokio::task::yield_now().await;
    }
    panic!("expected {count} publishes");
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_operations_before_init_fail() {
    let file = config_file(CONFIG);
    let client = client(&file);

    assert!(matches!(client.start().await, Err(EdgeError::NotInitialized)));
    assert!(matches!(
        client.send_message(MessageKind::Property, b"[]").await,
        Err(EdgeError::NotInitialized)
    ));
    assert!(matches!(
        client.edge_device_info().await,
        Err(EdgeError::NotInitialized)
    ));
    assert!(matches!(
        client.endpoint_infos().await,
        Err(EdgeError::NotInitialized)
    ));
    assert!(client.state().await.is_none());
}

#[tokio::test]
async fn test_stop_and_cleanup_before_init_are_noops() {
    let file = config_file(CONFIG);
    let client = client(&file);
    client.stop().await.unwrap();
    client.cleanup().await;
}

#[tokio::test]
async fn test_init_twice_fails() {
    let file = config_file(CONFIG);
    let client = client(&file);
    let _events = client.init().await.unwrap();

    assert!(matches!(
        client.init().await,
        Err(EdgeError::AlreadyInitialized)
    ));
}

#[tokio::test]
async fn test_init_with_invalid_config_fails() {
    let file = config_file(r#"{"hubAddr":"127.0.0.1","deviceId":"iotd-Y"}"#);
    let client = client(&file);
    assert!(matches!(client.init().await, Err(EdgeError::Config(_))));
    assert!(client.state().await.is_none());
}

#[tokio::test]
async fn test_cleanup_allows_init_again() {
    let file = config_file(CONFIG);
    let client = client(&file);
    let _events = client.init().await.unwrap();
    client.start().await.unwrap();

    client.cleanup().await;
    assert!(matches!(client.start().await, Err(EdgeError::NotInitialized)));

    let _events = client.init().await.unwrap();
    assert_eq!(client.state().await, Some(SessionState::Initialized));
}

#[tokio::test]
async fn test_start_connects_and_subscribes() {
    let file = config_file(CONFIG);
    let client = client(&file);
    let mut events = client.init().await.unwrap();
    client.start().await.unwrap();

    let transport = transport(&client).await;
    transport.connect().await.unwrap();

    assert_eq!(events.recv().await, Some(SessionEvent::Connected));
    assert_eq!(client.state().await, Some(SessionState::Connected));
}

// =========================================================================
// Operations
// =========================================================================

#[tokio::test]
async fn test_edge_device_info_reports_configured_identity() {
    let file = config_file(CONFIG);
    let client = client(&file);
    let _events = client.init().await.unwrap();

    let info = client.edge_device_info().await.unwrap();

    assert_eq!(
        info,
        EdgeLocalInfo {
            app_id: "app-1".into(),
            thing_id: "iott-X".into(),
            device_id: "iotd-Y".into(),
        }
    );
    assert_eq!(
        serde_json::to_value(&info).unwrap(),
        json!({"appId": "app-1", "thingId": "iott-X", "deviceId": "iotd-Y"})
    );
}

#[tokio::test]
async fn test_send_message_publishes_own_property() {
    let file = config_file(CONFIG);
    let client = client(&file);
    let _events = client.init().await.unwrap();
    client.start().await.unwrap();

    client
        .send_message(
            MessageKind::Property,
            br#"[{"identifier":"random_data","timestamp":7,"value":"42"}]"#,
        )
        .await
        .unwrap();

    let published = transport(&client).await.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "/sys/iott-X/iotd-Y/thing/property/base/post");
    let wire: Value = serde_json::from_slice(&published[0].payload).unwrap();
    assert_eq!(wire["params"]["random_data"], json!({"value": "42", "time": 7}));
}

#[tokio::test]
async fn test_send_message_empty_payload_rejected() {
    let file = config_file(CONFIG);
    let client = client(&file);
    let _events = client.init().await.unwrap();
    client.start().await.unwrap();

    assert!(matches!(
        client.send_message(MessageKind::Event, b"").await,
        Err(EdgeError::InvalidArgument(_))
    ));
    assert!(transport(&client).await.published().await.is_empty());
}

#[tokio::test]
async fn test_send_message_malformed_payload_is_protocol_error() {
    let file = config_file(CONFIG);
    let client = client(&file);
    let _events = client.init().await.unwrap();
    client.start().await.unwrap();

    let result = client.send_message(MessageKind::Property, b"{oops").await;

    assert!(matches!(
        result,
        Err(EdgeError::Session(SessionError::Protocol(_)))
    ));
}

#[tokio::test]
async fn test_call_endpoint_rejects_empty_arguments() {
    let file = config_file(CONFIG);
    let client = client(&file);
    let _events = client.init().await.unwrap();
    client.start().await.unwrap();

    for (thing, device, service) in [
        ("", "iotd-1", "setTemperature"),
        ("iott-sub", "", "setTemperature"),
        ("iott-sub", "iotd-1", ""),
    ] {
        let result = client
            .call_endpoint(thing, device, ServiceCall::new(service))
            .await;
        assert!(
            matches!(result, Err(EdgeError::InvalidArgument(_))),
            "({thing:?}, {device:?}, {service:?}) should be rejected"
        );
    }
}

#[tokio::test]
async fn test_call_endpoint_returns_reply() {
    let file = config_file(CONFIG);
    let client = std::sync::Arc::new(client(&file));
    let _events = client.init().await.unwrap();
    client.start().await.unwrap();
    let transport = transport(&client).await;
    transport.connect().await.unwrap();

    let caller = client.clone();
    let call = tokio::spawn(async move {
        let call = ServiceCall {
            message_id: "M1".into(),
            ..ServiceCall::new("setTemperature").with_param("temperature", 35)
        };
        caller.call_endpoint("iott-sub", "iotd-1", call).await
    });

    let published = wait_for_published(&transport, 1).await;
    assert_eq!(
        published[0].topic,
        "/sys/iott-sub/iotd-1/thing/service/setTemperature/call"
    );
    let reply = json!({"id": "M1", "version": "1.0", "code": 200, "data": {}});
    transport
        .inject(
            "/sys/iott-sub/iotd-1/thing/service/setTemperature/call_reply",
            &serde_json::to_vec(&reply).unwrap(),
        )
        .await;

    let reply = call.await.unwrap().unwrap();
    assert_eq!(reply.message_id, "M1");
    assert_eq!(reply.code, 200);
}

#[tokio::test(start_paused = true)]
async fn test_call_endpoint_without_reply_times_out() {
    let file = config_file(CONFIG);
    let client = client(&file);
    let _events = client.init().await.unwrap();
    client.start().await.unwrap();

    let err = client
        .call_endpoint("iott-sub", "iotd-1", ServiceCall::new("setTemperature"))
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {err}");
}
