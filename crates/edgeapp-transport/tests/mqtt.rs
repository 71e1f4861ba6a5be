//! Integration tests for [`MqttTransport`] against an unreachable address
//! and a minimal scripted broker.
//!
//! The scripted broker only speaks enough MQTT 3.1.1 to accept a CONNECT
//! with a CONNACK, so these tests cover connection status and request
//! bounds rather than broker semantics.

#![cfg(feature = "mqtt")]

use std::time::Duration;

use edgeapp_transport::{
    ConnectionStatus, MqttConfig, MqttTransport, PubSub, QoS, TransportError,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

// =========================================================================
// Helpers
// =========================================================================

/// CONNACK, session not present, return code accepted.
const CONNACK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

const BOUND: Duration = Duration::from_secs(3);

fn transport(
    url: &str,
) -> (MqttTransport, mpsc::UnboundedReceiver<ConnectionStatus>) {
    let mut config = MqttConfig::new("iotd-Y/app-1", url);
    config.retry_interval = Duration::from_millis(100);
    config.request_capacity = 2;
    let (status_tx, status_rx) = mpsc::unbounded_channel();
    (MqttTransport::new(config, status_tx), status_rx)
}

async fn next_status(
    status: &mut mpsc::UnboundedReceiver<ConnectionStatus>,
) -> ConnectionStatus {
    timeout(BOUND, status.recv())
        .await
        .expect("no status change in time")
        .expect("status channel closed")
}

/// Accepts one client and answers its CONNECT.
async fn accept_and_ack(listener: &TcpListener) -> TcpStream {
    let (mut stream, _) = timeout(BOUND, listener.accept())
        .await
        .expect("no connection attempt")
        .unwrap();
    let mut buf = [0u8; 256];
    let n = stream.read(&mut buf).await.unwrap();
    assert!(n > 0);
    assert_eq!(buf[0], 0x10, "expected CONNECT");
    stream.write_all(&CONNACK).await.unwrap();
    stream
}

// =========================================================================
// Unreachable broker
// =========================================================================

#[tokio::test]
async fn test_unreachable_broker_reports_no_connection() {
    let (transport, mut status) = transport("tcp://127.0.0.1:1");
    transport.start().await.unwrap();

    let quiet = timeout(Duration::from_millis(300), status.recv()).await;
    assert!(quiet.is_err(), "unexpected status: {quiet:?}");

    transport.stop().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_broker_publish_returns_when_queue_full() {
    let (transport, _status) = transport("tcp://127.0.0.1:1");
    transport.start().await.unwrap();

    let mut queue_full = 0;
    for _ in 0..10 {
        let result = timeout(
            Duration::from_secs(1),
            transport.publish("/sys/t", QoS::AtMostOnce, b"x"),
        )
        .await
        .expect("publish blocked");
        if matches!(result, Err(TransportError::QueueFull)) {
            queue_full += 1;
        }
    }
    assert!(queue_full > 0);

    let subscribed = timeout(
        Duration::from_secs(1),
        transport.subscribe("/sys/#", QoS::AtMostOnce, mpsc::unbounded_channel().0),
    )
    .await
    .expect("subscribe blocked");
    assert!(matches!(subscribed, Err(TransportError::QueueFull)));
}

#[tokio::test]
async fn test_unreachable_broker_stop_returns_with_full_queue() {
    let (transport, _status) = transport("tcp://127.0.0.1:1");
    transport.start().await.unwrap();
    for _ in 0..5 {
        let _ = transport.publish("/sys/t", QoS::AtMostOnce, b"x").await;
    }

    timeout(BOUND, transport.stop())
        .await
        .expect("stop blocked")
        .unwrap();
    assert!(matches!(
        transport.publish("/sys/t", QoS::AtMostOnce, b"x").await,
        Err(TransportError::NotStarted)
    ));
}

// =========================================================================
// Scripted broker
// =========================================================================

#[tokio::test]
async fn test_connack_reports_connected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("tcp://{}", listener.local_addr().unwrap());
    let (transport, mut status) = transport(&url);
    transport.start().await.unwrap();

    let mut broker = accept_and_ack(&listener).await;
    assert_eq!(next_status(&mut status).await, ConnectionStatus::Connected);

    transport
        .publish("/sys/t", QoS::AtMostOnce, b"x")
        .await
        .unwrap();
    let mut buf = [0u8; 64];
    let n = timeout(BOUND, broker.read(&mut buf)).await.unwrap().unwrap();
    assert!(n > 0);
    assert_eq!(buf[0], 0x30, "expected QoS 0 PUBLISH");

    timeout(BOUND, transport.stop())
        .await
        .expect("stop blocked")
        .unwrap();
}

#[tokio::test]
async fn test_dropped_connection_reports_disconnected_then_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("tcp://{}", listener.local_addr().unwrap());
    let (transport, mut status) = transport(&url);
    transport.start().await.unwrap();

    let broker = accept_and_ack(&listener).await;
    assert_eq!(next_status(&mut status).await, ConnectionStatus::Connected);

    drop(broker);
    assert!(matches!(
        next_status(&mut status).await,
        ConnectionStatus::Disconnected(_)
    ));

    let _broker = accept_and_ack(&listener).await;
    assert_eq!(next_status(&mut status).await, ConnectionStatus::Connected);

    transport.stop().await.unwrap();
}
