//! Integration tests for the in-memory transport.
//!
//! Exercises the [`PubSub`] contract the session layer relies on: routing
//! by filter, connection-status reporting, and clean-session semantics on
//! disconnect.

use edgeapp_transport::{
    ConnectionStatus, InboundMessage, MemoryTransport, PubSub, QoS,
    TransportError,
};
use tokio::sync::mpsc;

// =========================================================================
// Helpers
// =========================================================================

async fn connected() -> (
    MemoryTransport,
    mpsc::UnboundedReceiver<ConnectionStatus>,
) {
    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    let transport = MemoryTransport::new(status_tx);
    transport.start().await.unwrap();
    transport.connect().await.unwrap();
    assert_eq!(status_rx.recv().await, Some(ConnectionStatus::Connected));
    (transport, status_rx)
}

fn filters(list: &[&str]) -> Vec<String> {
    list.iter().map(|f| f.to_string()).collect()
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_connect_before_start_fails() {
    let (status_tx, _status_rx) = mpsc::unbounded_channel();
    let transport = MemoryTransport::new(status_tx);
    assert!(matches!(
        transport.connect().await,
        Err(TransportError::NotStarted)
    ));
}

#[tokio::test]
async fn test_start_twice_fails() {
    let (transport, _status) = connected().await;
    assert!(matches!(
        transport.start().await,
        Err(TransportError::AlreadyStarted)
    ));
}

#[tokio::test]
async fn test_publish_after_stop_fails() {
    let (transport, _status) = connected().await;
    transport.stop().await.unwrap();
    let result = transport.publish("/a", QoS::AtMostOnce, b"x").await;
    assert!(matches!(result, Err(TransportError::NotStarted)));
}

#[tokio::test]
async fn test_disconnect_reports_reason_and_drops_routes() {
    let (transport, mut status) = connected().await;
    let (sink, _rx) = mpsc::unbounded_channel();
    transport
        .subscribe("/a/+", QoS::AtMostOnce, sink)
        .await
        .unwrap();

    transport.disconnect("broker went away").await;

    assert_eq!(
        status.recv().await,
        Some(ConnectionStatus::Disconnected("broker went away".into()))
    );
    assert!(transport.active_filters().await.is_empty());
    assert!(!transport.is_connected().await);
}

// =========================================================================
// Routing
// =========================================================================

#[tokio::test]
async fn test_inject_reaches_matching_subscription_only() {
    let (transport, _status) = connected().await;
    let (props_tx, mut props_rx) = mpsc::unbounded_channel();
    let (calls_tx, mut calls_rx) = mpsc::unbounded_channel();
    transport
        .subscribe_many(&filters(&["/sys/+/+/thing/property/+/post"]), props_tx)
        .await
        .unwrap();
    transport
        .subscribe("/sys/m/d/thing/service/+/call", QoS::AtMostOnce, calls_tx)
        .await
        .unwrap();

    let topic = "/sys/m/d/thing/property/base/post";
    assert_eq!(transport.inject(topic, b"{}").await, 1);

    assert_eq!(
        props_rx.try_recv().unwrap(),
        InboundMessage {
            topic: topic.into(),
            payload: b"{}".to_vec(),
        }
    );
    assert!(calls_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_overlapping_filters_deliver_once_to_shared_sink() {
    let (transport, _status) = connected().await;
    let (sink, mut rx) = mpsc::unbounded_channel();
    transport
        .subscribe_many(
            &filters(&["/sys/+/+/thing/event/+/post", "/sys/m/+/thing/#"]),
            sink,
        )
        .await
        .unwrap();

    assert_eq!(
        transport.inject("/sys/m/d/thing/event/e/post", b"1").await,
        1
    );
    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_inject_while_disconnected_is_dropped() {
    let (transport, _status) = connected().await;
    let (sink, mut rx) = mpsc::unbounded_channel();
    transport.subscribe("#", QoS::AtMostOnce, sink).await.unwrap();
    transport.disconnect("gone").await;

    assert_eq!(transport.inject("/a", b"x").await, 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let (transport, _status) = connected().await;
    let (sink, mut rx) = mpsc::unbounded_channel();
    transport
        .subscribe_many(&filters(&["/a", "/b"]), sink)
        .await
        .unwrap();

    transport.unsubscribe(&filters(&["/a"])).await.unwrap();

    assert_eq!(transport.inject("/a", b"x").await, 0);
    assert_eq!(transport.inject("/b", b"y").await, 1);
    assert_eq!(rx.try_recv().unwrap().topic, "/b");
    assert_eq!(transport.unsubscribed().await, filters(&["/a"]));
    assert_eq!(transport.active_filters().await, filters(&["/b"]));
}

// =========================================================================
// Recording and failure injection
// =========================================================================

#[tokio::test]
async fn test_publish_is_recorded_with_qos() {
    let (transport, _status) = connected().await;
    transport
        .publish("/t", QoS::AtLeastOnce, b"payload")
        .await
        .unwrap();

    let published = transport.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "/t");
    assert_eq!(published[0].qos, QoS::AtLeastOnce);
    assert_eq!(published[0].payload, b"payload");
}

#[tokio::test]
async fn test_failure_injection_can_be_cleared() {
    let (transport, _status) = connected().await;
    let (sink, _rx) = mpsc::unbounded_channel();

    transport.fail_publishes(Some("no route")).await;
    transport.fail_subscribes(Some("denied")).await;
    assert!(matches!(
        transport.publish("/t", QoS::AtMostOnce, b"x").await,
        Err(TransportError::Request(reason)) if reason == "no route"
    ));
    assert!(matches!(
        transport.subscribe("/t", QoS::AtMostOnce, sink.clone()).await,
        Err(TransportError::Request(reason)) if reason == "denied"
    ));

    transport.fail_publishes(None).await;
    transport.fail_subscribes(None).await;
    assert!(transport.publish("/t", QoS::AtMostOnce, b"x").await.is_ok());
    assert!(transport.subscribe("/t", QoS::AtMostOnce, sink).await.is_ok());
    assert_eq!(transport.subscribe_requests().await, vec![filters(&["/t"])]);
}
