//! Publish/subscribe transport abstraction for edgeapp.
//!
//! Provides the [`PubSub`] trait the session layer drives, plus:
//!
//! - [`MqttTransport`] (feature `mqtt`, default) backed by `rumqttc`, with
//!   automatic reconnection.
//! - [`MemoryTransport`], an in-process broker stand-in for tests and
//!   demos without a live broker.
//!
//! Inbound messages and connection-status changes are delivered over
//! channels rather than callbacks, so the consumer owns its dispatch loop.

mod error;
pub mod filter;
mod memory;
#[cfg(feature = "mqtt")]
mod mqtt;

pub use error::TransportError;
pub use memory::{MemoryTransport, Published};
#[cfg(feature = "mqtt")]
pub use mqtt::{MqttConfig, MqttTransport};

use std::future::Future;

use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Channel types
// ---------------------------------------------------------------------------

/// A message received on a subscribed filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Where inbound messages for a subscription are delivered.
pub type MessageSink = mpsc::UnboundedSender<InboundMessage>;

/// A connection-state transition, reported on every connect and
/// disconnect including reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected(String),
}

/// Where a transport reports [`ConnectionStatus`] changes.
pub type StatusSink = mpsc::UnboundedSender<ConnectionStatus>;

// ---------------------------------------------------------------------------
// QoS
// ---------------------------------------------------------------------------

/// MQTT delivery level, passed through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QoS {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QoS {
    type Error = TransportError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(TransportError::InvalidQos(other)),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// PubSub
// ---------------------------------------------------------------------------

/// A reliable, auto-reconnecting publish/subscribe client.
///
/// Implementations report connection changes on the [`StatusSink`] they
/// were built with. All methods take `&self` and are safe to call
/// concurrently; the subscription table is synchronized internally.
pub trait PubSub: Send + Sync + 'static {
    /// Begins connecting. Returns once the attempt is under way, not
    /// when the connection is up.
    fn start(
        &self,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Disconnects and stops reconnecting.
    fn stop(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn publish(
        &self,
        topic: &str,
        qos: QoS,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Subscribes one filter, routing its messages to `sink`.
    fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
        sink: MessageSink,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Subscribes several filters at QoS 0 in one request.
    fn subscribe_many(
        &self,
        filters: &[String],
        sink: MessageSink,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn unsubscribe(
        &self,
        filters: &[String],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
