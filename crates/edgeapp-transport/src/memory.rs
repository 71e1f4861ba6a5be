//! In-memory [`PubSub`] implementation.
//!
//! Stands in for a broker connection: the owner drives connection state
//! with [`connect`](MemoryTransport::connect) and
//! [`disconnect`](MemoryTransport::disconnect), feeds inbound traffic with
//! [`inject`](MemoryTransport::inject), and inspects what was published
//! and subscribed. Publishes are recorded, not looped back.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};

use crate::filter::Routes;
use crate::{
    ConnectionStatus, InboundMessage, MessageSink, PubSub, QoS, StatusSink,
    TransportError,
};

/// One recorded publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub qos: QoS,
    pub payload: Vec<u8>,
}

/// Cheap to clone; clones share the same simulated connection.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

struct Inner {
    status: StatusSink,
    state: Mutex<State>,
    /// While `true`, requests wait before touching `state`.
    stalled: watch::Sender<bool>,
}

#[derive(Default)]
struct State {
    started: bool,
    connected: bool,
    routes: Routes,
    published: Vec<Published>,
    subscribe_requests: Vec<Vec<String>>,
    unsubscribed: Vec<String>,
    publish_failure: Option<String>,
    subscribe_failure: Option<String>,
}

impl MemoryTransport {
    /// Creates a stopped transport reporting status changes to `status`.
    pub fn new(status: StatusSink) -> Self {
        Self {
            inner: Arc::new(Inner {
                status,
                state: Mutex::new(State::default()),
                stalled: watch::channel(false).0,
            }),
        }
    }

    /// Simulates a successful (re)connect.
    ///
    /// # Errors
    /// [`TransportError::NotStarted`] before `start`.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock().await;
        if !state.started {
            return Err(TransportError::NotStarted);
        }
        state.connected = true;
        let _ = self.inner.status.send(ConnectionStatus::Connected);
        Ok(())
    }

    /// Simulates connection loss. Subscriptions are forgotten, as with a
    /// clean-session broker.
    pub async fn disconnect(&self, reason: &str) {
        let mut state = self.inner.state.lock().await;
        if !state.connected {
            return;
        }
        state.connected = false;
        state.routes.clear();
        let _ = self
            .inner
            .status
            .send(ConnectionStatus::Disconnected(reason.to_string()));
    }

    /// Delivers an inbound message to matching subscriptions.
    ///
    /// Returns the number of sinks reached; zero while disconnected.
    pub async fn inject(&self, topic: &str, payload: &[u8]) -> usize {
        let mut state = self.inner.state.lock().await;
        if !state.connected {
            return 0;
        }
        state.routes.deliver(&InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        })
    }

    pub async fn published(&self) -> Vec<Published> {
        self.inner.state.lock().await.published.clone()
    }

    /// Filters currently subscribed.
    pub async fn active_filters(&self) -> Vec<String> {
        self.inner.state.lock().await.routes.filters()
    }

    /// Every subscribe request so far, one entry per call.
    pub async fn subscribe_requests(&self) -> Vec<Vec<String>> {
        self.inner.state.lock().await.subscribe_requests.clone()
    }

    /// Every filter passed to `unsubscribe` so far.
    pub async fn unsubscribed(&self) -> Vec<String> {
        self.inner.state.lock().await.unsubscribed.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.state.lock().await.connected
    }

    /// Makes later publishes fail with `reason` (or succeed again with `None`).
    pub async fn fail_publishes(&self, reason: Option<&str>) {
        self.inner.state.lock().await.publish_failure =
            reason.map(str::to_string);
    }

    /// Holds publish, subscribe and unsubscribe requests, pending ones
    /// included, until called again with `false`. Simulates a broker
    /// client that has stopped accepting requests.
    pub fn stall_requests(&self, stalled: bool) {
        self.inner.stalled.send_replace(stalled);
    }

    async fn wait_unstalled(&self) {
        let mut stalled = self.inner.stalled.subscribe();
        // The sender lives in `inner`, so the channel can't close.
        let _ = stalled.wait_for(|stalled| !*stalled).await;
    }

    /// Makes later subscribes fail with `reason` (or succeed again with `None`).
    pub async fn fail_subscribes(&self, reason: Option<&str>) {
        self.inner.state.lock().await.subscribe_failure =
            reason.map(str::to_string);
    }
}

impl State {
    fn require_started(&self) -> Result<(), TransportError> {
        if self.started {
            Ok(())
        } else {
            Err(TransportError::NotStarted)
        }
    }

    fn check_subscribe(&self) -> Result<(), TransportError> {
        self.require_started()?;
        match &self.subscribe_failure {
            Some(reason) => Err(TransportError::Request(reason.clone())),
            None => Ok(()),
        }
    }
}

impl PubSub for MemoryTransport {
    async fn start(&self) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock().await;
        if state.started {
            return Err(TransportError::AlreadyStarted);
        }
        state.started = true;
        tracing::debug!("memory transport started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock().await;
        state.started = false;
        state.connected = false;
        state.routes.clear();
        tracing::debug!("memory transport stopped");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        self.wait_unstalled().await;
        let mut state = self.inner.state.lock().await;
        state.require_started()?;
        if let Some(reason) = &state.publish_failure {
            return Err(TransportError::Request(reason.clone()));
        }
        state.published.push(Published {
            topic: topic.to_string(),
            qos,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn subscribe(
        &self,
        filter: &str,
        _qos: QoS,
        sink: MessageSink,
    ) -> Result<(), TransportError> {
        self.wait_unstalled().await;
        let mut state = self.inner.state.lock().await;
        state.check_subscribe()?;
        state.routes.insert(filter, sink);
        state.subscribe_requests.push(vec![filter.to_string()]);
        Ok(())
    }

    async fn subscribe_many(
        &self,
        filters: &[String],
        sink: MessageSink,
    ) -> Result<(), TransportError> {
        self.wait_unstalled().await;
        let mut state = self.inner.state.lock().await;
        state.check_subscribe()?;
        for filter in filters {
            state.routes.insert(filter, sink.clone());
        }
        state.subscribe_requests.push(filters.to_vec());
        Ok(())
    }

    async fn unsubscribe(
        &self,
        filters: &[String],
    ) -> Result<(), TransportError> {
        self.wait_unstalled().await;
        let mut state = self.inner.state.lock().await;
        state.require_started()?;
        for filter in filters {
            state.routes.remove(filter);
        }
        state.unsubscribed.extend_from_slice(filters);
        Ok(())
    }
}
