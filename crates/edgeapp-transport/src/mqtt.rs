//! MQTT transport using `rumqttc`.
//!
//! `start` spawns a task that drives the rumqttc event loop. The loop
//! reports every ConnAck as [`ConnectionStatus::Connected`] and every
//! connection error as [`ConnectionStatus::Disconnected`], then retries
//! after a fixed delay; rumqttc reconnects on the next poll. Sessions are
//! clean, so subscriptions must be reissued after each connect.
//!
//! Requests are queued with rumqttc's non-blocking `try_*` calls. Nothing
//! drains the queue while the broker is unreachable, so once it is full
//! requests fail with [`TransportError::QueueFull`] instead of waiting for
//! the connection to come back.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ClientError, ConnectReturnCode, Event, EventLoop,
    MqttOptions, Outgoing, Packet, SubscribeFilter,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::filter::Routes;
use crate::{
    ConnectionStatus, InboundMessage, MessageSink, PubSub, QoS, StatusSink,
    TransportError,
};

// ---------------------------------------------------------------------------
// MqttConfig
// ---------------------------------------------------------------------------

/// Connection settings for [`MqttTransport`].
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub client_id: String,
    /// `tcp://host:port` or `mqtt://host:port`.
    pub url: String,
    pub keep_alive: Duration,
    /// Delay before the next connection attempt after an error.
    pub retry_interval: Duration,
    /// Capacity of the request channel between client and event loop.
    pub request_capacity: usize,
    /// How long `stop` waits for the disconnect to be flushed before
    /// abandoning the event loop.
    pub disconnect_timeout: Duration,
}

impl MqttConfig {
    /// Creates a config with 5 s keep-alive and 5 s retry interval.
    pub fn new(client_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            url: url.into(),
            keep_alive: Duration::from_secs(5),
            retry_interval: Duration::from_secs(5),
            request_capacity: 64,
            disconnect_timeout: Duration::from_secs(1),
        }
    }
}

/// Splits a broker URL into host and port.
fn parse_url(url: &str) -> Result<(String, u16), TransportError> {
    let invalid = |reason: &str| TransportError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };
    let (scheme, rest) =
        url.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
    if !matches!(scheme, "tcp" | "mqtt") {
        return Err(invalid("unsupported scheme"));
    }
    let (host, port) =
        rest.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    let port = port.parse().map_err(|_| invalid("bad port"))?;
    Ok((host.to_string(), port))
}

fn to_mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

fn request_error(err: ClientError) -> TransportError {
    match err {
        ClientError::TryRequest(_) => TransportError::QueueFull,
        ClientError::Request(_) => TransportError::Request(err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// MqttTransport
// ---------------------------------------------------------------------------

/// A [`PubSub`] client connected to an MQTT broker.
pub struct MqttTransport {
    config: MqttConfig,
    status: StatusSink,
    routes: Arc<Mutex<Routes>>,
    running: Mutex<Option<Running>>,
}

struct Running {
    client: AsyncClient,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MqttTransport {
    /// Creates a stopped transport reporting status changes to `status`.
    pub fn new(config: MqttConfig, status: StatusSink) -> Self {
        Self {
            config,
            status,
            routes: Arc::new(Mutex::new(Routes::default())),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    async fn client(&self) -> Result<AsyncClient, TransportError> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|running| running.client.clone())
            .ok_or(TransportError::NotStarted)
    }
}

impl PubSub for MqttTransport {
    async fn start(&self) -> Result<(), TransportError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        let (host, port) = parse_url(&self.config.url)?;
        let mut options =
            MqttOptions::new(self.config.client_id.clone(), host, port);
        options.set_keep_alive(self.config.keep_alive);
        options.set_clean_session(true);

        let (client, event_loop) =
            AsyncClient::new(options, self.config.request_capacity);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(drive(
            event_loop,
            Arc::clone(&self.routes),
            self.status.clone(),
            cancel.clone(),
            self.config.retry_interval,
        ));

        tracing::info!(
            url = %self.config.url,
            client_id = %self.config.client_id,
            "MQTT transport started"
        );
        *running = Some(Running {
            client,
            cancel,
            task,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };
        let Running {
            client,
            cancel,
            mut task,
        } = running;

        // The event loop exits once the disconnect is written out. It can't
        // be while the broker is down, so the wait is bounded.
        let flushed = match client.try_disconnect() {
            Ok(()) => {
                tokio::time::timeout(self.config.disconnect_timeout, &mut task)
                    .await
                    .ok()
            }
            Err(e) => {
                tracing::debug!(error = %e, "disconnect not queued");
                None
            }
        };
        let joined = match flushed {
            Some(joined) => joined,
            None => {
                cancel.cancel();
                task.await
            }
        };
        if let Err(e) = joined {
            tracing::warn!(error = %e, "MQTT event loop task failed");
        }
        self.routes.lock().await.clear();
        tracing::info!("MQTT transport stopped");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let client = self.client().await?;
        client
            .try_publish(topic, to_mqtt_qos(qos), false, payload.to_vec())
            .map_err(request_error)
    }

    async fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
        sink: MessageSink,
    ) -> Result<(), TransportError> {
        let client = self.client().await?;
        // Route first so nothing arriving right after SubAck is lost.
        self.routes.lock().await.insert(filter, sink);
        client
            .try_subscribe(filter, to_mqtt_qos(qos))
            .map_err(request_error)
    }

    async fn subscribe_many(
        &self,
        filters: &[String],
        sink: MessageSink,
    ) -> Result<(), TransportError> {
        if filters.is_empty() {
            return Ok(());
        }
        let client = self.client().await?;
        {
            let mut routes = self.routes.lock().await;
            for filter in filters {
                routes.insert(filter, sink.clone());
            }
        }
        let requests = filters.iter().map(|filter| {
            SubscribeFilter::new(filter.clone(), rumqttc::QoS::AtMostOnce)
        });
        client.try_subscribe_many(requests).map_err(request_error)
    }

    async fn unsubscribe(
        &self,
        filters: &[String],
    ) -> Result<(), TransportError> {
        let client = self.client().await?;
        let mut routes = self.routes.lock().await;
        for filter in filters {
            routes.remove(filter);
            client
                .try_unsubscribe(filter.as_str())
                .map_err(request_error)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

async fn drive(
    mut event_loop: EventLoop,
    routes: Arc<Mutex<Routes>>,
    status: StatusSink,
    cancel: CancellationToken,
    retry_interval: Duration,
) {
    let mut connected = false;
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = event_loop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    connected = true;
                    tracing::info!("connected to broker");
                    let _ = status.send(ConnectionStatus::Connected);
                } else {
                    tracing::warn!(code = ?ack.code, "broker refused connection");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                };
                let delivered = routes.lock().await.deliver(&message);
                if delivered == 0 {
                    tracing::debug!(topic = %message.topic, "no route for publish");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                mark_disconnected(&mut connected, &status, "disconnected");
                break;
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                mark_disconnected(
                    &mut connected,
                    &status,
                    "disconnected by broker",
                );
            }
            Ok(_) => {}
            Err(e) => {
                mark_disconnected(&mut connected, &status, &e.to_string());
                tracing::warn!(
                    error = %e,
                    retry_in = ?retry_interval,
                    "broker connection error"
                );
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(retry_interval) => {}
                }
            }
        }
    }
    tracing::debug!("MQTT event loop exited");
}

fn mark_disconnected(
    connected: &mut bool,
    status: &StatusSink,
    reason: &str,
) {
    if std::mem::replace(connected, false) {
        tracing::info!(reason, "disconnected from broker");
        let _ = status.send(ConnectionStatus::Disconnected(reason.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_parse_url_tcp() {
        let (host, port) = parse_url("tcp://edgewize-hub:1883").unwrap();
        assert_eq!(host, "edgewize-hub");
        assert_eq!(port, 1883);
    }

    #[test]
    fn test_parse_url_rejects_bad_input() {
        for url in [
            "edgewize-hub:1883",
            "ws://edgewize-hub:1883",
            "tcp://:1883",
            "tcp://edgewize-hub",
            "tcp://edgewize-hub:notaport",
        ] {
            assert!(
                matches!(
                    parse_url(url),
                    Err(TransportError::InvalidUrl { .. })
                ),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = MqttConfig::new("dev/app", "tcp://localhost:1883");
        assert_eq!(config.keep_alive, Duration::from_secs(5));
        assert_eq!(config.retry_interval, Duration::from_secs(5));
        assert_eq!(config.disconnect_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_request_error_full_queue_is_queue_full() {
        let (client, _event_loop) = AsyncClient::new(
            MqttOptions::new("dev/app", "localhost", 1883),
            1,
        );
        client
            .try_publish("t", rumqttc::QoS::AtMostOnce, false, vec![1])
            .unwrap();
        let err = client
            .try_publish("t", rumqttc::QoS::AtMostOnce, false, vec![2])
            .unwrap_err();
        assert!(matches!(request_error(err), TransportError::QueueFull));
    }

    #[tokio::test]
    async fn test_publish_before_start_fails() {
        let (status, _rx) = mpsc::unbounded_channel();
        let transport = MqttTransport::new(
            MqttConfig::new("dev/app", "tcp://localhost:1883"),
            status,
        );
        let result = transport.publish("t", QoS::AtMostOnce, b"x").await;
        assert!(matches!(result, Err(TransportError::NotStarted)));
    }

    #[tokio::test]
    async fn test_start_with_bad_url_fails() {
        let (status, _rx) = mpsc::unbounded_channel();
        let transport =
            MqttTransport::new(MqttConfig::new("dev/app", "nowhere"), status);
        let result = transport.start().await;
        assert!(matches!(result, Err(TransportError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_stop_when_not_started_is_noop() {
        let (status, _rx) = mpsc::unbounded_channel();
        let transport = MqttTransport::new(
            MqttConfig::new("dev/app", "tcp://localhost:1883"),
            status,
        );
        assert!(transport.stop().await.is_ok());
    }
}
