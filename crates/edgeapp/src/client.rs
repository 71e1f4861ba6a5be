//! The SDK entry point: [`EdgeClient`].
//!
//! ```text
//! new ──init──→ start ──…──→ stop ──cleanup──→ (init again)
//! ```
//!
//! `init` loads configuration and builds the codec, transport, session and
//! metadata client; `cleanup` drops them all. Every operation except
//! `stop` and `cleanup` fails with [`EdgeError::NotInitialized`] outside
//! that window.

use edgeapp_protocol::{MessageKind, ServiceCall, ServiceReply, ThingCodec};
use edgeapp_session::{
    Orchestrator, SessionConfig, SessionEvent, SessionState,
};
use edgeapp_transport::{PubSub, QoS, StatusSink};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};

use crate::config::{EdgeConfig, RuntimeKind};
use crate::meta::{EndpointInfo, MetaClient};
use crate::EdgeError;

#[cfg(feature = "mqtt")]
use edgeapp_transport::{MqttConfig, MqttTransport};

// ---------------------------------------------------------------------------
// Options and info types
// ---------------------------------------------------------------------------

/// What an [`EdgeClient`] needs before `init`.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub runtime: RuntimeKind,
    /// Services of this application that remote callers may invoke.
    pub service_ids: Vec<String>,
    /// Sub-device models whose properties and events are subscribed.
    pub endpoint_thing_ids: Vec<String>,
    pub qos: QoS,
}

impl ClientOptions {
    pub fn new(runtime: RuntimeKind) -> Self {
        Self {
            runtime,
            service_ids: Vec::new(),
            endpoint_thing_ids: Vec::new(),
            qos: QoS::AtMostOnce,
        }
    }

    pub fn service_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.service_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn endpoint_thing_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoint_thing_ids = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Identity of the edge device this application runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeLocalInfo {
    pub app_id: String,
    pub thing_id: String,
    pub device_id: String,
}

/// Builds the transport once configuration is known.
type TransportFactory<T> =
    Box<dyn Fn(&EdgeConfig, StatusSink) -> Result<T, EdgeError> + Send + Sync>;

// ---------------------------------------------------------------------------
// EdgeClient
// ---------------------------------------------------------------------------

/// An edge application's connection to the platform.
#[cfg(feature = "mqtt")]
pub struct EdgeClient<T: PubSub = MqttTransport> {
    options: ClientOptions,
    factory: TransportFactory<T>,
    core: Mutex<Option<Core<T>>>,
}

/// An edge application's connection to the platform.
#[cfg(not(feature = "mqtt"))]
pub struct EdgeClient<T: PubSub> {
    options: ClientOptions,
    factory: TransportFactory<T>,
    core: Mutex<Option<Core<T>>>,
}

/// Everything `init` builds.
struct Core<T: PubSub> {
    config: EdgeConfig,
    session: Orchestrator<T>,
    meta: MetaClient,
}

#[cfg(feature = "mqtt")]
impl EdgeClient<MqttTransport> {
    /// Creates a client that talks MQTT to the configured edge hub.
    pub fn new(options: ClientOptions) -> Self {
        Self::with_transport(options, |config, status| {
            let mqtt = MqttConfig::new(config.client_id(), config.broker_url());
            Ok(MqttTransport::new(mqtt, status))
        })
    }
}

impl<T: PubSub> EdgeClient<T> {
    /// Creates a client whose transport is built by `factory` during
    /// `init`. The factory receives the loaded configuration and the sink
    /// the transport must report connection status on.
    pub fn with_transport<F>(options: ClientOptions, factory: F) -> Self
    where
        F: Fn(&EdgeConfig, StatusSink) -> Result<T, EdgeError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            options,
            factory: Box::new(factory),
            core: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Loads configuration and builds every component. Nothing connects
    /// until [`start`](Self::start).
    ///
    /// Returns the receiver of connection events and inbound messages.
    ///
    /// # Errors
    /// [`EdgeError::Config`] if configuration is missing or invalid, and
    /// [`EdgeError::AlreadyInitialized`] on a second call.
    pub async fn init(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<SessionEvent>, EdgeError> {
        let mut core = self.core.lock().await;
        if core.is_some() {
            return Err(EdgeError::AlreadyInitialized);
        }

        let config = EdgeConfig::load(&self.options.runtime)?;
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let transport = (self.factory)(&config, status_tx)?;
        let meta = MetaClient::new(&config.hub_addr)?;
        let session_config = SessionConfig {
            qos: self.options.qos,
            service_ids: self.options.service_ids.clone(),
            endpoint_model_ids: self.options.endpoint_thing_ids.clone(),
            ..SessionConfig::default()
        };
        let (session, events) = Orchestrator::new(
            transport,
            status_rx,
            ThingCodec::new(config.identity()),
            session_config,
        );

        tracing::info!(
            app_id = %config.app_id,
            device_id = %config.device_id,
            thing_id = %config.thing_id,
            mode = %config.mode,
            "edge client initialized"
        );
        *core = Some(Core {
            config,
            session,
            meta,
        });
        Ok(events)
    }

    /// Stops the session and drops everything `init` built.
    pub async fn cleanup(&self) {
        let Some(core) = self.core.lock().await.take() else {
            return;
        };
        if let Err(e) = core.session.stop().await {
            tracing::warn!(error = %e, "error stopping session during cleanup");
        }
        tracing::info!("edge client cleaned up");
    }

    /// Begins connecting. Returns before the connection is up; watch the
    /// event receiver for [`SessionEvent::Connected`].
    pub async fn start(&self) -> Result<(), EdgeError> {
        self.session().await?.start().await?;
        Ok(())
    }

    /// Disconnects. A no-op before `init`.
    pub async fn stop(&self) -> Result<(), EdgeError> {
        match self.session().await {
            Ok(session) => Ok(session.stop().await?),
            Err(EdgeError::NotInitialized) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Current session state, or `None` before `init`.
    pub async fn state(&self) -> Option<SessionState> {
        self.core
            .lock()
            .await
            .as_ref()
            .map(|core| core.session.state())
    }

    /// A handle to the underlying session.
    pub async fn session(&self) -> Result<Orchestrator<T>, EdgeError> {
        self.core
            .lock()
            .await
            .as_ref()
            .map(|core| core.session.clone())
            .ok_or(EdgeError::NotInitialized)
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Publishes a neutral JSON payload as this application's own
    /// property report, event, service call or service reply.
    pub async fn send_message(
        &self,
        kind: MessageKind,
        payload: &[u8],
    ) -> Result<(), EdgeError> {
        let session = self.session().await?;
        if payload.is_empty() {
            return Err(EdgeError::InvalidArgument("empty payload".into()));
        }
        session.publish(kind, payload).await?;
        Ok(())
    }

    pub async fn edge_device_info(&self) -> Result<EdgeLocalInfo, EdgeError> {
        let core = self.core.lock().await;
        let config = &core.as_ref().ok_or(EdgeError::NotInitialized)?.config;
        Ok(EdgeLocalInfo {
            app_id: config.app_id.clone(),
            thing_id: config.thing_id.clone(),
            device_id: config.device_id.clone(),
        })
    }

    /// Lists the child devices known to the edge hub.
    pub async fn endpoint_infos(&self) -> Result<Vec<EndpointInfo>, EdgeError> {
        let meta = self
            .core
            .lock()
            .await
            .as_ref()
            .map(|core| core.meta.clone())
            .ok_or(EdgeError::NotInitialized)?;
        meta.list_child_devices().await
    }

    /// Invokes `call` on the child device `(thing_id, device_id)` and waits
    /// up to 5 seconds for its reply.
    ///
    /// # Errors
    /// [`EdgeError::InvalidArgument`] for empty ids. A missing reply is a
    /// session timeout, see [`EdgeError::is_timeout`].
    pub async fn call_endpoint(
        &self,
        thing_id: &str,
        device_id: &str,
        call: ServiceCall,
    ) -> Result<ServiceReply, EdgeError> {
        let session = self.session().await?;
        if thing_id.is_empty() || device_id.is_empty() {
            return Err(EdgeError::InvalidArgument(
                "thing id and device id are required".into(),
            ));
        }
        if call.identifier.is_empty() {
            return Err(EdgeError::InvalidArgument(
                "service identifier is required".into(),
            ));
        }
        Ok(session.call(thing_id, device_id, call).await?)
    }
}
