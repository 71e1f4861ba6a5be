//! The session orchestrator: owns the transport and the codec, keeps the
//! subscription set in place across reconnects, dispatches inbound
//! traffic, and implements correlated service calls.
//!
//! The transport reports connection changes and inbound messages on
//! channels. One dispatch task consumes both, so subscription (re)issue
//! and inbound decoding never run concurrently with each other:
//!
//! ```text
//! transport ──ConnectionStatus──┐
//!                               ├─→ dispatch task ──SessionEvent──→ application
//! transport ──InboundMessage────┘        │
//!                                        └─ ServiceReply ─→ ReplyRegistry ─→ call()
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use edgeapp_protocol::{
    AddressingMode, Body, Direction, MessageKind, ServiceCall, ServiceReply,
    ThingCodec, TopicRole, mapper,
};
use edgeapp_transport::{
    ConnectionStatus, InboundMessage, MessageSink, PubSub,
};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::pending::ReplyRegistry;
use crate::{SessionConfig, SessionError, SessionEvent, SessionState};

/// Drives one application session over a [`PubSub`] transport.
///
/// Cheap to clone; clones share the same session. All methods take
/// `&self` and may be called concurrently.
pub struct Orchestrator<T: PubSub> {
    inner: Arc<Inner<T>>,
}

impl<T: PubSub> Clone for Orchestrator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T: PubSub> {
    transport: T,
    codec: ThingCodec,
    config: SessionConfig,
    state: watch::Sender<SessionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
    /// Set once an event could not be delivered.
    events_closed: AtomicBool,
    /// Sink for every subscription this session makes, static and reply.
    inbound: MessageSink,
    calls: ReplyRegistry,
    cancel: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

/// Channel ends consumed by the dispatch task, and the task itself.
struct Lifecycle {
    receivers: Option<(
        mpsc::UnboundedReceiver<ConnectionStatus>,
        mpsc::UnboundedReceiver<InboundMessage>,
    )>,
    task: Option<JoinHandle<()>>,
}

impl<T: PubSub> Orchestrator<T> {
    /// Builds an orchestrator in [`SessionState::Initialized`].
    ///
    /// `status` must be the receiving end of the channel the transport
    /// reports [`ConnectionStatus`] on. Returns the orchestrator and the
    /// receiver of application events.
    pub fn new(
        transport: T,
        status: mpsc::UnboundedReceiver<ConnectionStatus>,
        codec: ThingCodec,
        config: SessionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SessionState::Initialized);

        let inner = Inner {
            transport,
            codec,
            config,
            state,
            events: events_tx,
            events_closed: AtomicBool::new(false),
            inbound: inbound_tx,
            calls: ReplyRegistry::default(),
            cancel: CancellationToken::new(),
            lifecycle: Mutex::new(Lifecycle {
                receivers: Some((status, inbound_rx)),
                task: None,
            }),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            events_rx,
        )
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Subscribes to state changes.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn codec(&self) -> &ThingCodec {
        &self.inner.codec
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Number of correlated calls currently waiting for a reply.
    pub async fn pending_calls(&self) -> usize {
        self.inner.calls.len().await
    }

    /// The static subscription set issued after every connect.
    pub fn subscription_topics(&self) -> Vec<String> {
        self.inner.subscription_topics()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Starts the transport and the dispatch task.
    ///
    /// Returns as soon as the transport has begun connecting. Connection
    /// and subscription happen in the background and are reported as
    /// [`SessionEvent`]s.
    ///
    /// # Errors
    /// [`SessionError::AlreadyStarted`], [`SessionError::Stopped`], or the
    /// transport's own start error.
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let next = self.state().on_start()?;
        if lifecycle.receivers.is_none() {
            return Err(SessionError::AlreadyStarted);
        }

        self.inner.transport.start().await?;

        let Some((status_rx, inbound_rx)) = lifecycle.receivers.take() else {
            return Err(SessionError::AlreadyStarted);
        };
        self.inner.state.send_replace(next);
        let inner = Arc::clone(&self.inner);
        lifecycle.task =
            Some(tokio::spawn(dispatch(inner, status_rx, inbound_rx)));

        let identity = self.inner.codec.identity();
        tracing::info!(
            app_id = %identity.application_id,
            device_id = %identity.device_id,
            mode = %identity.mode,
            "session started"
        );
        Ok(())
    }

    /// Stops dispatching and disconnects the transport. Idempotent.
    ///
    /// Calls still waiting for a reply are not cancelled; each runs out
    /// its own timeout.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if self.state() == SessionState::Stopped {
            return Ok(());
        }
        self.inner.state.send_replace(SessionState::Stopped);
        self.inner.cancel.cancel();
        if let Some(task) = lifecycle.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "dispatch task failed");
            }
        }
        lifecycle.receivers = None;
        self.inner.transport.stop().await?;
        tracing::info!("session stopped");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Encodes a neutral JSON payload of `kind` and publishes it as this
    /// application's own traffic.
    pub async fn publish(
        &self,
        kind: MessageKind,
        payload: &[u8],
    ) -> Result<(), SessionError> {
        let body = Body::from_slice(kind, payload)?;
        self.publish_body(&body).await
    }

    /// Publishes a typed body as this application's own traffic.
    pub async fn publish_body(&self, body: &Body) -> Result<(), SessionError> {
        self.ensure_not_stopped()?;
        let identity = self.inner.codec.identity();
        let role = TopicRole::new(body.kind(), Direction::Publish);
        let encoded = self.inner.codec.encode_body(
            role,
            &identity.model_id,
            &identity.device_id,
            body,
        )?;
        self.inner
            .transport
            .publish(&encoded.topic, self.inner.config.qos, &encoded.payload)
            .await?;
        tracing::debug!(topic = %encoded.topic, kind = %body.kind(), "published");
        Ok(())
    }

    /// Invokes a service on `(model_id, device_id)` and waits for the
    /// reply carrying the same message id.
    ///
    /// A message id is generated if `call.message_id` is empty. The reply
    /// topic is subscribed before the call is published and released on
    /// every exit path, including cancellation of the returned future.
    /// Replies with other message ids are ignored.
    ///
    /// The timeout covers the subscribe and the publish as well as the
    /// wait, so a stalled transport fails the call instead of hanging it.
    ///
    /// # Errors
    /// - [`SessionError::Timeout`] if no matching reply arrives within
    ///   [`SessionConfig::call_timeout`].
    /// - [`SessionError::Protocol`] for invalid arguments, or in proxied
    ///   mode, which has no reply topic.
    /// - [`SessionError::DuplicateCall`] if the message id is already
    ///   waiting.
    /// - [`SessionError::Transport`] if the subscribe or publish fails.
    pub async fn call(
        &self,
        model_id: &str,
        device_id: &str,
        mut call: ServiceCall,
    ) -> Result<ServiceReply, SessionError> {
        self.ensure_not_stopped()?;
        if call.message_id.is_empty() {
            call.message_id = mapper::new_message_id();
        }

        let codec = &self.inner.codec;
        let reply_topic = codec.topic(
            TopicRole::SubscribeServiceReply,
            &call.identifier,
            model_id,
            device_id,
        )?;
        let message_id = call.message_id.clone();
        let encoded = codec.encode_body(
            TopicRole::PublishService,
            model_id,
            device_id,
            &Body::ServiceCall(call),
        )?;

        let guard = CallGuard::new(&self.inner, &message_id);
        let ticket = guard.ticket;
        let inner = &self.inner;
        let exchange = async {
            let reply_rx = inner
                .calls
                .register(
                    &inner.transport,
                    &inner.inbound,
                    inner.config.qos,
                    ticket,
                    &message_id,
                    &reply_topic,
                )
                .await?;
            inner
                .transport
                .publish(&encoded.topic, inner.config.qos, &encoded.payload)
                .await?;
            tracing::debug!(%message_id, topic = %encoded.topic, "service call sent");
            let reply = reply_rx
                .await
                .map_err(|_| SessionError::ReplyDropped(message_id.clone()))?;
            Ok::<_, SessionError>(reply)
        };

        let after = self.inner.config.call_timeout;
        let outcome = tokio::time::timeout(after, exchange).await;
        guard.release().await;

        match outcome {
            Ok(Ok(reply)) => {
                tracing::debug!(%message_id, code = reply.code, "service reply");
                Ok(reply)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!(%message_id, ?after, "service call timed out");
                Err(SessionError::Timeout { message_id, after })
            }
        }
    }

    fn ensure_not_stopped(&self) -> Result<(), SessionError> {
        if self.state() == SessionState::Stopped {
            return Err(SessionError::Stopped);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Call guard
// ---------------------------------------------------------------------------

/// Releases a waiting call's registry entry on drop.
///
/// Created before the call registers, so a call cancelled while its
/// subscribe is still in flight is released too. Normal exits call [`release`](CallGuard::release). If the call future
/// is dropped mid-wait, `Drop` cannot await, so the release is spawned
/// onto the current runtime.
struct CallGuard<T: PubSub> {
    inner: Arc<Inner<T>>,
    ticket: u64,
    message_id: String,
    armed: bool,
}

impl<T: PubSub> CallGuard<T> {
    fn new(inner: &Arc<Inner<T>>, message_id: &str) -> Self {
        Self {
            inner: Arc::clone(inner),
            ticket: inner.calls.ticket(),
            message_id: message_id.to_string(),
            armed: true,
        }
    }

    async fn release(mut self) {
        self.armed = false;
        self.inner
            .calls
            .release(&self.inner.transport, self.ticket, &self.message_id)
            .await;
    }
}

impl<T: PubSub> Drop for CallGuard<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        let ticket = self.ticket;
        let message_id = std::mem::take(&mut self.message_id);
        runtime.spawn(async move {
            inner.calls.release(&inner.transport, ticket, &message_id).await;
        });
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

async fn dispatch<T: PubSub>(
    inner: Arc<Inner<T>>,
    mut status_rx: mpsc::UnboundedReceiver<ConnectionStatus>,
    mut inbound_rx: mpsc::UnboundedReceiver<InboundMessage>,
) {
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            Some(status) = status_rx.recv() => inner.on_status(status).await,
            Some(message) = inbound_rx.recv() => {
                inner.on_receive(message).await
            }
            else => break,
        }
    }
    tracing::debug!("dispatch loop exited");
}

impl<T: PubSub> Inner<T> {
    async fn on_status(&self, status: ConnectionStatus) {
        self.state.send_modify(|state| *state = state.on_status(&status));
        match status {
            ConnectionStatus::Connected => {
                tracing::info!("session connected");
                self.emit(SessionEvent::Connected);
                self.subscribe_all().await;
            }
            ConnectionStatus::Disconnected(reason) => {
                tracing::info!(%reason, "session disconnected");
                self.emit(SessionEvent::Disconnected { reason });
            }
        }
    }

    /// Hands `event` to the application. Dispatch keeps running after the
    /// receiver is dropped; the first lost event is logged.
    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err()
            && !self.events_closed.swap(true, Ordering::Relaxed)
        {
            tracing::debug!("application event receiver dropped");
        }
    }

    /// Issues the static subscription set, plus the reply topics of calls
    /// still waiting, in one batch.
    async fn subscribe_all(&self) {
        let mut topics = self.subscription_topics();
        topics.extend(self.calls.active_topics().await);
        if topics.is_empty() {
            return;
        }
        match self
            .transport
            .subscribe_many(&topics, self.inbound.clone())
            .await
        {
            Ok(()) => {
                tracing::info!(count = topics.len(), "subscriptions issued")
            }
            Err(e) => tracing::warn!(error = %e, "subscribe failed"),
        }
    }

    fn subscription_topics(&self) -> Vec<String> {
        let identity = self.codec.identity();
        let own_model = identity.model_id.as_str();
        let own_device = identity.device_id.as_str();

        let mut wanted = vec![
            (TopicRole::SubscribeProperty, "+", own_model, own_device),
            (TopicRole::SubscribeEvent, "+", own_model, own_device),
        ];
        for service in &self.config.service_ids {
            wanted.push((
                TopicRole::SubscribeService,
                service.as_str(),
                own_model,
                own_device,
            ));
        }
        if self.codec.mode() == AddressingMode::Direct {
            for model in &self.config.endpoint_model_ids {
                let model = model.as_str();
                wanted.push((TopicRole::SubscribeProperty, "+", model, "+"));
                wanted.push((TopicRole::SubscribeEvent, "+", model, "+"));
            }
        }

        wanted
            .into_iter()
            .filter_map(|(role, identifier, model, device)| {
                match self.codec.topic(role, identifier, model, device) {
                    Ok(topic) => Some(topic),
                    Err(e) => {
                        tracing::warn!(
                            %role,
                            identifier,
                            model_id = model,
                            error = %e,
                            "skipping subscription topic"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    async fn on_receive(&self, message: InboundMessage) {
        let decoded = match self
            .codec
            .decode_resolving_entity(&message.topic, &message.payload)
        {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(
                    topic = %message.topic,
                    error = %e,
                    "dropping inbound message"
                );
                return;
            }
        };

        if decoded.role.direction() != Direction::Subscribe {
            tracing::debug!(
                topic = %message.topic,
                role = %decoded.role,
                "ignoring outbound-direction topic"
            );
            return;
        }

        if let Body::ServiceReply(reply) = &decoded.body {
            if !self.calls.resolve(reply.clone()).await {
                tracing::debug!(
                    message_id = %reply.message_id,
                    "no call waiting for reply"
                );
            }
            return;
        }

        match decoded.into_message() {
            Ok(message) => {
                tracing::debug!(
                    kind = %message.kind,
                    model_id = %message.model_id,
                    device_id = %message.device_id,
                    "inbound message"
                );
                self.emit(SessionEvent::Message(message));
            }
            Err(e) => tracing::warn!(error = %e, "dropping inbound message"),
        }
    }
}
