//! Registry of correlated calls waiting for a reply.
//!
//! Each waiting call owns one single-use reply slot keyed by message id.
//! Calls to the same target share one reply topic, so reply topics are
//! reference counted: the first waiter subscribes, the last one to leave
//! unsubscribes.
//!
//! A waiter is recorded before its topic is subscribed, so a register
//! cancelled mid-subscribe still leaves an entry its owner can release.
//! Every caller holds a [`ticket`](ReplyRegistry::ticket); a release only
//! removes the waiter registered under the same ticket, which keeps a
//! rejected duplicate from releasing the call it collided with.
//!
//! The registry lock is held across subscribe and unsubscribe requests.
//! A release racing a register on the same topic could otherwise drop a
//! subscription the new waiter depends on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use edgeapp_protocol::ServiceReply;
use edgeapp_transport::{MessageSink, PubSub, QoS};
use tokio::sync::{Mutex, oneshot};

use crate::SessionError;

#[derive(Debug, Default)]
pub(crate) struct ReplyRegistry {
    calls: Mutex<Calls>,
    next_ticket: AtomicU64,
}

#[derive(Debug, Default)]
struct Calls {
    waiters: HashMap<String, Waiter>,
    /// Reply topic → number of waiters using it.
    topics: HashMap<String, usize>,
}

#[derive(Debug)]
struct Waiter {
    ticket: u64,
    topic: String,
    /// Taken by the first matching reply.
    reply: Option<oneshot::Sender<ServiceReply>>,
}

impl ReplyRegistry {
    /// A token identifying one caller's registration.
    pub(crate) fn ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::Relaxed)
    }

    /// Adds a waiter for `message_id` under `ticket`, subscribing `topic`
    /// if no other waiter uses it yet.
    ///
    /// If the returned future is dropped while the subscribe is in flight,
    /// the waiter stays registered until released with the same ticket.
    ///
    /// # Errors
    /// - [`SessionError::DuplicateCall`] if the id is already waiting.
    /// - [`SessionError::Transport`] if the subscribe fails; nothing is
    ///   registered in that case.
    pub(crate) async fn register<T: PubSub>(
        &self,
        transport: &T,
        sink: &MessageSink,
        qos: QoS,
        ticket: u64,
        message_id: &str,
        topic: &str,
    ) -> Result<oneshot::Receiver<ServiceReply>, SessionError> {
        let mut calls = self.calls.lock().await;
        if calls.waiters.contains_key(message_id) {
            return Err(SessionError::DuplicateCall(message_id.to_string()));
        }

        let (tx, rx) = oneshot::channel();
        calls.waiters.insert(
            message_id.to_string(),
            Waiter {
                ticket,
                topic: topic.to_string(),
                reply: Some(tx),
            },
        );
        let count = calls.topics.entry(topic.to_string()).or_insert(0);
        *count += 1;
        if *count > 1 {
            return Ok(rx);
        }

        if let Err(e) = transport.subscribe(topic, qos, sink.clone()).await {
            calls.waiters.remove(message_id);
            calls.topics.remove(topic);
            return Err(e.into());
        }
        tracing::debug!(%topic, "reply topic subscribed");
        Ok(rx)
    }

    /// Hands `reply` to the waiter with the same message id.
    ///
    /// Returns `false` if no waiter matches or the waiter already got its
    /// reply.
    pub(crate) async fn resolve(&self, reply: ServiceReply) -> bool {
        let mut calls = self.calls.lock().await;
        let Some(tx) = calls
            .waiters
            .get_mut(&reply.message_id)
            .and_then(|waiter| waiter.reply.take())
        else {
            return false;
        };
        tx.send(reply).is_ok()
    }

    /// Removes the waiter for `message_id`, unsubscribing its reply topic
    /// if no other waiter still uses it. Unknown ids, and waiters held
    /// under another ticket, are left alone.
    pub(crate) async fn release<T: PubSub>(
        &self,
        transport: &T,
        ticket: u64,
        message_id: &str,
    ) {
        let mut calls = self.calls.lock().await;
        if calls.waiters.get(message_id).map(|w| w.ticket) != Some(ticket) {
            return;
        }
        let Some(waiter) = calls.waiters.remove(message_id) else {
            return;
        };
        let last = match calls.topics.get_mut(&waiter.topic) {
            Some(count) => {
                *count -= 1;
                *count == 0
            }
            None => false,
        };
        if !last {
            return;
        }
        calls.topics.remove(&waiter.topic);
        match transport
            .unsubscribe(std::slice::from_ref(&waiter.topic))
            .await
        {
            Ok(()) => {
                tracing::debug!(topic = %waiter.topic, "reply topic released")
            }
            Err(e) => tracing::debug!(
                topic = %waiter.topic,
                error = %e,
                "reply topic unsubscribe failed"
            ),
        }
    }

    /// Reply topics with at least one waiter. Reissued after a reconnect.
    pub(crate) async fn active_topics(&self) -> Vec<String> {
        let calls = self.calls.lock().await;
        let mut topics: Vec<String> = calls.topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub(crate) async fn len(&self) -> usize {
        self.calls.lock().await.waiters.len()
    }
}
