/// Errors that can occur in the transport layer.
///
/// Losing the broker connection is not an error here; it is reported as a
/// [`ConnectionStatus`](crate::ConnectionStatus) and the transport keeps
/// reconnecting on its own.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An operation needs a started transport.
    #[error("transport not started")]
    NotStarted,

    /// `start` was called on a running transport.
    #[error("transport already started")]
    AlreadyStarted,

    /// The broker URL could not be used.
    #[error("invalid broker url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A QoS level outside 0..=2.
    #[error("invalid qos level {0}")]
    InvalidQos(u8),

    /// The client rejected a publish, subscribe, or unsubscribe request.
    #[error("request failed: {0}")]
    Request(String),

    /// The outgoing request queue is full, typically because the broker
    /// is unreachable. The request was not queued.
    #[error("request queue full")]
    QueueFull,

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
