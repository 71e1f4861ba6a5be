//! Error types for the session layer.

use std::time::Duration;

use edgeapp_protocol::ProtocolError;
use edgeapp_transport::TransportError;

/// Errors returned by [`Orchestrator`](crate::Orchestrator) operations.
///
/// Inbound decode failures never show up here: the dispatch loop logs
/// and drops those messages instead.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A topic could not be built or a payload could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport rejected a publish, subscribe, or lifecycle request.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No matching reply arrived before the deadline.
    ///
    /// Distinct from [`SessionError::Transport`] so callers can decide
    /// whether to retry.
    #[error("no reply to call {message_id} within {after:?}")]
    Timeout { message_id: String, after: Duration },

    /// Another call with the same message id is still waiting.
    #[error("a call with message id {0} is already waiting for a reply")]
    DuplicateCall(String),

    /// The orchestrator was stopped.
    #[error("session stopped")]
    Stopped,

    /// `start` was called more than once.
    #[error("session already started")]
    AlreadyStarted,

    /// The reply slot was discarded before a reply arrived.
    #[error("reply for call {0} was dropped")]
    ReplyDropped(String),
}
