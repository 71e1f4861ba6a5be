//! Error types for the protocol layer.
//!
//! Each crate in edgeapp defines its own error enum. A `ProtocolError`
//! always means the problem is in topic grammar or message mapping, never
//! in networking or session state. Every variant is returned
//! synchronously; nothing here is retried.

use crate::TopicRole;
use crate::topic::AddressingMode;

/// Errors that can occur while building topics or mapping messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A caller-supplied argument is empty or malformed.
    ///
    /// Raised for empty identifiers, empty property lists, wildcards in
    /// publish topics, and payloads whose kind does not match the role.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A topic string does not follow the grammar of the active mode.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// The role has no template in the given addressing mode.
    #[error("role {role} is not supported in {mode} mode")]
    UnsupportedRole {
        role: TopicRole,
        mode: AddressingMode,
    },

    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, or
    /// values of the wrong type.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The message parsed but violates protocol rules, for example an
    /// envelope whose `type` belongs to a different message kind.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
