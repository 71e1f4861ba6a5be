//! Unified error type for the edgeapp SDK.

use edgeapp_protocol::ProtocolError;
use edgeapp_session::SessionError;
use edgeapp_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// Callers of [`EdgeClient`](crate::EdgeClient) deal with this single type.
/// The `#[from]` variants let `?` convert sub-crate errors directly.
#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Includes call timeouts, see [`EdgeError::is_timeout`].
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Configuration could not be loaded or is incomplete.
    #[error("configuration error: {0}")]
    Config(String),

    /// The metadata service request failed.
    #[error("metadata request failed: {0}")]
    Meta(#[from] reqwest::Error),

    /// The client was used before `init` or after `cleanup`.
    #[error("client not initialized")]
    NotInitialized,

    /// `init` was called again without an intervening `cleanup`.
    #[error("client already initialized")]
    AlreadyInitialized,

    /// A caller-supplied argument is empty or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl EdgeError {
    /// Returns `true` if a correlated call ran out of time waiting for
    /// its reply.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Session(SessionError::Timeout { .. }))
    }
}

impl From<config::ConfigError> for EdgeError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_from_transport_error() {
        let err: EdgeError = TransportError::Request("queue full".into()).into();
        assert!(matches!(err, EdgeError::Transport(_)));
        assert!(err.to_string().contains("queue full"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: EdgeError = ProtocolError::InvalidTopic("/bogus".into()).into();
        assert!(matches!(err, EdgeError::Protocol(_)));
    }

    #[test]
    fn test_is_timeout_only_for_call_timeouts() {
        let timeout: EdgeError = SessionError::Timeout {
            message_id: "M1".into(),
            after: Duration::from_secs(5),
        }
        .into();
        assert!(timeout.is_timeout());

        let stopped: EdgeError = SessionError::Stopped.into();
        assert!(!stopped.is_timeout());
        assert!(!EdgeError::NotInitialized.is_timeout());
    }
}
