//! Session configuration, lifecycle state, and the events handed to the
//! application.

use std::fmt;
use std::time::Duration;

use edgeapp_protocol::Message;
use edgeapp_transport::{ConnectionStatus, QoS};

use crate::SessionError;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// What the orchestrator subscribes to and how it publishes.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// QoS for publishes and reply-topic subscriptions.
    pub qos: QoS,

    /// Deadline for a correlated call. Default: 5 seconds.
    pub call_timeout: Duration,

    /// Services of this application that remote callers may invoke.
    /// One service-call subscription is issued per id.
    pub service_ids: Vec<String>,

    /// Sub-device models whose property and event traffic is subscribed
    /// with a device wildcard. Only used in direct addressing mode.
    pub endpoint_model_ids: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            qos: QoS::AtMostOnce,
            call_timeout: Duration::from_secs(5),
            service_ids: Vec::new(),
            endpoint_model_ids: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle of an orchestrator.
///
/// ```text
/// Initialized ──start──→ Connecting ──connect──→ Connected
///                            ↑                      │
///                            └──── Disconnected ←───┘
///
/// any state ──stop──→ Stopped (terminal)
/// ```
///
/// `Connecting` and `Disconnected` alternate under the transport's own
/// reconnect policy; nothing here retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Built but not started.
    Initialized,
    /// Started, first connection not yet up.
    Connecting,
    Connected,
    /// Lost the connection; the transport is reconnecting.
    Disconnected,
    Stopped,
}

impl SessionState {
    /// State after a `start` request.
    pub(crate) fn on_start(self) -> Result<Self, SessionError> {
        match self {
            Self::Initialized => Ok(Self::Connecting),
            Self::Stopped => Err(SessionError::Stopped),
            Self::Connecting | Self::Connected | Self::Disconnected => {
                Err(SessionError::AlreadyStarted)
            }
        }
    }

    /// State after a transport status report.
    pub(crate) fn on_status(self, status: &ConnectionStatus) -> Self {
        match (self, status) {
            (Self::Stopped, _) => Self::Stopped,
            (_, ConnectionStatus::Connected) => Self::Connected,
            (_, ConnectionStatus::Disconnected(_)) => Self::Disconnected,
        }
    }

    pub fn is_running(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Connected | Self::Disconnected
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// Delivered to the application on the orchestrator's event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The transport (re)connected and subscriptions were reissued.
    Connected,
    /// The transport lost its connection and is reconnecting.
    Disconnected { reason: String },
    /// An inbound property, event, or service call.
    Message(Message),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_start_from_initialized_connects() {
        let next = SessionState::Initialized.on_start().unwrap();
        assert_eq!(next, SessionState::Connecting);
    }

    #[test]
    fn test_on_start_twice_fails() {
        for state in [
            SessionState::Connecting,
            SessionState::Connected,
            SessionState::Disconnected,
        ] {
            assert!(matches!(
                state.on_start(),
                Err(SessionError::AlreadyStarted)
            ));
        }
    }

    #[test]
    fn test_on_start_after_stop_fails() {
        assert!(matches!(
            SessionState::Stopped.on_start(),
            Err(SessionError::Stopped)
        ));
    }

    #[test]
    fn test_on_status_alternates_connected_and_disconnected() {
        let lost = ConnectionStatus::Disconnected("eof".into());
        let state = SessionState::Connecting
            .on_status(&ConnectionStatus::Connected)
            .on_status(&lost);
        assert_eq!(state, SessionState::Disconnected);
        assert_eq!(
            state.on_status(&ConnectionStatus::Connected),
            SessionState::Connected
        );
    }

    #[test]
    fn test_on_status_stopped_is_terminal() {
        let state =
            SessionState::Stopped.on_status(&ConnectionStatus::Connected);
        assert_eq!(state, SessionState::Stopped);
        assert!(!state.is_running());
    }

    #[test]
    fn test_default_config_has_five_second_call_timeout() {
        let config = SessionConfig::default();
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert_eq!(config.qos, QoS::AtMostOnce);
    }
}
