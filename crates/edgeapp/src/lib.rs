//! # edgeapp
//!
//! SDK for applications running on an edge device that exchange
//! thing-model data (properties, events and service calls) with an IoT
//! platform over MQTT.
//!
//! The application works with neutral [`Message`]s; the SDK handles topic
//! layout, wire envelopes, subscriptions across reconnects, and
//! correlating service calls with their replies.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgeapp::prelude::*;
//!
//! # async fn run() -> Result<(), EdgeError> {
//! let options = ClientOptions::new(RuntimeKind::Container)
//!     .service_ids(["test_app_call"]);
//! let client = EdgeClient::new(options);
//! let mut events = client.init().await?;
//! client.start().await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::Message(message) = event {
//!         println!("{:?} from {}", message.kind, message.device_id);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod client;
pub mod config;
mod error;
pub mod logging;
pub mod meta;

pub use client::{ClientOptions, EdgeClient, EdgeLocalInfo};
pub use config::{EdgeConfig, RuntimeKind};
pub use error::EdgeError;
pub use meta::{EndpointInfo, MetaClient};

pub use edgeapp_protocol::{
    AddressingMode, Body, EventRecord, Message, MessageKind, Params,
    PropertyValue, ServiceCall, ServiceReply,
};
pub use edgeapp_session::{SessionError, SessionEvent, SessionState};
pub use edgeapp_transport::{MemoryTransport, PubSub, Published, QoS};

/// Glob-import for the common application surface.
pub mod prelude {
    pub use crate::{
        ClientOptions, EdgeClient, EdgeError, EdgeLocalInfo, EndpointInfo,
        RuntimeKind,
    };
    pub use crate::{
        Body, Message, MessageKind, Params, ServiceCall, ServiceReply,
        SessionEvent, SessionState,
    };
}
