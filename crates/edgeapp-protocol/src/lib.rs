//! Thing-model protocol for edgeapp.
//!
//! This crate defines how the SDK's neutral messages map onto the
//! platform's topics and wire envelopes:
//!
//! - **Topic grammar** ([`topic`]): [`TopicRole`], [`AddressingMode`], and
//!   building/parsing topic strings in both addressing modes.
//! - **Messages** ([`Message`], [`Body`], [`PropertyValue`], [`EventRecord`],
//!   [`ServiceCall`], [`ServiceReply`]): the neutral shapes the application
//!   sees.
//! - **Wire** ([`wire`], [`mapper`]): platform envelopes and the pure
//!   functions that translate to and from them.
//! - **Codec** ([`ThingCodec`]): both of the above behind `encode` and
//!   `decode`, bound to a fixed [`Identity`].
//!
//! # Architecture
//!
//! The protocol layer is pure computation. It doesn't know about
//! connections or subscriptions; the session layer drives it.
//!
//! ```text
//! Transport (topic, bytes) → Protocol (Message) → Session (application events)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
pub mod mapper;
mod message;
pub mod topic;
pub mod wire;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{Decoded, Encoded, Identity, ThingCodec};
pub use error::ProtocolError;
pub use message::{
    Body, EventRecord, Message, MessageKind, Params, PropertyValue,
    ServiceCall, ServiceReply,
};
pub use topic::{AddressingMode, Direction, ParsedTopic, TopicRole, TopicScope};
