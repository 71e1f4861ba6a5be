//! Session orchestration for edgeapp.
//!
//! This crate turns a [`PubSub`](edgeapp_transport::PubSub) transport and a
//! [`ThingCodec`](edgeapp_protocol::ThingCodec) into an application
//! session:
//!
//! 1. **Lifecycle**: [`SessionState`] from start through reconnects to
//!    stop.
//! 2. **Subscriptions**: the full subscription set is reissued after
//!    every connect, so a reconnect needs no local teardown.
//! 3. **Dispatch**: inbound traffic is decoded and delivered as
//!    [`SessionEvent`]s; undecodable messages are logged and dropped.
//! 4. **Correlated calls**: [`Orchestrator::call`] layers request/reply
//!    on top of pub/sub, matching replies by message id.
//!
//! # How it fits in the stack
//!
//! ```text
//! Facade (above)    ← owns the orchestrator, exposes the SDK surface
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol + Transport (below)
//! ```

mod error;
mod orchestrator;
mod pending;
mod session;

pub use error::SessionError;
pub use orchestrator::Orchestrator;
pub use session::{SessionConfig, SessionEvent, SessionState};
