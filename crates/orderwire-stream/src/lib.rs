//! # orderwire-stream
//!
//! Client side of the order-update stream.
//!
//! [`StreamingClient`] keeps one WebSocket to the bridge open on behalf of
//! the authenticated user. Reconnection is decided by a pure state machine
//! ([`machine::StreamSession`]); a small tokio driver owns the socket and
//! the two timers (keepalive and reconnect) and executes the effects the
//! machine emits. Status updates, errors and connection changes are fanned
//! out to callbacks registered through [`SubscriberRegistry`].

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod machine;
pub mod message;
pub mod registry;

pub use client::StreamingClient;
pub use config::StreamConfig;
pub use machine::ConnectionState;
pub use message::{Inbound, StatusMessage};
pub use registry::{SubscriberRegistry, Subscription};
