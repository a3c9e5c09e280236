//! # orderwire-bridge
//!
//! WebSocket proxy between downstream stream clients and the authenticated
//! upstream order-update endpoint.
//!
//! Each accepted downstream socket is paired with its own upstream socket,
//! opened with the caller's bearer token. The two legs share a lifecycle:
//! when one closes or fails, the other is closed with the same code. Pairs
//! share nothing but read-only configuration and a live-connection counter.

#![deny(unsafe_code)]

pub mod config;
pub mod connections;
pub mod errors;
pub mod health;
mod pair;
pub mod server;
pub mod shutdown;
pub mod upgrade;
pub mod upstream;

pub use config::BridgeConfig;
pub use errors::BridgeError;
pub use server::BridgeServer;
