//! # orderwire-core
//!
//! Types shared by every orderwire crate:
//!
//! - [`CredentialStore`]: the single, process-scoped access/refresh token slot
//!   read by both the session client and the streaming client
//! - [`RelayError`]: tagged error taxonomy surfaced to consumers
//! - [`protocol`]: constants and frames of the order-stream wire protocol

#![deny(unsafe_code)]

pub mod credentials;
pub mod errors;
pub mod protocol;

pub use credentials::{Credential, CredentialStore};
pub use errors::{RelayError, Result};
