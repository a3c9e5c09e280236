//! # orderwire-session
//!
//! Authenticated HTTP client shared by every REST consumer.
//!
//! - **Single-flight refresh**: any number of concurrent auth failures produce
//!   one refresh call; every waiter retries once with the new token.
//! - **Request coalescing**: concurrent identical `GET`/`HEAD` calls share one
//!   network request and one result.
//! - **Session lifecycle**: [`SessionClient::login`] populates the shared
//!   [`CredentialStore`](orderwire_core::CredentialStore),
//!   [`SessionClient::logout`] clears it.

#![deny(unsafe_code)]

mod auth;
pub mod classify;
pub mod client;
pub mod config;
mod refresh;
pub mod signature;
pub mod types;

pub use classify::AuthFailureMatcher;
pub use client::SessionClient;
pub use config::SessionConfig;
pub use signature::RequestSignature;
pub use types::{ApiResponse, LoginRequest};
