//! Bridge error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while serving or while opening an upstream leg.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that could not be bound.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The upstream URL could not be turned into a handshake request.
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),

    /// The token cannot be sent as an HTTP header value.
    #[error("token is not a valid header value")]
    InvalidToken,

    /// The upstream handshake failed.
    #[error("upstream handshake failed: {0}")]
    Handshake(String),

    /// The upstream handshake did not finish in time.
    #[error("upstream handshake timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
