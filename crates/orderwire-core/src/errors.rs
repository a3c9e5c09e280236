//! Error taxonomy surfaced by the session and streaming clients.

use thiserror::Error;

/// Errors surfaced to orderwire consumers.
///
/// `Clone` so a single failure can be handed to every caller sharing a
/// coalesced request or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// No usable credential, or the server still rejected the request after a
    /// refresh and one retry.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Human-readable reason.
        message: String,
    },

    /// The request never produced an HTTP response.
    #[error("network error: {message}")]
    Network {
        /// Transport error description.
        message: String,
    },

    /// Non-success response that is not an auth failure.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Application error code from the response body, if present.
        code: Option<String>,
        /// Error message from the response body.
        message: String,
    },

    /// The server rejected the request payload.
    #[error("validation error: {message}")]
    Validation {
        /// Error message from the response body.
        message: String,
    },

    /// The streaming client gave up reconnecting.
    #[error("maximum reconnection attempts reached ({attempts})")]
    MaxReconnectExceeded {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// The bridge refused the upgrade request.
    #[error("upgrade rejected: {reason}")]
    UpgradeRejected {
        /// Close reason sent by the bridge.
        reason: String,
    },
}

impl RelayError {
    /// Shorthand for [`RelayError::Unauthorized`].
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Shorthand for [`RelayError::Network`].
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::Network { .. } => "NETWORK_ERROR",
            Self::Server { .. } => "INTERNAL_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::MaxReconnectExceeded { .. } => "MAX_RECONNECT_EXCEEDED",
            Self::UpgradeRejected { .. } => "UPGRADE_REJECTED",
        }
    }

    /// HTTP status carried by the error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(401),
            Self::Validation { .. } => Some(400),
            _ => None,
        }
    }
}

/// Result type for orderwire operations.
pub type Result<T> = std::result::Result<T, RelayError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
