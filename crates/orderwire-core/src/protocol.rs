//! Order-stream wire protocol.
//!
//! The stream carries UTF-8 text frames. Clients send the literal
//! [`PING`] as a liveness probe and may receive [`PONG`]. The first JSON
//! frame after a successful upstream handshake is a confirmation sentinel
//! (see [`is_confirmation`]); everything else is an order-status update.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Liveness probe sent by clients.
pub const PING: &str = "ping";

/// Liveness reply.
pub const PONG: &str = "pong";

/// Default upgrade path served by the bridge.
pub const DEFAULT_STREAM_PATH: &str = "/api/order/websocket";

/// Close reason sent when an upgrade request carries no token.
pub const MISSING_TOKEN_REASON: &str = "No authorization token provided";

/// Status code of the confirmation sentinel.
pub const CONFIRMATION_STATUS_CODE: &str = "200";

/// Order status of the confirmation sentinel.
pub const CONFIRMATION_ORDER_STATUS: &str = "AB00";

/// WebSocket close codes used by the bridge and clients.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away (server shutdown).
    pub const GOING_AWAY: u16 = 1001;
    /// Placeholder for "no status received". Never sent on the wire.
    pub const NO_STATUS: u16 = 1005;
    /// Placeholder for "closed without a close frame". Never sent on the wire.
    pub const ABNORMAL: u16 = 1006;
    /// Policy violation, used for a missing token.
    pub const POLICY: u16 = 1008;
    /// Unexpected condition, used when the upstream leg fails.
    pub const INTERNAL: u16 = 1011;
    /// Placeholder for TLS handshake failure. Never sent on the wire.
    pub const TLS_HANDSHAKE: u16 = 1015;
}

/// Whether `code` may appear in a close frame sent by an endpoint.
pub fn is_sendable_close_code(code: u16) -> bool {
    matches!(code, 1000..=1003 | 1007..=1014 | 3000..=4999)
}

/// Map a received close code to one that can be sent onward.
///
/// Reserved and out-of-range codes become [`close_code::INTERNAL`].
pub fn sendable_close_code(code: u16) -> u16 {
    if is_sendable_close_code(code) {
        code
    } else {
        close_code::INTERNAL
    }
}

/// Whether a decoded frame is the connection-confirmation sentinel.
pub fn is_confirmation(value: &Value) -> bool {
    value.get("status-code").and_then(Value::as_str) == Some(CONFIRMATION_STATUS_CODE)
        && value.get("order-status").and_then(Value::as_str) == Some(CONFIRMATION_ORDER_STATUS)
}

/// Error frame sent downstream when the upstream leg fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    /// Always `"500"` for bridge-originated frames.
    #[serde(rename = "status-code")]
    pub status_code: String,
    /// Description of the failure.
    #[serde(rename = "error-message")]
    pub error_message: String,
}

impl ErrorFrame {
    /// Frame describing an internal failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status_code: "500".into(),
            error_message: message.into(),
        }
    }

    /// Serialize to the JSON text sent on the wire.
    ///
    /// Both fields are plain strings, so serialization cannot fail.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
