//! Bridge server and streaming client settings.

use serde::{Deserialize, Serialize};

/// WebSocket bridge server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (0 for auto-assign).
    pub port: u16,
    /// Upgrade path for downstream clients.
    pub path: String,
    /// Authenticated upstream stream endpoint.
    pub upstream_url: String,
    /// Upstream handshake timeout in milliseconds.
    pub upstream_connect_timeout_ms: u64,
    /// How long shutdown waits for open pairs to close, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            path: "/api/order/websocket".to_string(),
            upstream_url: "wss://tns.angelone.in/smart-order-update".to_string(),
            upstream_connect_timeout_ms: 10_000,
            shutdown_timeout_ms: 5_000,
        }
    }
}

/// Reconnecting streaming client settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSettings {
    /// Bridge URL the client connects to. The token is appended as a query
    /// parameter.
    pub url: String,
    /// Interval between liveness probes in milliseconds.
    pub ping_interval_ms: u64,
    /// Fixed delay between reconnect attempts in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3001/api/order/websocket".to_string(),
            ping_interval_ms: 10_000,
            reconnect_delay_ms: 3_000,
            max_reconnect_attempts: 5,
        }
    }
}
