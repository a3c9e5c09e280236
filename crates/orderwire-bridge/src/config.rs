//! Bridge server configuration.

use std::time::Duration;

use orderwire_core::protocol::DEFAULT_STREAM_PATH;
use orderwire_settings::BridgeSettings;

/// Configuration for [`BridgeServer`](crate::BridgeServer).
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Bind address.
    pub host: String,
    /// Bind port (0 for auto-assign).
    pub port: u16,
    /// Upgrade path for downstream clients.
    pub path: String,
    /// Upstream stream endpoint.
    pub upstream_url: String,
    /// Upstream handshake timeout.
    pub upstream_connect_timeout: Duration,
    /// How long shutdown waits for the server task.
    pub shutdown_timeout: Duration,
}

impl BridgeConfig {
    /// Loopback config with an auto-assigned port.
    pub fn new(upstream_url: impl Into<String>) -> Self {
        Self {
            upstream_url: upstream_url.into(),
            ..Self::default()
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let settings = BridgeSettings::default();
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            path: DEFAULT_STREAM_PATH.into(),
            upstream_url: settings.upstream_url,
            upstream_connect_timeout: Duration::from_millis(settings.upstream_connect_timeout_ms),
            shutdown_timeout: Duration::from_millis(settings.shutdown_timeout_ms),
        }
    }
}

impl From<&BridgeSettings> for BridgeConfig {
    fn from(settings: &BridgeSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            path: settings.path.clone(),
            upstream_url: settings.upstream_url.clone(),
            upstream_connect_timeout: Duration::from_millis(settings.upstream_connect_timeout_ms),
            shutdown_timeout: Duration::from_millis(settings.shutdown_timeout_ms),
        }
    }
}
