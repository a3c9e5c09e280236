//! Settings types.

mod session;
mod transport;

pub use session::{AuthFailureSettings, SessionSettings};
pub use transport::{BridgeSettings, StreamSettings};

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderwireSettings {
    /// Authenticated HTTP client.
    pub session: SessionSettings,
    /// WebSocket bridge server.
    pub bridge: BridgeSettings,
    /// Reconnecting streaming client.
    pub stream: StreamSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
