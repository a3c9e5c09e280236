//! Streaming client configuration.

use std::time::Duration;

use orderwire_settings::StreamSettings;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// How long a closing socket waits for the peer's close reply.
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for [`StreamingClient`](crate::StreamingClient).
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Bridge endpoint, without the token.
    pub url: String,
    /// Interval between `"ping"` probes while open.
    pub ping_interval: Duration,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Upper bound on the close handshake after [`disconnect`](crate::StreamingClient::disconnect).
    pub close_timeout: Duration,
}

impl StreamConfig {
    /// Default timings against `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Connection URL carrying `token` as the `token` query parameter.
    pub fn stream_url(&self, token: &str) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{separator}token={}", self.url, urlencoded(token))
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::from(&StreamSettings::default())
    }
}

impl From<&StreamSettings> for StreamConfig {
    fn from(settings: &StreamSettings) -> Self {
        Self {
            url: settings.url.clone(),
            ping_interval: Duration::from_millis(settings.ping_interval_ms),
            reconnect_delay: Duration::from_millis(settings.reconnect_delay_ms),
            max_reconnect_attempts: settings.max_reconnect_attempts,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

/// Characters left as-is in a URI component.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// URL-encode a string for use in query parameters.
fn urlencoded(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}
