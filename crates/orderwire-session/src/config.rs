//! Session client configuration.

use std::time::Duration;

use orderwire_settings::SessionSettings;

use crate::classify::AuthFailureMatcher;

/// Runtime configuration for [`SessionClient`](crate::SessionClient).
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Prepended to relative request paths.
    pub base_url: String,
    /// Token refresh endpoint.
    pub refresh_path: String,
    /// Login endpoint.
    pub login_path: String,
    /// Logout endpoint.
    pub logout_path: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Pause after a successful refresh before waiters retry.
    pub refresh_settle: Duration,
    /// Recognises auth failures inside HTTP 500 bodies.
    pub auth_failure: AuthFailureMatcher,
}

impl SessionConfig {
    /// Defaults with a different base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Resolve `path` against the base URL. Absolute URLs pass through.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&SessionSettings::default())
    }
}

impl From<&SessionSettings> for SessionConfig {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            refresh_path: settings.refresh_path.clone(),
            login_path: settings.login_path.clone(),
            logout_path: settings.logout_path.clone(),
            request_timeout: Duration::from_millis(settings.request_timeout_ms),
            refresh_settle: Duration::from_millis(settings.refresh_settle_ms),
            auth_failure: AuthFailureMatcher::new(
                &settings.auth_failure.error_codes,
                &settings.auth_failure.message_keywords,
            ),
        }
    }
}
