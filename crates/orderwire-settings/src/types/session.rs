//! Session client settings.

use serde::{Deserialize, Serialize};

/// Authenticated HTTP client settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Base URL prepended to every request path.
    pub base_url: String,
    /// Token refresh endpoint.
    pub refresh_path: String,
    /// Login endpoint.
    pub login_path: String,
    /// Logout endpoint.
    pub logout_path: String,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Delay after a successful refresh before waiting callers retry.
    pub refresh_settle_ms: u64,
    /// How an HTTP 500 body is recognised as an auth failure.
    pub auth_failure: AuthFailureSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
            refresh_path: "/api/auth/generate-token".to_string(),
            login_path: "/api/auth/login".to_string(),
            logout_path: "/api/auth/logout".to_string(),
            request_timeout_ms: 30_000,
            refresh_settle_ms: 100,
            auth_failure: AuthFailureSettings::default(),
        }
    }
}

/// Auth-failure signals looked for in HTTP 500 bodies.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthFailureSettings {
    /// `errorcode` values that mark an auth failure (case-insensitive).
    pub error_codes: Vec<String>,
    /// Substrings of `message` that mark an auth failure (case-insensitive).
    pub message_keywords: Vec<String>,
}

impl Default for AuthFailureSettings {
    fn default() -> Self {
        Self {
            error_codes: vec!["UNAUTHORIZED".to_string()],
            message_keywords: vec![
                "token".to_string(),
                "unauthorized".to_string(),
                "expired".to_string(),
            ],
        }
    }
}
