//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` while the server runs.
    pub status: String,
    /// Human-readable summary.
    pub message: String,
    /// RFC 3339 time of the check.
    pub timestamp: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open bridge pairs.
    pub connections: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        message: "Order stream bridge is running".into(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
    }
}
