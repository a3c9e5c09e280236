//! Settings loading with deep merge and environment variable overrides.
//!
//! Merge rules for the settings file:
//! - objects merge key by key, recursively
//! - arrays and scalars from the file replace the default outright
//! - `null` in the file keeps the default

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::OrderwireSettings;

/// Path to the user settings file (`~/.orderwire/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".orderwire").join("settings.json")
}

/// Load settings from [`settings_path`] with env var overrides.
pub fn load_settings() -> Result<OrderwireSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with env var overrides.
///
/// A missing file yields the defaults; a malformed one is an error.
pub fn load_settings_from_path(path: &Path) -> Result<OrderwireSettings> {
    let mut settings = read_layered(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<OrderwireSettings> {
    let defaults = serde_json::to_value(OrderwireSettings::default())?;
    if !path.exists() {
        debug!(?path, "no settings file, using defaults");
        return Ok(serde_json::from_value(defaults)?);
    }

    debug!(?path, "loading settings file");
    let raw = std::fs::read_to_string(path)?;
    let user: Value = serde_json::from_str(&raw)?;
    Ok(serde_json::from_value(deep_merge(defaults, user))?)
}

/// Merge `overlay` onto `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut merged), Value::Object(overlay)) => {
            for (key, value) in overlay {
                if value.is_null() {
                    continue;
                }
                let next = match merged.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = merged.insert(key, next);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay,
    }
}

/// Apply `ORDERWIRE_*` environment overrides.
///
/// Values that fail to parse or fall outside their range are ignored with a
/// warning.
pub fn apply_env_overrides(settings: &mut OrderwireSettings) {
    // ── Session ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("ORDERWIRE_BASE_URL") {
        settings.session.base_url = v;
    }
    if let Some(v) = read_env_u64("ORDERWIRE_REQUEST_TIMEOUT_MS", 100, 600_000) {
        settings.session.request_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("ORDERWIRE_REFRESH_SETTLE_MS", 0, 10_000) {
        settings.session.refresh_settle_ms = v;
    }

    // ── Bridge ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("ORDERWIRE_BRIDGE_HOST") {
        settings.bridge.host = v;
    }
    if let Some(v) = read_env_u16("ORDERWIRE_BRIDGE_PORT", 0, 65535) {
        settings.bridge.port = v;
    }
    if let Some(v) = read_env_string("ORDERWIRE_UPSTREAM_URL") {
        settings.bridge.upstream_url = v;
    }

    // ── Stream ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("ORDERWIRE_STREAM_URL") {
        settings.stream.url = v;
    }
    if let Some(v) = read_env_u64("ORDERWIRE_PING_INTERVAL_MS", 100, 600_000) {
        settings.stream.ping_interval_ms = v;
    }
    if let Some(v) = read_env_u64("ORDERWIRE_RECONNECT_DELAY_MS", 0, 600_000) {
        settings.stream.reconnect_delay_ms = v;
    }
    if let Some(v) = read_env_u32("ORDERWIRE_MAX_RECONNECT_ATTEMPTS", 0, 1_000) {
        settings.stream.max_reconnect_attempts = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("ORDERWIRE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("ORDERWIRE_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Parsing ─────────────────────────────────────────────────────────────────

/// Parse a boolean: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`,
/// case-insensitive.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u16` within `min..=max`.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a `u64` within `min..=max`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_env_parsed<T>(name: &str, kind: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let val = std::env::var(name).ok()?;
    let parsed = parse(&val);
    if parsed.is_none() {
        warn!(key = name, value = %val, kind, "invalid env var, ignoring");
    }
    parsed
}

fn read_env_bool(name: &str) -> Option<bool> {
    read_env_parsed(name, "bool", parse_bool)
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    read_env_parsed(name, "u16", |v| parse_u16_range(v, min, max))
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    read_env_parsed(name, "u32", |v| {
        parse_u64_range(v, u64::from(min), u64::from(max)).and_then(|n| u32::try_from(n).ok())
    })
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    read_env_parsed(name, "u64", |v| parse_u64_range(v, min, max))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
