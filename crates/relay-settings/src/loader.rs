//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{RelaySettings, STREAM_TIMING_MS, StreamSettings};

/// Load settings from `path` with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RelaySettings = serde_json::from_value(merged)?;
    validate_stream(&mut settings.stream);
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

/// Reset stream timings outside [`STREAM_TIMING_MS`] to their defaults.
pub fn validate_stream(stream: &mut StreamSettings) {
    let defaults = StreamSettings::default();
    if !STREAM_TIMING_MS.contains(&stream.heartbeat_interval_ms) {
        warn!(
            value = stream.heartbeat_interval_ms,
            "heartbeatIntervalMs out of range, using default"
        );
        stream.heartbeat_interval_ms = defaults.heartbeat_interval_ms;
    }
    if !STREAM_TIMING_MS.contains(&stream.reconnect_delay_ms) {
        warn!(
            value = stream.reconnect_delay_ms,
            "reconnectDelayMs out of range, using default"
        );
        stream.reconnect_delay_ms = defaults.reconnect_delay_ms;
    }
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides read through `lookup` (the process environment in
/// production). Invalid values are logged and ignored.
pub fn apply_overrides<F>(settings: &mut RelaySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // `PORT` is the conventional hosting variable; `RELAY_PORT` wins over it
    if let Some(v) = env.u16_in("PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.u16_in("RELAY_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("RELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.string("RELAY_DB_PATH") {
        settings.database.path = v;
    }
    if let Some(v) = env.string("RELAY_APP_MAP") {
        settings.directory.app_map_path = v;
    }
    if let Some(v) = env.string("RELAY_INSTANCE_MAP") {
        settings.directory.instance_map_path = v;
    }
    if let Some(v) = env.string("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("RELAY_LOG_JSON") {
        settings.logging.json = v;
    }
    if let Some(v) = env.string("RELAY_PUSH_ENDPOINT") {
        settings.push.endpoint = v;
    }
    let (min_ms, max_ms) = (*STREAM_TIMING_MS.start(), *STREAM_TIMING_MS.end());
    if let Some(v) = env.u64_in("RELAY_RECONNECT_DELAY_MS", min_ms, max_ms) {
        settings.stream.reconnect_delay_ms = v;
    }
    if let Some(v) = env.u64_in("RELAY_HEARTBEAT_INTERVAL_MS", min_ms, max_ms) {
        settings.stream.heartbeat_interval_ms = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16_in(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.string(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
