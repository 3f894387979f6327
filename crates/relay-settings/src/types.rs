//! Settings types with compiled defaults.

use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Accepted range for stream timing values, in milliseconds.
pub const STREAM_TIMING_MS: RangeInclusive<u64> = 100..=600_000;

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// HTTP listener.
    pub server: ServerSettings,
    /// Registration database.
    pub database: DatabaseSettings,
    /// Lookup table locations.
    pub directory: DirectorySettings,
    /// Upstream streaming connections.
    pub stream: StreamSettings,
    /// Push gateway.
    pub push: PushSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Registration database settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// Path to the `SQLite` file.
    pub path: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "db/relay.sqlite".to_string(),
            pool_size: 8,
        }
    }
}

/// Locations of the app and instance lookup tables.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectorySettings {
    /// JSON map of application id → app entry.
    pub app_map_path: String,
    /// JSON map of instance URL (or `*`) → instance policy.
    pub instance_map_path: String,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            app_map_path: "db/app_map.json".to_string(),
            instance_map_path: "db/instance_map.json".to_string(),
        }
    }
}

/// Upstream streaming connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSettings {
    /// Path of the streaming endpoint, appended to the instance URL.
    pub streaming_path: String,
    /// Liveness probe interval while connected.
    pub heartbeat_interval_ms: u64,
    /// Fixed wait before every reconnect attempt.
    pub reconnect_delay_ms: u64,
}

impl StreamSettings {
    /// Heartbeat interval as a [`Duration`], clamped to [`STREAM_TIMING_MS`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(clamp_timing(self.heartbeat_interval_ms))
    }

    /// Reconnect delay as a [`Duration`], clamped to [`STREAM_TIMING_MS`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(clamp_timing(self.reconnect_delay_ms))
    }
}

fn clamp_timing(ms: u64) -> u64 {
    ms.clamp(*STREAM_TIMING_MS.start(), *STREAM_TIMING_MS.end())
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            streaming_path: "/api/v1/streaming/".to_string(),
            heartbeat_interval_ms: 1000,
            reconnect_delay_ms: 5000,
        }
    }
}

/// Push gateway settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushSettings {
    /// Gateway send endpoint.
    pub endpoint: String,
    /// Per-request timeout.
    pub timeout_ms: u64,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://fcm.googleapis.com/fcm/send".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
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

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
