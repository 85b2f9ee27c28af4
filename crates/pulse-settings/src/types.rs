//! Settings types.
//!
//! Every struct uses `#[serde(default)]` so a settings file only needs to
//! name the values it changes.

use pulse_core::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Smallest accepted inbound frame limit.
pub const MIN_MESSAGE_SIZE: usize = 1024;
/// Largest accepted inbound frame limit.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PulseSettings {
    /// Transport settings.
    pub server: ServerSettings,
    /// Hub timers.
    pub hub: HubSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl PulseSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let hub = &self.hub;
        for (name, value) in [
            ("pingIntervalMs", hub.ping_interval_ms),
            ("livenessTimeoutMs", hub.liveness_timeout_ms),
            ("feedIntervalMs", hub.feed_interval_ms),
        ] {
            if value == 0 {
                return Err(SettingsError::InvalidValue(format!("{name} must be > 0")));
            }
        }
        if hub.liveness_timeout_ms < hub.ping_interval_ms {
            return Err(SettingsError::InvalidValue(
                "livenessTimeoutMs must be >= pingIntervalMs".into(),
            ));
        }
        if !self.server.ws_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "wsPath must start with '/': {}",
                self.server.ws_path
            )));
        }
        let size = self.server.max_message_size;
        if !(MIN_MESSAGE_SIZE..=MAX_MESSAGE_SIZE).contains(&size) {
            return Err(SettingsError::InvalidValue(format!(
                "maxMessageSize must be between {MIN_MESSAGE_SIZE} and {MAX_MESSAGE_SIZE}: {size}"
            )));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "sendQueueCapacity must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Network and transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` for auto-assign).
    pub port: u16,
    /// WebSocket upgrade path.
    pub ws_path: String,
    /// Max inbound WebSocket message size in bytes.
    ///
    /// Enforced by the transport: an oversized frame ends the session
    /// without an `error` reply. Override with `PULSE_MAX_MESSAGE_SIZE`.
    pub max_message_size: usize,
    /// Outbound queue length per connection before messages are dropped.
    pub send_queue_capacity: usize,
    /// How long shutdown waits for the listener task.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            ws_path: "/ws".to_string(),
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
            shutdown_timeout_ms: 5_000,
        }
    }
}

/// Hub timer settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Liveness monitor period.
    pub ping_interval_ms: u64,
    /// Max silence before a connection is evicted.
    pub liveness_timeout_ms: u64,
    /// Synthetic feed period.
    pub feed_interval_ms: u64,
    /// Whether the synthetic market/system feed runs.
    pub feed_enabled: bool,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            ping_interval_ms: 10_000,
            liveness_timeout_ms: 30_000,
            feed_interval_ms: 5_000,
            feed_enabled: true,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// Line format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
