//! Hub timing configuration.

use std::time::Duration;

use pulse_settings::HubSettings;

/// Timer settings injected into a [`Hub`](crate::Hub).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// Period of the liveness sweep.
    pub ping_interval: Duration,
    /// Silence after which a connection is evicted.
    pub liveness_timeout: Duration,
    /// Period of the synthetic feed.
    pub feed_interval: Duration,
    /// Whether to run the feed at all.
    pub feed_enabled: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(10),
            liveness_timeout: Duration::from_secs(30),
            feed_interval: Duration::from_secs(5),
            feed_enabled: true,
        }
    }
}

impl From<&HubSettings> for HubConfig {
    fn from(settings: &HubSettings) -> Self {
        Self {
            ping_interval: Duration::from_millis(settings.ping_interval_ms),
            liveness_timeout: Duration::from_millis(settings.liveness_timeout_ms),
            feed_interval: Duration::from_millis(settings.feed_interval_ms),
            feed_enabled: settings.feed_enabled,
        }
    }
}
