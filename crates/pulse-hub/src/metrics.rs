//! Metric names recorded by the hub.
//!
//! The hub only emits through the `metrics` facade; installing a recorder and
//! exposing it is the host's job.

/// Connections registered total (counter).
pub const HUB_CONNECTIONS_TOTAL: &str = "hub_connections_total";
/// Connections deregistered total (counter).
pub const HUB_DISCONNECTIONS_TOTAL: &str = "hub_disconnections_total";
/// Currently registered connections (gauge).
pub const HUB_CONNECTIONS_ACTIVE: &str = "hub_connections_active";
/// Connections evicted by the liveness monitor (counter).
pub const HUB_EVICTIONS_TOTAL: &str = "hub_evictions_total";
/// Outbound frames dropped on full or closed queues (counter).
pub const HUB_MESSAGES_DROPPED_TOTAL: &str = "hub_messages_dropped_total";
/// Fan-out operations with at least one recipient (counter, labels: channel).
pub const HUB_BROADCASTS_TOTAL: &str = "hub_broadcasts_total";
/// Inbound messages rejected with an error reply (counter, labels: reason).
pub const HUB_PROTOCOL_ERRORS_TOTAL: &str = "hub_protocol_errors_total";
/// Synthetic feed ticks (counter).
pub const HUB_FEED_TICKS_TOTAL: &str = "hub_feed_ticks_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            HUB_CONNECTIONS_TOTAL,
            HUB_DISCONNECTIONS_TOTAL,
            HUB_CONNECTIONS_ACTIVE,
            HUB_EVICTIONS_TOTAL,
            HUB_MESSAGES_DROPPED_TOTAL,
            HUB_BROADCASTS_TOTAL,
            HUB_PROTOCOL_ERRORS_TOTAL,
            HUB_FEED_TICKS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{name} is not snake_case"
            );
            assert!(name.starts_with("hub_"));
        }
    }
}
