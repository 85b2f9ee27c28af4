//! `/health` endpoint.

use std::collections::BTreeMap;

use pulse_core::Channel;
use pulse_hub::Hub;
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the hub started.
    pub uptime_secs: u64,
    /// Registered connection count.
    pub connections: usize,
    /// Subscriber count per channel.
    pub channels: BTreeMap<&'static str, usize>,
}

/// Build a health response from the hub's live counters.
pub fn health_check(hub: &Hub) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: hub.uptime().as_secs(),
        connections: hub.connection_count(),
        channels: Channel::ALL
            .into_iter()
            .map(|c| (c.as_str(), hub.channel_subscriber_count(c)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pulse_hub::{ClientConnection, HubConfig};
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn empty_hub() {
        let hub = Hub::new(HubConfig::default());
        let resp = health_check(&hub);
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.connections, 0);
        assert_eq!(resp.channels.len(), Channel::ALL.len());
        assert!(resp.channels.values().all(|n| *n == 0));
    }

    #[tokio::test]
    async fn counts_connections_and_subscribers() {
        let hub = Hub::new(HubConfig::default());
        let (tx, _rx) = mpsc::channel(8);
        let conn = Arc::new(ClientConnection::new("a".into(), tx));
        assert!(hub.register(conn.clone()));
        let _ = hub.handle_message(&conn.id, r#"{"type":"subscribe","channel":"yield-updates"}"#);

        let resp = health_check(&hub);
        assert_eq!(resp.connections, 1);
        assert_eq!(resp.channels["yield-updates"], 1);
        assert_eq!(resp.channels["market-data"], 0);
    }

    #[tokio::test]
    async fn serializes_camel_case() {
        let hub = Hub::new(HubConfig::default());
        let json = serde_json::to_value(health_check(&hub)).unwrap();
        assert!(json.get("uptimeSecs").is_some());
        assert!(json["channels"].get("system-status").is_some());
    }
}
