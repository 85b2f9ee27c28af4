//! Periodic data producers.
//!
//! A [`FeedSource`] yields channel payloads on each tick; [`run_feed`] pushes
//! them through a [`FeedSink`]. The only sink the hub provides is
//! [`Broadcaster`], so swapping the synthetic feed for a real market-data
//! integration touches nothing else.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use pulse_core::Channel;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::Value;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::broadcast::Broadcaster;
use crate::metrics::HUB_FEED_TICKS_TOTAL;
use crate::snapshot::{self, SystemStats};

/// Produces payloads to publish on each feed tick.
pub trait FeedSource: Send {
    /// Payloads for this tick. `connections` is the live connection count.
    fn produce(&mut self, connections: usize) -> Vec<(Channel, Value)>;
}

/// Where feed payloads go.
pub trait FeedSink: Send + Sync {
    /// Fan `payload` out to subscribers of `channel`; returns recipients reached.
    fn publish(&self, channel: Channel, payload: Value) -> usize;

    /// Live connection count, for sources that report it.
    fn connection_count(&self) -> usize;
}

impl FeedSink for Broadcaster {
    fn publish(&self, channel: Channel, payload: Value) -> usize {
        self.to_channel(channel, payload)
    }

    fn connection_count(&self) -> usize {
        self.registry().len()
    }
}

/// Stand-in market and system metrics producer.
///
/// Emits one `market-data` and one `system-status` payload per tick.
pub struct SyntheticFeed {
    rng: StdRng,
    started_at: Instant,
}

impl SyntheticFeed {
    /// A feed seeded from the OS.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// A deterministic feed, for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng,
            started_at: Instant::now(),
        }
    }
}

impl Default for SyntheticFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedSource for SyntheticFeed {
    fn produce(&mut self, connections: usize) -> Vec<(Channel, Value)> {
        let stats = SystemStats {
            uptime: self.started_at.elapsed(),
            connections,
        };
        vec![
            (Channel::MarketData, snapshot::market_data(&mut self.rng)),
            (Channel::SystemStatus, snapshot::system_status(stats)),
        ]
    }
}

/// Publish one tick of `source` through `sink`.
pub fn tick(source: &mut dyn FeedSource, sink: &dyn FeedSink) -> usize {
    counter!(HUB_FEED_TICKS_TOTAL).increment(1);
    let mut delivered = 0;
    for (channel, payload) in source.produce(sink.connection_count()) {
        delivered += sink.publish(channel, payload);
    }
    trace!(delivered, "feed tick");
    delivered
}

/// Tick `source` every `interval` until `cancel` fires.
///
/// The first tick happens one full interval after start.
pub async fn run_feed(
    mut source: Box<dyn FeedSource>,
    sink: Arc<dyn FeedSink>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let _ = tick(source.as_mut(), sink.as_ref());
            }
            () = cancel.cancelled() => {
                debug!("feed stopped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<Vec<(Channel, Value)>>,
        connections: usize,
    }

    impl FeedSink for RecordingSink {
        fn publish(&self, channel: Channel, payload: Value) -> usize {
            self.published.lock().push((channel, payload));
            1
        }

        fn connection_count(&self) -> usize {
            self.connections
        }
    }

    struct Fixed;

    impl FeedSource for Fixed {
        fn produce(&mut self, connections: usize) -> Vec<(Channel, Value)> {
            vec![(Channel::YieldUpdates, json!({ "n": connections }))]
        }
    }

    #[tokio::test(start_paused = true)]
    async fn synthetic_feed_produces_market_and_status() {
        let mut feed = SyntheticFeed::with_seed(9);
        time::advance(Duration::from_secs(12)).await;
        let out = feed.produce(4);

        let channels: Vec<Channel> = out.iter().map(|(c, _)| *c).collect();
        assert_eq!(channels, vec![Channel::MarketData, Channel::SystemStatus]);
        assert!(out[0].1["usdt"]["price"].is_f64());
        assert_eq!(out[1].1["connections"], 4);
        assert_eq!(out[1].1["uptime"], 12);
    }

    #[test]
    fn tick_passes_connection_count_to_source() {
        let sink = RecordingSink {
            connections: 7,
            ..Default::default()
        };
        assert_eq!(tick(&mut Fixed, &sink), 1);
        let published = sink.published.lock();
        assert_eq!(published[0], (Channel::YieldUpdates, json!({ "n": 7 })));
    }

    #[tokio::test(start_paused = true)]
    async fn run_feed_ticks_on_interval_until_cancelled() {
        let sink = Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_feed(
            Box::new(SyntheticFeed::with_seed(1)),
            sink.clone(),
            Duration::from_secs(5),
            cancel.clone(),
        ));

        time::sleep(Duration::from_millis(4_900)).await;
        assert!(sink.published.lock().is_empty());

        time::sleep(Duration::from_millis(5_200)).await;
        // two ticks (5s, 10s), two payloads each
        assert_eq!(sink.published.lock().len(), 4);

        cancel.cancel();
        task.await.unwrap();
        let after = sink.published.lock().len();
        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(sink.published.lock().len(), after);
    }

    #[tokio::test]
    async fn broadcaster_is_a_sink() {
        use tokio::sync::mpsc;

        use crate::connection::ClientConnection;
        use crate::registry::ConnectionRegistry;

        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        let (tx, mut rx) = mpsc::channel(8);
        let conn = Arc::new(ClientConnection::new("a".into(), tx));
        let _ = registry.register(conn.clone());
        let _ = rx.try_recv();
        let _ = registry.subscribe(&conn.id, Channel::SystemStatus);

        let sink: &dyn FeedSink = &broadcaster;
        assert_eq!(sink.connection_count(), 1);
        assert_eq!(tick(&mut SyntheticFeed::with_seed(2), sink), 1);

        let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["channel"], "system-status");
        assert_eq!(frame["data"]["connections"], 1);
        assert!(rx.try_recv().is_err());
    }
}
