//! The hub: one explicitly constructed owner of the registry and both timers.
//!
//! Transports hand connections to [`Hub::register`], feed inbound text to
//! [`Hub::handle_message`] and call [`Hub::deregister`] when the socket goes
//! away. Business logic pushes events through [`Hub::notify`] and friends.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use pulse_core::Channel;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::config::HubConfig;
use crate::connection::{ClientConnection, ConnectionId};
use crate::feed::{self, FeedSink, FeedSource, SyntheticFeed};
use crate::liveness::{self, LivenessMonitor, SweepReport};
use crate::registry::{ConnectionRegistry, SubscriptionRecord};
use crate::router::{ChannelRouter, RouteOutcome};

/// Real-time pub/sub hub.
pub struct Hub {
    config: HubConfig,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
    liveness: Arc<LivenessMonitor>,
    router: ChannelRouter,
    feed_source: Mutex<Option<Box<dyn FeedSource>>>,
    timers: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    started: AtomicBool,
    shut_down: AtomicBool,
    started_at: Instant,
}

impl Hub {
    /// Create a hub driven by the synthetic feed.
    pub fn new(config: HubConfig) -> Self {
        Self::with_feed_source(config, Box::new(SyntheticFeed::new()))
    }

    /// Create a hub with a custom feed source.
    pub fn with_feed_source(config: HubConfig, source: Box<dyn FeedSource>) -> Self {
        let started_at = Instant::now();
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone()));
        let liveness = Arc::new(LivenessMonitor::new(registry.clone(), config.liveness_timeout));
        let router = ChannelRouter::new(registry.clone(), broadcaster.clone(), liveness.clone(), started_at);
        Self {
            config,
            registry,
            broadcaster,
            liveness,
            router,
            feed_source: Mutex::new(Some(source)),
            timers: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            started_at,
        }
    }

    /// The configuration this hub runs with.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Spawn the liveness monitor and (if enabled) the feed.
    ///
    /// Must be called from within a Tokio runtime. Calling it again, or after
    /// shutdown, does nothing.
    pub fn start(&self) {
        if self.shut_down.load(Ordering::SeqCst) || self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut timers = self.timers.lock();
        timers.push(tokio::spawn(liveness::run_liveness(
            self.liveness.clone(),
            self.config.ping_interval,
            self.cancel.child_token(),
        )));

        if self.config.feed_enabled {
            if let Some(source) = self.feed_source.lock().take() {
                let sink: Arc<dyn FeedSink> = self.broadcaster.clone();
                timers.push(tokio::spawn(feed::run_feed(
                    source,
                    sink,
                    self.config.feed_interval,
                    self.cancel.child_token(),
                )));
            }
        }

        info!(
            ping_interval_ms = self.config.ping_interval.as_millis(),
            liveness_timeout_ms = self.config.liveness_timeout.as_millis(),
            feed_enabled = self.config.feed_enabled,
            "hub started"
        );
    }

    /// Stop both timers, close every live connection, then release the registry.
    ///
    /// Returns the number of connections closed. Idempotent.
    pub async fn shutdown(&self) -> usize {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return 0;
        }

        self.cancel.cancel();
        let timers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.timers.lock());
        for result in futures::future::join_all(timers).await {
            if let Err(e) = result {
                warn!(error = %e, "hub timer task failed");
            }
        }

        let live = self.registry.all();
        for (conn, _) in &live {
            conn.close();
        }
        let released = self.registry.clear();
        info!(closed = live.len(), released, "hub shut down");
        live.len()
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Time since the hub was constructed.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    // ── Connection lifecycle ────────────────────────────────────────────

    /// Register a transport connection and send it the welcome.
    ///
    /// Refused after shutdown; the offered connection is closed.
    pub fn register(&self, connection: Arc<ClientConnection>) -> bool {
        if self.is_shut_down() {
            debug!(conn_id = %connection.id, "hub shut down, refusing connection");
            connection.close();
            return false;
        }
        let registered = self.registry.register(connection.clone());
        // shutdown may have cleared the registry between the check and the insert
        if registered && self.is_shut_down() {
            connection.close();
            let _ = self.registry.deregister(&connection.id);
            return false;
        }
        registered
    }

    /// Forget a connection. Does not close its transport.
    pub fn deregister(&self, id: &ConnectionId) -> bool {
        self.registry.deregister(id).is_some()
    }

    /// Snapshot of a connection's subscription record.
    pub fn get(&self, id: &ConnectionId) -> Option<SubscriptionRecord> {
        self.registry.get(id)
    }

    /// Apply one inbound text frame from `id`.
    pub fn handle_message(&self, id: &ConnectionId, text: &str) -> RouteOutcome {
        self.router.handle_text(id, text)
    }

    /// Apply one inbound binary frame from `id`. Non-UTF-8 bytes are
    /// answered with an `error`.
    pub fn handle_bytes(&self, id: &ConnectionId, bytes: &[u8]) -> RouteOutcome {
        self.router.handle_bytes(id, bytes)
    }

    /// Bind the identity used for user-targeted pushes.
    ///
    /// Called by the authentication layer; the wire protocol never sets it.
    pub fn bind_user(&self, id: &ConnectionId, user_id: impl Into<String>) -> bool {
        self.registry.bind_user(id, Some(user_id.into()))
    }

    /// Run a liveness sweep now.
    pub fn sweep(&self) -> SweepReport {
        self.liveness.sweep()
    }

    // ── Fan-out ─────────────────────────────────────────────────────────

    /// Broadcast to every subscriber of `channel`.
    pub fn to_channel(&self, channel: Channel, payload: Value) -> usize {
        self.broadcaster.to_channel(channel, payload)
    }

    /// Broadcast to `user_id`'s connections subscribed to `channel`.
    pub fn to_user(&self, user_id: &str, channel: Channel, payload: Value) -> usize {
        self.broadcaster.to_user(user_id, channel, payload)
    }

    /// Push a notification to a user.
    pub fn notify(&self, user_id: &str, payload: Value) -> usize {
        self.broadcaster.notify(user_id, payload)
    }

    /// Push a transaction update to a user.
    pub fn transaction_update(&self, user_id: &str, payload: Value) -> usize {
        self.broadcaster.transaction_update(user_id, payload)
    }

    /// Push a portfolio update to a user.
    pub fn portfolio_update(&self, user_id: &str, payload: Value) -> usize {
        self.broadcaster.portfolio_update(user_id, payload)
    }

    // ── Introspection ───────────────────────────────────────────────────

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of connections subscribed to `channel`.
    pub fn channel_subscriber_count(&self, channel: Channel) -> usize {
        self.registry.subscriber_count(channel)
    }
}
