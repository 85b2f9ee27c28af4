//! Connection registry: the single owner of per-connection subscription state.
//!
//! All mutations go through one `RwLock` so a record is never observed
//! half-updated. Sends happen after the lock is released.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use parking_lot::RwLock;
use pulse_core::{Channel, HubMessage};
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::connection::{ClientConnection, ConnectionId};
use crate::metrics::{HUB_CONNECTIONS_ACTIVE, HUB_CONNECTIONS_TOTAL, HUB_DISCONNECTIONS_TOTAL};

/// Per-connection subscription state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionRecord {
    /// Channels the connection wants to receive.
    pub channels: HashSet<Channel>,
    /// Identity bound out-of-band; scopes user-targeted pushes.
    pub user_id: Option<String>,
    /// Last liveness signal received from the client.
    pub last_ping: Instant,
}

impl SubscriptionRecord {
    fn new(now: Instant) -> Self {
        Self {
            channels: HashSet::new(),
            user_id: None,
            last_ping: now,
        }
    }

    /// Whether the record includes `channel`.
    pub fn is_subscribed(&self, channel: Channel) -> bool {
        self.channels.contains(&channel)
    }
}

struct Entry {
    connection: Arc<ClientConnection>,
    record: SubscriptionRecord,
}

/// Maps live connections to their [`SubscriptionRecord`].
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<ConnectionId, Entry>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and send it the welcome acknowledgement.
    ///
    /// Returns `false` (and sends nothing) if the id is already registered.
    pub fn register(&self, connection: Arc<ClientConnection>) -> bool {
        let active = {
            let mut entries = self.entries.write();
            if entries.contains_key(&connection.id) {
                debug!(conn_id = %connection.id, "connection already registered");
                return false;
            }
            let _ = entries.insert(
                connection.id.clone(),
                Entry {
                    connection: connection.clone(),
                    record: SubscriptionRecord::new(Instant::now()),
                },
            );
            set_active(entries.len());
            entries.len()
        };

        counter!(HUB_CONNECTIONS_TOTAL).increment(1);
        info!(conn_id = %connection.id, active, "connection registered");
        let _ = connection.send_message(&HubMessage::system(json!({
            "action": "connected",
            "message": "Connected to real-time updates",
            "connectionId": connection.id.as_str(),
        })));
        true
    }

    /// Remove a connection. No-op if absent.
    ///
    /// Does not close the transport.
    pub fn deregister(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        let (removed, active) = {
            let mut entries = self.entries.write();
            let removed = entries.remove(id).map(|e| e.connection);
            if removed.is_some() {
                set_active(entries.len());
            }
            (removed, entries.len())
        };
        if removed.is_some() {
            counter!(HUB_DISCONNECTIONS_TOTAL).increment(1);
            info!(conn_id = %id, active, "connection deregistered");
        }
        removed
    }

    /// Remove `id` only if its last liveness signal is more than `timeout`
    /// before `now`.
    ///
    /// The check and the removal happen under one write lock, so a `touch`
    /// that lands first keeps the connection. Returns the removed handle and
    /// how long it had been silent. Does not close the transport.
    pub fn evict_if_stale(
        &self,
        id: &ConnectionId,
        now: Instant,
        timeout: Duration,
    ) -> Option<(Arc<ClientConnection>, Duration)> {
        let (connection, silent_for, active) = {
            let mut entries = self.entries.write();
            let silent_for = now.saturating_duration_since(entries.get(id)?.record.last_ping);
            if silent_for <= timeout {
                return None;
            }
            let connection = entries.remove(id)?.connection;
            set_active(entries.len());
            (connection, silent_for, entries.len())
        };
        counter!(HUB_DISCONNECTIONS_TOTAL).increment(1);
        info!(conn_id = %id, active, "connection deregistered");
        Some((connection, silent_for))
    }

    /// Snapshot of a connection's record.
    pub fn get(&self, id: &ConnectionId) -> Option<SubscriptionRecord> {
        self.entries.read().get(id).map(|e| e.record.clone())
    }

    /// The connection handle for `id`.
    pub fn connection(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.entries.read().get(id).map(|e| e.connection.clone())
    }

    /// Point-in-time snapshot of every connection and its record.
    pub fn all(&self) -> Vec<(Arc<ClientConnection>, SubscriptionRecord)> {
        self.entries
            .read()
            .values()
            .map(|e| (e.connection.clone(), e.record.clone()))
            .collect()
    }

    /// Connections whose record satisfies `filter`, under a single read lock.
    pub fn matching(
        &self,
        filter: impl Fn(&SubscriptionRecord) -> bool,
    ) -> Vec<Arc<ClientConnection>> {
        self.entries
            .read()
            .values()
            .filter(|e| filter(&e.record))
            .map(|e| e.connection.clone())
            .collect()
    }

    /// Add `channel` to a connection's set.
    ///
    /// `None` if the connection is not registered, otherwise whether the
    /// channel was newly added.
    pub fn subscribe(&self, id: &ConnectionId, channel: Channel) -> Option<bool> {
        self.with_record(id, |record| record.channels.insert(channel))
    }

    /// Remove `channel` from a connection's set.
    ///
    /// `None` if the connection is not registered, otherwise whether the
    /// channel was present.
    pub fn unsubscribe(&self, id: &ConnectionId, channel: Channel) -> Option<bool> {
        self.with_record(id, |record| record.channels.remove(&channel))
    }

    /// Record a liveness signal. Returns `false` if not registered.
    pub fn touch(&self, id: &ConnectionId) -> bool {
        self.with_record(id, |record| record.last_ping = Instant::now())
            .is_some()
    }

    /// Bind (or clear) the identity used by user-targeted pushes.
    pub fn bind_user(&self, id: &ConnectionId, user_id: Option<String>) -> bool {
        self.with_record(id, |record| record.user_id = user_id)
            .is_some()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of connections subscribed to `channel`.
    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.entries
            .read()
            .values()
            .filter(|e| e.record.is_subscribed(channel))
            .count()
    }

    /// Drop every record. Used last during shutdown.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let n = entries.len();
        entries.clear();
        set_active(0);
        n
    }

    fn with_record<T>(
        &self,
        id: &ConnectionId,
        f: impl FnOnce(&mut SubscriptionRecord) -> T,
    ) -> Option<T> {
        self.entries.write().get_mut(id).map(|e| f(&mut e.record))
    }
}

#[allow(clippy::cast_precision_loss)]
fn set_active(n: usize) {
    gauge!(HUB_CONNECTIONS_ACTIVE).set(n as f64);
}
