//! Fan-out of `data` messages to registered connections.
//!
//! Each payload is serialized once and enqueued on every recipient's outbound
//! queue without waiting. A full or closing queue drops the frame for that
//! recipient only.

use std::sync::Arc;

use metrics::counter;
use pulse_core::{Channel, HubMessage};
use serde_json::Value;
use tracing::{debug, warn};

use crate::connection::ClientConnection;
use crate::metrics::{HUB_BROADCASTS_TOTAL, HUB_MESSAGES_DROPPED_TOTAL};
use crate::registry::ConnectionRegistry;

/// Delivers payloads to subsets of the registry. Never mutates records.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    /// Create a broadcaster over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this broadcaster reads from.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Send `payload` to every connection subscribed to `channel`.
    ///
    /// Returns the number of connections the frame was enqueued for.
    pub fn to_channel(&self, channel: Channel, payload: Value) -> usize {
        let recipients = self.registry.matching(|r| r.is_subscribed(channel));
        let delivered = self.fan_out(channel, payload, &recipients);
        debug!(%channel, recipients = recipients.len(), delivered, "broadcast to channel");
        delivered
    }

    /// Send `payload` to connections bound to `user_id` and subscribed to `channel`.
    ///
    /// No matching connection is not an error.
    pub fn to_user(&self, user_id: &str, channel: Channel, payload: Value) -> usize {
        let recipients = self
            .registry
            .matching(|r| r.is_subscribed(channel) && r.user_id.as_deref() == Some(user_id));
        let delivered = self.fan_out(channel, payload, &recipients);
        debug!(%channel, user_id, recipients = recipients.len(), delivered, "broadcast to user");
        delivered
    }

    /// Send `payload` on `channel` to a single connection.
    pub fn to_connection(&self, connection: &ClientConnection, channel: Channel, payload: Value) -> bool {
        let sent = connection.send_message(&HubMessage::data(channel.as_str(), payload));
        if !sent {
            record_drop(connection, channel);
        }
        sent
    }

    /// Push a `notifications` event to a user.
    pub fn notify(&self, user_id: &str, payload: Value) -> usize {
        self.to_user(user_id, Channel::Notifications, payload)
    }

    /// Push a `user-transactions` event to a user.
    pub fn transaction_update(&self, user_id: &str, payload: Value) -> usize {
        self.to_user(user_id, Channel::UserTransactions, payload)
    }

    /// Push a `portfolio-updates` event to a user.
    pub fn portfolio_update(&self, user_id: &str, payload: Value) -> usize {
        self.to_user(user_id, Channel::PortfolioUpdates, payload)
    }

    fn fan_out(&self, channel: Channel, payload: Value, recipients: &[Arc<ClientConnection>]) -> usize {
        if recipients.is_empty() {
            return 0;
        }
        let frame: Arc<str> = match HubMessage::data(channel.as_str(), payload).to_json() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(%channel, error = %e, "failed to serialize broadcast");
                return 0;
            }
        };
        counter!(HUB_BROADCASTS_TOTAL, "channel" => channel.as_str()).increment(1);

        let mut delivered = 0;
        for conn in recipients {
            if conn.send(frame.clone()) {
                delivered += 1;
            } else {
                record_drop(conn, channel);
            }
        }
        delivered
    }
}

fn record_drop(conn: &ClientConnection, channel: Channel) {
    counter!(HUB_MESSAGES_DROPPED_TOTAL).increment(1);
    if !conn.is_closed() {
        warn!(conn_id = %conn.id, %channel, dropped = conn.drop_count(), "failed to send to client");
    }
}
