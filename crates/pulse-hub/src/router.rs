//! Inbound control message handling.
//!
//! Every protocol error is answered with a single `error` message to the
//! offending connection, which stays open.

use std::sync::Arc;

use metrics::counter;
use pulse_core::{Channel, HubMessage, MessageKind, ProtocolError, ValidationError};
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::broadcast::Broadcaster;
use crate::connection::{ClientConnection, ConnectionId};
use crate::liveness::LivenessMonitor;
use crate::metrics::HUB_PROTOCOL_ERRORS_TOTAL;
use crate::registry::ConnectionRegistry;
use crate::snapshot::{self, SystemStats};

/// What the router did with an inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Channel added (or already present). `snapshot` is whether an initial
    /// payload was sent.
    Subscribed {
        /// The channel.
        channel: Channel,
        /// Whether a snapshot followed the acknowledgement.
        snapshot: bool,
    },
    /// Unsubscribe acknowledged. `None` when the channel was missing or not
    /// a known channel.
    Unsubscribed(Option<Channel>),
    /// Client `ping`: liveness refreshed and `pong` sent.
    Pong,
    /// Client `pong`: liveness refreshed, no reply.
    Touched,
    /// Answered with an `error` message.
    Rejected(ProtocolError),
    /// The connection is not registered; nothing was sent.
    Unregistered,
}

/// Applies control messages to the registry on behalf of one connection.
pub struct ChannelRouter {
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
    liveness: Arc<LivenessMonitor>,
    started_at: Instant,
}

impl ChannelRouter {
    /// Create a router. `started_at` feeds the `system-status` snapshot uptime.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        broadcaster: Arc<Broadcaster>,
        liveness: Arc<LivenessMonitor>,
        started_at: Instant,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            liveness,
            started_at,
        }
    }

    /// Parse and apply a raw text frame from `id`.
    pub fn handle_text(&self, id: &ConnectionId, text: &str) -> RouteOutcome {
        let Some(conn) = self.registry.connection(id) else {
            debug!(conn_id = %id, "message from unregistered connection ignored");
            return RouteOutcome::Unregistered;
        };
        match HubMessage::parse(text) {
            Ok(message) => self.apply(&conn, message),
            Err(e) => reject(&conn, e),
        }
    }

    /// Parse and apply a binary frame from `id`.
    ///
    /// Bytes that are not UTF-8 are malformed input and get the same
    /// `error` reply as unparseable text.
    pub fn handle_bytes(&self, id: &ConnectionId, bytes: &[u8]) -> RouteOutcome {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.handle_text(id, text),
            Err(_) => match self.registry.connection(id) {
                Some(conn) => reject(&conn, ProtocolError::InvalidFormat),
                None => RouteOutcome::Unregistered,
            },
        }
    }

    /// Apply an already-parsed message from `id`.
    pub fn handle(&self, id: &ConnectionId, message: HubMessage) -> RouteOutcome {
        match self.registry.connection(id) {
            Some(conn) => self.apply(&conn, message),
            None => RouteOutcome::Unregistered,
        }
    }

    fn apply(&self, conn: &Arc<ClientConnection>, message: HubMessage) -> RouteOutcome {
        match message.kind {
            MessageKind::Subscribe => match required_channel(message.channel.as_deref()) {
                Ok(channel) => self.subscribe(conn, channel),
                Err(e) => reject(conn, e.into()),
            },
            MessageKind::Unsubscribe => self.unsubscribe(conn, message.channel.as_deref()),
            MessageKind::Ping => {
                let _ = self.liveness.touch(&conn.id);
                let _ = conn.send_message(&HubMessage::pong());
                RouteOutcome::Pong
            }
            MessageKind::Pong => {
                let _ = self.liveness.touch(&conn.id);
                RouteOutcome::Touched
            }
            kind @ (MessageKind::Data | MessageKind::Error) => {
                reject(conn, ProtocolError::UnknownType(kind.as_str().to_owned()))
            }
        }
    }

    fn subscribe(&self, conn: &Arc<ClientConnection>, channel: Channel) -> RouteOutcome {
        let Some(added) = self.registry.subscribe(&conn.id, channel) else {
            debug!(conn_id = %conn.id, %channel, "subscribe after deregister ignored");
            return RouteOutcome::Unregistered;
        };
        debug!(conn_id = %conn.id, %channel, added, "subscribed");

        let _ = conn.send_message(&HubMessage::system(json!({
            "action": "subscribed",
            "message": format!("Subscribed to {channel}"),
            "channel": channel.as_str(),
        })));

        let stats = SystemStats {
            uptime: self.started_at.elapsed(),
            connections: self.registry.len(),
        };
        let snapshot = match snapshot::initial(channel, &mut rand::rng(), stats) {
            Some(payload) => self.broadcaster.to_connection(conn, channel, payload),
            None => false,
        };
        RouteOutcome::Subscribed { channel, snapshot }
    }

    fn unsubscribe(&self, conn: &ClientConnection, raw: Option<&str>) -> RouteOutcome {
        let channel = raw.and_then(|name| name.parse::<Channel>().ok());
        if let Some(channel) = channel {
            let removed = self.registry.unsubscribe(&conn.id, channel).unwrap_or(false);
            debug!(conn_id = %conn.id, %channel, removed, "unsubscribed");
        }

        let message = match raw {
            Some(name) => format!("Unsubscribed from {name}"),
            None => "Unsubscribed".to_owned(),
        };
        let _ = conn.send_message(&HubMessage::system(json!({
            "action": "unsubscribed",
            "message": message,
            "channel": raw,
        })));
        RouteOutcome::Unsubscribed(channel)
    }
}

fn required_channel(raw: Option<&str>) -> Result<Channel, ValidationError> {
    raw.ok_or(ValidationError::ChannelRequired)?.parse()
}

fn reject(conn: &ClientConnection, error: ProtocolError) -> RouteOutcome {
    let reason = match &error {
        ProtocolError::InvalidFormat => "invalid_format",
        ProtocolError::UnknownType(_) => "unknown_type",
        ProtocolError::Validation(_) => "invalid_channel",
    };
    counter!(HUB_PROTOCOL_ERRORS_TOTAL, "reason" => reason).increment(1);
    warn!(conn_id = %conn.id, error = %error, "rejected client message");
    let _ = conn.send_message(&HubMessage::error(error.to_string()));
    RouteOutcome::Rejected(error)
}
