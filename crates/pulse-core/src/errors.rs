//! Protocol error taxonomy.
//!
//! Every variant here is recovered locally: the offending connection gets a
//! single `error` reply and stays open.

use thiserror::Error;

/// A control message named a channel the hub does not accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The message had no `channel` field.
    #[error("channel is required")]
    ChannelRequired,
    /// The channel is not one of the enumerated channels.
    #[error("invalid channel: {0}")]
    InvalidChannel(String),
}

/// An inbound message could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Not JSON, not an object, or fields of the wrong type.
    #[error("invalid message format")]
    InvalidFormat,
    /// The `type` field named a kind the hub does not accept from clients.
    #[error("unrecognized message type: {0}")]
    UnknownType(String),
    /// A subscribe/unsubscribe carried a bad channel.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
