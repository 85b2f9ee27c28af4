//! # pulse-hub
//!
//! Transport-agnostic core of the pulse notification hub.
//!
//! - [`registry`]: connection → subscription record table
//! - [`router`]: inbound `subscribe` / `unsubscribe` / `ping` handling
//! - [`liveness`]: periodic ping and eviction of silent connections
//! - [`broadcast`]: channel and user-scoped fan-out
//! - [`feed`]: pluggable periodic producers, with a synthetic default
//! - [`hub`]: the facade tying them together with start/shutdown

#![deny(unsafe_code)]

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod feed;
pub mod hub;
pub mod liveness;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod snapshot;

pub use broadcast::Broadcaster;
pub use config::HubConfig;
pub use connection::{ClientConnection, ConnectionId};
pub use feed::{FeedSink, FeedSource, SyntheticFeed};
pub use hub::Hub;
pub use liveness::{LivenessMonitor, SweepReport};
pub use registry::{ConnectionRegistry, SubscriptionRecord};
pub use router::{ChannelRouter, RouteOutcome};
