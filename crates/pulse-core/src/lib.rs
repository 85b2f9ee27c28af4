//! # pulse-core
//!
//! Shared wire types for the pulse notification hub.
//!
//! - [`Channel`]: the closed set of subscribable channel names
//! - [`HubMessage`]: the JSON envelope exchanged with clients
//! - [`ProtocolError`] / [`ValidationError`]: locally recovered protocol errors
//! - [`logging`]: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod channel;
pub mod errors;
pub mod logging;
pub mod message;

pub use channel::{Channel, SYSTEM_CHANNEL};
pub use errors::{ProtocolError, ValidationError};
pub use logging::LogFormat;
pub use message::{HubMessage, MessageKind, now_millis};
