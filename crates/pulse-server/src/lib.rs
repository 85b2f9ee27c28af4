//! # pulse-server
//!
//! Axum HTTP + `WebSocket` transport for the pulse hub.
//!
//! - `GET <wsPath>`: one session per client, bridged to [`pulse_hub::Hub`]
//! - `GET /health`: liveness and per-channel subscriber counts
//! - `GET /metrics`: Prometheus text exposition
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod session;
pub mod shutdown;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::PulseServer;
pub use shutdown::ShutdownCoordinator;
