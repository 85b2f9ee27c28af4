//! # pulse
//!
//! Real-time notification hub binary: loads settings, starts the hub and
//! serves `WebSocket` clients until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pulse_hub::{Hub, HubConfig};
use pulse_server::{PulseServer, ServerConfig};
use pulse_settings::PulseSettings;

/// Pulse notification hub.
#[derive(Parser, Debug)]
#[command(name = "pulse", about = "Real-time pub/sub notification hub")]
struct Cli {
    /// Settings file (default `~/.pulse/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings, 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Log level or filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn load_settings(&self) -> Result<PulseSettings> {
        let path = self.config.clone().unwrap_or_else(pulse_settings::settings_path);
        let mut settings = pulse_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.load_settings()?;

    pulse_core::logging::init_subscriber(&settings.logging.level, settings.logging.format);
    let metrics_handle =
        pulse_server::metrics::install_recorder().context("Failed to install metrics recorder")?;

    let hub = Arc::new(Hub::new(HubConfig::from(&settings.hub)));
    hub.start();

    let server = PulseServer::new(ServerConfig::from(&settings.server), hub).with_metrics(metrics_handle);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("pulse listening on ws://{addr}{}", settings.server.ws_path);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.stop(handle).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
