//! Liveness monitoring.
//!
//! Every cycle, connections whose last liveness signal is older than the
//! timeout are closed and deregistered; all others get a server `ping`.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use pulse_core::HubMessage;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connection::ConnectionId;
use crate::metrics::HUB_EVICTIONS_TOTAL;
use crate::registry::ConnectionRegistry;

/// Result of one liveness sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections sent a `ping`.
    pub pinged: usize,
    /// Connections closed and removed.
    pub evicted: Vec<ConnectionId>,
}

/// Evicts connections that stopped signalling liveness.
pub struct LivenessMonitor {
    registry: Arc<ConnectionRegistry>,
    timeout: Duration,
}

impl LivenessMonitor {
    /// Create a monitor that evicts after `timeout` without a signal.
    pub fn new(registry: Arc<ConnectionRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// The eviction threshold.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record a liveness signal from `id`.
    pub fn touch(&self, id: &ConnectionId) -> bool {
        self.registry.touch(id)
    }

    /// Run one cycle against a point-in-time snapshot of the registry.
    ///
    /// Stale candidates are re-checked under the registry lock before
    /// removal, so a signal that arrives mid-sweep keeps the connection.
    /// The transport is closed once the record is gone.
    pub fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let mut report = SweepReport::default();

        for (conn, record) in self.registry.all() {
            let evicted = if now.saturating_duration_since(record.last_ping) > self.timeout {
                self.registry.evict_if_stale(&conn.id, now, self.timeout)
            } else {
                None
            };
            if let Some((evicted, silent_for)) = evicted {
                evicted.close();
                counter!(HUB_EVICTIONS_TOTAL).increment(1);
                info!(conn_id = %evicted.id, silent_ms = silent_for.as_millis(), "evicted unresponsive connection");
                report.evicted.push(evicted.id.clone());
                continue;
            }
            if conn.send_message(&HubMessage::ping()) {
                report.pinged += 1;
            }
        }

        if !report.evicted.is_empty() || report.pinged > 0 {
            debug!(pinged = report.pinged, evicted = report.evicted.len(), "liveness sweep");
        }
        report
    }
}

/// Sweep every `interval` until `cancel` fires.
///
/// The first sweep happens one full interval after start.
pub async fn run_liveness(monitor: Arc<LivenessMonitor>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let _ = monitor.sweep();
            }
            () = cancel.cancelled() => {
                debug!("liveness monitor stopped");
                return;
            }
        }
    }
}
