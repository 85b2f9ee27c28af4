//! Channel payload shapes.
//!
//! These are a contract for producers and clients; the hub passes payloads
//! through without validating them. The same builders back the one-time
//! snapshot sent on subscribe and the periodic synthetic feed.

use std::time::Duration;

use pulse_core::{Channel, now_millis};
use rand::Rng;
use serde_json::{Value, json};

/// A jittered quantity: `base ± spread`.
#[derive(Clone, Copy, Debug)]
pub struct Baseline {
    /// Center value.
    pub base: f64,
    /// Maximum absolute deviation.
    pub spread: f64,
}

impl Baseline {
    const fn new(base: f64, spread: f64) -> Self {
        Self { base, spread }
    }

    /// Draw a value in `[base - spread, base + spread]`.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        self.base + rng.random_range(-self.spread..=self.spread)
    }
}

/// Baselines for one asset quote.
#[derive(Clone, Copy, Debug)]
pub struct QuoteBaseline {
    /// Spot price.
    pub price: Baseline,
    /// 24h change in percent.
    pub change_24h: Baseline,
    /// 24h traded volume.
    pub volume_24h: Baseline,
}

/// USDT quote baselines.
pub const USDT: QuoteBaseline = QuoteBaseline {
    price: Baseline::new(1.0, 0.001),
    change_24h: Baseline::new(0.01, 0.05),
    volume_24h: Baseline::new(1_250_000.0, 62_500.0),
};

/// KAIA quote baselines.
pub const KAIA: QuoteBaseline = QuoteBaseline {
    price: Baseline::new(0.15, 0.003),
    change_24h: Baseline::new(2.5, 1.0),
    volume_24h: Baseline::new(890_000.0, 44_500.0),
};

/// Total value locked baseline.
pub const TOTAL_VALUE_LOCKED: Baseline = Baseline::new(2_500_000.0, 50_000.0);

/// Active users baseline.
pub const ACTIVE_USERS: Baseline = Baseline::new(1_250.0, 25.0);

/// A yield strategy advertised on `yield-updates`.
#[derive(Clone, Copy, Debug)]
pub struct Strategy {
    /// Display name.
    pub name: &'static str,
    /// Annual percentage yield.
    pub apy: f64,
    /// Value locked in the strategy.
    pub tvl: f64,
    /// Risk bucket.
    pub risk: &'static str,
}

/// Strategies published in the `yield-updates` snapshot.
pub const STRATEGIES: [Strategy; 3] = [
    Strategy {
        name: "Stable Yield",
        apy: 8.5,
        tvl: 1_200_000.0,
        risk: "low",
    },
    Strategy {
        name: "Balanced Growth",
        apy: 12.3,
        tvl: 850_000.0,
        risk: "medium",
    },
    Strategy {
        name: "High Yield",
        apy: 18.7,
        tvl: 420_000.0,
        risk: "high",
    },
];

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}

fn quote<R: Rng>(rng: &mut R, baseline: &QuoteBaseline) -> Value {
    json!({
        "price": round_to(baseline.price.sample(rng), 6),
        "change24h": round_to(baseline.change_24h.sample(rng), 4),
        "volume24h": baseline.volume_24h.sample(rng).round(),
    })
}

/// A `market-data` payload with bounded jitter around the baselines.
pub fn market_data<R: Rng>(rng: &mut R) -> Value {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let active_users = ACTIVE_USERS.sample(rng).round() as u64;
    json!({
        "usdt": quote(rng, &USDT),
        "kaia": quote(rng, &KAIA),
        "totalValueLocked": TOTAL_VALUE_LOCKED.sample(rng).round(),
        "activeUsers": active_users,
        "timestamp": now_millis(),
    })
}

/// Inputs for a `system-status` payload.
#[derive(Clone, Copy, Debug)]
pub struct SystemStats {
    /// Time since the hub started.
    pub uptime: Duration,
    /// Live connection count.
    pub connections: usize,
}

/// A `system-status` payload.
pub fn system_status(stats: SystemStats) -> Value {
    json!({
        "status": "healthy",
        "uptime": stats.uptime.as_secs(),
        "memory": { "rssBytes": resident_memory_bytes() },
        "connections": stats.connections,
        "timestamp": now_millis(),
    })
}

/// A `yield-updates` payload.
pub fn yield_updates() -> Value {
    let strategies: Vec<Value> = STRATEGIES
        .iter()
        .map(|s| json!({ "name": s.name, "apy": s.apy, "tvl": s.tvl, "risk": s.risk }))
        .collect();
    json!({
        "strategies": strategies,
        "timestamp": now_millis(),
    })
}

/// The one-time payload sent when a client subscribes to `channel`.
///
/// `None` for channels that only carry pushed events.
pub fn initial<R: Rng>(channel: Channel, rng: &mut R, stats: SystemStats) -> Option<Value> {
    match channel {
        Channel::MarketData => Some(market_data(rng)),
        Channel::SystemStatus => Some(system_status(stats)),
        Channel::YieldUpdates => Some(yield_updates()),
        Channel::UserTransactions | Channel::Notifications | Channel::PortfolioUpdates => None,
    }
}

/// Resident set size of this process, where the platform exposes it.
pub fn resident_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kib: u64 = line
        .trim_start_matches("VmRSS:")
        .trim()
        .trim_end_matches("kB")
        .trim()
        .parse()
        .ok()?;
    Some(kib * 1024)
}
