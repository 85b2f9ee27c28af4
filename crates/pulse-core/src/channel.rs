//! Subscribable channel names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Pseudo-channel used for connection and subscription acknowledgements.
///
/// Clients cannot subscribe to it.
pub const SYSTEM_CHANNEL: &str = "system";

/// A named topic clients subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    /// Market prices, volume and TVL.
    MarketData,
    /// Per-user transaction status updates.
    UserTransactions,
    /// Strategy APY and TVL updates.
    YieldUpdates,
    /// Per-user notifications.
    Notifications,
    /// Per-user portfolio valuation updates.
    PortfolioUpdates,
    /// Hub uptime, memory and connection count.
    SystemStatus,
}

impl Channel {
    /// Every channel, in declaration order.
    pub const ALL: [Channel; 6] = [
        Channel::MarketData,
        Channel::UserTransactions,
        Channel::YieldUpdates,
        Channel::Notifications,
        Channel::PortfolioUpdates,
        Channel::SystemStatus,
    ];

    /// Wire name of the channel.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MarketData => "market-data",
            Self::UserTransactions => "user-transactions",
            Self::YieldUpdates => "yield-updates",
            Self::Notifications => "notifications",
            Self::PortfolioUpdates => "portfolio-updates",
            Self::SystemStatus => "system-status",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidChannel(s.to_owned()))
    }
}
