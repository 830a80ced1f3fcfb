//! Market data and account value types exposed by brokers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV bar for a time interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    /// Symbol the bar belongs to.
    pub symbol: String,
    /// Bar open timestamp.
    pub timestamp: DateTime<Utc>,
    /// Opening price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Traded volume.
    pub volume: u64,
}

/// A bid/ask quote. `ask > bid` always holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    /// Symbol quoted.
    pub symbol: String,
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
}

impl Quote {
    /// Bid/ask spread.
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// Midpoint price.
    #[must_use]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }
}

/// Account snapshot as reported by a broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerAccount {
    /// Broker-side account identifier.
    pub account_id: String,
    /// Settled cash.
    pub cash: Decimal,
    /// Total account value (cash plus position market value).
    pub equity: Decimal,
    /// Cash available for new orders.
    pub buying_power: Decimal,
    /// When the snapshot was taken.
    pub updated_at: DateTime<Utc>,
}
