//! Trading signals produced by strategies.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::OrderSide;

/// What a strategy wants to do about a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalAction {
    /// Open or extend long exposure.
    Buy,
    /// Open or extend short exposure.
    Sell,
    /// No action; informational only.
    Hold,
}

impl SignalAction {
    /// Order side for an actionable signal, `None` for [`SignalAction::Hold`].
    #[must_use]
    pub const fn order_side(&self) -> Option<OrderSide> {
        match self {
            Self::Buy => Some(OrderSide::Buy),
            Self::Sell => Some(OrderSide::Sell),
            Self::Hold => None,
        }
    }
}

/// A strategy's opinion at one evaluation instant.
///
/// Signals are immutable once produced and are discarded after the cycle
/// that evaluated them; only admitted orders outlive the cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Symbol the signal applies to.
    pub symbol: String,
    /// Proposed action.
    pub action: SignalAction,
    /// Strategy conviction in `[0, 1]`.
    pub confidence: f64,
    /// Requested position size as a fraction of account equity.
    pub size_pct: Decimal,
    /// Human-readable justification for the audit trail.
    pub reasoning: String,
    /// When the signal was produced.
    pub timestamp: DateTime<Utc>,
    /// Name of the producing strategy.
    pub strategy_name: String,
    /// Price the strategy sized against; becomes the limit price.
    pub entry_price: Decimal,
    /// Protective stop level.
    pub stop_loss: Option<Decimal>,
    /// Profit target level.
    pub take_profit: Option<Decimal>,
}

impl Signal {
    /// Create a signal, clamping confidence into `[0, 1]`.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        action: SignalAction,
        confidence: f64,
        size_pct: Decimal,
        entry_price: Decimal,
        strategy_name: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            action,
            confidence: confidence.clamp(0.0, 1.0),
            size_pct,
            reasoning: reasoning.into(),
            timestamp: Utc::now(),
            strategy_name: strategy_name.into(),
            entry_price,
            stop_loss: None,
            take_profit: None,
        }
    }

    /// Attach stop-loss and take-profit levels.
    #[must_use]
    pub const fn with_brackets(mut self, stop_loss: Decimal, take_profit: Decimal) -> Self {
        self.stop_loss = Some(stop_loss);
        self.take_profit = Some(take_profit);
        self
    }

    /// Whether the signal asks for a trade at all.
    #[must_use]
    pub const fn is_actionable(&self) -> bool {
        !matches!(self.action, SignalAction::Hold)
    }
}
