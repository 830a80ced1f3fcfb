//! Order-related value types shared across risk, execution and broker code.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl OrderSide {
    /// The side that closes a position opened on this side.
    #[must_use]
    pub const fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type (market or limit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Market order - execute at best available price.
    Market,
    /// Limit order - execute at specified price or better.
    Limit,
}

/// Time in force for orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Valid for current trading day only.
    Day,
    /// Good-til-canceled.
    Gtc,
    /// Immediate-or-cancel (fill immediately, cancel remainder).
    Ioc,
    /// Fill-or-kill (all or nothing, immediate execution required).
    Fok,
}

/// Why an order exists: opening new exposure or unwinding it.
///
/// Exit orders bypass admission control (closing risk is always allowed) and
/// drive position close accounting when they fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPurpose {
    /// Opens or extends a position.
    Entry,
    /// Closes an existing position.
    Exit,
}

/// Order status in the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order created, awaiting broker acknowledgment.
    Pending,
    /// Order partially filled.
    PartiallyFilled,
    /// Order completely filled.
    Filled,
    /// Order cancelled; any filled portion stands.
    Cancelled,
    /// Order rejected by the broker.
    Rejected,
    /// No broker acknowledgment within the order timeout.
    Expired,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }

    /// Returns true if the order can still be filled or cancelled.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::PartiallyFilled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Validation failure for an [`OrderRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderValidationError {
    /// Quantity must be strictly positive.
    #[error("order quantity must be positive, got {quantity}")]
    NonPositiveQuantity {
        /// The offending quantity.
        quantity: Decimal,
    },

    /// Limit orders require a limit price.
    #[error("limit order requires a limit price")]
    MissingLimitPrice,

    /// Limit price must be strictly positive.
    #[error("limit price must be positive, got {price}")]
    NonPositiveLimitPrice {
        /// The offending price.
        price: Decimal,
    },
}

/// Broker-agnostic order intent, produced by admission control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Symbol to trade.
    pub symbol: String,
    /// Order side.
    pub side: OrderSide,
    /// Quantity in shares (fractional allowed).
    pub quantity: Decimal,
    /// Order type.
    pub order_type: OrderType,
    /// Limit price (required for limit orders).
    pub limit_price: Option<Decimal>,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Entry or exit intent.
    pub purpose: OrderPurpose,
    /// Stop-loss level carried from the originating signal.
    pub stop_loss: Option<Decimal>,
    /// Take-profit level carried from the originating signal.
    pub take_profit: Option<Decimal>,
    /// Strategy that produced the originating signal.
    pub strategy_name: Option<String>,
    /// Human-readable reasoning carried from the signal.
    pub reasoning: Option<String>,
}

impl OrderRequest {
    /// Create a market order request.
    #[must_use]
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Market,
            limit_price: None,
            time_in_force: TimeInForce::Day,
            purpose: OrderPurpose::Entry,
            stop_loss: None,
            take_profit: None,
            strategy_name: None,
            reasoning: None,
        }
    }

    /// Create a limit order request.
    #[must_use]
    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            time_in_force: TimeInForce::Day,
            purpose: OrderPurpose::Entry,
            stop_loss: None,
            take_profit: None,
            strategy_name: None,
            reasoning: None,
        }
    }

    /// Mark this request as a position exit.
    #[must_use]
    pub const fn as_exit(mut self) -> Self {
        self.purpose = OrderPurpose::Exit;
        self
    }

    /// Check the structural invariants of the request.
    pub fn validate(&self) -> Result<(), OrderValidationError> {
        if self.quantity <= Decimal::ZERO {
            return Err(OrderValidationError::NonPositiveQuantity {
                quantity: self.quantity,
            });
        }
        match (self.order_type, self.limit_price) {
            (OrderType::Limit, None) => Err(OrderValidationError::MissingLimitPrice),
            (OrderType::Limit, Some(price)) if price <= Decimal::ZERO => {
                Err(OrderValidationError::NonPositiveLimitPrice { price })
            }
            _ => Ok(()),
        }
    }
}
