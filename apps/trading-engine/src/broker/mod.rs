//! Broker abstraction: the capability surface the engine executes against.
//!
//! One concrete implementation ships with the engine, the deterministic
//! [`SimulatedBroker`](sim::SimulatedBroker); adapters for real brokers
//! implement the same [`Broker`] trait over a wire protocol.

pub mod retry;
pub mod sim;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::{Bar, BrokerAccount, OrderRequest, OrderStatus, Quote};
use crate::portfolio::Position;

pub use retry::{Backoff, RetryPolicy};
pub use sim::{SimulatedBroker, SimulatorConfig};

/// Order-placement failures. A subset of [`BrokerError`]; callers match
/// `BrokerError::Order(_)` to handle all of them uniformly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    /// The order is structurally invalid (bad quantity, missing limit price).
    #[error("invalid order: {message}")]
    Invalid {
        /// What was wrong with the order.
        message: String,
    },

    /// Order notional exceeds available buying power.
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        /// Notional the order requires.
        required: Decimal,
        /// Buying power available.
        available: Decimal,
    },

    /// The market is closed and the broker enforces trading hours.
    #[error("market is closed")]
    MarketClosed,

    /// The broker does not know the symbol.
    #[error("symbol not found: {symbol}")]
    SymbolNotFound {
        /// The unknown symbol.
        symbol: String,
    },
}

/// Broker fault taxonomy. `Connection` is the only transient variant; the
/// rest surface immediately without retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Transport-level failure; safe to retry with backoff.
    #[error("broker connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// Credentials rejected; never retried.
    #[error("broker authentication error: {message}")]
    Authentication {
        /// Error details.
        message: String,
    },

    /// Order placement failed.
    #[error(transparent)]
    Order(#[from] OrderError),
}

impl BrokerError {
    /// Whether the retry policy may resubmit after this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Convenience constructor for connection failures.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }
}

/// Broker-side view of a submitted order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerOrder {
    /// Client order id (assigned by the execution engine).
    pub order_id: String,
    /// The submitted request.
    pub request: OrderRequest,
    /// Current broker-side status.
    pub status: OrderStatus,
    /// Quantity filled so far.
    pub filled_quantity: Decimal,
    /// Quantity-weighted average fill price, if any fill happened.
    pub average_fill_price: Option<Decimal>,
    /// When the broker accepted the order.
    pub submitted_at: DateTime<Utc>,
}

/// Asynchronous order lifecycle events emitted by a broker.
///
/// Events for a single order are emitted, and must be applied, in order;
/// there is no ordering guarantee between different orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderUpdate {
    /// Some quantity executed.
    Fill {
        /// Client order id.
        order_id: String,
        /// Quantity of this fill only.
        quantity: Decimal,
        /// Price of this fill.
        price: Decimal,
        /// Commission charged for this fill.
        commission: Decimal,
        /// Whether the broker considers the order done. Authoritative: a
        /// rounded-away remainder still completes the order.
        is_complete: bool,
    },
    /// Cancel request honored; any filled portion stands.
    Cancelled {
        /// Client order id.
        order_id: String,
    },
    /// Broker rejected the order after acceptance.
    Rejected {
        /// Client order id.
        order_id: String,
        /// Broker-side reason.
        reason: String,
    },
}

impl OrderUpdate {
    /// The order this update refers to.
    #[must_use]
    pub fn order_id(&self) -> &str {
        match self {
            Self::Fill { order_id, .. }
            | Self::Cancelled { order_id }
            | Self::Rejected { order_id, .. } => order_id,
        }
    }
}

/// Capability surface of a brokerage.
///
/// All operations are suspend points: the caller yields while the broker
/// performs I/O (or simulated delay) and resumes with the result.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Establish a session. Returns `true` when connected.
    async fn connect(&self) -> Result<bool, BrokerError>;

    /// Tear the session down. Returns `true` when disconnected.
    async fn disconnect(&self) -> Result<bool, BrokerError>;

    /// Current account snapshot.
    async fn get_account(&self) -> Result<BrokerAccount, BrokerError>;

    /// All broker-side positions.
    async fn get_positions(&self) -> Result<Vec<Position>, BrokerError>;

    /// Broker-side position for one symbol.
    async fn get_position(&self, symbol: &str) -> Result<Option<Position>, BrokerError>;

    /// Up to `limit` recent bars, most recent last.
    async fn get_bars(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>, BrokerError>;

    /// Current bid/ask. `ask > bid` always.
    async fn get_quote(&self, symbol: &str) -> Result<Quote, BrokerError>;

    /// Submit an order under the caller-supplied client id.
    ///
    /// Acceptance is not execution: fills arrive later as [`OrderUpdate`]s.
    async fn place_order(
        &self,
        order_id: &str,
        request: OrderRequest,
    ) -> Result<BrokerOrder, BrokerError>;

    /// Request cancellation. Best-effort: returns `Ok(false)` when the order
    /// already reached a terminal state (for instance a fill that won the
    /// race); that is success-with-no-effect, not an error.
    async fn cancel_order(&self, order_id: &str) -> Result<bool, BrokerError>;

    /// Look up one order.
    async fn get_order(&self, order_id: &str) -> Result<Option<BrokerOrder>, BrokerError>;

    /// All orders known to the broker.
    async fn get_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError>;

    /// Take the order-update stream. Single consumer: the first call returns
    /// the receiver, later calls return `None`.
    fn take_order_updates(&self) -> Option<mpsc::UnboundedReceiver<OrderUpdate>>;
}
