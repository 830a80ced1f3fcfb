//! Order execution: the tracked-order arena and its lifecycle.
//!
//! The engine owns every [`TrackedOrder`] keyed by id. Orders are mutated
//! only through fill, cancel and timeout events; per-order mutation happens
//! under the map lock, which also gives fills for a single order a total
//! order of application.

pub mod state_machine;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::broker::{Backoff, Broker, BrokerError, BrokerOrder, RetryPolicy};
use crate::models::{OrderRequest, OrderStatus, OrderValidationError};

pub use state_machine::OrderStateMachine;

/// Execution tuning knobs.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// How long an order may go without reaching a terminal state before the
    /// timeout sweep expires it.
    pub order_timeout: Duration,
    /// Retry policy for transient submission failures.
    pub retry: RetryPolicy,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            order_timeout: Duration::from_secs(300),
            retry: RetryPolicy::default(),
        }
    }
}

/// An order under execution tracking. Owned exclusively by
/// [`ExecutionEngine`]; callers get clones.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedOrder {
    /// Unique order id, generated at creation and never reused.
    pub order_id: String,
    /// The admitted intent.
    pub request: OrderRequest,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Quantity filled so far; monotonically non-decreasing.
    pub filled_quantity: Decimal,
    /// Quantity-weighted average price over all fills so far.
    pub average_fill_price: Option<Decimal>,
    /// When the order was created.
    pub created_at: DateTime<Utc>,
    /// Last status or fill change.
    pub last_update_at: DateTime<Utc>,
    /// Diagnostic for terminal states reached without a complete fill.
    pub status_reason: Option<String>,
    #[serde(skip)]
    submitted_at: Instant,
}

impl TrackedOrder {
    fn new(request: OrderRequest) -> Self {
        Self {
            order_id: Uuid::new_v4().to_string(),
            request,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            average_fill_price: None,
            created_at: Utc::now(),
            last_update_at: Utc::now(),
            status_reason: None,
            submitted_at: Instant::now(),
        }
    }

    /// Quantity still open. `remaining + filled == requested` always.
    #[must_use]
    pub fn remaining_quantity(&self) -> Decimal {
        self.request.quantity - self.filled_quantity
    }

    /// How long the order has been outstanding.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.submitted_at.elapsed()
    }
}

/// Owns the map of tracked orders and applies lifecycle events to it.
pub struct ExecutionEngine {
    orders: Mutex<HashMap<String, TrackedOrder>>,
    config: ExecutionConfig,
}

impl ExecutionEngine {
    /// Create an engine with the given configuration.
    #[must_use]
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            orders: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Track a validated order request under a fresh unique id.
    pub fn create_order(
        &self,
        request: OrderRequest,
    ) -> Result<TrackedOrder, OrderValidationError> {
        request.validate()?;
        let order = TrackedOrder::new(request);
        let mut orders = self.orders.lock().unwrap();
        orders.insert(order.order_id.clone(), order.clone());
        tracing::info!(
            order_id = %order.order_id,
            symbol = %order.request.symbol,
            side = %order.request.side,
            quantity = %order.request.quantity,
            "order created"
        );
        Ok(order)
    }

    /// Submit a tracked order to the broker, retrying transient failures
    /// with backoff. Permanent failures mark the order REJECTED and surface
    /// immediately.
    pub async fn submit_order(
        &self,
        broker: &dyn Broker,
        order_id: &str,
    ) -> Result<BrokerOrder, BrokerError> {
        let request = {
            let orders = self.orders.lock().unwrap();
            orders.get(order_id).map(|o| o.request.clone())
        };
        let Some(request) = request else {
            return Err(BrokerError::Order(crate::broker::OrderError::Invalid {
                message: format!("unknown order id {order_id}"),
            }));
        };

        let mut backoff = Backoff::new(&self.config.retry);
        loop {
            match broker.place_order(order_id, request.clone()).await {
                Ok(acked) => return Ok(acked),
                Err(err) if err.is_transient() => match backoff.next_backoff() {
                    Some(delay) => {
                        tracing::warn!(
                            %order_id,
                            attempt = backoff.current_attempt(),
                            error = %err,
                            ?delay,
                            "transient submission failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        self.mark_rejected(order_id, "submission retries exhausted");
                        return Err(err);
                    }
                },
                Err(err) => {
                    self.mark_rejected(order_id, &err.to_string());
                    return Err(err);
                }
            }
        }
    }

    /// Apply one fill event.
    ///
    /// Adds `filled_qty` to the running total and recomputes the
    /// quantity-weighted average fill price. `is_complete` is the
    /// authoritative terminal signal: a rounded-away remainder still
    /// completes the order. Returns `false` for unknown ids and orders
    /// already in a terminal state.
    pub fn update_order_fill(
        &self,
        order_id: &str,
        filled_qty: Decimal,
        fill_price: Decimal,
        is_complete: bool,
    ) -> bool {
        if filled_qty <= Decimal::ZERO {
            tracing::warn!(%order_id, %filled_qty, "ignoring non-positive fill");
            return false;
        }

        let mut orders = self.orders.lock().unwrap();
        let Some(order) = orders.get_mut(order_id) else {
            tracing::warn!(%order_id, "fill for unknown order");
            return false;
        };

        let next_status = if is_complete {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        if !OrderStateMachine::is_valid_transition(order.status, next_status) {
            tracing::warn!(
                %order_id,
                from = %order.status,
                to = %next_status,
                "dropping fill: invalid transition"
            );
            return false;
        }

        let applied = filled_qty.min(order.remaining_quantity());
        if applied < filled_qty {
            tracing::warn!(
                %order_id,
                %filled_qty,
                remaining = %order.remaining_quantity(),
                "overfill clamped to remaining quantity"
            );
        }

        let prior_notional =
            order.average_fill_price.unwrap_or(Decimal::ZERO) * order.filled_quantity;
        order.filled_quantity += applied;
        order.average_fill_price =
            Some((prior_notional + fill_price * applied) / order.filled_quantity);
        order.status = next_status;
        order.last_update_at = Utc::now();

        tracing::info!(
            %order_id,
            filled = %order.filled_quantity,
            remaining = %order.remaining_quantity(),
            average_fill_price = %order.average_fill_price.unwrap_or(Decimal::ZERO),
            status = %order.status,
            "fill applied"
        );
        true
    }

    /// Mark an order cancelled. The filled portion stands. Returns `false`
    /// if the order is unknown or already terminal.
    pub fn mark_cancelled(&self, order_id: &str, reason: &str) -> bool {
        self.transition_terminal(order_id, OrderStatus::Cancelled, reason)
    }

    /// Mark an order rejected. Returns `false` if the order is unknown or
    /// the transition is invalid (rejection only happens before any fill).
    pub fn mark_rejected(&self, order_id: &str, reason: &str) -> bool {
        self.transition_terminal(order_id, OrderStatus::Rejected, reason)
    }

    /// Expire every non-terminal order older than the configured timeout.
    ///
    /// Wall-clock based: runs regardless of broker responsiveness. Returns
    /// the expired orders for auditing.
    pub fn expire_stale_orders(&self) -> Vec<TrackedOrder> {
        let timeout = self.config.order_timeout;
        let mut expired = Vec::new();
        let mut orders = self.orders.lock().unwrap();
        for order in orders.values_mut() {
            if !order.status.is_terminal() && order.submitted_at.elapsed() >= timeout {
                order.status = OrderStatus::Expired;
                order.status_reason = Some(format!(
                    "no broker acknowledgment within {}s",
                    timeout.as_secs()
                ));
                order.last_update_at = Utc::now();
                tracing::warn!(
                    order_id = %order.order_id,
                    symbol = %order.request.symbol,
                    filled = %order.filled_quantity,
                    "order expired"
                );
                expired.push(order.clone());
            }
        }
        expired
    }

    /// Orders that can still fill (PENDING or PARTIALLY_FILLED).
    #[must_use]
    pub fn get_pending_orders(&self) -> Vec<TrackedOrder> {
        let orders = self.orders.lock().unwrap();
        orders
            .values()
            .filter(|o| o.status.is_active())
            .cloned()
            .collect()
    }

    /// Look up one order.
    #[must_use]
    pub fn get_order(&self, order_id: &str) -> Option<TrackedOrder> {
        self.orders.lock().unwrap().get(order_id).cloned()
    }

    /// All tracked orders.
    #[must_use]
    pub fn get_orders(&self) -> Vec<TrackedOrder> {
        self.orders.lock().unwrap().values().cloned().collect()
    }

    fn transition_terminal(&self, order_id: &str, to: OrderStatus, reason: &str) -> bool {
        let mut orders = self.orders.lock().unwrap();
        let Some(order) = orders.get_mut(order_id) else {
            return false;
        };
        if !OrderStateMachine::is_valid_transition(order.status, to) {
            return false;
        }
        order.status = to;
        order.status_reason = Some(reason.to_string());
        order.last_update_at = Utc::now();
        tracing::info!(%order_id, status = %to, reason, "order transitioned");
        true
    }
}
