//! Audit/session sink port.
//!
//! The core emits session, order and position events tagged with a session
//! id; the sink is write-only and the core never reads it back for
//! decisions. A failing sink degrades to a logged warning: trading keeps
//! running on in-memory state.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::execution::TrackedOrder;
use crate::portfolio::Position;

/// Sink-side failure. Surfaced to the caller, who logs and continues.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuditError {
    /// The backing store is unreachable or corrupted.
    #[error("audit sink unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },

    /// The payload could not be serialized.
    #[error("audit serialization error: {message}")]
    Serialization {
        /// Error details.
        message: String,
    },
}

/// Closing summary for a trading session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Trading mode (for instance `simulated` or `paper`).
    pub mode: String,
    /// Strategies that ran, in registration order.
    pub strategies: Vec<String>,
    /// Balance at session open.
    pub initial_balance: Decimal,
    /// Balance at session close.
    pub final_balance: Decimal,
    /// Number of closed trades.
    pub trade_count: u32,
    /// Realized PnL over the session.
    pub realized_pnl: Decimal,
    /// Largest peak-to-trough equity drop observed.
    pub max_drawdown: Decimal,
    /// Fraction of closed trades that made money.
    pub win_rate: f64,
}

/// Write-only sink for the order lifecycle and session history.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record the start of a session.
    async fn session_opened(
        &self,
        session_id: &str,
        mode: &str,
        strategies: &[String],
        initial_balance: Decimal,
    ) -> Result<(), AuditError>;

    /// Record the end of a session.
    async fn session_closed(
        &self,
        session_id: &str,
        summary: &SessionSummary,
    ) -> Result<(), AuditError>;

    /// Record an order lifecycle event (creation, fill, status change).
    async fn order_event(
        &self,
        session_id: &str,
        event: &str,
        order: &TrackedOrder,
    ) -> Result<(), AuditError>;

    /// Record a position snapshot.
    async fn position_snapshot(
        &self,
        session_id: &str,
        position: &Position,
    ) -> Result<(), AuditError>;

    /// Record a free-form event with a structured payload.
    async fn record(
        &self,
        session_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), AuditError>;
}

/// Sink that drops everything. Useful in tests and when auditing is off.
#[derive(Debug, Clone, Default)]
pub struct NoOpAuditSink;

#[async_trait]
impl AuditSink for NoOpAuditSink {
    async fn session_opened(
        &self,
        _session_id: &str,
        _mode: &str,
        _strategies: &[String],
        _initial_balance: Decimal,
    ) -> Result<(), AuditError> {
        Ok(())
    }

    async fn session_closed(
        &self,
        _session_id: &str,
        _summary: &SessionSummary,
    ) -> Result<(), AuditError> {
        Ok(())
    }

    async fn order_event(
        &self,
        _session_id: &str,
        _event: &str,
        _order: &TrackedOrder,
    ) -> Result<(), AuditError> {
        Ok(())
    }

    async fn position_snapshot(
        &self,
        _session_id: &str,
        _position: &Position,
    ) -> Result<(), AuditError> {
        Ok(())
    }

    async fn record(
        &self,
        _session_id: &str,
        _event_type: &str,
        _payload: serde_json::Value,
    ) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Sink that writes structured events to the tracing subscriber.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn session_opened(
        &self,
        session_id: &str,
        mode: &str,
        strategies: &[String],
        initial_balance: Decimal,
    ) -> Result<(), AuditError> {
        tracing::info!(
            session_id,
            mode,
            strategies = ?strategies,
            %initial_balance,
            "audit: session opened"
        );
        Ok(())
    }

    async fn session_closed(
        &self,
        session_id: &str,
        summary: &SessionSummary,
    ) -> Result<(), AuditError> {
        tracing::info!(
            session_id,
            final_balance = %summary.final_balance,
            trade_count = summary.trade_count,
            realized_pnl = %summary.realized_pnl,
            max_drawdown = %summary.max_drawdown,
            win_rate = summary.win_rate,
            "audit: session closed"
        );
        Ok(())
    }

    async fn order_event(
        &self,
        session_id: &str,
        event: &str,
        order: &TrackedOrder,
    ) -> Result<(), AuditError> {
        tracing::info!(
            session_id,
            event,
            order_id = %order.order_id,
            symbol = %order.request.symbol,
            status = %order.status,
            filled = %order.filled_quantity,
            "audit: order event"
        );
        Ok(())
    }

    async fn position_snapshot(
        &self,
        session_id: &str,
        position: &Position,
    ) -> Result<(), AuditError> {
        tracing::info!(
            session_id,
            symbol = %position.symbol,
            side = %position.side,
            quantity = %position.quantity,
            entry_price = %position.entry_price,
            current_price = %position.current_price,
            "audit: position snapshot"
        );
        Ok(())
    }

    async fn record(
        &self,
        session_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), AuditError> {
        tracing::info!(session_id, event_type, %payload, "audit: event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn noop_sink_accepts_everything() {
        let sink = NoOpAuditSink;
        assert!(
            sink.session_opened("s-1", "simulated", &["mean_reversion".to_string()], dec!(100000))
                .await
                .is_ok()
        );
        assert!(
            sink.record("s-1", "risk_rejection", serde_json::json!({"reason": "TRADING_DISABLED"}))
                .await
                .is_ok()
        );
    }
}
