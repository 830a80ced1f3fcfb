//! Trading engine orchestration.
//!
//! One [`TradingEngine`] ties the pipeline together: feature snapshots fan
//! out to strategies, admitted signals become tracked orders submitted to
//! the broker, and broker events flow back through a single event pump that
//! applies fills, keeps the portfolio consistent and feeds trade outcomes to
//! the circuit breaker. The pump also runs the wall-clock timeout sweep and
//! stop/target monitoring.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::audit::{AuditSink, SessionSummary};
use crate::broker::{Broker, BrokerError, OrderUpdate};
use crate::execution::ExecutionEngine;
use crate::features::FeatureSnapshot;
use crate::models::{OrderPurpose, OrderRequest, OrderSide, Signal};
use crate::portfolio::{Position, PositionSide, SharedPortfolio};
use crate::risk::{Admission, RejectionReason, RiskManager};
use crate::strategy::SignalGenerator;

/// Engine-level settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Trading mode label for the audit trail (for instance `simulated`).
    pub mode: String,
    /// Cadence of the timeout sweep and position monitor.
    pub monitor_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            mode: "simulated".to_string(),
            monitor_interval: Duration::from_secs(1),
        }
    }
}

/// What happened to one signal in an evaluation cycle.
#[derive(Debug, Clone)]
pub enum SignalOutcome {
    /// Admitted and submitted to the broker.
    Submitted {
        /// Tracked order id.
        order_id: String,
    },
    /// Turned away by admission control.
    Rejected(RejectionReason),
    /// A hold signal; nothing to do.
    Held,
    /// Admitted but submission failed permanently.
    SubmissionFailed {
        /// Broker error description.
        error: String,
    },
}

/// Point-in-time view of the whole engine, for status endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStatus {
    /// Session id.
    pub session_id: String,
    /// Trading mode label.
    pub mode: String,
    /// Account snapshot.
    pub account: crate::portfolio::AccountState,
    /// Open positions.
    pub positions: Vec<Position>,
    /// Orders still able to fill.
    pub pending_orders: usize,
    /// Risk state.
    pub risk: crate::risk::RiskStatus,
}

/// Per-session trade statistics for the closing summary.
#[derive(Debug, Clone)]
struct SessionStats {
    trade_count: u32,
    wins: u32,
    peak_equity: Decimal,
    max_drawdown: Decimal,
}

/// The decision-to-execution pipeline.
pub struct TradingEngine {
    broker: Arc<dyn Broker>,
    portfolio: SharedPortfolio,
    risk: Arc<RiskManager>,
    execution: Arc<ExecutionEngine>,
    generator: Mutex<SignalGenerator>,
    audit: Arc<dyn AuditSink>,
    settings: EngineSettings,
    session_id: String,
    stats: Mutex<SessionStats>,
    initial_balance: Decimal,
}

impl TradingEngine {
    /// Wire the pipeline together.
    #[must_use]
    pub fn new(
        broker: Arc<dyn Broker>,
        portfolio: SharedPortfolio,
        risk: Arc<RiskManager>,
        execution: Arc<ExecutionEngine>,
        generator: SignalGenerator,
        audit: Arc<dyn AuditSink>,
        settings: EngineSettings,
    ) -> Self {
        let initial_balance = portfolio.lock().unwrap().account().initial_balance;
        Self {
            broker,
            portfolio,
            risk,
            execution,
            generator: Mutex::new(generator),
            audit,
            settings,
            session_id: Uuid::new_v4().to_string(),
            stats: Mutex::new(SessionStats {
                trade_count: 0,
                wins: 0,
                peak_equity: initial_balance,
                max_drawdown: Decimal::ZERO,
            }),
            initial_balance,
        }
    }

    /// Session id tagging every audit event from this engine.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Record the session opening in the audit trail.
    pub async fn open_session(&self) {
        let strategies = self.generator.lock().unwrap().strategy_names();
        let result = self
            .audit
            .session_opened(
                &self.session_id,
                &self.settings.mode,
                &strategies,
                self.initial_balance,
            )
            .await;
        log_audit_failure(result);
    }

    /// Run one decision cycle for a symbol: strategies, admission,
    /// submission. Returns what happened to each signal.
    pub async fn evaluate(
        &self,
        symbol: &str,
        features: &FeatureSnapshot,
    ) -> Vec<(Signal, SignalOutcome)> {
        let positions: HashMap<String, Position> = {
            let portfolio = self.portfolio.lock().unwrap();
            portfolio
                .positions()
                .into_iter()
                .map(|p| (p.symbol.clone(), p))
                .collect()
        };

        let signals = {
            let mut generator = self.generator.lock().unwrap();
            generator.generate_signals(symbol, features, &positions)
        };

        let mut outcomes = Vec::with_capacity(signals.len());
        for signal in signals {
            let outcome = self.process_signal(&signal).await;
            outcomes.push((signal, outcome));
        }
        outcomes
    }

    async fn process_signal(&self, signal: &Signal) -> SignalOutcome {
        match self.risk.validate_signal(signal) {
            Admission::Hold => SignalOutcome::Held,
            Admission::Rejected(reason) => {
                let result = self
                    .audit
                    .record(
                        &self.session_id,
                        "signal_rejected",
                        serde_json::json!({
                            "symbol": signal.symbol,
                            "strategy": signal.strategy_name,
                            "reason": reason.to_string(),
                        }),
                    )
                    .await;
                log_audit_failure(result);
                SignalOutcome::Rejected(reason)
            }
            Admission::Approved(order) => self.submit(order).await,
        }
    }

    async fn submit(&self, order: OrderRequest) -> SignalOutcome {
        let tracked = match self.execution.create_order(order) {
            Ok(tracked) => tracked,
            Err(err) => {
                // Admission already sized the order; reaching this means a
                // degenerate quantity slipped through (for instance zero
                // equity).
                tracing::error!(error = %err, "admitted order failed validation");
                return SignalOutcome::SubmissionFailed {
                    error: err.to_string(),
                };
            }
        };
        log_audit_failure(
            self.audit
                .order_event(&self.session_id, "created", &tracked)
                .await,
        );

        match self
            .execution
            .submit_order(self.broker.as_ref(), &tracked.order_id)
            .await
        {
            Ok(_) => SignalOutcome::Submitted {
                order_id: tracked.order_id,
            },
            Err(err) => {
                if let Some(rejected) = self.execution.get_order(&tracked.order_id) {
                    log_audit_failure(
                        self.audit
                            .order_event(&self.session_id, "rejected", &rejected)
                            .await,
                    );
                }
                SignalOutcome::SubmissionFailed {
                    error: err.to_string(),
                }
            }
        }
    }

    /// Submit a market order closing the position in `symbol`.
    ///
    /// Exits bypass admission control: reducing risk is always allowed.
    /// Returns the exit order id, or `None` when there is nothing to close
    /// or an exit is already pending.
    pub async fn close_position(
        &self,
        symbol: &str,
        reason: &str,
    ) -> Result<Option<String>, BrokerError> {
        if self.has_pending_exit(symbol) {
            return Ok(None);
        }
        let (side, quantity) = {
            let portfolio = self.portfolio.lock().unwrap();
            match portfolio.get_position(symbol) {
                Some(position) => (
                    match position.side {
                        PositionSide::Long => OrderSide::Sell,
                        PositionSide::Short => OrderSide::Buy,
                    },
                    position.quantity,
                ),
                None => return Ok(None),
            }
        };

        let mut request = OrderRequest::market(symbol, side, quantity).as_exit();
        request.reasoning = Some(reason.to_string());
        let tracked = match self.execution.create_order(request) {
            Ok(tracked) => tracked,
            Err(err) => {
                tracing::error!(symbol, error = %err, "exit order failed validation");
                return Ok(None);
            }
        };
        log_audit_failure(
            self.audit
                .order_event(&self.session_id, "created", &tracked)
                .await,
        );

        self.execution
            .submit_order(self.broker.as_ref(), &tracked.order_id)
            .await?;
        tracing::info!(symbol, reason, order_id = %tracked.order_id, "position close submitted");
        Ok(Some(tracked.order_id))
    }

    /// Drive the event pump until `shutdown` fires: broker order updates,
    /// the order-timeout sweep, and stop/target monitoring.
    pub async fn run(&self, shutdown: CancellationToken) {
        let Some(mut updates) = self.broker.take_order_updates() else {
            tracing::error!("broker order-update stream already taken");
            return;
        };

        self.open_session().await;
        let mut ticker = tokio::time::interval(self.settings.monitor_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                update = updates.recv() => match update {
                    Some(update) => self.handle_order_update(update).await,
                    None => {
                        tracing::warn!("broker order-update stream closed");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.sweep_timeouts().await;
                    self.monitor_positions().await;
                }
            }
        }

        self.close_session().await;
    }

    /// Apply one broker event. Fill events for a single order arrive in
    /// emission order through the single pump; that ordering is preserved
    /// into the tracked order.
    pub async fn handle_order_update(&self, update: OrderUpdate) {
        match update {
            OrderUpdate::Fill {
                order_id,
                quantity,
                price,
                commission,
                is_complete,
            } => {
                self.handle_fill(&order_id, quantity, price, commission, is_complete)
                    .await;
            }
            OrderUpdate::Cancelled { order_id } => {
                if self.execution.mark_cancelled(&order_id, "cancelled by broker") {
                    if let Some(order) = self.execution.get_order(&order_id) {
                        log_audit_failure(
                            self.audit
                                .order_event(&self.session_id, "cancelled", &order)
                                .await,
                        );
                    }
                } else {
                    // The fill won the race; cancellation is a no-op.
                    tracing::debug!(%order_id, "cancel event after terminal state ignored");
                }
            }
            OrderUpdate::Rejected { order_id, reason } => {
                if self.execution.mark_rejected(&order_id, &reason) {
                    if let Some(order) = self.execution.get_order(&order_id) {
                        log_audit_failure(
                            self.audit
                                .order_event(&self.session_id, "rejected", &order)
                                .await,
                        );
                    }
                }
            }
        }
    }

    async fn handle_fill(
        &self,
        order_id: &str,
        quantity: Decimal,
        price: Decimal,
        commission: Decimal,
        is_complete: bool,
    ) {
        if !self
            .execution
            .update_order_fill(order_id, quantity, price, is_complete)
        {
            return;
        }
        let Some(order) = self.execution.get_order(order_id) else {
            return;
        };
        log_audit_failure(
            self.audit
                .order_event(&self.session_id, "fill", &order)
                .await,
        );
        if commission > Decimal::ZERO {
            tracing::debug!(%order_id, %commission, "fill commission");
        }

        match order.request.purpose {
            OrderPurpose::Entry => {
                let side = match order.request.side {
                    OrderSide::Buy => PositionSide::Long,
                    OrderSide::Sell => PositionSide::Short,
                };
                let (snapshot, equity) = {
                    let mut portfolio = self.portfolio.lock().unwrap();
                    portfolio.apply_entry_fill(
                        &order.request.symbol,
                        side,
                        quantity,
                        price,
                        order.request.stop_loss,
                        order.request.take_profit,
                    );
                    (
                        portfolio.get_position(&order.request.symbol).cloned(),
                        portfolio.account().equity,
                    )
                };
                self.observe_equity(equity);
                if let Some(position) = snapshot {
                    log_audit_failure(
                        self.audit
                            .position_snapshot(&self.session_id, &position)
                            .await,
                    );
                }
            }
            OrderPurpose::Exit => {
                if !is_complete {
                    return;
                }
                let exit_price = order.average_fill_price.unwrap_or(price);
                let (closed, equity) = {
                    let mut portfolio = self.portfolio.lock().unwrap();
                    let closed = portfolio.close_position(&order.request.symbol, exit_price);
                    (closed, portfolio.account().equity)
                };
                self.observe_equity(equity);
                if let Some(closed) = closed {
                    // The single point where trade outcomes feed the
                    // circuit-breaker counter.
                    self.risk.record_trade_result(&closed);
                    {
                        let mut stats = self.stats.lock().unwrap();
                        stats.trade_count += 1;
                        if closed.realized_pnl > Decimal::ZERO {
                            stats.wins += 1;
                        }
                    }
                    log_audit_failure(
                        self.audit
                            .record(
                                &self.session_id,
                                "position_closed",
                                serde_json::json!({
                                    "symbol": closed.symbol,
                                    "realized_pnl": closed.realized_pnl,
                                    "realized_pnl_pct": closed.realized_pnl_pct,
                                    "exit_price": closed.exit_price,
                                }),
                            )
                            .await,
                    );
                }
            }
        }
    }

    /// Expire orders past the wall-clock timeout and best-effort cancel them
    /// broker-side.
    pub async fn sweep_timeouts(&self) {
        for expired in self.execution.expire_stale_orders() {
            log_audit_failure(
                self.audit
                    .order_event(&self.session_id, "expired", &expired)
                    .await,
            );
            if let Err(err) = self.broker.cancel_order(&expired.order_id).await {
                tracing::warn!(
                    order_id = %expired.order_id,
                    error = %err,
                    "broker cancel for expired order failed"
                );
            }
        }
    }

    /// Refresh position marks from quotes and trigger stop/target exits.
    pub async fn monitor_positions(&self) {
        let positions = {
            let portfolio = self.portfolio.lock().unwrap();
            portfolio.positions()
        };

        for position in positions {
            let quote = match self.broker.get_quote(&position.symbol).await {
                Ok(quote) => quote,
                Err(err) => {
                    tracing::warn!(symbol = %position.symbol, error = %err, "quote fetch failed");
                    continue;
                }
            };

            let (marked, equity) = {
                let mut portfolio = self.portfolio.lock().unwrap();
                portfolio.update_price(&position.symbol, quote.mid());
                (
                    portfolio.get_position(&position.symbol).cloned(),
                    portfolio.account().equity,
                )
            };
            self.observe_equity(equity);
            let Some(marked) = marked else { continue };

            if marked.check_stop_loss() {
                if let Err(err) = self.close_position(&marked.symbol, "stop loss hit").await {
                    tracing::error!(symbol = %marked.symbol, error = %err, "stop-loss close failed");
                }
            } else if marked.check_take_profit() {
                if let Err(err) = self.close_position(&marked.symbol, "take profit hit").await {
                    tracing::error!(symbol = %marked.symbol, error = %err, "take-profit close failed");
                }
            }
        }
    }

    /// Point-in-time snapshot of account, positions, orders and risk state.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let (account, positions) = {
            let portfolio = self.portfolio.lock().unwrap();
            (portfolio.account().clone(), portfolio.positions())
        };
        EngineStatus {
            session_id: self.session_id.clone(),
            mode: self.settings.mode.clone(),
            account,
            positions,
            pending_orders: self.execution.get_pending_orders().len(),
            risk: self.risk.risk_status(),
        }
    }

    /// External session-boundary trigger: reset daily PnL tracking.
    pub fn reset_daily(&self) {
        self.portfolio.lock().unwrap().reset_daily();
        tracing::info!("daily PnL figures reset");
    }

    /// Record the closing summary in the audit trail.
    pub async fn close_session(&self) {
        let (final_balance, realized_pnl) = {
            let portfolio = self.portfolio.lock().unwrap();
            (
                portfolio.account().equity,
                portfolio.account().realized_pnl,
            )
        };
        let stats = self.stats.lock().unwrap().clone();
        let strategies = self.generator.lock().unwrap().strategy_names();
        let win_rate = if stats.trade_count > 0 {
            f64::from(stats.wins) / f64::from(stats.trade_count)
        } else {
            0.0
        };

        let summary = SessionSummary {
            mode: self.settings.mode.clone(),
            strategies,
            initial_balance: self.initial_balance,
            final_balance,
            trade_count: stats.trade_count,
            realized_pnl,
            max_drawdown: stats.max_drawdown,
            win_rate,
        };
        log_audit_failure(self.audit.session_closed(&self.session_id, &summary).await);
        tracing::info!(
            session_id = %self.session_id,
            %final_balance,
            trade_count = stats.trade_count,
            "session closed"
        );
    }

    fn has_pending_exit(&self, symbol: &str) -> bool {
        self.execution
            .get_pending_orders()
            .iter()
            .any(|o| o.request.symbol == symbol && o.request.purpose == OrderPurpose::Exit)
    }

    fn observe_equity(&self, equity: Decimal) {
        let mut stats = self.stats.lock().unwrap();
        if equity > stats.peak_equity {
            stats.peak_equity = equity;
        }
        let drawdown = stats.peak_equity - equity;
        if drawdown > stats.max_drawdown {
            stats.max_drawdown = drawdown;
        }
    }
}

fn log_audit_failure(result: Result<(), crate::audit::AuditError>) {
    if let Err(err) = result {
        // A failing sink never halts trading.
        tracing::warn!(error = %err, "audit sink failure, continuing");
    }
}
