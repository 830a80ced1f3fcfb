//! Admission control: the non-negotiable safety layer between signals and
//! orders.
//!
//! Rejections are values, not errors; turning a signal away is normal
//! risk-management behavior. Validation reads the portfolio under its lock
//! for the whole decision, so it never sees a half-applied fill.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::models::{OrderPurpose, OrderRequest, OrderType, Signal, TimeInForce};
use crate::portfolio::{ClosedTrade, SharedPortfolio};

/// Why a signal was turned away. Exactly one reason per rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    /// The order would breach the per-position or total exposure limit.
    PositionSizeExceeded,
    /// The maximum number of simultaneous positions is already open.
    MaxPositionsReached,
    /// The daily loss limit has been hit; trading is disabled for the day.
    DailyLossLimitHit,
    /// The consecutive-loss circuit breaker is active.
    CircuitBreakerActive,
    /// The symbol trades below the minimum liquidity floor.
    InsufficientLiquidity,
    /// Trading is disabled (manually or after a loss-limit trip).
    TradingDisabled,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::PositionSizeExceeded => "POSITION_SIZE_EXCEEDED",
            Self::MaxPositionsReached => "MAX_POSITIONS_REACHED",
            Self::DailyLossLimitHit => "DAILY_LOSS_LIMIT_HIT",
            Self::CircuitBreakerActive => "CIRCUIT_BREAKER_ACTIVE",
            Self::InsufficientLiquidity => "INSUFFICIENT_LIQUIDITY",
            Self::TradingDisabled => "TRADING_DISABLED",
        };
        write!(f, "{label}")
    }
}

/// Risk limit configuration. Not mutated at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Maximum single-position value as a fraction of equity.
    pub max_position_size_pct: Decimal,
    /// Maximum total exposure across positions as a fraction of equity.
    pub max_total_exposure_pct: Decimal,
    /// Daily realized loss, as a fraction of day-start equity, that disables
    /// trading.
    pub daily_loss_limit_pct: Decimal,
    /// Maximum simultaneous positions.
    pub max_positions: usize,
    /// Consecutive losing closes that trip the circuit breaker.
    pub circuit_breaker_losses: u32,
    /// Minimum average daily volume for a symbol to be tradable.
    pub min_avg_volume: u64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_size_pct: dec!(0.01),
            max_total_exposure_pct: dec!(0.05),
            daily_loss_limit_pct: dec!(0.03),
            max_positions: 3,
            circuit_breaker_losses: 3,
            min_avg_volume: 1_000_000,
        }
    }
}

/// Outcome of validating one signal.
#[derive(Debug, Clone)]
pub enum Admission {
    /// The signal passed every check; the order is ready for execution.
    Approved(OrderRequest),
    /// The signal was turned away.
    Rejected(RejectionReason),
    /// The signal was a hold; nothing to admit.
    Hold,
}

impl Admission {
    /// Whether an order was produced.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved(_))
    }
}

/// Snapshot of risk state for status reporting and audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskStatus {
    /// Whether new entries are admitted at all.
    pub trading_enabled: bool,
    /// Whether the consecutive-loss circuit breaker is tripped.
    pub circuit_breaker_active: bool,
    /// Current consecutive losing closes.
    pub consecutive_losses: u32,
    /// Open position count.
    pub open_positions: usize,
    /// Total exposure as a fraction of equity.
    pub current_exposure_pct: Decimal,
    /// Daily realized PnL as a fraction of day-start equity.
    pub daily_pnl_pct: Decimal,
}

/// Validates trading signals and enforces risk limits.
///
/// All orders come through here; execution never accepts an order that did
/// not pass [`RiskManager::validate_signal`], except engine-generated exits.
pub struct RiskManager {
    portfolio: SharedPortfolio,
    limits: RiskLimits,
    trading_enabled: AtomicBool,
    circuit_breaker_active: AtomicBool,
    consecutive_losses: AtomicU32,
    symbol_volume: Mutex<HashMap<String, u64>>,
}

impl RiskManager {
    /// Create a risk manager over a shared portfolio.
    #[must_use]
    pub fn new(portfolio: SharedPortfolio, limits: RiskLimits) -> Self {
        tracing::info!(
            max_position_size_pct = %limits.max_position_size_pct,
            max_total_exposure_pct = %limits.max_total_exposure_pct,
            daily_loss_limit_pct = %limits.daily_loss_limit_pct,
            max_positions = limits.max_positions,
            circuit_breaker_losses = limits.circuit_breaker_losses,
            "risk manager initialized"
        );
        Self {
            portfolio,
            limits,
            trading_enabled: AtomicBool::new(true),
            circuit_breaker_active: AtomicBool::new(false),
            consecutive_losses: AtomicU32::new(0),
            symbol_volume: Mutex::new(HashMap::new()),
        }
    }

    /// The configured limits.
    #[must_use]
    pub const fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Validate a signal against live portfolio state.
    pub fn validate_signal(&self, signal: &Signal) -> Admission {
        let Some(side) = signal.action.order_side() else {
            return Admission::Hold;
        };

        if !self.trading_enabled.load(Ordering::SeqCst) {
            tracing::warn!(symbol = %signal.symbol, "signal rejected: trading disabled");
            return Admission::Rejected(RejectionReason::TradingDisabled);
        }
        if self.circuit_breaker_active.load(Ordering::SeqCst) {
            tracing::warn!(symbol = %signal.symbol, "signal rejected: circuit breaker active");
            return Admission::Rejected(RejectionReason::CircuitBreakerActive);
        }

        // Everything below reads portfolio aggregates; hold the lock for the
        // whole decision so a concurrent fill cannot change them mid-check.
        let portfolio = self.portfolio.lock().unwrap();

        let daily_pnl_pct = portfolio.account().daily_pnl_pct;
        if daily_pnl_pct <= -self.limits.daily_loss_limit_pct {
            tracing::error!(
                %daily_pnl_pct,
                limit = %self.limits.daily_loss_limit_pct,
                "daily loss limit hit, disabling trading"
            );
            self.trading_enabled.store(false, Ordering::SeqCst);
            return Admission::Rejected(RejectionReason::DailyLossLimitHit);
        }

        let already_held = portfolio.get_position(&signal.symbol).is_some();
        if portfolio.position_count() >= self.limits.max_positions && !already_held {
            tracing::warn!(
                symbol = %signal.symbol,
                max_positions = self.limits.max_positions,
                "signal rejected: max positions reached"
            );
            return Admission::Rejected(RejectionReason::MaxPositionsReached);
        }

        let equity = portfolio.account().equity;
        if signal.entry_price <= Decimal::ZERO || equity <= Decimal::ZERO {
            tracing::warn!(
                symbol = %signal.symbol,
                entry_price = %signal.entry_price,
                "signal rejected: cannot size against non-positive price or equity"
            );
            return Admission::Rejected(RejectionReason::PositionSizeExceeded);
        }

        let notional = signal.size_pct * equity;
        let quantity = notional / signal.entry_price;
        if signal.size_pct > self.limits.max_position_size_pct {
            tracing::warn!(
                symbol = %signal.symbol,
                size_pct = %signal.size_pct,
                limit = %self.limits.max_position_size_pct,
                "signal rejected: position size exceeds limit"
            );
            return Admission::Rejected(RejectionReason::PositionSizeExceeded);
        }

        let new_exposure = portfolio.total_exposure() + notional / equity;
        if new_exposure > self.limits.max_total_exposure_pct {
            tracing::warn!(
                symbol = %signal.symbol,
                %new_exposure,
                limit = %self.limits.max_total_exposure_pct,
                "signal rejected: total exposure would exceed limit"
            );
            return Admission::Rejected(RejectionReason::PositionSizeExceeded);
        }

        drop(portfolio);

        // Unknown symbols pass: the floor only bites once a volume figure has
        // been cached by upstream data collection.
        let known_volume = self.symbol_volume.lock().unwrap().get(&signal.symbol).copied();
        if let Some(volume) = known_volume {
            if volume < self.limits.min_avg_volume {
                tracing::warn!(
                    symbol = %signal.symbol,
                    volume,
                    floor = self.limits.min_avg_volume,
                    "signal rejected: volume below liquidity floor"
                );
                return Admission::Rejected(RejectionReason::InsufficientLiquidity);
            }
        }

        let order = OrderRequest {
            symbol: signal.symbol.clone(),
            side,
            quantity,
            order_type: OrderType::Limit,
            limit_price: Some(signal.entry_price),
            time_in_force: TimeInForce::Day,
            purpose: OrderPurpose::Entry,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            strategy_name: Some(signal.strategy_name.clone()),
            reasoning: Some(signal.reasoning.clone()),
        };

        tracing::info!(
            symbol = %signal.symbol,
            side = %order.side,
            quantity = %order.quantity,
            entry_price = %signal.entry_price,
            strategy = %signal.strategy_name,
            "signal approved"
        );
        Admission::Approved(order)
    }

    /// Feed a closed trade into the consecutive-loss counter.
    ///
    /// Called from the single place where positions close. A losing close
    /// increments the counter and may trip the breaker; any other close
    /// resets it.
    pub fn record_trade_result(&self, trade: &ClosedTrade) {
        if trade.is_loss() {
            let losses = self.consecutive_losses.fetch_add(1, Ordering::SeqCst) + 1;
            if losses >= self.limits.circuit_breaker_losses {
                self.circuit_breaker_active.store(true, Ordering::SeqCst);
                tracing::error!(
                    consecutive_losses = losses,
                    "circuit breaker activated"
                );
            }
        } else {
            self.consecutive_losses.store(0, Ordering::SeqCst);
        }
    }

    /// Cache the average daily volume for a symbol.
    pub fn update_symbol_volume(&self, symbol: &str, avg_volume: u64) {
        self.symbol_volume
            .lock()
            .unwrap()
            .insert(symbol.to_string(), avg_volume);
    }

    /// Re-enable trading after a daily-loss trip or a manual disable.
    pub fn enable_trading(&self) {
        self.trading_enabled.store(true, Ordering::SeqCst);
        tracing::info!("trading enabled");
    }

    /// Disable all new entries.
    pub fn disable_trading(&self) {
        self.trading_enabled.store(false, Ordering::SeqCst);
        tracing::warn!("trading disabled");
    }

    /// Whether new entries are currently admitted.
    #[must_use]
    pub fn trading_enabled(&self) -> bool {
        self.trading_enabled.load(Ordering::SeqCst)
    }

    /// Whether the circuit breaker is tripped.
    #[must_use]
    pub fn circuit_breaker_active(&self) -> bool {
        self.circuit_breaker_active.load(Ordering::SeqCst)
    }

    /// Clear the circuit breaker and the loss counter (manual action).
    pub fn reset_circuit_breaker(&self) {
        self.circuit_breaker_active.store(false, Ordering::SeqCst);
        self.consecutive_losses.store(0, Ordering::SeqCst);
        tracing::info!("circuit breaker reset");
    }

    /// Current risk state for status endpoints and the audit trail.
    #[must_use]
    pub fn risk_status(&self) -> RiskStatus {
        let portfolio = self.portfolio.lock().unwrap();
        RiskStatus {
            trading_enabled: self.trading_enabled.load(Ordering::SeqCst),
            circuit_breaker_active: self.circuit_breaker_active.load(Ordering::SeqCst),
            consecutive_losses: self.consecutive_losses.load(Ordering::SeqCst),
            open_positions: portfolio.position_count(),
            current_exposure_pct: portfolio.total_exposure(),
            daily_pnl_pct: portfolio.account().daily_pnl_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalAction;
    use crate::portfolio::{Portfolio, Position, PositionSide};

    fn buy_signal(symbol: &str, size_pct: Decimal, entry: Decimal) -> Signal {
        Signal::new(
            symbol,
            SignalAction::Buy,
            0.8,
            size_pct,
            entry,
            "test",
            "unit test",
        )
    }

    fn manager_with_equity(equity: Decimal) -> RiskManager {
        RiskManager::new(Portfolio::new_shared(equity), RiskLimits::default())
    }

    #[test]
    fn approves_in_bounds_signal_with_sized_quantity() {
        let risk = manager_with_equity(dec!(100000));
        let admission = risk.validate_signal(&buy_signal("AAPL", dec!(0.01), dec!(100)));

        match admission {
            Admission::Approved(order) => {
                // 1% of 100k = 1000 notional at 100 = 10 shares.
                assert_eq!(order.quantity, dec!(10));
                assert_eq!(order.limit_price, Some(dec!(100)));
                assert_eq!(order.order_type, OrderType::Limit);
            }
            other => panic!("expected approval, got {other:?}"),
        }
    }

    #[test]
    fn oversized_signal_is_rejected() {
        let risk = manager_with_equity(dec!(100000));
        let admission = risk.validate_signal(&buy_signal("AAPL", dec!(0.02), dec!(100)));
        assert!(matches!(
            admission,
            Admission::Rejected(RejectionReason::PositionSizeExceeded)
        ));
    }

    #[test]
    fn exposure_limit_counts_existing_positions() {
        let portfolio = Portfolio::new_shared(dec!(100000));
        {
            let mut pf = portfolio.lock().unwrap();
            // 4.5% of equity already deployed.
            pf.add_position(Position::open("MSFT", PositionSide::Long, dec!(45), dec!(100)));
        }
        let risk = RiskManager::new(portfolio, RiskLimits::default());

        let admission = risk.validate_signal(&buy_signal("AAPL", dec!(0.01), dec!(100)));
        assert!(matches!(
            admission,
            Admission::Rejected(RejectionReason::PositionSizeExceeded)
        ));
    }

    #[test]
    fn daily_loss_limit_disables_trading_stickily() {
        let portfolio = Portfolio::new_shared(dec!(100000));
        {
            let mut pf = portfolio.lock().unwrap();
            pf.add_position(Position::open("MSFT", PositionSide::Long, dec!(40), dec!(100)));
            // Lose 4% of day-start equity, beyond the 3% limit.
            pf.close_position("MSFT", dec!(0));
        }
        let risk = RiskManager::new(portfolio, RiskLimits::default());

        assert!(matches!(
            risk.validate_signal(&buy_signal("AAPL", dec!(0.01), dec!(100))),
            Admission::Rejected(RejectionReason::DailyLossLimitHit)
        ));
        assert!(!risk.trading_enabled());

        // Subsequent signals see the sticky disable, not the loss limit.
        assert!(matches!(
            risk.validate_signal(&buy_signal("AAPL", dec!(0.01), dec!(100))),
            Admission::Rejected(RejectionReason::TradingDisabled)
        ));

        risk.enable_trading();
        assert!(risk.trading_enabled());
    }

    #[test]
    fn max_positions_rejects_fourth_symbol() {
        let portfolio = Portfolio::new_shared(dec!(100000));
        {
            let mut pf = portfolio.lock().unwrap();
            for symbol in ["A", "B", "C"] {
                pf.add_position(Position::open(symbol, PositionSide::Long, dec!(1), dec!(100)));
            }
        }
        let risk = RiskManager::new(portfolio, RiskLimits::default());

        assert!(matches!(
            risk.validate_signal(&buy_signal("D", dec!(0.01), dec!(100))),
            Admission::Rejected(RejectionReason::MaxPositionsReached)
        ));
    }

    #[test]
    fn liquidity_floor_uses_cached_volume() {
        let risk = manager_with_equity(dec!(100000));
        risk.update_symbol_volume("THIN", 50_000);

        assert!(matches!(
            risk.validate_signal(&buy_signal("THIN", dec!(0.01), dec!(100))),
            Admission::Rejected(RejectionReason::InsufficientLiquidity)
        ));

        // Unknown symbols pass until a volume figure is cached.
        assert!(
            risk.validate_signal(&buy_signal("AAPL", dec!(0.01), dec!(100)))
                .is_approved()
        );
    }

    #[test]
    fn circuit_breaker_trips_after_consecutive_losses() {
        let risk = manager_with_equity(dec!(100000));
        let loss = ClosedTrade {
            symbol: "AAPL".to_string(),
            side: PositionSide::Long,
            quantity: dec!(1),
            entry_price: dec!(100),
            exit_price: dec!(99),
            realized_pnl: dec!(-1),
            realized_pnl_pct: dec!(-0.01),
            closed_at: chrono::Utc::now(),
        };

        risk.record_trade_result(&loss);
        risk.record_trade_result(&loss);
        assert!(!risk.circuit_breaker_active());

        risk.record_trade_result(&loss);
        assert!(risk.circuit_breaker_active());
        assert!(matches!(
            risk.validate_signal(&buy_signal("AAPL", dec!(0.01), dec!(100))),
            Admission::Rejected(RejectionReason::CircuitBreakerActive)
        ));

        risk.reset_circuit_breaker();
        assert!(!risk.circuit_breaker_active());
    }

    #[test]
    fn winning_close_resets_loss_counter() {
        let risk = manager_with_equity(dec!(100000));
        let mut trade = ClosedTrade {
            symbol: "AAPL".to_string(),
            side: PositionSide::Long,
            quantity: dec!(1),
            entry_price: dec!(100),
            exit_price: dec!(99),
            realized_pnl: dec!(-1),
            realized_pnl_pct: dec!(-0.01),
            closed_at: chrono::Utc::now(),
        };

        risk.record_trade_result(&trade);
        risk.record_trade_result(&trade);

        trade.realized_pnl = dec!(5);
        risk.record_trade_result(&trade);

        // Two more losses should not trip a breaker configured for three.
        trade.realized_pnl = dec!(-1);
        risk.record_trade_result(&trade);
        risk.record_trade_result(&trade);
        assert!(!risk.circuit_breaker_active());
    }

    #[test]
    fn hold_signals_produce_no_admission() {
        let risk = manager_with_equity(dec!(100000));
        let signal = Signal::new(
            "AAPL",
            SignalAction::Hold,
            0.5,
            dec!(0),
            dec!(100),
            "test",
            "hold",
        );
        assert!(matches!(risk.validate_signal(&signal), Admission::Hold));
    }
}
