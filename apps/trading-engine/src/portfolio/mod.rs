//! Position and account accounting.
//!
//! The portfolio is the book of record for risk decisions. It is mutated only
//! from execution callbacks (fills, closes, price updates) and read under the
//! same lock that admission control takes, so validation always sees a
//! consistent snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    /// Profits when price rises.
    Long,
    /// Profits when price falls.
    Short,
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// An open position in one symbol. At most one per symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Symbol held.
    pub symbol: String,
    /// Long or short.
    pub side: PositionSide,
    /// Shares held, always positive.
    pub quantity: Decimal,
    /// Average entry price.
    pub entry_price: Decimal,
    /// When the position was opened.
    pub entry_time: DateTime<Utc>,
    /// Protective stop level.
    pub stop_loss: Option<Decimal>,
    /// Profit target level.
    pub take_profit: Option<Decimal>,
    /// Last observed price.
    pub current_price: Decimal,
    /// Mark-to-market profit at `current_price`.
    pub unrealized_pnl: Decimal,
    /// `unrealized_pnl` as a fraction of entry notional.
    pub unrealized_pnl_pct: Decimal,
}

impl Position {
    /// Open a new position at `entry_price`.
    #[must_use]
    pub fn open(
        symbol: impl Into<String>,
        side: PositionSide,
        quantity: Decimal,
        entry_price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            entry_price,
            entry_time: Utc::now(),
            stop_loss: None,
            take_profit: None,
            current_price: entry_price,
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_pct: Decimal::ZERO,
        }
    }

    /// Attach stop-loss and take-profit levels.
    #[must_use]
    pub const fn with_brackets(
        mut self,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }

    /// Market value at the last observed price.
    #[must_use]
    pub fn market_value(&self) -> Decimal {
        self.current_price * self.quantity
    }

    /// Entry notional plus unrealized PnL; what closing now would return.
    #[must_use]
    pub fn carrying_value(&self) -> Decimal {
        self.entry_price * self.quantity + self.unrealized_pnl
    }

    /// Recompute mark-to-market PnL against `price`.
    pub fn update_price(&mut self, price: Decimal) {
        self.current_price = price;
        let delta = match self.side {
            PositionSide::Long => price - self.entry_price,
            PositionSide::Short => self.entry_price - price,
        };
        self.unrealized_pnl = delta * self.quantity;
        let notional = self.entry_price * self.quantity;
        self.unrealized_pnl_pct = if notional > Decimal::ZERO {
            self.unrealized_pnl / notional
        } else {
            Decimal::ZERO
        };
    }

    /// Whether the last observed price has reached or passed the stop level
    /// in the adverse direction. The boundary is inclusive: a price exactly
    /// at the stop counts as hit.
    #[must_use]
    pub fn check_stop_loss(&self) -> bool {
        self.stop_loss.is_some_and(|stop| match self.side {
            PositionSide::Long => self.current_price <= stop,
            PositionSide::Short => self.current_price >= stop,
        })
    }

    /// Whether the last observed price has reached or passed the profit
    /// target. Inclusive boundary, mirroring [`Position::check_stop_loss`].
    #[must_use]
    pub fn check_take_profit(&self) -> bool {
        self.take_profit.is_some_and(|target| match self.side {
            PositionSide::Long => self.current_price >= target,
            PositionSide::Short => self.current_price <= target,
        })
    }
}

/// Cash and PnL state of the trading account.
///
/// `equity = cash + Σ position carrying value` at every observation. Daily
/// figures reset at an externally triggered session boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountState {
    /// Free cash (entry notional is escrowed while a position is open).
    pub cash: Decimal,
    /// Total account value.
    pub equity: Decimal,
    /// Balance the account started with.
    pub initial_balance: Decimal,
    /// Lifetime realized PnL.
    pub realized_pnl: Decimal,
    /// Realized PnL since the last session boundary.
    pub daily_pnl: Decimal,
    /// `daily_pnl` as a fraction of equity at the session boundary.
    pub daily_pnl_pct: Decimal,
    /// Equity at the last session boundary.
    pub day_start_equity: Decimal,
}

impl AccountState {
    fn new(initial_balance: Decimal) -> Self {
        Self {
            cash: initial_balance,
            equity: initial_balance,
            initial_balance,
            realized_pnl: Decimal::ZERO,
            daily_pnl: Decimal::ZERO,
            daily_pnl_pct: Decimal::ZERO,
            day_start_equity: initial_balance,
        }
    }
}

/// Result of closing a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    /// Symbol that was closed.
    pub symbol: String,
    /// Direction of the closed position.
    pub side: PositionSide,
    /// Shares closed.
    pub quantity: Decimal,
    /// Average entry price.
    pub entry_price: Decimal,
    /// Price the close executed at.
    pub exit_price: Decimal,
    /// Realized profit or loss.
    pub realized_pnl: Decimal,
    /// `realized_pnl` as a fraction of entry notional.
    pub realized_pnl_pct: Decimal,
    /// When the close was applied.
    pub closed_at: DateTime<Utc>,
}

impl ClosedTrade {
    /// Whether the trade lost money.
    #[must_use]
    pub fn is_loss(&self) -> bool {
        self.realized_pnl < Decimal::ZERO
    }
}

/// The set of open positions plus account state.
#[derive(Debug)]
pub struct Portfolio {
    positions: HashMap<String, Position>,
    account: AccountState,
}

/// Shared handle to a [`Portfolio`]. The single mutex is the serialization
/// point for portfolio-wide aggregates: admission control and fill
/// application both go through it.
pub type SharedPortfolio = Arc<Mutex<Portfolio>>;

impl Portfolio {
    /// Create a portfolio with `initial_balance` in cash and no positions.
    #[must_use]
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            positions: HashMap::new(),
            account: AccountState::new(initial_balance),
        }
    }

    /// Create a shared, lock-guarded portfolio.
    #[must_use]
    pub fn new_shared(initial_balance: Decimal) -> SharedPortfolio {
        Arc::new(Mutex::new(Self::new(initial_balance)))
    }

    /// Account snapshot.
    #[must_use]
    pub const fn account(&self) -> &AccountState {
        &self.account
    }

    /// Open position for `symbol`, if any.
    #[must_use]
    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Number of open positions.
    #[must_use]
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// All open positions.
    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    /// Add a new position, escrowing its entry notional from cash.
    ///
    /// Returns `false` without mutating anything if a position for the
    /// symbol already exists; there is no averaging-in here.
    pub fn add_position(&mut self, position: Position) -> bool {
        if self.positions.contains_key(&position.symbol) {
            tracing::warn!(symbol = %position.symbol, "position already exists, not adding");
            return false;
        }
        self.account.cash -= position.entry_price * position.quantity;
        self.positions.insert(position.symbol.clone(), position);
        self.recompute_equity();
        true
    }

    /// Apply an entry fill: create the position on first fill, merge further
    /// fills of the same order at a quantity-weighted entry price.
    pub fn apply_entry_fill(
        &mut self,
        symbol: &str,
        side: PositionSide,
        quantity: Decimal,
        fill_price: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) {
        if let Some(position) = self.positions.get_mut(symbol) {
            let total = position.quantity + quantity;
            if total > Decimal::ZERO {
                position.entry_price = (position.entry_price * position.quantity
                    + fill_price * quantity)
                    / total;
            }
            position.quantity = total;
            position.update_price(fill_price);
            self.account.cash -= fill_price * quantity;
        } else {
            let position = Position::open(symbol, side, quantity, fill_price)
                .with_brackets(stop_loss, take_profit);
            self.account.cash -= fill_price * quantity;
            self.positions.insert(symbol.to_string(), position);
        }
        self.recompute_equity();
    }

    /// Recompute unrealized PnL for `symbol` against `price`.
    pub fn update_price(&mut self, symbol: &str, price: Decimal) {
        if let Some(position) = self.positions.get_mut(symbol) {
            position.update_price(price);
            self.recompute_equity();
        }
    }

    /// Close the position for `symbol` at `exit_price`.
    ///
    /// Removes the position, returns the escrowed entry notional plus the
    /// realized PnL to cash, and rolls the PnL into the lifetime and daily
    /// figures. This is the single point where trade outcomes exist; the
    /// caller reports the result to the risk manager's loss counter.
    pub fn close_position(&mut self, symbol: &str, exit_price: Decimal) -> Option<ClosedTrade> {
        let mut position = self.positions.remove(symbol)?;
        position.update_price(exit_price);

        let realized_pnl = position.unrealized_pnl;
        let entry_notional = position.entry_price * position.quantity;
        let realized_pnl_pct = if entry_notional > Decimal::ZERO {
            realized_pnl / entry_notional
        } else {
            Decimal::ZERO
        };

        self.account.cash += entry_notional + realized_pnl;
        self.account.realized_pnl += realized_pnl;
        self.account.daily_pnl += realized_pnl;
        self.account.daily_pnl_pct = if self.account.day_start_equity > Decimal::ZERO {
            self.account.daily_pnl / self.account.day_start_equity
        } else {
            Decimal::ZERO
        };
        self.recompute_equity();

        Some(ClosedTrade {
            symbol: position.symbol,
            side: position.side,
            quantity: position.quantity,
            entry_price: position.entry_price,
            exit_price,
            realized_pnl,
            realized_pnl_pct,
            closed_at: Utc::now(),
        })
    }

    /// Total open exposure as a fraction of equity.
    #[must_use]
    pub fn total_exposure(&self) -> Decimal {
        if self.account.equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let exposure: Decimal = self.positions.values().map(Position::market_value).sum();
        exposure / self.account.equity
    }

    /// Reset daily PnL tracking at a session boundary.
    pub fn reset_daily(&mut self) {
        self.account.daily_pnl = Decimal::ZERO;
        self.account.daily_pnl_pct = Decimal::ZERO;
        self.account.day_start_equity = self.account.equity;
    }

    fn recompute_equity(&mut self) {
        let carrying: Decimal = self.positions.values().map(Position::carrying_value).sum();
        self.account.equity = self.account.cash + carrying;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long_position(symbol: &str, quantity: Decimal, entry: Decimal) -> Position {
        Position::open(symbol, PositionSide::Long, quantity, entry)
    }

    #[test]
    fn add_position_rejects_duplicate_symbol() {
        let mut portfolio = Portfolio::new(dec!(100000));
        assert!(portfolio.add_position(long_position("AAPL", dec!(10), dec!(100))));
        assert!(!portfolio.add_position(long_position("AAPL", dec!(5), dec!(101))));
        assert_eq!(portfolio.position_count(), 1);
    }

    #[test]
    fn long_unrealized_pnl() {
        let mut portfolio = Portfolio::new(dec!(100000));
        portfolio.add_position(long_position("AAPL", dec!(10), dec!(100)));
        portfolio.update_price("AAPL", dec!(105));

        let position = portfolio.get_position("AAPL").unwrap();
        assert_eq!(position.unrealized_pnl, dec!(50));
        assert_eq!(position.unrealized_pnl_pct, dec!(0.05));
    }

    #[test]
    fn short_unrealized_pnl_is_negated() {
        let mut portfolio = Portfolio::new(dec!(100000));
        portfolio.add_position(Position::open("TSLA", PositionSide::Short, dec!(10), dec!(200)));
        portfolio.update_price("TSLA", dec!(210));

        let position = portfolio.get_position("TSLA").unwrap();
        assert_eq!(position.unrealized_pnl, dec!(-100));
    }

    #[test]
    fn close_reproduces_last_unrealized_pnl() {
        let mut portfolio = Portfolio::new(dec!(100000));
        portfolio.add_position(long_position("AAPL", dec!(10), dec!(96)));
        portfolio.update_price("AAPL", dec!(99));
        let unrealized = portfolio.get_position("AAPL").unwrap().unrealized_pnl;

        let closed = portfolio.close_position("AAPL", dec!(99)).unwrap();
        assert_eq!(closed.realized_pnl, unrealized);
        assert_eq!(closed.realized_pnl, dec!(30));
        assert!(portfolio.get_position("AAPL").is_none());
        assert_eq!(portfolio.account().realized_pnl, dec!(30));
    }

    #[test]
    fn equity_is_continuous_across_open_and_close() {
        let mut portfolio = Portfolio::new(dec!(100000));
        assert_eq!(portfolio.account().equity, dec!(100000));

        portfolio.add_position(long_position("AAPL", dec!(10), dec!(100)));
        assert_eq!(portfolio.account().equity, dec!(100000));
        assert_eq!(portfolio.account().cash, dec!(99000));

        portfolio.update_price("AAPL", dec!(110));
        assert_eq!(portfolio.account().equity, dec!(100100));

        portfolio.close_position("AAPL", dec!(110));
        assert_eq!(portfolio.account().equity, dec!(100100));
        assert_eq!(portfolio.account().cash, dec!(100100));
    }

    #[test]
    fn stop_loss_boundary_is_inclusive() {
        let mut position =
            long_position("AAPL", dec!(10), dec!(100)).with_brackets(Some(dec!(95)), None);

        position.update_price(dec!(96));
        assert!(!position.check_stop_loss());

        position.update_price(dec!(95));
        assert!(position.check_stop_loss());

        position.update_price(dec!(94));
        assert!(position.check_stop_loss());
    }

    #[test]
    fn short_stop_loss_trips_on_rising_price() {
        let mut position = Position::open("TSLA", PositionSide::Short, dec!(5), dec!(200))
            .with_brackets(Some(dec!(210)), None);

        position.update_price(dec!(209));
        assert!(!position.check_stop_loss());
        position.update_price(dec!(210));
        assert!(position.check_stop_loss());
    }

    #[test]
    fn take_profit_boundary() {
        let mut position =
            long_position("AAPL", dec!(10), dec!(100)).with_brackets(None, Some(dec!(103)));

        position.update_price(dec!(102.99));
        assert!(!position.check_take_profit());
        position.update_price(dec!(103));
        assert!(position.check_take_profit());
    }

    #[test]
    fn daily_pnl_tracks_closes_and_resets() {
        let mut portfolio = Portfolio::new(dec!(100000));
        portfolio.add_position(long_position("AAPL", dec!(10), dec!(100)));
        portfolio.close_position("AAPL", dec!(90));

        assert_eq!(portfolio.account().daily_pnl, dec!(-100));
        assert_eq!(portfolio.account().daily_pnl_pct, dec!(-0.001));

        portfolio.reset_daily();
        assert_eq!(portfolio.account().daily_pnl, Decimal::ZERO);
        assert_eq!(portfolio.account().day_start_equity, dec!(99900));
    }

    #[test]
    fn total_exposure_fraction() {
        let mut portfolio = Portfolio::new(dec!(100000));
        portfolio.add_position(long_position("AAPL", dec!(10), dec!(100)));
        portfolio.add_position(long_position("MSFT", dec!(10), dec!(200)));

        // 1000 + 2000 over 100000 equity
        assert_eq!(portfolio.total_exposure(), dec!(0.03));
    }

    #[test]
    fn entry_fill_merge_weights_entry_price() {
        let mut portfolio = Portfolio::new(dec!(100000));
        portfolio.apply_entry_fill("AAPL", PositionSide::Long, dec!(5), dec!(100), None, None);
        portfolio.apply_entry_fill("AAPL", PositionSide::Long, dec!(5), dec!(102), None, None);

        let position = portfolio.get_position("AAPL").unwrap();
        assert_eq!(position.quantity, dec!(10));
        assert_eq!(position.entry_price, dec!(101));
    }
}
