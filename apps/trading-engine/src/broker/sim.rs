//! Deterministic execution simulator.
//!
//! Fills orders asynchronously after a configurable delay against synthetic
//! prices, with configurable slippage and commission models. Given a seed and
//! a fill delay, a run is reproducible.
//!
//! Submission and fill are distinct events: market orders price themselves
//! off the quote at *fill* time, not at submission time. Limit orders fill at
//! the limit when it is marketable against the last price, and are rejected
//! otherwise (no resting book in the simulator).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

use crate::models::{Bar, BrokerAccount, OrderRequest, OrderSide, OrderStatus, OrderType, Quote};
use crate::portfolio::{Position, PositionSide};

use super::{Broker, BrokerError, BrokerOrder, OrderError, OrderUpdate};

/// Simulator tuning knobs.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Starting cash balance.
    pub initial_balance: Decimal,
    /// Commission charged per share.
    pub commission_per_share: Decimal,
    /// Fixed commission charged per trade.
    pub commission_per_trade: Decimal,
    /// Slippage applied to market fills, in basis points.
    pub slippage_bps: u32,
    /// Delay between order acceptance and fill.
    pub fill_delay: Duration,
    /// Seed for the synthetic price generator.
    pub seed: u64,
    /// Reject orders outside regular trading hours.
    pub enforce_market_hours: bool,
    /// Tradable universe. `None` admits any symbol, pricing it on demand.
    pub symbols: Option<Vec<String>>,
    /// Lower bound for synthetic prices.
    pub price_floor: Decimal,
    /// Upper bound for synthetic prices.
    pub price_ceiling: Decimal,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            initial_balance: dec!(100000),
            commission_per_share: Decimal::ZERO,
            commission_per_trade: Decimal::ZERO,
            slippage_bps: 5,
            fill_delay: Duration::from_millis(1000),
            seed: 42,
            enforce_market_hours: false,
            symbols: None,
            price_floor: dec!(10),
            price_ceiling: dec!(500),
        }
    }
}

/// Mutable simulator state behind one lock.
#[derive(Debug)]
struct SimState {
    prices: HashMap<String, Decimal>,
    orders: HashMap<String, BrokerOrder>,
    positions: HashMap<String, Position>,
    cash: Decimal,
    rng: StdRng,
}

/// Local execution simulator implementing [`Broker`].
#[derive(Debug)]
pub struct SimulatedBroker {
    config: SimulatorConfig,
    connected: Arc<AtomicBool>,
    state: Arc<Mutex<SimState>>,
    events_tx: mpsc::UnboundedSender<OrderUpdate>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<OrderUpdate>>>,
}

impl SimulatedBroker {
    /// Create a simulator from config.
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = SimState {
            prices: HashMap::new(),
            orders: HashMap::new(),
            positions: HashMap::new(),
            cash: config.initial_balance,
            rng: StdRng::seed_from_u64(config.seed),
        };
        Self {
            config,
            connected: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(state)),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Pin the last-trade price for a symbol.
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        let mut state = self.state.lock().unwrap();
        state.prices.insert(symbol.to_string(), price);
    }

    /// Whether the simulated market is currently open.
    ///
    /// Regular hours are approximated as 14:30-21:00 UTC on weekdays.
    #[must_use]
    pub fn is_market_open(&self) -> bool {
        if !self.config.enforce_market_hours {
            return true;
        }
        let now = Utc::now();
        if now.weekday().number_from_monday() > 5 {
            return false;
        }
        let minutes = now.hour() * 60 + now.minute();
        (14 * 60 + 30..=21 * 60).contains(&minutes)
    }

    fn require_connected(&self) -> Result<(), BrokerError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::connection("not connected to simulator"))
        }
    }

    /// Last-trade price, generating one deterministically for unseen symbols
    /// inside the configured universe.
    fn price_of(state: &mut SimState, config: &SimulatorConfig, symbol: &str) -> Option<Decimal> {
        if let Some(price) = state.prices.get(symbol) {
            return Some(*price);
        }
        if let Some(universe) = &config.symbols {
            if !universe.iter().any(|s| s == symbol) {
                return None;
            }
        }
        let floor_cents = (config.price_floor * dec!(100)).to_i64().unwrap_or(1000);
        let ceiling_cents = (config.price_ceiling * dec!(100)).to_i64().unwrap_or(50000);
        let cents = state.rng.random_range(floor_cents..=ceiling_cents);
        let price = Decimal::new(cents, 2);
        state.prices.insert(symbol.to_string(), price);
        Some(price)
    }

    /// Quote construction: bid at the last price, ask one spread above.
    fn quote_from_price(symbol: &str, price: Decimal) -> Quote {
        let spread = (price * dec!(0.001)).max(dec!(0.01));
        Quote {
            symbol: symbol.to_string(),
            bid: price,
            ask: price + spread,
        }
    }

    fn commission_for(&self, quantity: Decimal) -> Decimal {
        self.config.commission_per_share * quantity + self.config.commission_per_trade
    }

    /// Merge a fill into the simulator's own position book.
    fn apply_fill_to_book(state: &mut SimState, request: &OrderRequest, fill_price: Decimal) {
        let quantity = request.quantity;
        let opens = match request.side {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        };

        match state.positions.get_mut(&request.symbol) {
            Some(position) if position.side == opens => {
                let total = position.quantity + quantity;
                position.entry_price =
                    (position.entry_price * position.quantity + fill_price * quantity) / total;
                position.quantity = total;
                position.update_price(fill_price);
            }
            Some(position) => {
                if quantity < position.quantity {
                    position.quantity -= quantity;
                    position.update_price(fill_price);
                } else {
                    let excess = quantity - position.quantity;
                    state.positions.remove(&request.symbol);
                    if excess > Decimal::ZERO {
                        let opened =
                            Position::open(request.symbol.clone(), opens, excess, fill_price);
                        state.positions.insert(request.symbol.clone(), opened);
                    }
                }
            }
            None => {
                let opened = Position::open(request.symbol.clone(), opens, quantity, fill_price);
                state.positions.insert(request.symbol.clone(), opened);
            }
        }
    }

    /// The asynchronous fill task spawned per accepted order.
    async fn process_order(
        state: Arc<Mutex<SimState>>,
        connected: Arc<AtomicBool>,
        events_tx: mpsc::UnboundedSender<OrderUpdate>,
        config: SimulatorConfig,
        order_id: String,
    ) {
        tokio::time::sleep(config.fill_delay).await;

        // A disconnect leaves the order pending; the engine's timeout sweep
        // will expire it.
        if !connected.load(Ordering::SeqCst) {
            return;
        }

        let mut state = state.lock().unwrap();
        let Some(order) = state.orders.get(&order_id) else {
            return;
        };
        if order.status != OrderStatus::Pending {
            return;
        }
        let request = order.request.clone();

        let Some(last_price) = Self::price_of(&mut state, &config, &request.symbol) else {
            Self::reject(&mut state, &events_tx, &order_id, "symbol price unavailable");
            return;
        };

        let slippage = Decimal::new(i64::from(config.slippage_bps), 4);
        let fill_price = match request.order_type {
            OrderType::Market => {
                // Price off the quote at fill time, slipped adversely.
                let quote = Self::quote_from_price(&request.symbol, last_price);
                match request.side {
                    OrderSide::Buy => quote.ask * (Decimal::ONE + slippage),
                    OrderSide::Sell => quote.bid * (Decimal::ONE - slippage),
                }
            }
            OrderType::Limit => {
                let limit = request.limit_price.unwrap_or(last_price);
                let marketable = match request.side {
                    OrderSide::Buy => limit >= last_price,
                    OrderSide::Sell => limit <= last_price,
                };
                if !marketable {
                    Self::reject(&mut state, &events_tx, &order_id, "limit price not marketable");
                    return;
                }
                limit
            }
        };

        let commission =
            config.commission_per_share * request.quantity + config.commission_per_trade;
        let notional = fill_price * request.quantity;
        match request.side {
            OrderSide::Buy => state.cash -= notional + commission,
            OrderSide::Sell => state.cash += notional - commission,
        }
        Self::apply_fill_to_book(&mut state, &request, fill_price);

        if let Some(order) = state.orders.get_mut(&order_id) {
            order.status = OrderStatus::Filled;
            order.filled_quantity = request.quantity;
            order.average_fill_price = Some(fill_price);
        }

        tracing::debug!(
            order_id = %order_id,
            symbol = %request.symbol,
            side = %request.side,
            %fill_price,
            "simulated fill"
        );
        let _ = events_tx.send(OrderUpdate::Fill {
            order_id,
            quantity: request.quantity,
            price: fill_price,
            commission,
            is_complete: true,
        });
    }

    fn reject(
        state: &mut SimState,
        events_tx: &mpsc::UnboundedSender<OrderUpdate>,
        order_id: &str,
        reason: &str,
    ) {
        if let Some(order) = state.orders.get_mut(order_id) {
            order.status = OrderStatus::Rejected;
        }
        let _ = events_tx.send(OrderUpdate::Rejected {
            order_id: order_id.to_string(),
            reason: reason.to_string(),
        });
    }

    fn position_equity(position: &Position) -> Decimal {
        match position.side {
            PositionSide::Long => position.entry_price * position.quantity + position.unrealized_pnl,
            PositionSide::Short => position.unrealized_pnl - position.entry_price * position.quantity,
        }
    }
}

#[async_trait]
impl Broker for SimulatedBroker {
    async fn connect(&self) -> Result<bool, BrokerError> {
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!("connected to simulator");
        Ok(true)
    }

    async fn disconnect(&self) -> Result<bool, BrokerError> {
        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("disconnected from simulator");
        Ok(true)
    }

    async fn get_account(&self) -> Result<BrokerAccount, BrokerError> {
        self.require_connected()?;
        let state = self.state.lock().unwrap();
        let position_value: Decimal = state.positions.values().map(Self::position_equity).sum();
        Ok(BrokerAccount {
            account_id: "simulator".to_string(),
            cash: state.cash,
            equity: state.cash + position_value,
            buying_power: state.cash,
            updated_at: Utc::now(),
        })
    }

    async fn get_positions(&self) -> Result<Vec<Position>, BrokerError> {
        self.require_connected()?;
        let state = self.state.lock().unwrap();
        Ok(state.positions.values().cloned().collect())
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<Position>, BrokerError> {
        self.require_connected()?;
        let state = self.state.lock().unwrap();
        Ok(state.positions.get(symbol).cloned())
    }

    async fn get_bars(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>, BrokerError> {
        self.require_connected()?;
        let mut state = self.state.lock().unwrap();
        let base = Self::price_of(&mut state, &self.config, symbol).ok_or_else(|| {
            OrderError::SymbolNotFound {
                symbol: symbol.to_string(),
            }
        })?;

        // Forward random walk ending now; most recent bar last.
        let now = Utc::now();
        let mut bars = Vec::with_capacity(limit);
        let mut price = base;
        for i in 0..limit {
            let change_bps = state.rng.random_range(-200_i64..=200);
            let close = price * (Decimal::ONE + Decimal::new(change_bps, 4));
            let (high, low) = if close > price {
                (close, price)
            } else {
                (price, close)
            };
            let minutes_back = (limit - 1 - i) as i64;
            bars.push(Bar {
                symbol: symbol.to_string(),
                timestamp: now - chrono::Duration::minutes(minutes_back),
                open: price,
                high,
                low,
                close,
                volume: state.rng.random_range(1_000..10_000),
            });
            price = close;
        }
        Ok(bars)
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, BrokerError> {
        self.require_connected()?;
        let mut state = self.state.lock().unwrap();
        let price = Self::price_of(&mut state, &self.config, symbol).ok_or_else(|| {
            OrderError::SymbolNotFound {
                symbol: symbol.to_string(),
            }
        })?;
        Ok(Self::quote_from_price(symbol, price))
    }

    async fn place_order(
        &self,
        order_id: &str,
        request: OrderRequest,
    ) -> Result<BrokerOrder, BrokerError> {
        self.require_connected()?;
        if !self.is_market_open() {
            return Err(OrderError::MarketClosed.into());
        }
        request.validate().map_err(|e| OrderError::Invalid {
            message: e.to_string(),
        })?;

        let order = {
            let mut state = self.state.lock().unwrap();
            let price =
                Self::price_of(&mut state, &self.config, &request.symbol).ok_or_else(|| {
                    OrderError::SymbolNotFound {
                        symbol: request.symbol.clone(),
                    }
                })?;

            if request.side == OrderSide::Buy {
                let required = price * request.quantity + self.commission_for(request.quantity);
                if required > state.cash {
                    return Err(OrderError::InsufficientFunds {
                        required,
                        available: state.cash,
                    }
                    .into());
                }
            }

            let order = BrokerOrder {
                order_id: order_id.to_string(),
                request,
                status: OrderStatus::Pending,
                filled_quantity: Decimal::ZERO,
                average_fill_price: None,
                submitted_at: Utc::now(),
            };
            state.orders.insert(order_id.to_string(), order.clone());
            order
        };

        tokio::spawn(Self::process_order(
            Arc::clone(&self.state),
            Arc::clone(&self.connected),
            self.events_tx.clone(),
            self.config.clone(),
            order_id.to_string(),
        ));

        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool, BrokerError> {
        self.require_connected()?;
        let mut state = self.state.lock().unwrap();
        match state.orders.get_mut(order_id) {
            Some(order) if order.status.is_active() => {
                order.status = OrderStatus::Cancelled;
                let _ = self.events_tx.send(OrderUpdate::Cancelled {
                    order_id: order_id.to_string(),
                });
                Ok(true)
            }
            // Terminal or unknown: cancellation has no effect, which is not
            // an error (the fill may simply have won the race).
            _ => Ok(false),
        }
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<BrokerOrder>, BrokerError> {
        self.require_connected()?;
        let state = self.state.lock().unwrap();
        Ok(state.orders.get(order_id).cloned())
    }

    async fn get_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        self.require_connected()?;
        let state = self.state.lock().unwrap();
        Ok(state.orders.values().cloned().collect())
    }

    fn take_order_updates(&self) -> Option<mpsc::UnboundedReceiver<OrderUpdate>> {
        self.events_rx.lock().unwrap().take()
    }
}
