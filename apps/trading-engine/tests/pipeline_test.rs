//! End-to-end pipeline tests against the deterministic simulator.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use trading_engine::audit::NoOpAuditSink;
use trading_engine::broker::{Broker, SimulatedBroker, SimulatorConfig};
use trading_engine::engine::{EngineSettings, SignalOutcome, TradingEngine};
use trading_engine::execution::{ExecutionConfig, ExecutionEngine};
use trading_engine::features::{FeatureSnapshot, keys};
use trading_engine::models::OrderStatus;
use trading_engine::portfolio::{Portfolio, PositionSide, SharedPortfolio};
use trading_engine::risk::{RiskLimits, RiskManager};
use trading_engine::strategy::{MeanReversionStrategy, SignalGenerator};

struct Harness {
    broker: Arc<SimulatedBroker>,
    portfolio: SharedPortfolio,
    risk: Arc<RiskManager>,
    execution: Arc<ExecutionEngine>,
    engine: Arc<TradingEngine>,
}

fn harness(simulator: SimulatorConfig, execution_config: ExecutionConfig) -> Harness {
    let broker = Arc::new(SimulatedBroker::new(simulator));
    let portfolio = Portfolio::new_shared(dec!(100000));
    let risk = Arc::new(RiskManager::new(
        Arc::clone(&portfolio),
        RiskLimits::default(),
    ));
    let execution = Arc::new(ExecutionEngine::new(execution_config));

    let mut generator = SignalGenerator::new();
    generator.register(Box::new(MeanReversionStrategy::default()));

    let engine = Arc::new(TradingEngine::new(
        Arc::clone(&broker) as Arc<dyn Broker>,
        Arc::clone(&portfolio),
        Arc::clone(&risk),
        Arc::clone(&execution),
        generator,
        Arc::new(NoOpAuditSink),
        EngineSettings {
            mode: "simulated".to_string(),
            monitor_interval: Duration::from_millis(25),
        },
    ));

    Harness {
        broker,
        portfolio,
        risk,
        execution,
        engine,
    }
}

fn instant_fill_sim() -> SimulatorConfig {
    SimulatorConfig {
        fill_delay: Duration::from_millis(0),
        slippage_bps: 0,
        ..Default::default()
    }
}

fn oversold_features() -> FeatureSnapshot {
    FeatureSnapshot::new()
        .with(keys::RSI, 25.0)
        .with(keys::BB_POSITION, 0.01)
        .with(keys::CLOSE, 96.0)
}

async fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// The full happy path: an oversold snapshot becomes exactly one BUY
/// signal, admission sizes a positive quantity, the order fills at the
/// entry price, and closing three dollars higher realizes exactly
/// `3 × quantity`.
#[tokio::test]
async fn mean_reversion_signal_to_realized_pnl() {
    let h = harness(instant_fill_sim(), ExecutionConfig::default());
    h.broker.connect().await.unwrap();
    h.broker.set_price("AAPL", dec!(96));

    let shutdown = CancellationToken::new();
    let pump = tokio::spawn({
        let engine = Arc::clone(&h.engine);
        let shutdown = shutdown.clone();
        async move { engine.run(shutdown).await }
    });

    // One buy signal, confidence above 0.5, admitted with positive quantity.
    let outcomes = h.engine.evaluate("AAPL", &oversold_features()).await;
    assert_eq!(outcomes.len(), 1);
    let (signal, outcome) = &outcomes[0];
    assert!(signal.confidence > 0.5);
    let order_id = match outcome {
        SignalOutcome::Submitted { order_id } => order_id.clone(),
        other => panic!("expected submission, got {other:?}"),
    };
    let tracked = h.execution.get_order(&order_id).unwrap();
    assert!(tracked.request.quantity > Decimal::ZERO);

    // The entry fill creates the position at the limit price.
    assert!(
        wait_until(
            || {
                h.portfolio
                    .lock()
                    .unwrap()
                    .get_position("AAPL")
                    .is_some()
            },
            Duration::from_secs(2)
        )
        .await
    );
    let quantity = {
        let portfolio = h.portfolio.lock().unwrap();
        let position = portfolio.get_position("AAPL").unwrap();
        assert_eq!(position.side, PositionSide::Long);
        assert_eq!(position.entry_price, dec!(96));
        position.quantity
    };
    assert_eq!(
        h.execution.get_order(&order_id).unwrap().status,
        OrderStatus::Filled
    );

    // Close at 99: the market exit fills at the fill-time bid of 99.
    h.broker.set_price("AAPL", dec!(99));
    h.engine.close_position("AAPL", "test close").await.unwrap();

    assert!(
        wait_until(
            || {
                h.portfolio
                    .lock()
                    .unwrap()
                    .get_position("AAPL")
                    .is_none()
            },
            Duration::from_secs(2)
        )
        .await
    );
    let realized = h.portfolio.lock().unwrap().account().realized_pnl;
    assert_eq!(realized, (dec!(99) - dec!(96)) * quantity);

    shutdown.cancel();
    pump.await.unwrap();
}

/// A take-profit hit is detected by the position monitor and closed without
/// any external prompt.
#[tokio::test]
async fn take_profit_triggers_automatic_close() {
    let h = harness(instant_fill_sim(), ExecutionConfig::default());
    h.broker.connect().await.unwrap();
    h.broker.set_price("AAPL", dec!(96));

    let shutdown = CancellationToken::new();
    let pump = tokio::spawn({
        let engine = Arc::clone(&h.engine);
        let shutdown = shutdown.clone();
        async move { engine.run(shutdown).await }
    });

    h.engine.evaluate("AAPL", &oversold_features()).await;
    assert!(
        wait_until(
            || {
                h.portfolio
                    .lock()
                    .unwrap()
                    .get_position("AAPL")
                    .is_some()
            },
            Duration::from_secs(2)
        )
        .await
    );

    // Take profit sits at 96 * 1.03 = 98.88; 99 is through it.
    h.broker.set_price("AAPL", dec!(99));

    assert!(
        wait_until(
            || {
                h.portfolio
                    .lock()
                    .unwrap()
                    .get_position("AAPL")
                    .is_none()
            },
            Duration::from_secs(2)
        )
        .await
    );
    let account = h.portfolio.lock().unwrap().account().clone();
    assert!(account.realized_pnl > Decimal::ZERO);
    // A winning close leaves the breaker untouched.
    assert!(!h.risk.circuit_breaker_active());

    shutdown.cancel();
    pump.await.unwrap();
}

/// Orders the broker never acknowledges are expired by the wall-clock sweep
/// with a diagnostic distinct from cancellation.
#[tokio::test]
async fn unacknowledged_orders_expire() {
    let slow_sim = SimulatorConfig {
        fill_delay: Duration::from_secs(30),
        slippage_bps: 0,
        ..Default::default()
    };
    let fast_timeout = ExecutionConfig {
        order_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let h = harness(slow_sim, fast_timeout);
    h.broker.connect().await.unwrap();
    h.broker.set_price("AAPL", dec!(96));

    let shutdown = CancellationToken::new();
    let pump = tokio::spawn({
        let engine = Arc::clone(&h.engine);
        let shutdown = shutdown.clone();
        async move { engine.run(shutdown).await }
    });

    let outcomes = h.engine.evaluate("AAPL", &oversold_features()).await;
    let order_id = match &outcomes[0].1 {
        SignalOutcome::Submitted { order_id } => order_id.clone(),
        other => panic!("expected submission, got {other:?}"),
    };

    assert!(
        wait_until(
            || {
                h.execution
                    .get_order(&order_id)
                    .is_some_and(|o| o.status == OrderStatus::Expired)
            },
            Duration::from_secs(2)
        )
        .await
    );
    let expired = h.execution.get_order(&order_id).unwrap();
    assert!(
        expired
            .status_reason
            .as_deref()
            .unwrap()
            .contains("no broker acknowledgment")
    );
    // No position was ever created.
    assert!(h.portfolio.lock().unwrap().get_position("AAPL").is_none());

    shutdown.cancel();
    pump.await.unwrap();
}

/// Concurrent orders on distinct symbols all complete, whatever the fill
/// interleaving, and the portfolio ends with one position per symbol.
#[tokio::test]
async fn concurrent_fills_across_symbols() {
    let h = harness(
        SimulatorConfig {
            fill_delay: Duration::from_millis(20),
            slippage_bps: 0,
            ..Default::default()
        },
        ExecutionConfig::default(),
    );
    h.broker.connect().await.unwrap();

    let shutdown = CancellationToken::new();
    let pump = tokio::spawn({
        let engine = Arc::clone(&h.engine);
        let shutdown = shutdown.clone();
        async move { engine.run(shutdown).await }
    });

    let symbols = ["AAPL", "MSFT", "NVDA"];
    for symbol in symbols {
        h.broker.set_price(symbol, dec!(96));
        let outcomes = h.engine.evaluate(symbol, &oversold_features()).await;
        assert!(
            matches!(outcomes[0].1, SignalOutcome::Submitted { .. }),
            "{symbol} should be admitted"
        );
    }

    assert!(
        wait_until(
            || h.portfolio.lock().unwrap().position_count() == symbols.len(),
            Duration::from_secs(2)
        )
        .await
    );
    {
        let portfolio = h.portfolio.lock().unwrap();
        for symbol in symbols {
            assert_eq!(
                portfolio.get_position(symbol).unwrap().entry_price,
                dec!(96)
            );
        }
        // Three 1% entries: exposure stays within the 5% limit.
        assert!(portfolio.total_exposure() <= dec!(0.05));
    }

    shutdown.cancel();
    pump.await.unwrap();
}

/// A fourth signal with three positions open is rejected at admission, end
/// to end.
#[tokio::test]
async fn max_positions_enforced_through_pipeline() {
    let h = harness(instant_fill_sim(), ExecutionConfig::default());
    h.broker.connect().await.unwrap();

    let shutdown = CancellationToken::new();
    let pump = tokio::spawn({
        let engine = Arc::clone(&h.engine);
        let shutdown = shutdown.clone();
        async move { engine.run(shutdown).await }
    });

    for symbol in ["AAPL", "MSFT", "NVDA"] {
        h.broker.set_price(symbol, dec!(96));
        h.engine.evaluate(symbol, &oversold_features()).await;
    }
    assert!(
        wait_until(
            || h.portfolio.lock().unwrap().position_count() == 3,
            Duration::from_secs(2)
        )
        .await
    );

    h.broker.set_price("TSLA", dec!(96));
    let outcomes = h.engine.evaluate("TSLA", &oversold_features()).await;
    assert!(matches!(
        outcomes[0].1,
        SignalOutcome::Rejected(trading_engine::risk::RejectionReason::MaxPositionsReached)
    ));

    shutdown.cancel();
    pump.await.unwrap();
}
