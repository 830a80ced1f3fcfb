//! Trading Engine Binary
//!
//! Wires the simulator broker, risk manager, strategies and execution engine
//! together, then consumes feature snapshots from stdin (one JSON object per
//! line) and runs them through the pipeline.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin trading-engine [config.yaml] < features.jsonl
//! ```
//!
//! Feature lines look like:
//!
//! ```json
//! {"symbol": "AAPL", "features": {"rsi": 25.0, "bb_position": 0.01, "close": 96.0}}
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: log level filter (default: info)

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use trading_engine::broker::{Broker, SimulatedBroker};
use trading_engine::engine::{SignalOutcome, TradingEngine};
use trading_engine::execution::ExecutionEngine;
use trading_engine::portfolio::Portfolio;
use trading_engine::risk::RiskManager;
use trading_engine::strategy::{
    MeanReversionStrategy, MomentumBreakoutStrategy, NewsDrivenStrategy, SignalGenerator,
};
use trading_engine::{FeatureSnapshot, TracingAuditSink, load_config, telemetry};

/// One stdin line: a symbol plus its named indicators.
#[derive(Debug, Deserialize)]
struct FeatureLine {
    symbol: String,
    features: HashMap<String, f64>,
}

impl FeatureLine {
    fn snapshot(&self) -> FeatureSnapshot {
        let mut snapshot = FeatureSnapshot::new();
        for (name, value) in &self.features {
            snapshot.insert(name, *value);
        }
        snapshot
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path.as_deref())?;
    tracing::info!(mode = %config.engine.mode, "starting trading engine");

    let broker = Arc::new(SimulatedBroker::new(config.simulator_config()));
    broker.connect().await?;

    let portfolio = Portfolio::new_shared(config.simulator_config().initial_balance);
    let risk = Arc::new(RiskManager::new(
        Arc::clone(&portfolio),
        config.risk_limits(),
    ));
    let execution = Arc::new(ExecutionEngine::new(config.execution_config()));

    let mut generator = SignalGenerator::new();
    if config.strategies.mean_reversion.enabled {
        generator.register(Box::new(MeanReversionStrategy::default()));
    }
    if config.strategies.momentum_breakout.enabled {
        generator.register(Box::new(MomentumBreakoutStrategy::default()));
    }
    if config.strategies.news_driven.enabled {
        generator.register(Box::new(NewsDrivenStrategy::default()));
    }

    let engine = Arc::new(TradingEngine::new(
        Arc::clone(&broker) as Arc<dyn Broker>,
        portfolio,
        risk,
        Arc::clone(&execution),
        generator,
        Arc::new(TracingAuditSink),
        config.engine_settings(),
    ));
    tracing::info!(session_id = %engine.session_id(), "session starting");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
            shutdown.cancel();
        }
    });

    let pump = tokio::spawn({
        let engine = Arc::clone(&engine);
        let shutdown = shutdown.clone();
        async move {
            engine.run(shutdown).await;
        }
    });

    consume_feature_stream(&engine, &shutdown).await?;
    drain_pending_orders(&execution, &shutdown).await;

    shutdown.cancel();
    pump.await?;
    broker.disconnect().await?;
    Ok(())
}

/// Feed stdin feature snapshots through the pipeline until EOF or shutdown.
async fn consume_feature_stream(
    engine: &TradingEngine,
    shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            line = lines.next_line() => match line? {
                None => break,
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match serde_json::from_str::<FeatureLine>(&line) {
                    Ok(input) => {
                        let outcomes = engine.evaluate(&input.symbol, &input.snapshot()).await;
                        for (signal, outcome) in outcomes {
                            match outcome {
                                SignalOutcome::Submitted { order_id } => tracing::info!(
                                    symbol = %signal.symbol,
                                    strategy = %signal.strategy_name,
                                    %order_id,
                                    "signal submitted"
                                ),
                                SignalOutcome::Rejected(reason) => tracing::info!(
                                    symbol = %signal.symbol,
                                    strategy = %signal.strategy_name,
                                    %reason,
                                    "signal rejected"
                                ),
                                SignalOutcome::Held => {}
                                SignalOutcome::SubmissionFailed { error } => tracing::warn!(
                                    symbol = %signal.symbol,
                                    %error,
                                    "signal submission failed"
                                ),
                            }
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "skipping malformed feature line"),
                },
            }
        }
    }
    Ok(())
}

/// Give in-flight orders a chance to reach a terminal state before shutdown.
async fn drain_pending_orders(execution: &ExecutionEngine, shutdown: &CancellationToken) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !execution.get_pending_orders().is_empty() {
        if shutdown.is_cancelled() || tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
