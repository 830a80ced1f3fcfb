// Allow unwrap/expect and test-specific patterns in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Trading Engine - Rust Core Library
//!
//! Risk-bounded signal-to-execution pipeline for the Helmsman trading
//! system.
//!
//! # Pipeline
//!
//! ```text
//! feature snapshot -> SignalGenerator -> Signal(s)
//!                  -> RiskManager::validate_signal -> OrderRequest | rejection
//!                  -> ExecutionEngine::create_order -> Broker::place_order
//!                  -> asynchronous fill/cancel events
//!                  -> ExecutionEngine::update_order_fill -> Portfolio update
//!                  -> audit sink
//! ```
//!
//! # Modules
//!
//! - [`strategy`]: polymorphic strategies and the fan-out generator
//! - [`risk`]: admission control, limits, circuit breaker
//! - [`execution`]: tracked orders, the lifecycle state machine, timeouts
//! - [`broker`]: the broker capability trait, error taxonomy, retry policy
//!   and the deterministic simulator
//! - [`portfolio`]: positions and account accounting
//! - [`engine`]: the orchestration loop tying the pipeline together
//! - [`audit`], [`vault`], [`rate_limit`]: boundary ports for external
//!   collaborators

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Audit/session sink port and reference implementations.
pub mod audit;

/// Broker capability surface, error taxonomy, retry and the simulator.
pub mod broker;

/// YAML configuration loading and validation.
pub mod config;

/// Trading engine orchestration.
pub mod engine;

/// Tracked orders and the order lifecycle state machine.
pub mod execution;

/// Indicator feature snapshots.
pub mod features;

/// Shared value types (signals, orders, market data).
pub mod models;

/// Positions and account accounting.
pub mod portfolio;

/// Token-bucket rate limiting for upstream data sources.
pub mod rate_limit;

/// Admission control and risk limits.
pub mod risk;

/// Strategy interface and implementations.
pub mod strategy;

/// Tracing initialization.
pub mod telemetry;

/// Credential vault port.
pub mod vault;

pub use audit::{AuditSink, NoOpAuditSink, TracingAuditSink};
pub use broker::{
    Broker, BrokerError, BrokerOrder, OrderError, OrderUpdate, RetryPolicy, SimulatedBroker,
    SimulatorConfig,
};
pub use config::{Config, ConfigError, load_config};
pub use engine::{EngineSettings, EngineStatus, SignalOutcome, TradingEngine};
pub use execution::{ExecutionConfig, ExecutionEngine, OrderStateMachine, TrackedOrder};
pub use features::FeatureSnapshot;
pub use models::{
    Bar, BrokerAccount, OrderPurpose, OrderRequest, OrderSide, OrderStatus, OrderType, Quote,
    Signal, SignalAction, TimeInForce,
};
pub use portfolio::{AccountState, ClosedTrade, Portfolio, Position, PositionSide, SharedPortfolio};
pub use rate_limit::{RateLimiter, SourceLimit};
pub use risk::{Admission, RejectionReason, RiskLimits, RiskManager, RiskStatus};
pub use strategy::{
    MeanReversionStrategy, MomentumBreakoutStrategy, NewsDrivenStrategy, SignalGenerator, Strategy,
};
pub use vault::{CredentialVault, InMemoryVault};
