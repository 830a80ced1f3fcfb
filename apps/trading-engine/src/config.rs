//! Engine configuration.
//!
//! Loaded from YAML with serde defaults for every field, then validated
//! before any component is built. Sections convert into the typed configs
//! their components consume.

use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::broker::{RetryPolicy, SimulatorConfig};
use crate::engine::EngineSettings;
use crate::execution::ExecutionConfig;
use crate::risk::RiskLimits;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse the YAML.
    #[error("failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// A value failed validation.
    #[error("config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Engine orchestration settings.
    #[serde(default)]
    pub engine: EngineSection,
    /// Simulator broker settings.
    #[serde(default)]
    pub simulator: SimulatorSection,
    /// Risk limits.
    #[serde(default)]
    pub risk: RiskSection,
    /// Execution settings.
    #[serde(default)]
    pub execution: ExecutionSection,
    /// Strategy toggles and thresholds.
    #[serde(default)]
    pub strategies: StrategiesSection,
}

/// Engine orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Trading mode label for the audit trail.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Position monitor and timeout sweep cadence, in milliseconds.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            monitor_interval_ms: default_monitor_interval_ms(),
        }
    }
}

/// Simulator broker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorSection {
    /// Starting cash balance.
    #[serde(default = "default_initial_balance")]
    pub initial_balance: f64,
    /// Commission per share.
    #[serde(default)]
    pub commission_per_share: f64,
    /// Fixed commission per trade.
    #[serde(default)]
    pub commission_per_trade: f64,
    /// Market-order slippage in basis points.
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    /// Delay between order acceptance and fill, in milliseconds.
    #[serde(default = "default_fill_delay_ms")]
    pub fill_delay_ms: u64,
    /// Seed for the synthetic price generator.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Reject orders outside regular trading hours.
    #[serde(default)]
    pub enforce_market_hours: bool,
    /// Tradable universe; empty admits any symbol.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Lower bound for synthetic prices.
    #[serde(default = "default_price_floor")]
    pub price_floor: f64,
    /// Upper bound for synthetic prices.
    #[serde(default = "default_price_ceiling")]
    pub price_ceiling: f64,
}

impl Default for SimulatorSection {
    fn default() -> Self {
        Self {
            initial_balance: default_initial_balance(),
            commission_per_share: 0.0,
            commission_per_trade: 0.0,
            slippage_bps: default_slippage_bps(),
            fill_delay_ms: default_fill_delay_ms(),
            seed: default_seed(),
            enforce_market_hours: false,
            symbols: Vec::new(),
            price_floor: default_price_floor(),
            price_ceiling: default_price_ceiling(),
        }
    }
}

/// Risk limit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSection {
    /// Maximum single-position value as a fraction of equity.
    #[serde(default = "default_max_position_size_pct")]
    pub max_position_size_pct: f64,
    /// Maximum total exposure as a fraction of equity.
    #[serde(default = "default_max_total_exposure_pct")]
    pub max_total_exposure_pct: f64,
    /// Daily loss fraction that disables trading.
    #[serde(default = "default_daily_loss_limit_pct")]
    pub daily_loss_limit_pct: f64,
    /// Maximum simultaneous positions.
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    /// Consecutive losses that trip the circuit breaker.
    #[serde(default = "default_circuit_breaker_losses")]
    pub circuit_breaker_losses: u32,
    /// Minimum average daily volume per symbol.
    #[serde(default = "default_min_avg_volume")]
    pub min_avg_volume: u64,
}

impl Default for RiskSection {
    fn default() -> Self {
        Self {
            max_position_size_pct: default_max_position_size_pct(),
            max_total_exposure_pct: default_max_total_exposure_pct(),
            daily_loss_limit_pct: default_daily_loss_limit_pct(),
            max_positions: default_max_positions(),
            circuit_breaker_losses: default_circuit_breaker_losses(),
            min_avg_volume: default_min_avg_volume(),
        }
    }
}

/// Execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSection {
    /// Seconds an order may stay non-terminal before the sweep expires it.
    #[serde(default = "default_order_timeout_secs")]
    pub order_timeout_secs: u64,
    /// Retries for transient submission failures.
    #[serde(default = "default_max_order_retry")]
    pub max_order_retry: u32,
    /// Initial retry backoff, in milliseconds.
    #[serde(default = "default_retry_initial_backoff_ms")]
    pub retry_initial_backoff_ms: u64,
    /// Maximum retry backoff, in milliseconds.
    #[serde(default = "default_retry_max_backoff_ms")]
    pub retry_max_backoff_ms: u64,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            order_timeout_secs: default_order_timeout_secs(),
            max_order_retry: default_max_order_retry(),
            retry_initial_backoff_ms: default_retry_initial_backoff_ms(),
            retry_max_backoff_ms: default_retry_max_backoff_ms(),
        }
    }
}

/// Per-strategy toggle plus its headline threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyToggle {
    /// Whether the strategy is registered.
    pub enabled: bool,
}

/// Strategy toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategiesSection {
    /// Mean reversion strategy.
    #[serde(default = "enabled_toggle")]
    pub mean_reversion: StrategyToggle,
    /// Momentum breakout strategy.
    #[serde(default = "enabled_toggle")]
    pub momentum_breakout: StrategyToggle,
    /// News-driven strategy.
    #[serde(default = "disabled_toggle")]
    pub news_driven: StrategyToggle,
}

impl Default for StrategiesSection {
    fn default() -> Self {
        Self {
            mean_reversion: enabled_toggle(),
            momentum_breakout: enabled_toggle(),
            news_driven: disabled_toggle(),
        }
    }
}

const fn enabled_toggle() -> StrategyToggle {
    StrategyToggle { enabled: true }
}

const fn disabled_toggle() -> StrategyToggle {
    StrategyToggle { enabled: false }
}

fn default_mode() -> String {
    "simulated".to_string()
}
const fn default_monitor_interval_ms() -> u64 {
    1000
}
const fn default_initial_balance() -> f64 {
    100_000.0
}
const fn default_slippage_bps() -> u32 {
    5
}
const fn default_fill_delay_ms() -> u64 {
    1000
}
const fn default_seed() -> u64 {
    42
}
const fn default_price_floor() -> f64 {
    10.0
}
const fn default_price_ceiling() -> f64 {
    500.0
}
const fn default_max_position_size_pct() -> f64 {
    0.01
}
const fn default_max_total_exposure_pct() -> f64 {
    0.05
}
const fn default_daily_loss_limit_pct() -> f64 {
    0.03
}
const fn default_max_positions() -> usize {
    3
}
const fn default_circuit_breaker_losses() -> u32 {
    3
}
const fn default_min_avg_volume() -> u64 {
    1_000_000
}
const fn default_order_timeout_secs() -> u64 {
    300
}
const fn default_max_order_retry() -> u32 {
    3
}
const fn default_retry_initial_backoff_ms() -> u64 {
    250
}
const fn default_retry_max_backoff_ms() -> u64 {
    5000
}

impl Config {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn fraction(name: &str, value: f64) -> Result<(), ConfigError> {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
            Ok(())
        }

        if self.simulator.initial_balance <= 0.0 || !self.simulator.initial_balance.is_finite() {
            return Err(ConfigError::ValidationError(format!(
                "simulator.initial_balance must be positive, got {}",
                self.simulator.initial_balance
            )));
        }
        if self.simulator.price_floor <= 0.0
            || self.simulator.price_floor >= self.simulator.price_ceiling
        {
            return Err(ConfigError::ValidationError(
                "simulator price bounds must satisfy 0 < floor < ceiling".to_string(),
            ));
        }
        fraction("risk.max_position_size_pct", self.risk.max_position_size_pct)?;
        fraction("risk.max_total_exposure_pct", self.risk.max_total_exposure_pct)?;
        fraction("risk.daily_loss_limit_pct", self.risk.daily_loss_limit_pct)?;
        if self.risk.max_positions == 0 {
            return Err(ConfigError::ValidationError(
                "risk.max_positions must be at least 1".to_string(),
            ));
        }
        if self.execution.order_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "execution.order_timeout_secs must be positive".to_string(),
            ));
        }
        if self.engine.monitor_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "engine.monitor_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Typed simulator config. Call after [`Config::validate`].
    #[must_use]
    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            initial_balance: to_decimal(self.simulator.initial_balance),
            commission_per_share: to_decimal(self.simulator.commission_per_share),
            commission_per_trade: to_decimal(self.simulator.commission_per_trade),
            slippage_bps: self.simulator.slippage_bps,
            fill_delay: Duration::from_millis(self.simulator.fill_delay_ms),
            seed: self.simulator.seed,
            enforce_market_hours: self.simulator.enforce_market_hours,
            symbols: if self.simulator.symbols.is_empty() {
                None
            } else {
                Some(self.simulator.symbols.clone())
            },
            price_floor: to_decimal(self.simulator.price_floor),
            price_ceiling: to_decimal(self.simulator.price_ceiling),
        }
    }

    /// Typed risk limits. Call after [`Config::validate`].
    #[must_use]
    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            max_position_size_pct: to_decimal(self.risk.max_position_size_pct),
            max_total_exposure_pct: to_decimal(self.risk.max_total_exposure_pct),
            daily_loss_limit_pct: to_decimal(self.risk.daily_loss_limit_pct),
            max_positions: self.risk.max_positions,
            circuit_breaker_losses: self.risk.circuit_breaker_losses,
            min_avg_volume: self.risk.min_avg_volume,
        }
    }

    /// Typed execution config. Call after [`Config::validate`].
    #[must_use]
    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            order_timeout: Duration::from_secs(self.execution.order_timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.execution.max_order_retry,
                initial_backoff: Duration::from_millis(self.execution.retry_initial_backoff_ms),
                max_backoff: Duration::from_millis(self.execution.retry_max_backoff_ms),
                ..Default::default()
            },
        }
    }

    /// Typed engine settings. Call after [`Config::validate`].
    #[must_use]
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            mode: self.engine.mode.clone(),
            monitor_interval: Duration::from_millis(self.engine.monitor_interval_ms),
        }
    }
}

/// Load configuration from an optional YAML file path.
///
/// `None` yields the built-in defaults, already validated.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config = match path {
        None => Config::default(),
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
                path: path.display().to_string(),
                source,
            })?;
            serde_yaml_bw::from_str(&raw)?
        }
    };
    config.validate()?;
    Ok(config)
}

fn to_decimal(value: f64) -> Decimal {
    // Validation has already rejected non-finite values.
    Decimal::from_f64(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.risk.max_positions, 3);
        assert_eq!(config.execution.order_timeout_secs, 300);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: Config = serde_yaml_bw::from_str(
            r"
            simulator:
              initial_balance: 50000.0
              fill_delay_ms: 0
            risk:
              max_positions: 5
            ",
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.simulator.initial_balance, 50_000.0);
        assert_eq!(config.risk.max_positions, 5);
        // Untouched fields keep their defaults.
        assert_eq!(config.simulator.slippage_bps, 5);
        assert_eq!(config.risk.circuit_breaker_losses, 3);
    }

    #[test]
    fn typed_conversions_round_numbers() {
        let config = Config::default();
        let limits = config.risk_limits();
        assert_eq!(limits.max_position_size_pct, dec!(0.01));
        assert_eq!(limits.daily_loss_limit_pct, dec!(0.03));

        let sim = config.simulator_config();
        assert_eq!(sim.initial_balance, dec!(100000));
        assert_eq!(sim.fill_delay, Duration::from_millis(1000));
    }

    #[test]
    fn out_of_range_fraction_rejected() {
        let mut config = Config::default();
        config.risk.max_position_size_pct = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = Config::default();
        config.execution.order_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_price_bounds_rejected() {
        let mut config = Config::default();
        config.simulator.price_floor = 600.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load_config(Some(Path::new("/nonexistent/config.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
