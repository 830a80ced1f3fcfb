//! Momentum breakout on a volume-confirmed moving-average crossing.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;

use crate::features::{FeatureSnapshot, keys};
use crate::models::{Signal, SignalAction};
use crate::portfolio::Position;

use super::Strategy;

/// Tunable thresholds for [`MomentumBreakoutStrategy`].
#[derive(Debug, Clone)]
pub struct MomentumBreakoutConfig {
    /// Volume ratio that confirms a breakout.
    pub volume_burst_threshold: f64,
    /// Position size as a fraction of equity.
    pub size_pct: Decimal,
    /// Stop-loss distance as a fraction of entry.
    pub stop_loss_pct: Decimal,
    /// Take-profit distance as a fraction of entry.
    pub take_profit_pct: Decimal,
    /// Minimum confidence to emit a signal.
    pub min_confidence: f64,
}

impl Default for MomentumBreakoutConfig {
    fn default() -> Self {
        Self {
            volume_burst_threshold: 1.5,
            size_pct: dec!(0.02),
            stop_loss_pct: dec!(0.02),
            take_profit_pct: dec!(0.06),
            min_confidence: 0.6,
        }
    }
}

/// Last evaluation of one symbol, for crossing detection.
#[derive(Debug, Clone, Copy)]
struct LastObservation {
    close: f64,
    sma: f64,
}

impl LastObservation {
    const fn is_above(&self) -> bool {
        self.close > self.sma
    }
}

/// Buys the transition where close crosses above its 20-period moving
/// average on a volume burst.
///
/// The trigger is the *crossing*, not the level: while price stays above the
/// average no further signals are emitted. The previous observation per
/// symbol is kept in an explicit field so the edge detector is testable and
/// resettable.
pub struct MomentumBreakoutStrategy {
    config: MomentumBreakoutConfig,
    last_seen: HashMap<String, LastObservation>,
}

impl MomentumBreakoutStrategy {
    /// Strategy name used in signals.
    pub const NAME: &'static str = "momentum_breakout";

    /// Create the strategy with the given thresholds.
    #[must_use]
    pub fn new(config: MomentumBreakoutConfig) -> Self {
        Self {
            config,
            last_seen: HashMap::new(),
        }
    }
}

impl Default for MomentumBreakoutStrategy {
    fn default() -> Self {
        Self::new(MomentumBreakoutConfig::default())
    }
}

impl Strategy for MomentumBreakoutStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn generate_signals(
        &mut self,
        symbol: &str,
        features: &FeatureSnapshot,
        positions: &HashMap<String, Position>,
    ) -> Vec<Signal> {
        if !features.has_all(&[keys::CLOSE, keys::SMA_20, keys::VOLUME_RATIO]) {
            return Vec::new();
        }

        let close = features.get(keys::CLOSE).unwrap_or_default();
        let sma = features.get(keys::SMA_20).unwrap_or_default();
        let volume_ratio = features.get(keys::VOLUME_RATIO).unwrap_or_default();

        let previous = self
            .last_seen
            .insert(symbol.to_string(), LastObservation { close, sma });

        // A crossing needs a prior observation below the average.
        let crossed_up = close > sma && previous.is_some_and(|last| !last.is_above());
        if !crossed_up
            || volume_ratio < self.config.volume_burst_threshold
            || positions.contains_key(symbol)
        {
            return Vec::new();
        }

        let confidence = (0.5 + (volume_ratio - 1.0) * 0.2).min(0.9);
        if confidence < self.config.min_confidence {
            return Vec::new();
        }

        let Some(entry) = Decimal::from_f64(close) else {
            return Vec::new();
        };
        let stop_loss = entry * (Decimal::ONE - self.config.stop_loss_pct);
        let take_profit = entry * (Decimal::ONE + self.config.take_profit_pct);

        vec![
            Signal::new(
                symbol,
                SignalAction::Buy,
                confidence,
                self.config.size_pct,
                entry,
                Self::NAME,
                format!(
                    "momentum breakout: close {close:.2} crossed above sma {sma:.2}, volume {volume_ratio:.2}x"
                ),
            )
            .with_brackets(stop_loss, take_profit),
        ]
    }

    fn reset(&mut self) {
        self.last_seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(close: f64, sma: f64, volume_ratio: f64) -> FeatureSnapshot {
        FeatureSnapshot::new()
            .with(keys::CLOSE, close)
            .with(keys::SMA_20, sma)
            .with(keys::VOLUME_RATIO, volume_ratio)
    }

    #[test]
    fn signals_only_on_the_crossing() {
        let mut strategy = MomentumBreakoutStrategy::default();
        let positions = HashMap::new();

        // First observation below the average: nothing (no prior state).
        assert!(
            strategy
                .generate_signals("AAPL", &snapshot(98.0, 100.0, 2.0), &positions)
                .is_empty()
        );

        // Crossing above with a volume burst: one signal.
        let signals = strategy.generate_signals("AAPL", &snapshot(101.0, 100.0, 2.0), &positions);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action, SignalAction::Buy);

        // Still above: suppressed, level does not re-trigger.
        assert!(
            strategy
                .generate_signals("AAPL", &snapshot(103.0, 100.0, 2.5), &positions)
                .is_empty()
        );

        // Dip below and cross again: re-armed.
        assert!(
            strategy
                .generate_signals("AAPL", &snapshot(99.0, 100.0, 1.0), &positions)
                .is_empty()
        );
        assert_eq!(
            strategy
                .generate_signals("AAPL", &snapshot(102.0, 100.0, 2.0), &positions)
                .len(),
            1
        );
    }

    #[test]
    fn first_observation_above_does_not_trigger() {
        let mut strategy = MomentumBreakoutStrategy::default();
        assert!(
            strategy
                .generate_signals("AAPL", &snapshot(105.0, 100.0, 3.0), &HashMap::new())
                .is_empty()
        );
    }

    #[test]
    fn weak_volume_suppresses_the_crossing() {
        let mut strategy = MomentumBreakoutStrategy::default();
        let positions = HashMap::new();

        strategy.generate_signals("AAPL", &snapshot(98.0, 100.0, 1.0), &positions);
        assert!(
            strategy
                .generate_signals("AAPL", &snapshot(101.0, 100.0, 1.2), &positions)
                .is_empty()
        );
    }

    #[test]
    fn state_is_per_symbol() {
        let mut strategy = MomentumBreakoutStrategy::default();
        let positions = HashMap::new();

        strategy.generate_signals("AAPL", &snapshot(98.0, 100.0, 2.0), &positions);
        // MSFT has no prior observation; its crossing state is independent.
        assert!(
            strategy
                .generate_signals("MSFT", &snapshot(101.0, 100.0, 2.0), &positions)
                .is_empty()
        );
        assert_eq!(
            strategy
                .generate_signals("AAPL", &snapshot(101.0, 100.0, 2.0), &positions)
                .len(),
            1
        );
    }

    #[test]
    fn reset_clears_edge_state() {
        let mut strategy = MomentumBreakoutStrategy::default();
        let positions = HashMap::new();

        strategy.generate_signals("AAPL", &snapshot(98.0, 100.0, 2.0), &positions);
        strategy.reset();
        // After reset the crossing cannot be detected again until re-armed.
        assert!(
            strategy
                .generate_signals("AAPL", &snapshot(101.0, 100.0, 2.0), &positions)
                .is_empty()
        );
    }
}
