//! Strategy interface and the fan-out signal generator.

pub mod mean_reversion;
pub mod momentum;
pub mod news_driven;

use std::collections::HashMap;

use crate::features::FeatureSnapshot;
use crate::models::Signal;
use crate::portfolio::Position;

pub use mean_reversion::{MeanReversionConfig, MeanReversionStrategy};
pub use momentum::{MomentumBreakoutConfig, MomentumBreakoutStrategy};
pub use news_driven::{NewsDrivenConfig, NewsDrivenStrategy};

/// A trading strategy: maps a feature snapshot plus current positions to
/// zero or more signals.
///
/// Implementations are pure with respect to their thresholds but may hold
/// bounded internal state for edge-triggered logic (see
/// [`MomentumBreakoutStrategy`]); that state must live in an explicit field
/// and be clearable through [`Strategy::reset`].
pub trait Strategy: Send {
    /// Stable strategy name, used in signals and the audit trail.
    fn name(&self) -> &str;

    /// Evaluate one symbol at one instant.
    fn generate_signals(
        &mut self,
        symbol: &str,
        features: &FeatureSnapshot,
        positions: &HashMap<String, Position>,
    ) -> Vec<Signal>;

    /// Clear any internal edge-trigger state.
    fn reset(&mut self) {}
}

/// Fans one feature snapshot out to every registered strategy.
///
/// Strategies run in registration order and their outputs are concatenated;
/// the order matters only for reproducibility of the output sequence.
#[derive(Default)]
pub struct SignalGenerator {
    strategies: Vec<Box<dyn Strategy>>,
}

impl SignalGenerator {
    /// Create an empty generator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Register a strategy. Evaluation follows registration order.
    pub fn register(&mut self, strategy: Box<dyn Strategy>) {
        tracing::info!(strategy = strategy.name(), "strategy registered");
        self.strategies.push(strategy);
    }

    /// Names of the registered strategies, in evaluation order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name().to_string()).collect()
    }

    /// Evaluate every strategy against one snapshot.
    pub fn generate_signals(
        &mut self,
        symbol: &str,
        features: &FeatureSnapshot,
        positions: &HashMap<String, Position>,
    ) -> Vec<Signal> {
        let mut signals = Vec::new();
        for strategy in &mut self.strategies {
            signals.extend(strategy.generate_signals(symbol, features, positions));
        }
        signals
    }

    /// Reset edge-trigger state on every strategy.
    pub fn reset(&mut self) {
        for strategy in &mut self.strategies {
            strategy.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalAction;
    use rust_decimal_macros::dec;

    struct FixedStrategy {
        name: String,
        emit: usize,
    }

    impl Strategy for FixedStrategy {
        fn name(&self) -> &str {
            &self.name
        }

        fn generate_signals(
            &mut self,
            symbol: &str,
            _features: &FeatureSnapshot,
            _positions: &HashMap<String, Position>,
        ) -> Vec<Signal> {
            (0..self.emit)
                .map(|i| {
                    Signal::new(
                        symbol,
                        SignalAction::Buy,
                        0.7,
                        dec!(0.01),
                        dec!(100),
                        self.name.clone(),
                        format!("signal {i}"),
                    )
                })
                .collect()
        }
    }

    #[test]
    fn concatenates_in_registration_order() {
        let mut generator = SignalGenerator::new();
        generator.register(Box::new(FixedStrategy {
            name: "first".to_string(),
            emit: 2,
        }));
        generator.register(Box::new(FixedStrategy {
            name: "second".to_string(),
            emit: 1,
        }));

        let signals =
            generator.generate_signals("AAPL", &FeatureSnapshot::new(), &HashMap::new());
        assert_eq!(signals.len(), 3);
        assert_eq!(signals[0].strategy_name, "first");
        assert_eq!(signals[1].strategy_name, "first");
        assert_eq!(signals[2].strategy_name, "second");
    }

    #[test]
    fn empty_generator_produces_nothing() {
        let mut generator = SignalGenerator::new();
        assert!(
            generator
                .generate_signals("AAPL", &FeatureSnapshot::new(), &HashMap::new())
                .is_empty()
        );
    }
}
