//! Mean reversion on RSI extremes near the Bollinger band edges.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;

use crate::features::{FeatureSnapshot, keys};
use crate::models::{Signal, SignalAction};
use crate::portfolio::Position;

use super::Strategy;

/// Tunable thresholds for [`MeanReversionStrategy`].
#[derive(Debug, Clone)]
pub struct MeanReversionConfig {
    /// RSI below this is oversold.
    pub rsi_oversold: f64,
    /// RSI above this is overbought.
    pub rsi_overbought: f64,
    /// Distance from a band edge that counts as a touch.
    pub bb_touch_threshold: f64,
    /// Position size as a fraction of equity.
    pub size_pct: Decimal,
    /// Stop-loss distance as a fraction of entry.
    pub stop_loss_pct: Decimal,
    /// Take-profit distance as a fraction of entry.
    pub take_profit_pct: Decimal,
    /// Minimum confidence to emit a signal.
    pub min_confidence: f64,
}

impl Default for MeanReversionConfig {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            bb_touch_threshold: 0.02,
            size_pct: dec!(0.01),
            stop_loss_pct: dec!(0.02),
            take_profit_pct: dec!(0.03),
            min_confidence: 0.5,
        }
    }
}

/// Buys oversold touches of the lower band, sells overbought touches of the
/// upper band. Confidence scales with how far RSI is past its threshold.
pub struct MeanReversionStrategy {
    config: MeanReversionConfig,
}

impl MeanReversionStrategy {
    /// Strategy name used in signals.
    pub const NAME: &'static str = "mean_reversion";

    /// Create the strategy with the given thresholds.
    #[must_use]
    pub const fn new(config: MeanReversionConfig) -> Self {
        Self { config }
    }

    fn entry_signal(
        &self,
        symbol: &str,
        action: SignalAction,
        confidence: f64,
        close: Decimal,
        rsi: f64,
        bb_position: f64,
    ) -> Signal {
        let (stop_loss, take_profit) = match action {
            SignalAction::Sell => (
                close * (Decimal::ONE + self.config.stop_loss_pct),
                close * (Decimal::ONE - self.config.take_profit_pct),
            ),
            _ => (
                close * (Decimal::ONE - self.config.stop_loss_pct),
                close * (Decimal::ONE + self.config.take_profit_pct),
            ),
        };
        Signal::new(
            symbol,
            action,
            confidence,
            self.config.size_pct,
            close,
            Self::NAME,
            format!("mean reversion: rsi={rsi:.1}, bb_position={bb_position:.3}"),
        )
        .with_brackets(stop_loss, take_profit)
    }
}

impl Default for MeanReversionStrategy {
    fn default() -> Self {
        Self::new(MeanReversionConfig::default())
    }
}

impl Strategy for MeanReversionStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn generate_signals(
        &mut self,
        symbol: &str,
        features: &FeatureSnapshot,
        positions: &HashMap<String, Position>,
    ) -> Vec<Signal> {
        if !features.has_all(&[keys::RSI, keys::BB_POSITION, keys::CLOSE]) {
            return Vec::new();
        }
        // Entries only; exits are handled by stop/target monitoring.
        if positions.contains_key(symbol) {
            return Vec::new();
        }

        let rsi = features.get(keys::RSI).unwrap_or_default();
        let bb_position = features.get(keys::BB_POSITION).unwrap_or_default();
        let Some(close) = features.get(keys::CLOSE).and_then(Decimal::from_f64) else {
            return Vec::new();
        };

        if rsi < self.config.rsi_oversold && bb_position < self.config.bb_touch_threshold {
            let confidence = (0.5 + (self.config.rsi_oversold - rsi) / 100.0).min(0.9);
            if confidence >= self.config.min_confidence {
                return vec![self.entry_signal(
                    symbol,
                    SignalAction::Buy,
                    confidence,
                    close,
                    rsi,
                    bb_position,
                )];
            }
        } else if rsi > self.config.rsi_overbought
            && bb_position > 1.0 - self.config.bb_touch_threshold
        {
            let confidence = (0.5 + (rsi - self.config.rsi_overbought) / 100.0).min(0.9);
            if confidence >= self.config.min_confidence {
                return vec![self.entry_signal(
                    symbol,
                    SignalAction::Sell,
                    confidence,
                    close,
                    rsi,
                    bb_position,
                )];
            }
        }

        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::PositionSide;

    fn oversold_snapshot() -> FeatureSnapshot {
        FeatureSnapshot::new()
            .with(keys::RSI, 25.0)
            .with(keys::BB_POSITION, 0.01)
            .with(keys::CLOSE, 96.0)
    }

    #[test]
    fn oversold_touch_produces_buy() {
        let mut strategy = MeanReversionStrategy::default();
        let signals =
            strategy.generate_signals("AAPL", &oversold_snapshot(), &HashMap::new());

        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.action, SignalAction::Buy);
        assert!(signal.confidence > 0.5);
        assert_eq!(signal.entry_price, dec!(96));
        assert_eq!(signal.stop_loss, Some(dec!(94.08)));
        assert_eq!(signal.take_profit, Some(dec!(98.88)));
    }

    #[test]
    fn confidence_scales_with_rsi_depth() {
        let mut strategy = MeanReversionStrategy::default();
        let shallow = FeatureSnapshot::new()
            .with(keys::RSI, 29.0)
            .with(keys::BB_POSITION, 0.01)
            .with(keys::CLOSE, 96.0);
        let deep = FeatureSnapshot::new()
            .with(keys::RSI, 10.0)
            .with(keys::BB_POSITION, 0.01)
            .with(keys::CLOSE, 96.0);

        let shallow_conf = strategy.generate_signals("AAPL", &shallow, &HashMap::new())[0]
            .confidence;
        let deep_conf = strategy.generate_signals("AAPL", &deep, &HashMap::new())[0].confidence;
        assert!(deep_conf > shallow_conf);
        assert!(deep_conf <= 0.9);
    }

    #[test]
    fn overbought_touch_produces_sell() {
        let mut strategy = MeanReversionStrategy::default();
        let snapshot = FeatureSnapshot::new()
            .with(keys::RSI, 78.0)
            .with(keys::BB_POSITION, 0.99)
            .with(keys::CLOSE, 200.0);

        let signals = strategy.generate_signals("TSLA", &snapshot, &HashMap::new());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action, SignalAction::Sell);
        assert_eq!(signals[0].stop_loss, Some(dec!(204.00)));
    }

    #[test]
    fn neutral_rsi_is_quiet() {
        let mut strategy = MeanReversionStrategy::default();
        let snapshot = FeatureSnapshot::new()
            .with(keys::RSI, 50.0)
            .with(keys::BB_POSITION, 0.5)
            .with(keys::CLOSE, 100.0);
        assert!(
            strategy
                .generate_signals("AAPL", &snapshot, &HashMap::new())
                .is_empty()
        );
    }

    #[test]
    fn held_symbol_gets_no_entry() {
        let mut strategy = MeanReversionStrategy::default();
        let mut positions = HashMap::new();
        positions.insert(
            "AAPL".to_string(),
            Position::open("AAPL", PositionSide::Long, dec!(10), dec!(95)),
        );
        assert!(
            strategy
                .generate_signals("AAPL", &oversold_snapshot(), &positions)
                .is_empty()
        );
    }

    #[test]
    fn missing_features_are_quiet() {
        let mut strategy = MeanReversionStrategy::default();
        let snapshot = FeatureSnapshot::new().with(keys::RSI, 25.0);
        assert!(
            strategy
                .generate_signals("AAPL", &snapshot, &HashMap::new())
                .is_empty()
        );
    }
}
