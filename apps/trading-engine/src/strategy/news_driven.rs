//! News-driven entries on aggregated sentiment.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;

use crate::features::{FeatureSnapshot, keys};
use crate::models::{Signal, SignalAction};
use crate::portfolio::Position;

use super::Strategy;

/// Tunable thresholds for [`NewsDrivenStrategy`].
#[derive(Debug, Clone)]
pub struct NewsDrivenConfig {
    /// Aggregated sentiment required for an entry.
    pub sentiment_threshold: f64,
    /// Minimum article count behind the sentiment figure.
    pub min_article_count: f64,
    /// Position size as a fraction of equity.
    pub size_pct: Decimal,
    /// Stop-loss distance as a fraction of entry.
    pub stop_loss_pct: Decimal,
    /// Take-profit distance as a fraction of entry.
    pub take_profit_pct: Decimal,
    /// Minimum confidence to emit a signal.
    pub min_confidence: f64,
}

impl Default for NewsDrivenConfig {
    fn default() -> Self {
        Self {
            sentiment_threshold: 0.5,
            min_article_count: 2.0,
            size_pct: dec!(0.015),
            stop_loss_pct: dec!(0.02),
            take_profit_pct: dec!(0.05),
            min_confidence: 0.6,
        }
    }
}

/// Buys when recent sentiment is strongly positive, enough articles back it,
/// and short-term momentum is not fighting the news.
pub struct NewsDrivenStrategy {
    config: NewsDrivenConfig,
}

impl NewsDrivenStrategy {
    /// Strategy name used in signals.
    pub const NAME: &'static str = "news_driven";

    /// Create the strategy with the given thresholds.
    #[must_use]
    pub const fn new(config: NewsDrivenConfig) -> Self {
        Self { config }
    }
}

impl Default for NewsDrivenStrategy {
    fn default() -> Self {
        Self::new(NewsDrivenConfig::default())
    }
}

impl Strategy for NewsDrivenStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn generate_signals(
        &mut self,
        symbol: &str,
        features: &FeatureSnapshot,
        positions: &HashMap<String, Position>,
    ) -> Vec<Signal> {
        if !features.has_all(&[
            keys::CLOSE,
            keys::NEWS_SENTIMENT_1H,
            keys::NEWS_COUNT_1H,
            keys::MOMENTUM_5,
        ]) {
            return Vec::new();
        }
        if positions.contains_key(symbol) {
            return Vec::new();
        }

        let sentiment = features.get(keys::NEWS_SENTIMENT_1H).unwrap_or_default();
        let article_count = features.get(keys::NEWS_COUNT_1H).unwrap_or_default();
        let momentum = features.get(keys::MOMENTUM_5).unwrap_or_default();

        if sentiment < self.config.sentiment_threshold
            || article_count < self.config.min_article_count
            || momentum < 0.0
        {
            return Vec::new();
        }

        let confidence =
            (0.5 + (sentiment - self.config.sentiment_threshold) * 0.8).min(0.9);
        if confidence < self.config.min_confidence {
            return Vec::new();
        }

        let Some(entry) = features.get(keys::CLOSE).and_then(Decimal::from_f64) else {
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
                    "news driven: sentiment {sentiment:.2} over {article_count:.0} articles, momentum {momentum:.3}"
                ),
            )
            .with_brackets(stop_loss, take_profit),
        ]
    }
}
