//! Indicator feature snapshots, the boundary with the upstream feature
//! producer.
//!
//! The producer computes named indicators per timestamp; strategies only ever
//! do named lookups, never time-series math. Boolean indicators arrive as
//! `0.0`/`1.0` and are read through [`FeatureSnapshot::flag`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known indicator names used by the built-in strategies.
pub mod keys {
    /// Latest close price.
    pub const CLOSE: &str = "close";
    /// Relative strength index, `[0, 100]`.
    pub const RSI: &str = "rsi";
    /// Normalized price location within the Bollinger band, `[0, 1]`.
    pub const BB_POSITION: &str = "bb_position";
    /// 20-period simple moving average of close.
    pub const SMA_20: &str = "sma_20";
    /// Volume relative to its recent average.
    pub const VOLUME_RATIO: &str = "volume_ratio";
    /// 5-period price momentum.
    pub const MOMENTUM_5: &str = "momentum_5";
    /// Aggregated news sentiment over the last hour, `[-1, 1]`.
    pub const NEWS_SENTIMENT_1H: &str = "news_sentiment_1h";
    /// Number of news articles over the last hour.
    pub const NEWS_COUNT_1H: &str = "news_count_1h";
    /// Whether any news arrived recently (boolean).
    pub const HAS_RECENT_NEWS: &str = "has_recent_news";
}

/// A named-indicator mapping for one symbol at one instant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    /// When the snapshot was computed.
    pub timestamp: Option<DateTime<Utc>>,
    values: HashMap<String, f64>,
}

impl FeatureSnapshot {
    /// Create an empty snapshot stamped now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timestamp: Some(Utc::now()),
            values: HashMap::new(),
        }
    }

    /// Builder-style insertion.
    #[must_use]
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    /// Insert or replace an indicator value.
    pub fn insert(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
    }

    /// Look up an indicator. NaN values are treated as absent.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().filter(|v| !v.is_nan())
    }

    /// Read a boolean indicator (`>= 0.5` is true, absent is false).
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| v >= 0.5)
    }

    /// Whether every named indicator is present and non-NaN.
    #[must_use]
    pub fn has_all(&self, names: &[&str]) -> bool {
        names.iter().all(|name| self.get(name).is_some())
    }

    /// Number of indicators in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot carries no indicators.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_and_flags() {
        let snapshot = FeatureSnapshot::new()
            .with(keys::RSI, 27.5)
            .with(keys::HAS_RECENT_NEWS, 1.0);

        assert_eq!(snapshot.get(keys::RSI), Some(27.5));
        assert!(snapshot.flag(keys::HAS_RECENT_NEWS));
        assert!(!snapshot.flag("is_market_open"));
        assert!(snapshot.get("missing").is_none());
    }

    #[test]
    fn nan_is_absent() {
        let snapshot = FeatureSnapshot::new().with(keys::RSI, f64::NAN);
        assert!(snapshot.get(keys::RSI).is_none());
        assert!(!snapshot.has_all(&[keys::RSI]));
    }

    #[test]
    fn has_all_requires_every_key() {
        let snapshot = FeatureSnapshot::new()
            .with(keys::CLOSE, 100.0)
            .with(keys::RSI, 50.0);
        assert!(snapshot.has_all(&[keys::CLOSE, keys::RSI]));
        assert!(!snapshot.has_all(&[keys::CLOSE, keys::BB_POSITION]));
    }
}
