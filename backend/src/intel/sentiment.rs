use std::sync::Arc;

use anyhow::{bail, Result};

use super::SentimentSource;
use crate::market_data::{BarStore, Candle};

const MIN_BARS: usize = 10;
const LOOKBACK: usize = 50;
const NEUTRAL_VOLATILITY: f64 = 50.0;

/// Local sentiment derived from recent volatility: calm markets read as
/// mildly positive, wild ones as negative.
///
/// volScore  = min(100, round(range of last 50 bars / last close x 1000))
/// sentiment = clamp(70 - volScore / 2, 0, 100)
pub struct VolatilitySentiment {
    store: Arc<BarStore>,
}

impl VolatilitySentiment {
    pub fn new(store: Arc<BarStore>) -> Self {
        Self { store }
    }
}

/// Volatility score of the last 50 bars; fewer than 10 bars is neutral.
pub fn volatility_score(bars: &[Candle]) -> f64 {
    if bars.len() < MIN_BARS {
        return NEUTRAL_VOLATILITY;
    }
    let recent = &bars[bars.len().saturating_sub(LOOKBACK)..];
    let high = recent.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = recent.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let last_close = recent[recent.len() - 1].close;
    let denom = if last_close != 0.0 { last_close } else { 1.0 };
    ((high - low) / denom * 1000.0).round().min(100.0)
}

pub fn sentiment_from_volatility(vol_score: f64) -> f64 {
    (70.0 - vol_score / 2.0).clamp(0.0, 100.0)
}

impl SentimentSource for VolatilitySentiment {
    fn sentiment(&self, instrument: &str) -> Result<f64> {
        let bars = self.store.recent(instrument, LOOKBACK);
        let value = sentiment_from_volatility(volatility_score(&bars));
        if !value.is_finite() {
            bail!("non-finite sentiment for {instrument}");
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_history_is_neutral_volatility() {
        let store = Arc::new(BarStore::new(100, 1));
        for t in 0..5 {
            store.ingest("EUR/USD", 1.09, 1.0, t);
        }
        let s = VolatilitySentiment::new(store).sentiment("EUR/USD").unwrap();
        assert_eq!(s, 45.0);
    }

    #[test]
    fn flat_market_is_mildly_positive() {
        let store = Arc::new(BarStore::new(100, 1));
        for t in 0..60 {
            store.ingest("EUR/USD", 1.09, 1.0, t);
        }
        let s = VolatilitySentiment::new(store).sentiment("EUR/USD").unwrap();
        assert_eq!(s, 70.0);
    }

    #[test]
    fn wild_market_is_negative() {
        let store = Arc::new(BarStore::new(100, 1));
        for t in 0..60 {
            let p = if t % 2 == 0 { 100.0 } else { 115.0 };
            store.ingest("BTC", p, 1.0, t);
        }
        // Range 15 on ~115 => volScore capped at 100 => sentiment 20.
        let s = VolatilitySentiment::new(store).sentiment("BTC").unwrap();
        assert_eq!(s, 20.0);
    }
}
