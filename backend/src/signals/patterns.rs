// =============================================================================
// Candle pattern tags (engulfing, pin bar)
// =============================================================================

use crate::market_data::Candle;

pub const TAG_ENGULFING: &str = "engulfing";
pub const TAG_PIN: &str = "pin";

const MIN_BARS: usize = 3;

/// Last candle's body is > 1.1 x the previous body, points the opposite way,
/// and its open/close straddle the previous close/open.
pub fn is_engulfing(bars: &[Candle]) -> bool {
    if bars.len() < 2 {
        return false;
    }
    let a = &bars[bars.len() - 2];
    let b = &bars[bars.len() - 1];
    if b.body() <= a.body() * 1.1 {
        return false;
    }
    let bullish = b.is_bullish() && a.is_bearish() && b.open < a.close && b.close > a.open;
    let bearish = b.is_bearish() && a.is_bullish() && b.open > a.close && b.close < a.open;
    bullish || bearish
}

/// One wick > 2 x body while the other is < 0.6 x body.
pub fn is_pin(bar: &Candle) -> bool {
    let body = bar.body();
    let upper = bar.upper_wick();
    let lower = bar.lower_wick();
    (upper > body * 2.0 && lower < body * 0.6) || (lower > body * 2.0 && upper < body * 0.6)
}

/// Tags for the pattern(s) completed by the most recent candle.
pub fn detect_patterns(bars: &[Candle]) -> Vec<&'static str> {
    let mut tags = Vec::new();
    if bars.len() < MIN_BARS {
        return tags;
    }
    if is_engulfing(bars) {
        tags.push(TAG_ENGULFING);
    }
    if let Some(last) = bars.last() {
        if is_pin(last) {
            tags.push(TAG_PIN);
        }
    }
    tags
}
