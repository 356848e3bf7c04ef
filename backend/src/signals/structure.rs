// =============================================================================
// Market structure detectors
// =============================================================================
//
// Boolean / ternary flags read from aggregated candle series:
//
//   order block   — 1m: previous body > 1.4 x mean body of the last 10 bars,
//                   and the last bar closes opposite to the previous one
//   fair-value gap — 1m: the bar two-before-last and the bar before last do
//                   not overlap (a.high < b.low or a.low > b.high)
//   BOS / CHOCH   — 5m: last close vs previous close
//   round number  — last close within 0.08% of the nearest integer
//   volume spike  — last volume > 2.2 x mean volume of the prior bars
//   long wick     — either wick larger than 3 x body
//
// All functions are pure and return `false` / `None` on undersized input.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

const ORDER_BLOCK_MIN_BARS: usize = 4;
const ORDER_BLOCK_LOOKBACK: usize = 10;
const ORDER_BLOCK_BODY_MULT: f64 = 1.4;
const BOS_MIN_BARS: usize = 6;
const ROUND_NUMBER_TOLERANCE: f64 = 0.0008;
const VOLUME_SPIKE_MULT: f64 = 2.2;
const LONG_WICK_MULT: f64 = 3.0;

/// Direction of a break of structure on the 5-minute series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bos {
    #[serde(rename = "BOS_UP")]
    Up,
    #[serde(rename = "BOS_DOWN")]
    Down,
}

impl std::fmt::Display for Bos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "BOS_UP"),
            Self::Down => write!(f, "BOS_DOWN"),
        }
    }
}

/// Large-bodied candle followed by an opposite-direction close.
pub fn order_block(m1: &[Candle]) -> bool {
    if m1.len() < ORDER_BLOCK_MIN_BARS {
        return false;
    }
    let prev = &m1[m1.len() - 2];
    let last = &m1[m1.len() - 1];

    let lookback = &m1[m1.len().saturating_sub(ORDER_BLOCK_LOOKBACK)..];
    let avg_body = (lookback.iter().map(Candle::body).sum::<f64>() / lookback.len() as f64).max(1e-6);

    let reversal = (last.is_bullish() && prev.is_bearish()) || (last.is_bearish() && prev.is_bullish());
    prev.body() > avg_body * ORDER_BLOCK_BODY_MULT && reversal
}

/// Gap between the bar two-before-last and the bar before last.
pub fn fair_value_gap(m1: &[Candle]) -> bool {
    if m1.len() < 3 {
        return false;
    }
    let a = &m1[m1.len() - 3];
    let b = &m1[m1.len() - 2];
    a.high < b.low || a.low > b.high
}

/// Compare the last two 5-minute closes. Equal closes yield `None`.
pub fn break_of_structure(m5: &[Candle]) -> Option<Bos> {
    if m5.len() < BOS_MIN_BARS {
        return None;
    }
    let last = m5[m5.len() - 1].close;
    let prev = m5[m5.len() - 2].close;
    if last > prev {
        Some(Bos::Up)
    } else if last < prev {
        Some(Bos::Down)
    } else {
        None
    }
}

pub fn near_round_number(price: f64) -> bool {
    if !price.is_finite() || price <= 0.0 {
        return false;
    }
    (price.round() - price).abs() < price * ROUND_NUMBER_TOLERANCE
}

/// Last volume versus the mean of everything before it.
pub fn volume_spike(series: &[Candle]) -> bool {
    let Some((last, prior)) = series.split_last() else {
        return false;
    };
    let avg = if prior.is_empty() {
        0.0
    } else {
        prior.iter().map(|c| c.volume).sum::<f64>() / prior.len() as f64
    };
    last.volume > avg * VOLUME_SPIKE_MULT
}

/// Rejection candle: either wick larger than 3 x body.
pub fn long_wick(candle: &Candle) -> bool {
    candle.upper_wick().max(candle.lower_wick()) > candle.body() * LONG_WICK_MULT
}
