// =============================================================================
// Relative Strength Index (RSI) — simple averages over the last `period` deltas
// =============================================================================
//
// Step 1 — Take the last `period` close-to-close deltas.
// Step 2 — avg_gain = sum(gains) / period, avg_loss = sum(losses) / period.
//          A zero avg_loss becomes a small epsilon.
// Step 3 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// Thresholds used by the scorer: < 30 oversold, > 70 overbought; < 40 or > 60
// counts as an RSI confirmation layer.
// =============================================================================

/// RSI value returned when there is not enough history.
pub const NEUTRAL_RSI: f64 = 50.0;

const LOSS_EPSILON: f64 = 1e-6;

/// Compute RSI over the most recent `period` deltas of `closes`.
///
/// # Edge cases
/// - `period == 0` or fewer than `period + 1` closes => `NEUTRAL_RSI`
/// - No movement at all (every delta is zero) => `NEUTRAL_RSI`
/// - Zero average loss with gains => near 100 (loss floored at epsilon)
/// - Non-finite result => `NEUTRAL_RSI`
pub fn simple_rsi(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() < period + 1 {
        return NEUTRAL_RSI;
    }

    let start = closes.len() - period;
    let (gains, losses) = (start..closes.len()).fold((0.0_f64, 0.0_f64), |(g, l), i| {
        let d = closes[i] - closes[i - 1];
        if d > 0.0 {
            (g + d, l)
        } else {
            (g, l + d.abs())
        }
    });

    if gains == 0.0 && losses == 0.0 {
        return NEUTRAL_RSI;
    }

    let period_f = period as f64;
    let avg_gain = gains / period_f;
    let avg_loss = match losses / period_f {
        l if l > 0.0 => l,
        _ => LOSS_EPSILON,
    };

    let rsi = 100.0 - 100.0 / (1.0 + avg_gain / avg_loss);
    if rsi.is_finite() {
        rsi
    } else {
        NEUTRAL_RSI
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsiZone {
    Oversold,
    Overbought,
    Neutral,
}

impl RsiZone {
    pub fn of(rsi: f64) -> Self {
        if rsi < 30.0 {
            Self::Oversold
        } else if rsi > 70.0 {
            Self::Overbought
        } else {
            Self::Neutral
        }
    }
}

/// Whether RSI sits far enough from 50 to count as a confirming layer.
pub fn is_extended(rsi: f64) -> bool {
    rsi < 40.0 || rsi > 60.0
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_history_is_neutral() {
        assert_eq!(simple_rsi(&[], 14), NEUTRAL_RSI);
        assert_eq!(simple_rsi(&[1.0; 14], 14), NEUTRAL_RSI);
        assert_eq!(simple_rsi(&[1.0, 2.0], 0), NEUTRAL_RSI);
    }

    #[test]
    fn flat_series_is_neutral() {
        assert_eq!(simple_rsi(&[1.09; 160], 14), NEUTRAL_RSI);
    }

    #[test]
    fn only_gains_is_near_100() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let rsi = simple_rsi(&closes, 14);
        assert!(rsi > 99.9 && rsi <= 100.0, "rsi = {rsi}");
        assert_eq!(RsiZone::of(rsi), RsiZone::Overbought);
    }

    #[test]
    fn only_losses_is_zero() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let rsi = simple_rsi(&closes, 14);
        assert!(rsi.abs() < 1e-9);
        assert_eq!(RsiZone::of(rsi), RsiZone::Oversold);
    }

    #[test]
    fn balanced_moves_are_fifty() {
        // Alternating +1 / -1: equal gains and losses.
        let closes: Vec<f64> = (0..15).map(|i| if i % 2 == 0 { 10.0 } else { 11.0 }).collect();
        let rsi = simple_rsi(&closes, 14);
        assert!((rsi - 50.0).abs() < 1e-9);
        assert!(!is_extended(rsi));
    }

    #[test]
    fn uses_only_last_period_deltas() {
        // A crash long ago must not affect RSI over the last 14 deltas.
        let mut closes = vec![500.0, 100.0];
        closes.extend((0..14).map(|i| 100.0 + i as f64));
        assert!(simple_rsi(&closes, 14) > 99.0);
    }
}
