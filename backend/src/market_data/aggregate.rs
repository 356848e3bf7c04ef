// =============================================================================
// Timeframe aggregation
// =============================================================================
//
// Folds a base-resolution series into a coarser one:
//   bucket = floor(time / period) * period
//   open   = open of the first constituent
//   close  = close of the latest constituent
//   high   = running max, low = running min, volume = sum
//
// Always returns a fresh series; nothing is cached.

use super::bar_store::Candle;

pub const ONE_MINUTE: i64 = 60;
pub const FIVE_MINUTES: i64 = 300;

/// Aggregate `series` into `period_secs` buckets.
///
/// Empty input or a non-positive period yields an empty series.
pub fn aggregate(series: &[Candle], period_secs: i64) -> Vec<Candle> {
    if series.is_empty() || period_secs <= 0 {
        return Vec::new();
    }

    let mut out: Vec<Candle> = Vec::with_capacity(series.len() / period_secs.max(1) as usize + 1);
    for bar in series {
        let bucket = bar.time.div_euclid(period_secs) * period_secs;
        match out.last_mut() {
            Some(current) if current.time == bucket => {
                current.high = current.high.max(bar.high);
                current.low = current.low.min(bar.low);
                current.close = bar.close;
                current.volume += bar.volume;
            }
            _ => out.push(Candle {
                time: bucket,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            }),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn empty_and_degenerate_inputs() {
        assert!(aggregate(&[], 60).is_empty());
        assert!(aggregate(&[bar(0, 1.0, 1.0, 1.0, 1.0, 1.0)], 0).is_empty());
        assert!(aggregate(&[bar(0, 1.0, 1.0, 1.0, 1.0, 1.0)], -5).is_empty());
    }

    #[test]
    fn folds_into_minute_buckets() {
        let series = vec![
            bar(58, 1.0, 1.5, 0.9, 1.2, 1.0),
            bar(60, 1.2, 1.3, 1.1, 1.25, 2.0),
            bar(61, 1.25, 1.8, 1.0, 1.4, 3.0),
            bar(119, 1.4, 1.45, 0.7, 0.8, 4.0),
            bar(120, 0.8, 0.9, 0.8, 0.85, 5.0),
        ];
        let m1 = aggregate(&series, ONE_MINUTE);
        assert_eq!(m1.len(), 3);
        assert_eq!(m1[0], bar(0, 1.0, 1.5, 0.9, 1.2, 1.0));
        assert_eq!(m1[1], bar(60, 1.2, 1.8, 0.7, 0.8, 9.0));
        assert_eq!(m1[2], bar(120, 0.8, 0.9, 0.8, 0.85, 5.0));
    }

    #[test]
    fn aggregation_is_pure() {
        let series: Vec<Candle> = (0..600)
            .map(|t| {
                let p = 100.0 + ((t * 7) % 13) as f64 * 0.1;
                bar(t, p, p + 0.2, p - 0.2, p + 0.05, 1.0)
            })
            .collect();
        let a = aggregate(&series, FIVE_MINUTES);
        let b = aggregate(&series, FIVE_MINUTES);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        // Re-aggregating an already aggregated series at the same period is a no-op.
        assert_eq!(aggregate(&a, FIVE_MINUTES), a);
    }
}
