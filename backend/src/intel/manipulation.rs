// =============================================================================
// Wick / Volume manipulation detector
// =============================================================================
//
// Flags the last few bars when volume surges without an honest move:
//
//   stop hunt  — volume > 2x average and a wick >= 70% of the bar's range
//   absorption — volume > 2x average and range < 0.5x the mean range
//
// score = strongest pattern strength x 100, clamped to [0, 100].

use tracing::debug;

use super::{ManipulationDetector, ManipulationKind, ManipulationReport};
use crate::market_data::Candle;

const MIN_BARS: usize = 20;
const CHECK_WINDOW: usize = 3;
const VOLUME_MULT: f64 = 2.0;
const WICK_SHARE: f64 = 0.7;
const RANGE_MULT: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default)]
pub struct WickVolumeDetector;

impl ManipulationDetector for WickVolumeDetector {
    fn detect(&self, _history: &[Candle], recent: &[Candle]) -> ManipulationReport {
        if recent.len() < MIN_BARS {
            return ManipulationReport::clean("not enough bars");
        }

        let n = recent.len() as f64;
        let avg_volume = recent.iter().map(|c| c.volume).sum::<f64>() / n;
        let avg_range = recent.iter().map(Candle::range).sum::<f64>() / n;
        if avg_volume < f64::EPSILON || avg_range < f64::EPSILON {
            return ManipulationReport::clean("flat market");
        }

        let mut best: Option<(f64, ManipulationKind, String)> = None;

        for candle in &recent[recent.len() - CHECK_WINDOW..] {
            let volume_ratio = candle.volume / avg_volume;
            if volume_ratio <= VOLUME_MULT {
                continue;
            }
            let range = candle.range();
            let range_ratio = range / avg_range;
            let wick_share = if range > f64::EPSILON {
                candle.upper_wick().max(candle.lower_wick()) / range
            } else {
                0.0
            };
            let volume_strength = (volume_ratio / 3.0).min(1.0);

            let found = if wick_share >= WICK_SHARE {
                Some((volume_strength * wick_share, ManipulationKind::StopHunt))
            } else if range_ratio < RANGE_MULT {
                Some((volume_strength * (1.0 - range_ratio), ManipulationKind::Absorption))
            } else {
                None
            };

            if let Some((strength, kind)) = found {
                let strength = strength.clamp(0.0, 1.0);
                if best.as_ref().map_or(true, |(s, _, _)| strength > *s) {
                    let reason = format!(
                        "{kind:?}: vol_ratio={volume_ratio:.2}x range_ratio={range_ratio:.2} wick_share={wick_share:.2}"
                    );
                    best = Some((strength, kind, reason));
                }
            }
        }

        let report = match best {
            Some((strength, kind, reason)) => ManipulationReport {
                score: (strength * 100.0).round().clamp(0.0, 100.0),
                kind: Some(kind),
                reason,
            },
            None => ManipulationReport::clean("no manipulation pattern"),
        };

        debug!(score = report.score, kind = ?report.kind, "manipulation check complete");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet(count: usize) -> Vec<Candle> {
        (0..count as i64)
            .map(|t| Candle {
                time: t,
                open: 1.0,
                high: 1.002,
                low: 0.998,
                close: 1.001,
                volume: 10.0,
            })
            .collect()
    }

    #[test]
    fn too_few_bars_is_clean() {
        assert_eq!(WickVolumeDetector.detect(&[], &quiet(10)).score, 0.0);
    }

    #[test]
    fn quiet_market_is_clean() {
        let r = WickVolumeDetector.detect(&[], &quiet(30));
        assert_eq!(r.score, 0.0);
        assert!(r.kind.is_none());
    }

    #[test]
    fn stop_hunt_wick_on_heavy_volume() {
        let mut bars = quiet(30);
        bars.push(Candle {
            time: 30,
            open: 1.0,
            high: 1.0015,
            low: 0.990,
            close: 1.001,
            volume: 60.0,
        });
        let r = WickVolumeDetector.detect(&[], &bars);
        assert_eq!(r.kind, Some(ManipulationKind::StopHunt));
        assert!(r.score > 50.0 && r.score <= 100.0);
    }

    #[test]
    fn absorption_on_tight_range() {
        let mut bars = quiet(30);
        bars.push(Candle {
            time: 30,
            open: 1.0,
            high: 1.0006,
            low: 0.9998,
            close: 1.0005,
            volume: 45.0,
        });
        let r = WickVolumeDetector.detect(&[], &bars);
        assert_eq!(r.kind, Some(ManipulationKind::Absorption));
        assert!(r.score > 0.0);
    }
}
