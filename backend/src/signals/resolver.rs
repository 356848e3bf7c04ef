// =============================================================================
// Resolution Sweep — settle expired PENDING signals against later prices
// =============================================================================
//
// For every PENDING signal whose expiry has passed:
//   final candle = first base candle at or after expiry, else (optionally)
//                  the latest candle available
//   no candle    => stays PENDING, retried next sweep
//   otherwise    => WIN/LOSS recorded once, learner notified, result broadcast
//
// The latest-candle fallback may settle on a pre-expiry price; such
// resolutions are marked `resolved_with_fallback` and logged.
// =============================================================================

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::ledger::{Settlement, SignalLedger};
use crate::broadcast::{EngineEvent, EventSink, ResolutionEvent};
use crate::clock::SharedClock;
use crate::learning::FeatureLearner;
use crate::market_data::BarStore;
use crate::types::SignalResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub resolved: usize,
    pub used_fallback: usize,
    pub still_pending: usize,
    pub stale_pending: usize,
}

pub struct ResolutionSweep {
    ledger: Arc<SignalLedger>,
    bars: Arc<BarStore>,
    learner: Arc<dyn FeatureLearner>,
    sink: Arc<dyn EventSink>,
    clock: SharedClock,
    latest_fallback: bool,
    pending_alert_secs: i64,
}

impl ResolutionSweep {
    pub fn new(
        ledger: Arc<SignalLedger>,
        bars: Arc<BarStore>,
        learner: Arc<dyn FeatureLearner>,
        sink: Arc<dyn EventSink>,
        clock: SharedClock,
    ) -> Self {
        Self {
            ledger,
            bars,
            learner,
            sink,
            clock,
            latest_fallback: true,
            pending_alert_secs: 300,
        }
    }

    pub fn with_latest_fallback(mut self, enabled: bool) -> Self {
        self.latest_fallback = enabled;
        self
    }

    pub fn with_pending_alert(mut self, secs: i64) -> Self {
        self.pending_alert_secs = secs;
        self
    }

    /// One sweep over the ledger.
    pub fn run_once(&self) -> SweepReport {
        let now = self.clock.now_secs();
        let mut report = SweepReport::default();

        for signal in self.ledger.expired_pending(now) {
            let exact = self.bars.first_at_or_after(&signal.instrument, signal.expiry_time);
            let chosen = match exact {
                Some(c) => Some((c, false)),
                None if self.latest_fallback => self.bars.latest(&signal.instrument).map(|c| (c, true)),
                None => None,
            };

            let Some((candle, used_fallback)) = chosen else {
                debug!(id = signal.id, instrument = %signal.instrument, "no price after expiry yet");
                report.still_pending += 1;
                continue;
            };

            let settlement = Settlement {
                final_price: candle.close,
                resolved_at: now,
                used_fallback,
            };
            let Some(resolved) = self.ledger.resolve(signal.id, settlement) else {
                continue;
            };

            let won = resolved.result == SignalResult::Win;
            report.resolved += 1;
            if used_fallback {
                report.used_fallback += 1;
                warn!(
                    id = resolved.id,
                    instrument = %resolved.instrument,
                    candle_time = candle.time,
                    expiry = resolved.expiry_time,
                    "resolved against latest candle (no candle at or after expiry)"
                );
            }
            info!(
                id = resolved.id,
                instrument = %resolved.instrument,
                direction = %resolved.direction,
                entry = resolved.entry_price,
                final_price = candle.close,
                result = %resolved.result,
                "signal resolved"
            );

            self.learner.record_outcome(&resolved.flags, won);
            self.sink.publish(EngineEvent::SignalResult(ResolutionEvent {
                id: resolved.id,
                symbol: resolved.instrument.clone(),
                result: resolved.result,
                final_price: candle.close,
                used_fallback,
            }));
        }

        report.stale_pending = self.ledger.stale_pending(now, self.pending_alert_secs);
        if report.stale_pending > 0 {
            warn!(
                stale = report.stale_pending,
                threshold_secs = self.pending_alert_secs,
                "signals pending long after expiry (no price data)"
            );
        }
        report
    }
}
