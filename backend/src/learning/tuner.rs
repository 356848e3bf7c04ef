// =============================================================================
// Weight Tuner — learning-rate control from the recent win rate
// =============================================================================
//
// Every pass:
//   winRate = wins / max(1, wins + losses) over the last N resolved signals
//   winRate < 45%  => learningRate = max(min, learningRate - step)
//   winRate > 60%  => learningRate = min(max, learningRate + step)
//   otherwise unchanged
// then persists {winRate, timestamp, learningRate} and the full WeightState.
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::store::write_json_atomic;
use super::WeightStore;
use crate::clock::SharedClock;
use crate::runtime_config::LearningRateBounds;
use crate::signals::ledger::SignalLedger;
use crate::types::SignalResult;

const LOW_WIN_RATE: f64 = 45.0;
const HIGH_WIN_RATE: f64 = 60.0;

/// What one tuning pass observed and decided.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunerSnapshot {
    pub win_rate: f64,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub learning_rate: f64,
    #[serde(default)]
    pub sample_size: usize,
}

/// Learning rate after one step given `win_rate` (percent).
pub fn next_learning_rate(current: f64, win_rate: f64, bounds: &LearningRateBounds) -> f64 {
    if win_rate < LOW_WIN_RATE {
        (current - bounds.step).max(bounds.min)
    } else if win_rate > HIGH_WIN_RATE {
        (current + bounds.step).min(bounds.max)
    } else {
        current
    }
}

/// Win rate in percent over `outcomes`; pending entries are ignored.
pub fn win_rate(outcomes: &[SignalResult]) -> f64 {
    let wins = outcomes.iter().filter(|r| **r == SignalResult::Win).count();
    let losses = outcomes.iter().filter(|r| **r == SignalResult::Loss).count();
    let total = (wins + losses).max(1);
    wins as f64 / total as f64 * 100.0
}

pub struct WeightTuner {
    store: Arc<WeightStore>,
    ledger: Arc<SignalLedger>,
    clock: SharedClock,
    bounds: LearningRateBounds,
    window: usize,
    state_path: Option<PathBuf>,
    weights_path: Option<PathBuf>,
}

impl WeightTuner {
    pub fn new(
        store: Arc<WeightStore>,
        ledger: Arc<SignalLedger>,
        clock: SharedClock,
        bounds: LearningRateBounds,
        window: usize,
    ) -> Self {
        Self {
            store,
            ledger,
            clock,
            bounds,
            window,
            state_path: None,
            weights_path: None,
        }
    }

    /// Persist snapshots to these files after every pass.
    pub fn with_persistence(mut self, state_path: impl Into<PathBuf>, weights_path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(state_path.into());
        self.weights_path = Some(weights_path.into());
        self
    }

    /// One tuning pass.
    pub fn run_once(&self) -> Result<TunerSnapshot> {
        let outcomes = self.ledger.recent_outcomes(self.window);
        let rate = win_rate(&outcomes);

        let bounds = self.bounds;
        let mut previous = 0.0;
        let updated = self.store.update(|state| {
            previous = state.learning_rate;
            state.learning_rate = next_learning_rate(state.learning_rate, rate, &bounds);
        });

        let snapshot = TunerSnapshot {
            win_rate: rate,
            timestamp: self.clock.now_millis(),
            learning_rate: updated.learning_rate,
            sample_size: outcomes.len(),
        };

        info!(
            win_rate = rate,
            sample = outcomes.len(),
            previous,
            learning_rate = updated.learning_rate,
            "weight tuner pass"
        );

        if let Some(path) = &self.state_path {
            write_json_atomic(path, &snapshot)?;
        }
        if let Some(path) = &self.weights_path {
            self.store.save(path)?;
        }
        Ok(snapshot)
    }
}
