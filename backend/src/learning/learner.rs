// =============================================================================
// Online Learner — per-feature outcome tallies and weight nudges
// =============================================================================
//
// predict_boost  = Σ over active features of (smoothed win rate - 0.5) x 10,
//                  clamped to ±5.  Smoothing: (wins + 1) / (wins + losses + 2).
// record_outcome = each active feature weight moves ±learningRate; the
//                  manipulation weight never rises above 0 and every weight
//                  stays within [-5, 5].
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use super::{active_features, FeatureLearner, WeightState, WeightStore, FEATURE_MANIPULATION};
use crate::types::FeatureFlags;

const BOOST_SCALE: f64 = 10.0;
const MAX_BOOST: f64 = 5.0;
const WEIGHT_LIMIT: f64 = 5.0;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FeatureTally {
    pub wins: u32,
    pub losses: u32,
}

impl FeatureTally {
    pub fn smoothed_win_rate(&self) -> f64 {
        (self.wins as f64 + 1.0) / (self.wins as f64 + self.losses as f64 + 2.0)
    }
}

pub struct OnlineLearner {
    store: Arc<WeightStore>,
    tallies: RwLock<HashMap<&'static str, FeatureTally>>,
}

impl OnlineLearner {
    pub fn new(store: Arc<WeightStore>) -> Self {
        Self {
            store,
            tallies: RwLock::new(HashMap::new()),
        }
    }

    pub fn tallies(&self) -> HashMap<&'static str, FeatureTally> {
        self.tallies.read().clone()
    }
}

impl FeatureLearner for OnlineLearner {
    fn weights(&self) -> Arc<WeightState> {
        self.store.snapshot()
    }

    fn predict_boost(&self, flags: &FeatureFlags) -> f64 {
        let tallies = self.tallies.read();
        let boost: f64 = active_features(flags)
            .iter()
            .map(|f| {
                let rate = tallies.get(f).copied().unwrap_or_default().smoothed_win_rate();
                (rate - 0.5) * BOOST_SCALE
            })
            .sum();
        boost.clamp(-MAX_BOOST, MAX_BOOST)
    }

    fn record_outcome(&self, flags: &FeatureFlags, won: bool) {
        let features = active_features(flags);
        if features.is_empty() {
            return;
        }

        {
            let mut tallies = self.tallies.write();
            for f in &features {
                let t = tallies.entry(*f).or_default();
                if won {
                    t.wins += 1;
                } else {
                    t.losses += 1;
                }
            }
        }

        let updated = self.store.update(|state| {
            let delta = if won { state.learning_rate } else { -state.learning_rate };
            for f in &features {
                let w = state.feature_weights.entry(f.to_string()).or_insert(0.0);
                let mut next = (*w + delta).clamp(-WEIGHT_LIMIT, WEIGHT_LIMIT);
                if *f == FEATURE_MANIPULATION {
                    next = next.min(0.0);
                }
                *w = next;
            }
        });

        debug!(won, features = ?features, learning_rate = updated.learning_rate, "outcome recorded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::{FEATURE_FVG, FEATURE_VOLUME};

    fn learner() -> OnlineLearner {
        OnlineLearner::new(Arc::new(WeightStore::new(WeightState::default())))
    }

    fn fvg_volume() -> FeatureFlags {
        FeatureFlags {
            has_fvg: true,
            volume_spike: true,
            ..FeatureFlags::default()
        }
    }

    #[test]
    fn unseen_features_give_no_boost() {
        assert_eq!(learner().predict_boost(&fvg_volume()), 0.0);
    }

    #[test]
    fn wins_raise_boost_and_weights() {
        let l = learner();
        for _ in 0..3 {
            l.record_outcome(&fvg_volume(), true);
        }
        // (4/5 - 0.5) * 10 = 3 per feature, 6 total, clamped to 5.
        assert_eq!(l.predict_boost(&fvg_volume()), 5.0);
        let w = l.weights();
        assert!((w.weight(FEATURE_FVG) - 1.15).abs() < 1e-9);
        assert!((w.weight(FEATURE_VOLUME) - 1.15).abs() < 1e-9);
    }

    #[test]
    fn manipulation_weight_stays_non_positive() {
        let store = Arc::new(WeightStore::new(WeightState::default()));
        store.update(|w| {
            w.feature_weights.insert(FEATURE_MANIPULATION.to_string(), -0.01);
            w.learning_rate = 0.2;
        });
        let l = OnlineLearner::new(store);
        let flags = FeatureFlags {
            manipulation: true,
            ..FeatureFlags::default()
        };
        l.record_outcome(&flags, true);
        assert_eq!(l.weights().weight(FEATURE_MANIPULATION), 0.0);
    }

    #[test]
    fn no_features_no_change() {
        let l = learner();
        let before = l.weights();
        l.record_outcome(&FeatureFlags::default(), false);
        assert_eq!(*l.weights(), *before);
        assert!(l.tallies().is_empty());
    }
}
