// =============================================================================
// Adaptive weighting
// =============================================================================
//
// Two independent feedback loops share one `WeightState`:
//
//   OnlineLearner — nudges per-feature weights on every resolved signal
//   WeightTuner   — steps the single learning-rate scalar from the recent
//                   win rate, once a minute
//
// Each loop owns its own fields.  Updates go through `WeightStore::update`,
// which swaps in a new snapshot; readers keep whatever `Arc` they hold.

pub mod learner;
pub mod store;
pub mod tuner;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::FeatureFlags;

pub use learner::OnlineLearner;
pub use store::WeightStore;
pub use tuner::WeightTuner;

pub const FEATURE_FVG: &str = "fvg";
pub const FEATURE_VOLUME: &str = "volume";
pub const FEATURE_BOS: &str = "bos";
pub const FEATURE_MANIPULATION: &str = "manipulation";

/// Feature weights plus the learning rate applied when they move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightState {
    pub feature_weights: BTreeMap<String, f64>,
    pub learning_rate: f64,
}

impl Default for WeightState {
    fn default() -> Self {
        Self::with_learning_rate(0.05)
    }
}

impl WeightState {
    pub fn with_learning_rate(learning_rate: f64) -> Self {
        let feature_weights = [
            (FEATURE_FVG, 1.0),
            (FEATURE_VOLUME, 1.0),
            (FEATURE_BOS, 1.0),
            (FEATURE_MANIPULATION, -2.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            feature_weights,
            learning_rate,
        }
    }

    pub fn weight(&self, feature: &str) -> f64 {
        self.feature_weights.get(feature).copied().unwrap_or(0.0)
    }

    /// Sum of the weights of every active feature.
    pub fn boost_for(&self, flags: &FeatureFlags) -> f64 {
        active_features(flags).iter().map(|f| self.weight(f)).sum()
    }
}

/// Names of the weighted features present in `flags`.
pub fn active_features(flags: &FeatureFlags) -> Vec<&'static str> {
    let mut out = Vec::with_capacity(4);
    if flags.has_fvg {
        out.push(FEATURE_FVG);
    }
    if flags.volume_spike {
        out.push(FEATURE_VOLUME);
    }
    if flags.has_bos {
        out.push(FEATURE_BOS);
    }
    if flags.manipulation {
        out.push(FEATURE_MANIPULATION);
    }
    out
}

/// The learned-weight collaborator consulted by the modifier pipeline.
pub trait FeatureLearner: Send + Sync {
    fn weights(&self) -> Arc<WeightState>;

    /// Extra confidence from the learner's own outcome history.
    fn predict_boost(&self, flags: &FeatureFlags) -> f64;

    fn record_outcome(&self, flags: &FeatureFlags, won: bool);
}
