// =============================================================================
// Modifier Pipeline — candidate in, signal or reasoned hold out
// =============================================================================
//
// Fixed order:
//   1. pattern tags      (engulfing / pin on recent bars)
//   2. risk assessment   (veto above threshold => hold)
//   3. sentiment bias    (confidence += round((sentiment - 50) / 8))
//   4. learned weights   (Σ feature weights + predictive boost, clamp [1, 99])
//   5. minimum-confidence gate
//
// Steps that change the candidate are recorded on it, so running the
// pipeline again on the same instance does not double count.
// =============================================================================

use std::sync::Arc;

use tracing::debug;

use super::confluence::Candidate;
use super::patterns::detect_patterns;
use crate::decision_envelope::HoldReason;
use crate::learning::FeatureLearner;
use crate::market_data::Candle;
use crate::risk::{RiskAssessment, RiskAssessor, RiskInputs};

pub const MIN_CONFIDENCE: i32 = 1;
pub const MAX_CONFIDENCE: i32 = 99;

const STEP_PATTERNS: &str = "patterns";
const STEP_SENTIMENT: &str = "sentiment";
const STEP_WEIGHTS: &str = "weights";

/// Context gathered from collaborators before the pipeline runs.
#[derive(Debug, Clone, Copy)]
pub struct PipelineInputs<'a> {
    pub recent_bars: &'a [Candle],
    pub manipulation_score: f64,
    pub high_impact_news: bool,
    pub sentiment: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Signal { risk: RiskAssessment },
    Hold { reason: HoldReason, risk: RiskAssessment },
}

pub struct ModifierPipeline {
    risk: RiskAssessor,
    learner: Arc<dyn FeatureLearner>,
    min_confidence: i32,
}

impl ModifierPipeline {
    pub fn new(risk: RiskAssessor, learner: Arc<dyn FeatureLearner>, min_confidence: i32) -> Self {
        Self {
            risk,
            learner,
            min_confidence,
        }
    }

    pub fn apply(&self, candidate: &mut Candidate, inputs: &PipelineInputs<'_>) -> PipelineOutcome {
        // ── 1. Pattern tags ─────────────────────────────────────────────
        let tags = detect_patterns(inputs.recent_bars);
        let first_tagging = candidate.mark_applied(STEP_PATTERNS);
        if first_tagging && !tags.is_empty() {
            candidate.notes.push('|');
            candidate.notes.push_str(&tags.join(","));
        }
        candidate.tags.extend(tags.iter().map(|t| t.to_string()));

        // ── 2. Risk ─────────────────────────────────────────────────────
        let risk = self.risk.assess(RiskInputs {
            manipulation_score: inputs.manipulation_score,
            high_impact_news: inputs.high_impact_news,
            sentiment: inputs.sentiment,
        });
        if risk.vetoed {
            return PipelineOutcome::Hold {
                reason: HoldReason::RiskVeto {
                    risk_score: risk.risk_score,
                    threshold: self.risk.veto_threshold(),
                },
                risk,
            };
        }

        // ── 3. Sentiment bias ───────────────────────────────────────────
        if candidate.mark_applied(STEP_SENTIMENT) {
            candidate.confidence += ((inputs.sentiment - 50.0) / 8.0).round() as i32;
        }

        // ── 4. Learned weights ──────────────────────────────────────────
        if candidate.mark_applied(STEP_WEIGHTS) {
            candidate.flags.manipulation = inputs.manipulation_score > 0.0;
            let weights = self.learner.weights();
            let boost = weights.boost_for(&candidate.flags) + self.learner.predict_boost(&candidate.flags);
            let adjusted = candidate.confidence as f64 + boost;
            candidate.confidence = if adjusted.is_finite() {
                adjusted.round() as i32
            } else {
                candidate.confidence
            };
            debug!(instrument = %candidate.instrument, boost, "learned weights applied");
        }
        candidate.confidence = candidate.confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE);

        // ── 5. Gate ─────────────────────────────────────────────────────
        if candidate.confidence < self.min_confidence {
            return PipelineOutcome::Hold {
                reason: HoldReason::LowConfidence {
                    confidence: candidate.confidence,
                    minimum: self.min_confidence,
                },
                risk,
            };
        }

        PipelineOutcome::Signal { risk }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::{OnlineLearner, WeightState, WeightStore};
    use crate::signals::ledger::tests::candidate;
    use crate::types::{Direction, FeatureFlags};

    struct FixedBoost(f64);

    impl FeatureLearner for FixedBoost {
        fn weights(&self) -> Arc<WeightState> {
            Arc::new(WeightState::default())
        }
        fn predict_boost(&self, _flags: &FeatureFlags) -> f64 {
            self.0
        }
        fn record_outcome(&self, _flags: &FeatureFlags, _won: bool) {}
    }

    fn pipeline(boost: f64) -> ModifierPipeline {
        ModifierPipeline::new(RiskAssessor::default(), Arc::new(FixedBoost(boost)), 40)
    }

    fn inputs(bars: &[Candle], manip: f64, sentiment: f64) -> PipelineInputs<'_> {
        PipelineInputs {
            recent_bars: bars,
            manipulation_score: manip,
            high_impact_news: false,
            sentiment,
        }
    }

    fn pin_bars() -> Vec<Candle> {
        let flat = Candle {
            time: 0,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        };
        let pin = Candle {
            time: 2,
            open: 1.00,
            high: 1.011,
            low: 0.97,
            close: 1.01,
            volume: 1.0,
        };
        vec![flat, Candle { time: 1, ..flat }, pin]
    }

    #[test]
    fn sentiment_and_weights_adjust_confidence() {
        let mut c = candidate("EUR/USD", Direction::Up, 1.0, 0);
        c.flags.has_fvg = true;
        // 70 + round((70-50)/8)=3 + fvg weight 1 + boost 2 = 76
        let out = pipeline(2.0).apply(&mut c, &inputs(&[], 0.0, 70.0));
        assert!(matches!(out, PipelineOutcome::Signal { .. }));
        assert_eq!(c.confidence, 76);
    }

    #[test]
    fn reapplication_does_not_double_count() {
        let bars = pin_bars();
        let mut c = candidate("EUR/USD", Direction::Up, 1.0, 0);
        c.flags.volume_spike = true;
        let p = pipeline(1.0);

        p.apply(&mut c, &inputs(&bars, 10.0, 62.0));
        let after_first = (c.confidence, c.tags.clone(), c.notes.clone(), c.flags);
        p.apply(&mut c, &inputs(&bars, 10.0, 62.0));
        assert_eq!((c.confidence, c.tags.clone(), c.notes.clone(), c.flags), after_first);
        assert!(c.tags.contains("pin"));
        assert_eq!(c.notes.matches("pin").count(), 1);
    }

    #[test]
    fn high_risk_is_always_a_hold() {
        let p = pipeline(5.0);
        for manip in [0.0, 20.0, 40.0, 60.0, 80.0, 100.0] {
            for sentiment in [0.0, 25.0, 50.0, 75.0, 100.0] {
                for news in [false, true] {
                    let mut c = candidate("X", Direction::Up, 1.0, 0);
                    c.confidence = 99;
                    let out = p.apply(
                        &mut c,
                        &PipelineInputs {
                            recent_bars: &[],
                            manipulation_score: manip,
                            high_impact_news: news,
                            sentiment,
                        },
                    );
                    match out {
                        PipelineOutcome::Signal { risk } => assert!(risk.risk_score <= 65.0),
                        PipelineOutcome::Hold { risk, .. } if risk.risk_score > 65.0 => {}
                        PipelineOutcome::Hold { reason, .. } => {
                            panic!("unexpected hold {reason}")
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn news_window_vetoes() {
        let mut c = candidate("X", Direction::Up, 1.0, 0);
        let out = ModifierPipeline::new(RiskAssessor::default(), Arc::new(FixedBoost(0.0)), 40).apply(
            &mut c,
            &PipelineInputs {
                recent_bars: &[],
                manipulation_score: 20.0,
                high_impact_news: true,
                sentiment: 50.0,
            },
        );
        // 20 + 40 + 16.67 => 77
        assert!(matches!(
            out,
            PipelineOutcome::Hold { reason: HoldReason::RiskVeto { .. }, .. }
        ));
    }

    #[test]
    fn confidence_bounds_and_low_confidence_gate() {
        let mut high = candidate("X", Direction::Up, 1.0, 0);
        high.confidence = 99;
        pipeline(5.0).apply(&mut high, &inputs(&[], 0.0, 100.0));
        assert_eq!(high.confidence, 99);

        let mut low = candidate("X", Direction::Down, 1.0, 0);
        low.confidence = 10;
        let out = pipeline(-5.0).apply(&mut low, &inputs(&[], 0.0, 30.0));
        // 10 + round(-2.5) = 7, then -5 boost = 2.
        assert_eq!(low.confidence, 2);
        assert_eq!(
            out,
            PipelineOutcome::Hold {
                reason: HoldReason::LowConfidence {
                    confidence: 2,
                    minimum: 40
                },
                risk: RiskAssessor::default().assess(RiskInputs {
                    manipulation_score: 0.0,
                    high_impact_news: false,
                    sentiment: 30.0,
                }),
            }
        );
    }

    #[test]
    fn manipulation_flag_uses_negative_weight() {
        let store = Arc::new(WeightStore::new(WeightState::default()));
        let p = ModifierPipeline::new(RiskAssessor::default(), Arc::new(OnlineLearner::new(store)), 40);
        let mut c = candidate("X", Direction::Up, 1.0, 0);
        p.apply(&mut c, &inputs(&[], 5.0, 50.0));
        assert!(c.flags.manipulation);
        assert_eq!(c.confidence, 68);
    }
}
