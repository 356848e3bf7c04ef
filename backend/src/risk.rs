// =============================================================================
// Risk Assessor — manipulation + news + sentiment => risk score and veto
// =============================================================================
//
//   riskScore = clamp(round(manipulation + newsPenalty + (50 - sentiment/1.5)), 0, 100)
//
// newsPenalty is a fixed amount (default 40) while a high-impact news window
// is active, otherwise 0.  A score above the veto threshold (default 65)
// turns the candidate into a hold.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Inputs gathered from the external collaborators for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskInputs {
    pub manipulation_score: f64,
    pub high_impact_news: bool,
    pub sentiment: f64,
}

/// Outcome of a risk assessment, kept on holds for auditing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_score: f64,
    pub manipulation_score: f64,
    pub news_penalty: f64,
    pub sentiment: f64,
    pub vetoed: bool,
}

#[derive(Debug, Clone)]
pub struct RiskAssessor {
    news_penalty: f64,
    veto_threshold: f64,
}

impl Default for RiskAssessor {
    fn default() -> Self {
        Self::new(40.0, 65.0)
    }
}

impl RiskAssessor {
    pub fn new(news_penalty: f64, veto_threshold: f64) -> Self {
        Self {
            news_penalty,
            veto_threshold,
        }
    }

    pub fn veto_threshold(&self) -> f64 {
        self.veto_threshold
    }

    pub fn assess(&self, inputs: RiskInputs) -> RiskAssessment {
        let news_penalty = if inputs.high_impact_news {
            self.news_penalty
        } else {
            0.0
        };
        let raw = inputs.manipulation_score + news_penalty + (50.0 - inputs.sentiment / 1.5);
        let risk_score = if raw.is_finite() {
            raw.round().clamp(0.0, 100.0)
        } else {
            100.0
        };
        let vetoed = risk_score > self.veto_threshold;

        debug!(
            risk_score,
            manipulation = inputs.manipulation_score,
            news_penalty,
            sentiment = inputs.sentiment,
            vetoed,
            "risk assessed"
        );

        RiskAssessment {
            risk_score,
            manipulation_score: inputs.manipulation_score,
            news_penalty,
            sentiment: inputs.sentiment,
            vetoed,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
