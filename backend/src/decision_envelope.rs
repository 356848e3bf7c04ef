// =============================================================================
// Decision Envelope — auditable record of every signal / hold decision
// =============================================================================
//
// Each scan or on-demand request ends in exactly one envelope: either SIGNAL
// (with the emitted id) or HOLD (with a typed reason).  The most recent ones
// are kept in AppState and served on `/decisions`.
// =============================================================================

use serde::Serialize;

use crate::risk::RiskAssessment;
use crate::signals::confluence::NoCandidate;

/// Why no tradable signal was emitted. Normal outcomes, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum HoldReason {
    NoCandidate(NoCandidate),
    ManipulationVeto { score: f64, threshold: f64 },
    RiskVeto { risk_score: f64, threshold: f64 },
    LowConfidence { confidence: i32, minimum: i32 },
    /// Auto-pick found no instrument scoring high enough.
    NoInstrument,
}

impl HoldReason {
    /// Short machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoCandidate(NoCandidate::InsufficientHistory { .. })
            | Self::NoCandidate(NoCandidate::ShortAggregate { .. }) => "INSUFFICIENT_DATA",
            Self::NoCandidate(NoCandidate::ThinConfluence { .. }) => "THIN_CONFLUENCE",
            Self::ManipulationVeto { .. } => "MANIPULATION",
            Self::RiskVeto { .. } => "RISK",
            Self::LowConfidence { .. } => "LOW_CONFIDENCE",
            Self::NoInstrument => "NO_INSTRUMENT",
        }
    }
}

impl std::fmt::Display for HoldReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCandidate(nc) => write!(f, "no confirmed opportunity: {nc}"),
            Self::ManipulationVeto { score, threshold } => {
                write!(f, "manipulation score {score:.0} above {threshold:.0}")
            }
            Self::RiskVeto {
                risk_score,
                threshold,
            } => write!(f, "risk score {risk_score:.0} above {threshold:.0}"),
            Self::LowConfidence {
                confidence,
                minimum,
            } => write!(f, "confidence {confidence} below minimum {minimum}"),
            Self::NoInstrument => write!(f, "no pairs available or no suitable auto-pick"),
        }
    }
}

impl From<NoCandidate> for HoldReason {
    fn from(nc: NoCandidate) -> Self {
        Self::NoCandidate(nc)
    }
}

/// Complete auditable record of one decision.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionEnvelope {
    /// Unique identifier for this decision (UUID v4).
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,

    /// "SIGNAL" or "HOLD".
    pub final_decision: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_id: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskAssessment>,

    /// ISO 8601 timestamp of when this decision was created.
    pub created_at: String,
}

impl DecisionEnvelope {
    pub fn signal(instrument: &str, signal_id: u64, confidence: i32, risk: Option<RiskAssessment>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            instrument: Some(instrument.to_string()),
            final_decision: "SIGNAL".to_string(),
            signal_id: Some(signal_id),
            confidence: Some(confidence),
            hold_code: None,
            reason: None,
            risk,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn hold(instrument: Option<&str>, reason: &HoldReason, risk: Option<RiskAssessment>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            instrument: instrument.map(str::to_string),
            final_decision: "HOLD".to_string(),
            signal_id: None,
            confidence: match reason {
                HoldReason::LowConfidence { confidence, .. } => Some(*confidence),
                _ => None,
            },
            hold_code: Some(reason.code().to_string()),
            reason: Some(reason.to_string()),
            risk,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_hold(&self) -> bool {
        self.final_decision == "HOLD"
    }
}
