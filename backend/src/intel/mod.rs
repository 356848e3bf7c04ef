// =============================================================================
// Market intelligence collaborators
// =============================================================================
//
// Narrow interfaces the signal pipeline consults for context it cannot derive
// from its own bars: manipulation heuristics, the news calendar, sentiment.
// Failures here never abort a scan; callers fall back to neutral values and
// record a `DependencyFailure`.

pub mod manipulation;
pub mod news;
pub mod sentiment;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

pub use manipulation::WickVolumeDetector;
pub use news::{check_with_timeout, HttpNewsCalendar, NoNewsCalendar};
pub use sentiment::VolatilitySentiment;

// ---------------------------------------------------------------------------
// Manipulation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManipulationKind {
    StopHunt,
    Absorption,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManipulationReport {
    /// 0..=100.
    pub score: f64,
    pub kind: Option<ManipulationKind>,
    pub reason: String,
}

impl ManipulationReport {
    pub fn clean(reason: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            kind: None,
            reason: reason.into(),
        }
    }
}

/// Pure heuristic over candle history; no side effects.
pub trait ManipulationDetector: Send + Sync {
    fn detect(&self, history: &[Candle], recent: &[Candle]) -> ManipulationReport;
}

// ---------------------------------------------------------------------------
// News
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsCheck {
    pub is_high_impact: bool,
    #[serde(default)]
    pub events: Vec<serde_json::Value>,
}

impl NewsCheck {
    pub fn clear() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait NewsCalendar: Send + Sync {
    async fn check_high_impact(&self, instrument: &str) -> anyhow::Result<NewsCheck>;
}

// ---------------------------------------------------------------------------
// Sentiment
// ---------------------------------------------------------------------------

/// Market sentiment in [0, 100]; 50 is neutral.
pub trait SentimentSource: Send + Sync {
    fn sentiment(&self, instrument: &str) -> anyhow::Result<f64>;
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

/// An external collaborator failed and a neutral default was used instead.
#[derive(Debug, Clone, PartialEq)]
pub enum DependencyFailure {
    Timeout { dependency: &'static str, after_ms: u64 },
    Error { dependency: &'static str, message: String },
}

impl std::fmt::Display for DependencyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout {
                dependency,
                after_ms,
            } => write!(f, "{dependency} timed out after {after_ms}ms"),
            Self::Error {
                dependency,
                message,
            } => write!(f, "{dependency} failed: {message}"),
        }
    }
}
