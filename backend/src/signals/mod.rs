// =============================================================================
// Signals Module
// =============================================================================
//
// Bars to resolved signals:
// - Structure detectors and candle pattern tags
// - Confluence scoring (bars -> candidate)
// - Modifier pipeline (candidate -> signal or hold)
// - Signal ledger and the periodic resolution sweep

pub mod confluence;
pub mod ledger;
pub mod patterns;
pub mod pipeline;
pub mod resolver;
pub mod structure;

pub use confluence::{ConfluenceScorer, ScoreOptions, ScorerConfig};
pub use ledger::{LedgerStats, Signal, SignalLedger};
pub use pipeline::{ModifierPipeline, PipelineInputs, PipelineOutcome};
pub use resolver::ResolutionSweep;
