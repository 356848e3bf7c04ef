// =============================================================================
// Central Application State — Signal Forge
// =============================================================================
//
// Ties the engine's components together. Every component is built once from
// `RuntimeConfig` and shared through `Arc<AppState>` by the periodic tasks,
// the REST handlers and the WebSocket feed.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for the audit ring buffers.
//   - Components (bar store, ledger, weight store) manage their own interior
//     mutability.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::broadcast::{BroadcastHub, EngineEvent, EventSink};
use crate::clock::SharedClock;
use crate::decision_envelope::DecisionEnvelope;
use crate::intel::{ManipulationDetector, NewsCalendar, SentimentSource, VolatilitySentiment, WickVolumeDetector};
use crate::learning::{FeatureLearner, OnlineLearner, WeightStore};
use crate::market_data::{normalize_symbol, BarStore};
use crate::risk::RiskAssessor;
use crate::runtime_config::RuntimeConfig;
use crate::signals::{ConfluenceScorer, ModifierPipeline, ResolutionSweep, ScorerConfig, SignalLedger};
use crate::types::PairInfo;

// =============================================================================
// Error Record
// =============================================================================

/// A recorded error event for `/stats` and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// Instrument the failure was isolated to, if any.
    pub instrument: Option<String>,
    pub at: String,
}

// =============================================================================
// AppState
// =============================================================================

const MAX_RECENT_ERRORS: usize = 50;
const MAX_RECENT_DECISIONS: usize = 100;

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Incremented on every recorded decision or error.
    pub state_version: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    pub clock: SharedClock,

    // ── Market Data ─────────────────────────────────────────────────────
    pub bars: Arc<BarStore>,

    // ── Signal Pipeline ─────────────────────────────────────────────────
    pub scorer: ConfluenceScorer,
    pub pipeline: ModifierPipeline,
    pub ledger: Arc<SignalLedger>,

    // ── Learning ────────────────────────────────────────────────────────
    pub weights: Arc<WeightStore>,
    pub learner: Arc<OnlineLearner>,

    // ── External collaborators ──────────────────────────────────────────
    pub manipulation: Arc<dyn ManipulationDetector>,
    pub news: Arc<dyn NewsCalendar>,
    pub sentiment: Arc<dyn SentimentSource>,

    // ── Broadcast ───────────────────────────────────────────────────────
    pub hub: BroadcastHub,

    // ── Audit trail ─────────────────────────────────────────────────────
    pub recent_decisions: RwLock<Vec<DecisionEnvelope>>,
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    // ── Timing ──────────────────────────────────────────────────────────
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Build every component from `config`. Weights come from `weights`
    /// (usually loaded from disk by the caller).
    pub fn new(
        config: RuntimeConfig,
        clock: SharedClock,
        weights: WeightStore,
        news: Arc<dyn NewsCalendar>,
    ) -> Self {
        let bars = Arc::new(BarStore::new(config.bar_capacity, config.base_resolution_secs));
        let weights = Arc::new(weights);
        let learner = Arc::new(OnlineLearner::new(weights.clone()));

        let scorer = ConfluenceScorer::new(ScorerConfig {
            expiry_horizon_secs: config.expiry_horizon_secs,
            ..ScorerConfig::default()
        });
        let pipeline = ModifierPipeline::new(
            RiskAssessor::new(config.news_penalty, config.risk_veto_threshold),
            learner.clone() as Arc<dyn FeatureLearner>,
            config.min_broadcast_confidence,
        );

        Self {
            state_version: AtomicU64::new(1),
            ledger: Arc::new(SignalLedger::new(config.ledger_capacity)),
            sentiment: Arc::new(VolatilitySentiment::new(bars.clone())),
            manipulation: Arc::new(WickVolumeDetector),
            runtime_config: Arc::new(RwLock::new(config)),
            clock,
            bars,
            scorer,
            pipeline,
            weights,
            learner,
            news,
            hub: BroadcastHub::new(),
            recent_decisions: RwLock::new(Vec::new()),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    /// Resolution sweep wired to this state's ledger, bars, learner and hub.
    pub fn resolution_sweep(&self) -> ResolutionSweep {
        let config = self.runtime_config.read();
        ResolutionSweep::new(
            self.ledger.clone(),
            self.bars.clone(),
            self.learner.clone(),
            Arc::new(self.hub.clone()),
            self.clock.clone(),
        )
        .with_latest_fallback(config.resolve_with_latest_fallback)
        .with_pending_alert(config.pending_alert_secs)
    }

    /// Configured instruments in their normalised (upper-case) form.
    pub fn instruments(&self) -> Vec<String> {
        self.runtime_config
            .read()
            .instruments
            .iter()
            .map(|s| normalize_symbol(s))
            .collect()
    }

    pub fn pairs(&self) -> Vec<PairInfo> {
        self.instruments().iter().map(|s| PairInfo::from_symbol(s)).collect()
    }

    pub fn publish(&self, event: EngineEvent) {
        self.hub.publish(event);
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an error. Capped at [`MAX_RECENT_ERRORS`], oldest evicted.
    pub fn push_error(&self, msg: String, instrument: Option<&str>) {
        let record = ErrorRecord {
            message: msg,
            instrument: instrument.map(str::to_string),
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }

        self.increment_version();
    }

    // ── Decision Audit ──────────────────────────────────────────────────

    /// Record a decision envelope. Capped at [`MAX_RECENT_DECISIONS`].
    pub fn push_decision(&self, envelope: DecisionEnvelope) {
        let mut decisions = self.recent_decisions.write();
        decisions.push(envelope);
        while decisions.len() > MAX_RECENT_DECISIONS {
            decisions.remove(0);
        }

        self.increment_version();
    }
}
