// =============================================================================
// Runtime Configuration — engine settings with env overrides and atomic save
// =============================================================================
//
// Every tunable of the signal engine lives here: scan cadence, gating
// thresholds, risk weights, learning-rate bounds, storage sizes and paths.
//
// Load order: `runtime_config.json` (or defaults when absent), then
// environment overrides (`.env` is loaded by main before this runs).
// Persistence uses an atomic tmp + rename pattern.  All fields carry a serde
// default so adding a field never breaks loading an older file.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_instruments() -> Vec<String> {
    [
        "EUR/USD",
        "GBP/USD",
        "USD/JPY",
        "AUD/USD",
        "EUR/JPY",
        "EUR/USD (OTC)",
        "GBP/USD (OTC)",
        "Bitcoin (OTC)",
        "Gold (OTC)",
        "UKBrent (OTC)",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_expiry_horizon_secs() -> i64 {
    60
}

fn default_scan_interval_ms() -> u64 {
    4_500
}

fn default_min_broadcast_confidence() -> i32 {
    40
}

fn default_auto_pick_min_score() -> i32 {
    45
}

fn default_manipulation_veto_threshold() -> f64 {
    85.0
}

fn default_risk_veto_threshold() -> f64 {
    65.0
}

fn default_news_penalty() -> f64 {
    40.0
}

fn default_news_timeout_ms() -> u64 {
    1_500
}

fn default_sentiment_default() -> f64 {
    50.0
}

fn default_resolution_interval_secs() -> u64 {
    3
}

fn default_tuner_interval_secs() -> u64 {
    60
}

fn default_tuner_window() -> usize {
    200
}

fn default_hygiene_interval_secs() -> u64 {
    120
}

fn default_weights_persist_secs() -> u64 {
    30
}

fn default_bar_capacity() -> usize {
    7_200
}

fn default_base_resolution_secs() -> i64 {
    1
}

fn default_ledger_capacity() -> usize {
    5_000
}

fn default_pending_alert_secs() -> i64 {
    300
}

fn default_min_scan_history() -> usize {
    120
}

fn default_weights_path() -> String {
    "weight_state.json".to_string()
}

fn default_tuner_state_path() -> String {
    "optimizer_state.json".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_learning_rate() -> f64 {
    0.05
}

fn default_learning_rate_step() -> f64 {
    0.005
}

fn default_learning_rate_min() -> f64 {
    0.01
}

fn default_learning_rate_max() -> f64 {
    0.2
}

// =============================================================================
// LearningRateBounds
// =============================================================================

/// Bounds and step for the tuner's single learning-rate scalar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearningRateBounds {
    #[serde(default = "default_learning_rate")]
    pub initial: f64,

    /// Fixed step applied per tuning pass.
    #[serde(default = "default_learning_rate_step")]
    pub step: f64,

    #[serde(default = "default_learning_rate_min")]
    pub min: f64,

    #[serde(default = "default_learning_rate_max")]
    pub max: f64,
}

impl Default for LearningRateBounds {
    fn default() -> Self {
        Self {
            initial: default_learning_rate(),
            step: default_learning_rate_step(),
            min: default_learning_rate_min(),
            max: default_learning_rate_max(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the signal engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Instruments & feed --------------------------------------------------

    /// Instruments scanned every cycle.
    #[serde(default = "default_instruments")]
    pub instruments: Vec<String>,

    /// Upstream tick WebSocket. `None` disables the adapter.
    #[serde(default)]
    pub tick_feed_url: Option<String>,

    /// Generate random ticks for instruments without a live feed.
    #[serde(default = "default_true")]
    pub simulate_ticks: bool,

    // --- Bars ----------------------------------------------------------------

    #[serde(default = "default_bar_capacity")]
    pub bar_capacity: usize,

    #[serde(default = "default_base_resolution_secs")]
    pub base_resolution_secs: i64,

    /// Bars required before an instrument is scanned.
    #[serde(default = "default_min_scan_history")]
    pub min_scan_history: usize,

    // --- Signal gating -------------------------------------------------------

    #[serde(default = "default_expiry_horizon_secs")]
    pub expiry_horizon_secs: i64,

    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    #[serde(default = "default_min_broadcast_confidence")]
    pub min_broadcast_confidence: i32,

    #[serde(default = "default_true")]
    pub auto_pick: bool,

    #[serde(default = "default_auto_pick_min_score")]
    pub auto_pick_min_score: i32,

    #[serde(default = "default_manipulation_veto_threshold")]
    pub manipulation_veto_threshold: f64,

    #[serde(default = "default_risk_veto_threshold")]
    pub risk_veto_threshold: f64,

    // --- External collaborators ---------------------------------------------

    /// Added to the risk score when the news check reports a high-impact window.
    #[serde(default = "default_news_penalty")]
    pub news_penalty: f64,

    #[serde(default = "default_news_timeout_ms")]
    pub news_timeout_ms: u64,

    #[serde(default)]
    pub news_api_url: Option<String>,

    /// Sentiment used when the source fails.
    #[serde(default = "default_sentiment_default")]
    pub sentiment_default: f64,

    // --- Resolution & tuning -------------------------------------------------

    #[serde(default = "default_resolution_interval_secs")]
    pub resolution_interval_secs: u64,

    /// Resolve against the latest candle when nothing exists at or after
    /// expiry. The fallback can use pre-expiry prices.
    #[serde(default = "default_true")]
    pub resolve_with_latest_fallback: bool,

    /// Age past expiry after which a PENDING signal counts as stale.
    #[serde(default = "default_pending_alert_secs")]
    pub pending_alert_secs: i64,

    #[serde(default = "default_tuner_interval_secs")]
    pub tuner_interval_secs: u64,

    #[serde(default = "default_tuner_window")]
    pub tuner_window: usize,

    #[serde(default)]
    pub learning_rate: LearningRateBounds,

    #[serde(default = "default_ledger_capacity")]
    pub ledger_capacity: usize,

    #[serde(default = "default_hygiene_interval_secs")]
    pub hygiene_interval_secs: u64,

    #[serde(default = "default_weights_persist_secs")]
    pub weights_persist_secs: u64,

    // --- Persistence & transport ---------------------------------------------

    #[serde(default = "default_weights_path")]
    pub weights_path: String,

    #[serde(default = "default_tuner_state_path")]
    pub tuner_state_path: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            instruments: default_instruments(),
            tick_feed_url: None,
            simulate_ticks: true,
            bar_capacity: default_bar_capacity(),
            base_resolution_secs: default_base_resolution_secs(),
            min_scan_history: default_min_scan_history(),
            expiry_horizon_secs: default_expiry_horizon_secs(),
            scan_interval_ms: default_scan_interval_ms(),
            min_broadcast_confidence: default_min_broadcast_confidence(),
            auto_pick: true,
            auto_pick_min_score: default_auto_pick_min_score(),
            manipulation_veto_threshold: default_manipulation_veto_threshold(),
            risk_veto_threshold: default_risk_veto_threshold(),
            news_penalty: default_news_penalty(),
            news_timeout_ms: default_news_timeout_ms(),
            news_api_url: None,
            sentiment_default: default_sentiment_default(),
            resolution_interval_secs: default_resolution_interval_secs(),
            resolve_with_latest_fallback: true,
            pending_alert_secs: default_pending_alert_secs(),
            tuner_interval_secs: default_tuner_interval_secs(),
            tuner_window: default_tuner_window(),
            learning_rate: LearningRateBounds::default(),
            ledger_capacity: default_ledger_capacity(),
            hygiene_interval_secs: default_hygiene_interval_secs(),
            weights_persist_secs: default_weights_persist_secs(),
            weights_path: default_weights_path(),
            tuner_state_path: default_tuner_state_path(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            instruments = config.instruments.len(),
            expiry_secs = config.expiry_horizon_secs,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Load from `path`, falling back to defaults, then apply env overrides.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut config = match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(error = %e, "using default runtime config");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate();
        config
    }

    /// Reset zero periods and a non-positive expiry horizon to their
    /// defaults. Returns the names of the fields that were reset.
    pub fn validate(&mut self) -> Vec<&'static str> {
        let mut reset = Vec::new();
        reset_zero(&mut self.scan_interval_ms, default_scan_interval_ms(), "scan_interval_ms", &mut reset);
        reset_zero(
            &mut self.resolution_interval_secs,
            default_resolution_interval_secs(),
            "resolution_interval_secs",
            &mut reset,
        );
        reset_zero(&mut self.tuner_interval_secs, default_tuner_interval_secs(), "tuner_interval_secs", &mut reset);
        reset_zero(
            &mut self.hygiene_interval_secs,
            default_hygiene_interval_secs(),
            "hygiene_interval_secs",
            &mut reset,
        );
        reset_zero(&mut self.weights_persist_secs, default_weights_persist_secs(), "weights_persist_secs", &mut reset);
        if self.expiry_horizon_secs <= 0 {
            warn!(value = self.expiry_horizon_secs, "expiry_horizon_secs must be positive; using default");
            self.expiry_horizon_secs = default_expiry_horizon_secs();
            reset.push("expiry_horizon_secs");
        }
        reset
    }

    /// Apply overrides from a key lookup (the process environment in
    /// production). Unparseable values are ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(list) = lookup("WATCH_SYMBOLS") {
            let symbols: Vec<String> = list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !symbols.is_empty() {
                self.instruments = symbols;
            }
        }

        override_parsed(&lookup, "BINARY_EXPIRY_SECONDS", &mut self.expiry_horizon_secs);
        override_parsed(&lookup, "SIGNAL_INTERVAL_MS", &mut self.scan_interval_ms);
        override_parsed(&lookup, "MIN_BROADCAST_CONF", &mut self.min_broadcast_confidence);
        override_parsed(&lookup, "AUTO_PICK_MIN_SCORE", &mut self.auto_pick_min_score);

        if let Some(raw) = lookup("AUTO_PICK") {
            self.auto_pick = !matches!(raw.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no");
        }
        if let Some(url) = lookup("TICK_FEED_URL").filter(|s| !s.trim().is_empty()) {
            self.tick_feed_url = Some(url);
        }
        if let Some(url) = lookup("NEWS_API_URL").filter(|s| !s.trim().is_empty()) {
            self.news_api_url = Some(url);
        }
        if let Some(addr) = lookup("BIND_ADDR").filter(|s| !s.trim().is_empty()) {
            self.bind_addr = addr;
        }
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

fn reset_zero(slot: &mut u64, default: u64, field: &'static str, reset: &mut Vec<&'static str>) {
    if *slot == 0 {
        warn!(field, default, "zero period in runtime config; using default");
        *slot = default;
        reset.push(field);
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => warn!(key, value = %raw, "ignoring unparseable env override"),
        }
    }
}
