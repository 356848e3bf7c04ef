// =============================================================================
// Confluence Scorer — bars in, scored directional candidate out
// =============================================================================
//
// Pipeline:
//
//   1. Sample the most recent ≤160 base bars; SMA(5) / SMA(20) / RSI(14).
//   2. Aggregate the full series to 1m and 5m; the 1m series needs ≥20 bars.
//   3. Structure flags: order block + FVG (1m), BOS (5m), round number.
//   4. Volume spike on the sample.
//   5. Score from 50 with fixed deltas, then confluence gating on layers.
//   6. Clamp to [10, 99]; direction from score, ties broken by momentum.
//
// Given the same series, `now_secs` and config, the result is identical.
// =============================================================================

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tracing::debug;

use super::structure::{self, Bos};
use crate::indicators::moving_average::sma_clamped;
use crate::indicators::rsi::{self, simple_rsi, RsiZone};
use crate::market_data::{aggregate, Candle, FIVE_MINUTES, ONE_MINUTE};
use crate::types::{Direction, FeatureFlags};

// ---------------------------------------------------------------------------
// Score deltas
// ---------------------------------------------------------------------------

const BASE_SCORE: i32 = 50;
const MOMENTUM_DELTA: i32 = 11;
const RSI_DELTA: i32 = 8;
const VOLUME_SPIKE_DELTA: i32 = 7;
const ORDER_BLOCK_DELTA: i32 = 7;
const FVG_DELTA: i32 = 6;
const BOS_DELTA: i32 = 4;
const LONG_WICK_PENALTY: i32 = 8;
const ROUND_NUMBER_DELTA: i32 = 3;

pub const MIN_SCORE: i32 = 10;
pub const MAX_SCORE: i32 = 99;

const UP_THRESHOLD: i32 = 60;
const DOWN_THRESHOLD: i32 = 40;
const MIN_LAYERS: u8 = 2;
const RSI_PERIOD: usize = 14;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Why the scorer produced no candidate. Expected outcomes, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoCandidate {
    InsufficientHistory { have: usize, need: usize },
    ShortAggregate { have: usize, need: usize },
    ThinConfluence { layers: u8 },
}

impl std::fmt::Display for NoCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientHistory { have, need } => {
                write!(f, "insufficient history ({have}/{need} bars)")
            }
            Self::ShortAggregate { have, need } => {
                write!(f, "insufficient 1m history ({have}/{need} bars)")
            }
            Self::ThinConfluence { layers } => {
                write!(f, "thin confluence ({layers} confirming layers)")
            }
        }
    }
}

/// Per-call scoring switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreOptions {
    /// Require at least two confirming layers.
    pub require_confirmation: bool,
    /// Bypass the confirmation requirement (user asked for the next signal).
    pub force: bool,
}

impl ScoreOptions {
    pub fn strict() -> Self {
        Self {
            require_confirmation: true,
            force: false,
        }
    }

    pub fn relaxed() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone)]
pub struct ScorerConfig {
    pub min_history: usize,
    pub sample_size: usize,
    pub min_m1_bars: usize,
    pub expiry_horizon_secs: i64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            min_history: 60,
            sample_size: 160,
            min_m1_bars: 20,
            expiry_horizon_secs: 60,
        }
    }
}

/// A scored directional candidate, transient within one scan.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub instrument: String,
    pub direction: Direction,
    pub confidence: i32,
    pub entry_price: f64,
    pub entry_time: i64,
    pub expiry_time: i64,
    pub tags: BTreeSet<String>,
    pub flags: FeatureFlags,
    pub notes: String,
    pub rsi: f64,
    pub layers: u8,
    pub bullish_momentum: bool,
    /// Pipeline steps already applied to this instance.
    #[serde(skip)]
    pub applied: HashSet<&'static str>,
}

impl Candidate {
    /// Mark `step` as applied. Returns false if it already was.
    pub fn mark_applied(&mut self, step: &'static str) -> bool {
        self.applied.insert(step)
    }
}

// ---------------------------------------------------------------------------
// ConfluenceScorer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ConfluenceScorer {
    config: ScorerConfig,
}

impl ConfluenceScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    /// Score `series` (oldest first, base resolution) for `instrument`.
    pub fn score(
        &self,
        instrument: &str,
        series: &[Candle],
        now_secs: i64,
        opts: ScoreOptions,
    ) -> Result<Candidate, NoCandidate> {
        // ── Guards ──────────────────────────────────────────────────────
        let need = self.config.min_history.max(2);
        if series.len() < need {
            return Err(NoCandidate::InsufficientHistory {
                have: series.len(),
                need,
            });
        }

        let sample = &series[series.len().saturating_sub(self.config.sample_size.max(2))..];
        let closes: Vec<f64> = sample.iter().map(|c| c.close).collect();

        // ── Indicators ──────────────────────────────────────────────────
        let sma_short = sma_clamped(&closes, 5).unwrap_or(0.0);
        let sma_long = sma_clamped(&closes, 20).unwrap_or(0.0);
        let rsi_val = simple_rsi(&closes, RSI_PERIOD);
        let vol_spike = structure::volume_spike(sample);

        // ── Timeframes ──────────────────────────────────────────────────
        let m1 = aggregate(series, ONE_MINUTE);
        let m5 = aggregate(series, FIVE_MINUTES);
        if m1.len() < self.config.min_m1_bars {
            return Err(NoCandidate::ShortAggregate {
                have: m1.len(),
                need: self.config.min_m1_bars,
            });
        }

        // ── Structure ───────────────────────────────────────────────────
        let last = sample[sample.len() - 1];
        let prev = sample[sample.len() - 2];
        let price_delta = last.close - prev.close;

        let ob = structure::order_block(&m1);
        let fvg = structure::fair_value_gap(&m1);
        let bos = structure::break_of_structure(&m5);
        let choch = change_of_character(&m5, bos);
        let round = structure::near_round_number(last.close);
        let wick = structure::long_wick(&last);

        let bullish_momentum = price_delta > 0.0 && sma_short > sma_long;
        let bearish_momentum = price_delta < 0.0 && sma_short < sma_long;

        // ── Score ───────────────────────────────────────────────────────
        let mut score = BASE_SCORE;
        if bullish_momentum {
            score += MOMENTUM_DELTA;
        }
        if bearish_momentum {
            score -= MOMENTUM_DELTA;
        }
        match RsiZone::of(rsi_val) {
            RsiZone::Oversold => score += RSI_DELTA,
            RsiZone::Overbought => score -= RSI_DELTA,
            RsiZone::Neutral => {}
        }
        if vol_spike {
            score += VOLUME_SPIKE_DELTA;
        }
        if ob {
            score += ORDER_BLOCK_DELTA;
        }
        if fvg {
            score += FVG_DELTA;
        }
        match bos {
            Some(Bos::Up) => score += BOS_DELTA,
            Some(Bos::Down) => score -= BOS_DELTA,
            None => {}
        }
        if wick {
            score -= LONG_WICK_PENALTY;
        }
        if round {
            score += ROUND_NUMBER_DELTA;
        }

        // ── Confluence gating ───────────────────────────────────────────
        let layers = [
            bullish_momentum || bearish_momentum,
            ob || fvg,
            vol_spike,
            rsi::is_extended(rsi_val),
        ]
        .iter()
        .filter(|l| **l)
        .count() as u8;

        if opts.require_confirmation && layers < MIN_LAYERS && !opts.force {
            debug!(instrument, layers, "confluence too thin");
            return Err(NoCandidate::ThinConfluence { layers });
        }

        let confidence = score.clamp(MIN_SCORE, MAX_SCORE);
        let direction = if confidence >= UP_THRESHOLD {
            Direction::Up
        } else if confidence <= DOWN_THRESHOLD {
            Direction::Down
        } else if bullish_momentum {
            Direction::Up
        } else {
            Direction::Down
        };

        let notes = format!(
            "rsi:{}|volSpike:{}|ob:{}|fvg:{}|bos:{}|round:{}",
            rsi_val.round() as i64,
            vol_spike,
            ob,
            fvg,
            bos.map_or_else(|| "none".to_string(), |b| b.to_string()),
            round,
        );

        Ok(Candidate {
            instrument: instrument.to_string(),
            direction,
            confidence,
            entry_price: last.close,
            entry_time: now_secs,
            expiry_time: now_secs + self.config.expiry_horizon_secs,
            tags: BTreeSet::new(),
            flags: FeatureFlags {
                has_fvg: fvg,
                has_order_block: ob,
                has_bos: bos.is_some(),
                has_choch: choch,
                volume_spike: vol_spike,
                manipulation: false,
            },
            notes,
            rsi: rsi_val,
            layers,
            bullish_momentum,
            applied: HashSet::new(),
        })
    }
}

/// A break whose direction flips the previous 5m move.
fn change_of_character(m5: &[Candle], bos: Option<Bos>) -> bool {
    let Some(bos) = bos else {
        return false;
    };
    if m5.len() < 3 {
        return false;
    }
    let earlier = m5[m5.len() - 2].close - m5[m5.len() - 3].close;
    match bos {
        Bos::Up => earlier < 0.0,
        Bos::Down => earlier > 0.0,
    }
}

// =============================================================================
// Tests
// =============================================================================
