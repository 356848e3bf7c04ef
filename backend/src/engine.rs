// =============================================================================
// Signal Engine — scan cycle and on-demand requests
// =============================================================================
//
// Per instrument:
//   1. History guard (short history => skip; demo mode adds a random tick)
//   2. Manipulation detector on the last 120 bars (scan only: veto > threshold)
//   3. Confluence scorer (scan: strict; request: strict, then relaxed)
//   4. News check (bounded timeout) and sentiment (neutral default on error)
//   5. Modifier pipeline
//   6. SIGNAL => ledger + broadcast, HOLD => decision log + broadcast
//
// A failure on one instrument is logged and recorded; the cycle moves on.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::broadcast::{EngineEvent, HoldEvent};
use crate::decision_envelope::{DecisionEnvelope, HoldReason};
use crate::intel::{check_with_timeout, DependencyFailure};
use crate::market_data::{normalize_symbol, simulator};
use crate::risk::RiskAssessment;
use crate::signals::{PipelineInputs, PipelineOutcome, ScoreOptions, Signal};
use crate::types::Direction;

const MANIPULATION_WINDOW: usize = 120;
const PATTERN_WINDOW: usize = 200;

// =============================================================================
// Decision
// =============================================================================

/// Result of evaluating one instrument.
#[derive(Debug, Clone)]
pub enum Decision {
    Signal {
        signal: Signal,
        risk: RiskAssessment,
    },
    Hold {
        instrument: Option<String>,
        reason: HoldReason,
        risk: Option<RiskAssessment>,
    },
}

impl Decision {
    fn hold(instrument: &str, reason: HoldReason, risk: Option<RiskAssessment>) -> Self {
        Self::Hold {
            instrument: Some(instrument.to_string()),
            reason,
            risk,
        }
    }

    pub fn envelope(&self) -> DecisionEnvelope {
        match self {
            Self::Signal { signal, risk } => {
                DecisionEnvelope::signal(&signal.instrument, signal.id, signal.confidence, Some(*risk))
            }
            Self::Hold {
                instrument,
                reason,
                risk,
            } => DecisionEnvelope::hold(instrument.as_deref(), reason, *risk),
        }
    }

    pub fn event(&self) -> EngineEvent {
        match self {
            Self::Signal { signal, .. } => EngineEvent::Signal(signal.clone()),
            Self::Hold {
                instrument, reason, ..
            } => EngineEvent::Hold(HoldEvent::new(instrument.as_deref(), reason)),
        }
    }
}

/// On-demand request type. `Next` bypasses the confluence gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Start,
    Next,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Next => write!(f, "next"),
        }
    }
}

/// Ranking entry for auto-pick and `getScores`.
#[derive(Debug, Clone, Serialize)]
pub struct PairScore {
    pub symbol: String,
    pub score: i32,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub skipped: usize,
    pub signals: usize,
    pub holds: usize,
    pub errors: usize,
}

enum ScanOutcome {
    Skipped,
    Signal,
    Hold,
}

// =============================================================================
// Signal Engine
// =============================================================================

pub struct SignalEngine;

impl SignalEngine {
    /// One pass over every configured instrument.
    pub async fn scan_cycle(state: &Arc<AppState>) -> ScanSummary {
        let mut summary = ScanSummary::default();

        for instrument in state.instruments() {
            match Self::scan_instrument(state, &instrument).await {
                Ok(ScanOutcome::Skipped) => summary.skipped += 1,
                Ok(ScanOutcome::Signal) => summary.signals += 1,
                Ok(ScanOutcome::Hold) => summary.holds += 1,
                Err(e) => {
                    summary.errors += 1;
                    let msg = format!("{e:#}");
                    warn!(instrument = %instrument, error = %msg, "scan failed for instrument; continuing");
                    state.push_error(msg, Some(&instrument));
                }
            }
        }

        debug!(
            skipped = summary.skipped,
            signals = summary.signals,
            holds = summary.holds,
            errors = summary.errors,
            "scan cycle complete"
        );
        summary
    }

    async fn scan_instrument(state: &Arc<AppState>, instrument: &str) -> Result<ScanOutcome> {
        // ── 1. History guard ─────────────────────────────────────────────
        let (min_history, simulate) = {
            let config = state.runtime_config.read();
            (
                config.min_scan_history,
                config.simulate_ticks && config.tick_feed_url.is_none(),
            )
        };
        let have = state.bars.len(instrument);
        if have < min_history {
            if simulate {
                simulator::simulate_tick(&state.bars, instrument, state.clock.now_secs(), &mut rand::thread_rng());
            }
            debug!(instrument, have, need = min_history, "history too short; skipping");
            return Ok(ScanOutcome::Skipped);
        }

        // ── 2-5. Evaluate ────────────────────────────────────────────────
        let decision = Self::evaluate(state, instrument, ScoreOptions::strict(), None, true).await?;

        // ── 6. Record and broadcast ──────────────────────────────────────
        state.push_decision(decision.envelope());
        state.publish(decision.event());
        match &decision {
            Decision::Signal { signal, risk } => {
                info!(
                    id = signal.id,
                    instrument = %signal.instrument,
                    direction = %signal.direction,
                    confidence = signal.confidence,
                    risk = risk.risk_score,
                    "signal emitted"
                );
                state.publish(EngineEvent::Log(format!(
                    "Signal {} {} conf:{}% id:{}",
                    signal.instrument, signal.direction, signal.confidence, signal.id
                )));
                Ok(ScanOutcome::Signal)
            }
            Decision::Hold { reason, .. } => {
                debug!(instrument, code = reason.code(), reason = %reason, "hold");
                Ok(ScanOutcome::Hold)
            }
        }
    }

    /// Handle a `start` / `next` request. Without a symbol the best-scoring
    /// instrument is picked when auto-pick is enabled.
    pub async fn request_signal(
        state: &Arc<AppState>,
        kind: RequestKind,
        symbol: Option<&str>,
    ) -> Result<Decision> {
        let (auto_pick, min_pick_score) = {
            let config = state.runtime_config.read();
            (config.auto_pick, config.auto_pick_min_score)
        };

        let explicit = symbol.map(str::trim).filter(|s| !s.is_empty()).map(normalize_symbol);
        let instrument = match explicit {
            Some(sym) => Some(sym),
            None if auto_pick => Self::score_all(state)
                .into_iter()
                .next()
                .filter(|best| best.score >= min_pick_score)
                .map(|best| best.symbol),
            None => None,
        };

        let Some(instrument) = instrument else {
            let decision = Decision::Hold {
                instrument: None,
                reason: HoldReason::NoInstrument,
                risk: None,
            };
            state.push_decision(decision.envelope());
            info!(%kind, "request held: no instrument");
            return Ok(decision);
        };

        let force = kind == RequestKind::Next;
        let strict = ScoreOptions {
            require_confirmation: true,
            force,
        };
        let relaxed = ScoreOptions {
            require_confirmation: false,
            force,
        };
        let decision = Self::evaluate(state, &instrument, strict, Some(relaxed), false).await?;

        state.push_decision(decision.envelope());
        match &decision {
            Decision::Signal { signal, .. } => {
                info!(%kind, id = signal.id, instrument = %signal.instrument, confidence = signal.confidence, "requested signal emitted");
                state.publish(EngineEvent::Log(format!(
                    "User requested {kind} -> {} id:{}",
                    signal.instrument, signal.id
                )));
            }
            Decision::Hold { reason, .. } => {
                info!(%kind, instrument = %instrument, code = reason.code(), reason = %reason, "request held");
            }
        }
        Ok(decision)
    }

    /// Rank every instrument by relaxed confidence, best first.
    pub fn score_all(state: &Arc<AppState>) -> Vec<PairScore> {
        let now = state.clock.now_secs();
        let mut scores: Vec<PairScore> = state
            .instruments()
            .iter()
            .filter_map(|symbol| {
                let series = state.bars.snapshot(symbol);
                state
                    .scorer
                    .score(symbol, &series, now, ScoreOptions::relaxed())
                    .ok()
                    .map(|c| PairScore {
                        symbol: normalize_symbol(symbol),
                        score: c.confidence,
                        direction: c.direction,
                    })
            })
            .collect();
        scores.sort_by(|a, b| b.score.cmp(&a.score));
        scores
    }

    /// Integrity check over every bar series. Returns the number of bars removed.
    pub fn hygiene_sweep(state: &Arc<AppState>) -> usize {
        let removed = state.bars.sanitize();
        if removed > 0 {
            warn!(removed, "bar hygiene removed invalid candles");
            state.push_error(format!("bar hygiene removed {removed} invalid candles"), None);
        } else {
            debug!(instruments = state.bars.instruments().len(), "bar hygiene clean");
        }
        removed
    }

    // ── Evaluation ──────────────────────────────────────────────────────

    async fn evaluate(
        state: &Arc<AppState>,
        instrument: &str,
        primary: ScoreOptions,
        fallback: Option<ScoreOptions>,
        manipulation_veto: bool,
    ) -> Result<Decision> {
        let (manip_threshold, news_timeout, sentiment_default) = {
            let config = state.runtime_config.read();
            (
                config.manipulation_veto_threshold,
                Duration::from_millis(config.news_timeout_ms),
                config.sentiment_default,
            )
        };

        let series = state.bars.snapshot(instrument);
        if let Some(last) = series.last() {
            ensure!(
                last.close.is_finite() && last.close > 0.0,
                "invalid last close {} at {}",
                last.close,
                last.time
            );
        }

        // ── Manipulation ────────────────────────────────────────────────
        let recent = &series[series.len().saturating_sub(MANIPULATION_WINDOW)..];
        let manipulation = state.manipulation.detect(&series, recent);
        if manipulation_veto && manipulation.score > manip_threshold {
            return Ok(Decision::hold(
                instrument,
                HoldReason::ManipulationVeto {
                    score: manipulation.score,
                    threshold: manip_threshold,
                },
                None,
            ));
        }

        // ── Confluence ──────────────────────────────────────────────────
        let now = state.clock.now_secs();
        let scored = state
            .scorer
            .score(instrument, &series, now, primary)
            .or_else(|nc| match fallback {
                Some(opts) => state.scorer.score(instrument, &series, now, opts),
                None => Err(nc),
            });
        let mut candidate = match scored {
            Ok(c) => c,
            Err(nc) => return Ok(Decision::hold(instrument, nc.into(), None)),
        };

        // ── Collaborators ───────────────────────────────────────────────
        let (news, failure) = check_with_timeout(state.news.as_ref(), instrument, news_timeout).await;
        if let Some(failure) = failure {
            state.push_error(failure.to_string(), Some(instrument));
        }

        let sentiment = match state.sentiment.sentiment(instrument) {
            Ok(value) if value.is_finite() => value.clamp(0.0, 100.0),
            Ok(value) => {
                warn!(instrument, value, "non-finite sentiment; using default");
                sentiment_default
            }
            Err(e) => {
                let failure = DependencyFailure::Error {
                    dependency: "sentiment",
                    message: format!("{e:#}"),
                };
                warn!(instrument, error = %failure, "sentiment unavailable; using default");
                state.push_error(failure.to_string(), Some(instrument));
                sentiment_default
            }
        };

        // ── Pipeline ────────────────────────────────────────────────────
        let inputs = PipelineInputs {
            recent_bars: &series[series.len().saturating_sub(PATTERN_WINDOW)..],
            manipulation_score: manipulation.score,
            high_impact_news: news.is_high_impact,
            sentiment,
        };
        let decision = match state.pipeline.apply(&mut candidate, &inputs) {
            PipelineOutcome::Signal { risk } => Decision::Signal {
                signal: state.ledger.emit(&candidate),
                risk,
            },
            PipelineOutcome::Hold { reason, risk } => Decision::hold(instrument, reason, Some(risk)),
        };
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::tests::test_state;
    use crate::clock::ManualClock;
    use crate::intel::news::tests::AlwaysHighImpact;
    use crate::intel::{NewsCalendar, NewsCheck};
    use crate::learning::{WeightState, WeightStore};
    use crate::market_data::Candle;
    use crate::runtime_config::RuntimeConfig;

    const NOW: i64 = 10_000;

    fn config(instruments: &[&str]) -> RuntimeConfig {
        RuntimeConfig {
            instruments: instruments.iter().map(|s| s.to_string()).collect(),
            simulate_ticks: false,
            ..RuntimeConfig::default()
        }
    }

    /// One tick per second, steadily rising, ending just before `NOW`.
    fn feed_rising(state: &AppState, symbol: &str, count: i64) {
        for i in 0..count {
            state
                .bars
                .ingest(symbol, 2.5 + i as f64 * 0.0001, 1.0, NOW - count + i);
        }
    }

    fn feed_flat(state: &AppState, symbol: &str, count: i64) {
        for i in 0..count {
            state.bars.ingest(symbol, 1.2345, 1.0, NOW - count + i);
        }
    }

    #[tokio::test]
    async fn rising_market_emits_and_broadcasts() {
        let (state, _) = test_state(config(&["GBP/JPY"]), NOW);
        let mut rx = state.hub.subscribe();
        feed_rising(&state, "GBP/JPY", 2_000);

        let summary = SignalEngine::scan_cycle(&state).await;
        assert_eq!(summary.signals, 1);
        assert_eq!(state.ledger.len(), 1);

        let signal = state.ledger.recent(1).remove(0);
        assert_eq!(signal.direction, Direction::Up);
        assert!(signal.confidence >= 40 && signal.confidence <= 99);
        assert_eq!(signal.expiry_time, NOW + 60);
        assert!(signal.notes.contains("fvg:true"));

        let first: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first["type"], "signal");
        let second: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(second["type"], "log");
        assert!(!state.recent_decisions.read()[0].is_hold());
    }

    #[tokio::test]
    async fn short_history_is_skipped_and_simulated() {
        let mut cfg = config(&["EUR/USD"]);
        cfg.simulate_ticks = true;
        let (state, _) = test_state(cfg, NOW);
        feed_flat(&state, "EUR/USD", 10);

        let summary = SignalEngine::scan_cycle(&state).await;
        assert_eq!(summary.skipped, 1);
        assert_eq!(state.bars.len("EUR/USD"), 11);
        assert!(state.recent_decisions.read().is_empty());
    }

    #[tokio::test]
    async fn one_bad_instrument_does_not_stop_the_cycle() {
        let (state, _) = test_state(config(&["BAD", "GOOD"]), NOW);
        for t in 0..150 {
            state.bars.insert_raw("BAD", Candle::from_tick(t, 1.0, 1.0));
        }
        state.bars.insert_raw("BAD", Candle::from_tick(150, f64::NAN, 1.0));
        feed_rising(&state, "GOOD", 2_000);

        let summary = SignalEngine::scan_cycle(&state).await;
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.signals, 1);
        let errors = state.recent_errors.read();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].instrument.as_deref(), Some("BAD"));
    }

    #[tokio::test]
    async fn flat_ticks_give_no_candidate() {
        let (state, _) = test_state(config(&["EUR/USD"]), NOW);
        feed_flat(&state, "EUR/USD", 160);

        let decision = SignalEngine::request_signal(&state, RequestKind::Start, Some("eur/usd"))
            .await
            .unwrap();
        match decision {
            Decision::Hold {
                instrument, reason, ..
            } => {
                assert_eq!(instrument.as_deref(), Some("EUR/USD"));
                assert_eq!(reason.code(), "INSUFFICIENT_DATA");
            }
            Decision::Signal { .. } => panic!("flat series must not signal"),
        }
        assert_eq!(state.ledger.len(), 0);
    }

    #[tokio::test]
    async fn auto_pick_without_data_holds() {
        let (state, _) = test_state(config(&["EUR/USD", "BTCUSD"]), NOW);
        let decision = SignalEngine::request_signal(&state, RequestKind::Next, None)
            .await
            .unwrap();
        assert!(matches!(
            decision,
            Decision::Hold {
                reason: HoldReason::NoInstrument,
                ..
            }
        ));
        assert_eq!(state.recent_decisions.read()[0].hold_code.as_deref(), Some("NO_INSTRUMENT"));
    }

    #[tokio::test]
    async fn auto_pick_selects_best_scoring_pair() {
        let (state, _) = test_state(config(&["EUR/USD", "GBP/JPY"]), NOW);
        feed_flat(&state, "EUR/USD", 2_000);
        feed_rising(&state, "GBP/JPY", 2_000);

        let scores = SignalEngine::score_all(&state);
        assert_eq!(scores[0].symbol, "GBP/JPY");

        let decision = SignalEngine::request_signal(&state, RequestKind::Start, None)
            .await
            .unwrap();
        match decision {
            Decision::Signal { signal, .. } => assert_eq!(signal.instrument, "GBP/JPY"),
            Decision::Hold { reason, .. } => panic!("unexpected hold: {reason}"),
        }
    }

    struct SlowCalendar;

    #[async_trait::async_trait]
    impl NewsCalendar for SlowCalendar {
        async fn check_high_impact(&self, _instrument: &str) -> anyhow::Result<NewsCheck> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(NewsCheck {
                is_high_impact: true,
                events: Vec::new(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_news_defaults_to_clear() {
        let state = Arc::new(AppState::new(
            config(&["GBP/JPY"]),
            Arc::new(ManualClock::new(NOW)),
            WeightStore::new(WeightState::default()),
            Arc::new(SlowCalendar),
        ));
        feed_rising(&state, "GBP/JPY", 2_000);

        let summary = SignalEngine::scan_cycle(&state).await;
        assert_eq!(summary.signals, 1);
        let errors = state.recent_errors.read();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("timed out"));
    }

    #[tokio::test]
    async fn high_impact_news_vetoes_scan() {
        let mut cfg = config(&["GBP/JPY"]);
        cfg.news_penalty = 70.0;
        let state = Arc::new(AppState::new(
            cfg,
            Arc::new(ManualClock::new(NOW)),
            WeightStore::new(WeightState::default()),
            Arc::new(AlwaysHighImpact),
        ));
        let mut rx = state.hub.subscribe();
        feed_rising(&state, "GBP/JPY", 2_000);

        let summary = SignalEngine::scan_cycle(&state).await;
        assert_eq!(summary.signals, 0);
        assert_eq!(summary.holds, 1);
        assert_eq!(state.ledger.len(), 0);

        let decisions = state.recent_decisions.read();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].hold_code.as_deref(), Some("RISK"));

        let event: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(event["type"], "hold");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn hygiene_reports_removed_bars() {
        let (state, _) = test_state(config(&["X"]), NOW);
        state.bars.insert_raw("X", Candle::from_tick(1, 2.0, 1.0));
        state.bars.insert_raw("X", Candle::from_tick(1, 2.0, 1.0));
        assert_eq!(SignalEngine::hygiene_sweep(&state), 1);
        assert_eq!(SignalEngine::hygiene_sweep(&state), 0);
    }
}
