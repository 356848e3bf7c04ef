// =============================================================================
// Signal Forge — Main Entry Point
// =============================================================================
//
// Ticks in (upstream feed or demo simulator), scored binary-option signals
// out over WebSocket, each signal settled after its expiry and fed back into
// the learned feature weights.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod broadcast;
mod clock;
mod decision_envelope;
mod engine;
mod indicators;
mod intel;
mod learning;
mod market_data;
mod risk;
mod runtime_config;
mod scheduler;
mod signals;
mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::clock::{SharedClock, SystemClock};
use crate::engine::SignalEngine;
use crate::intel::{HttpNewsCalendar, NewsCalendar, NoNewsCalendar};
use crate::learning::{WeightStore, WeightTuner};
use crate::market_data::{simulator, tick_feed};
use crate::runtime_config::RuntimeConfig;
use crate::scheduler::PeriodicTask;

const CONFIG_PATH: &str = "runtime_config.json";
const FEED_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Signal Forge — Starting Up                       ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config = RuntimeConfig::load_or_default(CONFIG_PATH);
    info!(
        instruments = ?config.instruments,
        expiry_secs = config.expiry_horizon_secs,
        scan_interval_ms = config.scan_interval_ms,
        min_confidence = config.min_broadcast_confidence,
        auto_pick = config.auto_pick,
        "configuration resolved"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let clock: SharedClock = Arc::new(SystemClock);
    let weights = WeightStore::load_or_default(&config.weights_path, config.learning_rate.initial);

    let news: Arc<dyn NewsCalendar> = match &config.news_api_url {
        Some(url) => match HttpNewsCalendar::new(url.clone()) {
            Ok(calendar) => {
                info!(url = %url, "news calendar enabled");
                Arc::new(calendar)
            }
            Err(e) => {
                warn!(error = %e, "news calendar unavailable; assuming no high-impact events");
                Arc::new(NoNewsCalendar)
            }
        },
        None => Arc::new(NoNewsCalendar),
    };

    let state = Arc::new(AppState::new(config.clone(), clock.clone(), weights, news));

    // ── 3. Tick sources ──────────────────────────────────────────────────
    if let Some(url) = config.tick_feed_url.clone() {
        let bars = state.bars.clone();
        let feed_clock = clock.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tick_feed::run_tick_feed(&url, &bars, &feed_clock).await {
                    error!(url = %url, error = %format!("{e:#}"), "tick feed error — reconnecting in 5s");
                }
                tokio::time::sleep(FEED_RECONNECT_DELAY).await;
            }
        });
    } else if config.simulate_ticks {
        simulator::warmup(&state.bars, &state.instruments(), clock.now_secs(), &mut rand::thread_rng());
        info!(
            instruments = state.bars.instruments().len(),
            bars = simulator::WARMUP_BARS,
            "demo mode: simulated warmup bars written"
        );
    } else {
        warn!("no tick feed configured and simulation disabled; waiting for data");
    }

    // ── 4. API server ────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "API server listening");

    let app = api::rest::router(state.clone());
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    // ── 5. Periodic tasks ────────────────────────────────────────────────
    let mut tasks = Vec::new();

    let scan_state = state.clone();
    tasks.push(PeriodicTask::spawn(
        "scan",
        Duration::from_millis(config.scan_interval_ms),
        Duration::from_millis(config.scan_interval_ms),
        move || {
            let s = scan_state.clone();
            async move {
                SignalEngine::scan_cycle(&s).await;
            }
        },
    ));

    let sweep = Arc::new(state.resolution_sweep());
    tasks.push(PeriodicTask::spawn(
        "resolution",
        Duration::from_secs(config.resolution_interval_secs),
        Duration::ZERO,
        move || {
            let sweep = sweep.clone();
            async move {
                sweep.run_once();
            }
        },
    ));

    let tuner = Arc::new(
        WeightTuner::new(
            state.weights.clone(),
            state.ledger.clone(),
            clock.clone(),
            config.learning_rate,
            config.tuner_window,
        )
        .with_persistence(config.tuner_state_path.clone(), config.weights_path.clone()),
    );
    tasks.push(PeriodicTask::spawn(
        "weight-tuner",
        Duration::from_secs(config.tuner_interval_secs),
        Duration::from_secs(config.tuner_interval_secs),
        move || {
            let tuner = tuner.clone();
            async move {
                if let Err(e) = tuner.run_once() {
                    error!(error = %format!("{e:#}"), "weight tuning pass failed");
                }
            }
        },
    ));

    let hygiene_state = state.clone();
    tasks.push(PeriodicTask::spawn(
        "bar-hygiene",
        Duration::from_secs(config.hygiene_interval_secs),
        Duration::from_secs(config.hygiene_interval_secs),
        move || {
            let s = hygiene_state.clone();
            async move {
                SignalEngine::hygiene_sweep(&s);
            }
        },
    ));

    let persist_state = state.clone();
    let weights_path = config.weights_path.clone();
    tasks.push(PeriodicTask::spawn(
        "weight-persist",
        Duration::from_secs(config.weights_persist_secs),
        Duration::from_secs(config.weights_persist_secs),
        move || {
            let s = persist_state.clone();
            let path = weights_path.clone();
            async move {
                if let Err(e) = s.weights.save(&path) {
                    warn!(error = %format!("{e:#}"), "failed to persist weights");
                }
            }
        },
    ));

    info!(tasks = tasks.len(), "All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    scheduler::stop_all(tasks).await;
    server.abort();

    if let Err(e) = state.weights.save(&config.weights_path) {
        error!(error = %format!("{e:#}"), "Failed to save weights on shutdown");
    }
    if let Err(e) = state.runtime_config.read().save(CONFIG_PATH) {
        error!(error = %format!("{e:#}"), "Failed to save runtime config on shutdown");
    }

    let stats = state.ledger.stats();
    info!(
        signals = stats.total,
        wins = stats.wins,
        losses = stats.losses,
        pending = stats.pending,
        "Signal Forge shut down complete."
    );
    Ok(())
}
