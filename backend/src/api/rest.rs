// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Read-only views over the engine: health, instrument catalog, signal
// history, learning/ledger stats and the recent decision log.  The WebSocket
// feed is mounted on the same router.
//
// CORS is configured permissively; the dashboard is served from elsewhere.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::AppState;
use crate::learning::learner::FeatureTally;
use crate::learning::WeightState;
use crate::signals::LedgerStats;

const HISTORY_LIMIT: usize = 500;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/pairs", get(pairs))
        .route("/signals/history", get(signal_history))
        .route("/stats", get(stats))
        .route("/decisions", get(decisions))
        .route("/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
    uptime_secs: u64,
    subscribers: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: state.clock.now_millis(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        subscribers: state.hub.subscriber_count(),
    })
}

// =============================================================================
// Instrument catalog
// =============================================================================

async fn pairs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.pairs())
}

// =============================================================================
// Signal history
// =============================================================================

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    limit: Option<usize>,
}

async fn signal_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(HISTORY_LIMIT).min(HISTORY_LIMIT);
    Json(state.ledger.recent(limit))
}

// =============================================================================
// Stats
// =============================================================================

#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    ledger: LedgerStats,
    /// PENDING signals whose expiry is older than `pending_alert_secs`.
    stale_pending: usize,
    weights: WeightState,
    feature_tallies: HashMap<&'static str, FeatureTally>,
    recent_errors: usize,
}

async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let alert_secs = state.runtime_config.read().pending_alert_secs;
    Json(StatsResponse {
        ledger: state.ledger.stats(),
        stale_pending: state.ledger.stale_pending(state.clock.now_secs(), alert_secs),
        weights: (*state.weights.snapshot()).clone(),
        feature_tallies: state.learner.tallies(),
        recent_errors: state.recent_errors.read().len(),
    })
}

// =============================================================================
// Decisions
// =============================================================================

#[derive(Deserialize)]
struct DecisionsQuery {
    /// Only HOLD decisions when true.
    #[serde(default)]
    holds_only: bool,
}

async fn decisions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DecisionsQuery>,
) -> impl IntoResponse {
    let decisions: Vec<_> = state
        .recent_decisions
        .read()
        .iter()
        .rev()
        .filter(|d| !query.holds_only || d.is_hold())
        .cloned()
        .collect();
    Json(decisions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::tests::test_state;
    use crate::runtime_config::RuntimeConfig;
    use crate::signals::ledger::tests::candidate;
    use crate::types::Direction;

    #[tokio::test]
    async fn stats_counts_stale_pending() {
        let (state, clock) = test_state(RuntimeConfig::default(), 0);
        state.ledger.emit(&candidate("EUR/USD", Direction::Up, 1.1, 0));
        clock.set(60 + 301);

        let resp = stats(State(state)).await.into_response();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["stale_pending"], 1);
        assert_eq!(v["pending"], 1);
        assert_eq!(v["weights"]["featureWeights"]["manipulation"], -2.0);
    }

    #[tokio::test]
    async fn history_is_capped_and_newest_first() {
        let (state, _) = test_state(RuntimeConfig::default(), 0);
        for t in 0..3 {
            state.ledger.emit(&candidate("EUR/USD", Direction::Up, 1.1, t));
        }
        let resp = signal_history(State(state), Query(HistoryQuery { limit: Some(2) }))
            .await
            .into_response();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let ids: Vec<u64> = v
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids[0] > ids[1]);
    }
}
