// =============================================================================
// WebSocket Handler — broadcast feed and on-demand requests
// =============================================================================
//
// Clients connect to `/ws` and receive:
//   1. A `hello` message with server time and the instrument catalog.
//   2. Every engine event published on the hub (signal, hold, signal_result,
//      log), forwarded as-is.
//
// Clients may send:
//   {"type":"start"|"next", "symbol"?: "..."}  => signal or hold reply
//   {"type":"getScores"}                        => top instrument scores
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::clock::iso_from_secs;
use crate::engine::{PairScore, RequestKind, SignalEngine};
use crate::types::PairInfo;

const SCORES_EXPOSED: usize = 10;

// =============================================================================
// Wire messages
// =============================================================================

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
    Start {
        #[serde(default)]
        symbol: Option<String>,
    },
    Next {
        #[serde(default)]
        symbol: Option<String>,
    },
    GetScores,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage<'a> {
    Hello {
        server_time: String,
        pairs: &'a [PairInfo],
    },
    Scores {
        data: &'a [PairScore],
    },
    Error {
        data: String,
    },
}

// =============================================================================
// WebSocket upgrade handler
// =============================================================================

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("WebSocket connection accepted — upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

// =============================================================================
// Connection handler
// =============================================================================

/// Runs two concurrent loops via `tokio::select!`:
///   1. **Forward loop** — relay hub events to this client.
///   2. **Recv loop** — answer requests, Ping/Pong and Close.
async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.hub.subscribe();

    let pairs = state.pairs();
    let hello = ServerMessage::Hello {
        server_time: iso_from_secs(state.clock.now_secs()),
        pairs: &pairs,
    };
    if let Err(e) = send_json(&mut sender, &hello).await {
        warn!(error = %e, "Failed to send hello");
        return;
    }

    loop {
        tokio::select! {
            // ── Forward loop ────────────────────────────────────────────
            event = events.recv() => {
                match event {
                    Ok(json) => {
                        if let Err(e) = sender.send(Message::Text(json)).await {
                            debug!(error = %e, "WebSocket send failed — disconnecting");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "WebSocket client lagging; events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            // ── Recv loop ───────────────────────────────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_text(&state, &text).await;
                        if let Err(e) = sender.send(Message::Text(reply)).await {
                            debug!(error = %e, "WebSocket reply failed — disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "Failed to send Pong — disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Binary(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket Close frame received — disconnecting");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error — disconnecting");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

/// Turn one client text frame into the JSON reply.
async fn handle_client_text(state: &Arc<AppState>, text: &str) -> String {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(m) => m,
        Err(e) => {
            debug!(error = %e, msg = %text, "unrecognised client message");
            return to_json(&ServerMessage::Error {
                data: format!("unrecognised message: {e}"),
            });
        }
    };

    let (kind, symbol) = match message {
        ClientMessage::Start { symbol } => (RequestKind::Start, symbol),
        ClientMessage::Next { symbol } => (RequestKind::Next, symbol),
        ClientMessage::GetScores => {
            let mut scores = SignalEngine::score_all(state);
            scores.truncate(SCORES_EXPOSED);
            return to_json(&ServerMessage::Scores { data: &scores });
        }
    };

    match SignalEngine::request_signal(state, kind, symbol.as_deref()).await {
        Ok(decision) => to_json(&decision.event()),
        Err(e) => {
            let msg = format!("{e:#}");
            warn!(%kind, error = %msg, "signal request failed");
            state.push_error(msg.clone(), symbol.as_deref());
            to_json(&ServerMessage::Error { data: msg })
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to serialize WebSocket message");
        r#"{"type":"error","data":"serialization failed"}"#.to_string()
    })
}

async fn send_json<S, T>(sender: &mut S, value: &T) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
    T: Serialize,
{
    sender.send(Message::Text(to_json(value))).await
}
