// =============================================================================
// Engine events and the broadcast hub
// =============================================================================
//
// The engine publishes structured events; transports (the WebSocket handler)
// subscribe and forward them.  Events are serialised once at publish time as
// `{ "type": ..., "data": ... }`.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::decision_envelope::HoldReason;
use crate::signals::Signal;
use crate::types::SignalResult;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct HoldEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub code: String,
    pub reason: String,
}

impl HoldEvent {
    pub fn new(symbol: Option<&str>, reason: &HoldReason) -> Self {
        Self {
            symbol: symbol.map(str::to_string),
            code: reason.code().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionEvent {
    pub id: u64,
    pub symbol: String,
    pub result: SignalResult,
    pub final_price: f64,
    pub used_fallback: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EngineEvent {
    Signal(Signal),
    Hold(HoldEvent),
    SignalResult(ResolutionEvent),
    Log(String),
}

/// Receiver of engine events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: EngineEvent);
}

/// Fan-out of serialised events to every subscribed connection.
#[derive(Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<String>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for BroadcastHub {
    fn publish(&self, event: EngineEvent) {
        match serde_json::to_string(&event) {
            // No subscribers is not an error.
            Ok(json) => {
                let delivered = self.tx.send(json).unwrap_or(0);
                debug!(delivered, "event published");
            }
            Err(e) => warn!(error = %e, "failed to serialise engine event"),
        }
    }
}
