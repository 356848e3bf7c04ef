// =============================================================================
// Tick Feed — upstream WebSocket adapter feeding the BarStore
// =============================================================================

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::bar_store::{normalize_symbol, BarStore, IngestOutcome};
use crate::clock::Clock;

/// One parsed trade tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub time_secs: i64,
}

/// Connect to the tick feed at `url` and ingest every trade message.
///
/// Runs until the stream disconnects or errors, then returns so the caller
/// can reconnect.
pub async fn run_tick_feed(url: &str, store: &Arc<BarStore>, clock: &Arc<dyn Clock>) -> Result<()> {
    info!(url = %url, "connecting to tick feed");

    let (ws_stream, _response) = connect_async(url)
        .await
        .context("failed to connect to tick feed")?;

    info!(url = %url, "tick feed connected");
    let (_write, mut read) = ws_stream.split();

    let mut ingested: u64 = 0;
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => match parse_tick(&text, clock.now_secs()) {
                Ok(Some(tick)) => {
                    let outcome = store.ingest(&tick.symbol, tick.price, tick.quantity, tick.time_secs);
                    if let IngestOutcome::Dropped(reason) = outcome {
                        debug!(symbol = %tick.symbol, reason = %reason, "tick dropped");
                    } else {
                        ingested += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "failed to parse tick message"),
            },
            Some(Ok(Message::Close(_))) => {
                warn!(ingested, "tick feed closed by peer");
                return Ok(());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!(error = %e, "tick feed read error");
                return Err(e.into());
            }
            None => {
                warn!(ingested, "tick feed stream ended");
                return Ok(());
            }
        }
    }
}

/// Parse a feed message.
///
/// Expected shape:
/// ```json
/// { "type": "trade", "symbol": "eur/usd", "price": 1.0843, "volume": 2, "time": 1700000000000 }
/// ```
/// Messages of any other `type` yield `Ok(None)`. `volume` defaults to 1 and
/// `time` (epoch ms, or an RFC 3339 string) defaults to `now_secs`.
pub fn parse_tick(text: &str, now_secs: i64) -> Result<Option<Tick>> {
    let root: serde_json::Value = serde_json::from_str(text).context("failed to parse tick JSON")?;

    if root["type"].as_str() != Some("trade") {
        return Ok(None);
    }

    let symbol = root["symbol"].as_str().context("missing field symbol")?;
    if symbol.trim().is_empty() {
        bail!("empty symbol");
    }

    let price = number_field(&root["price"]).context("missing or invalid field price")?;
    let quantity = match &root["volume"] {
        serde_json::Value::Null => 1.0,
        v => number_field(v).context("invalid field volume")?,
    };

    let time_secs = match &root["time"] {
        serde_json::Value::Null => now_secs,
        serde_json::Value::String(s) => match s.parse::<f64>() {
            Ok(ms) => (ms / 1000.0).floor() as i64,
            Err(_) => chrono::DateTime::parse_from_rfc3339(s)
                .with_context(|| format!("invalid time {s}"))?
                .timestamp(),
        },
        v => {
            let ms = v.as_f64().context("invalid field time")?;
            (ms / 1000.0).floor() as i64
        }
    };

    Ok(Some(Tick {
        symbol: normalize_symbol(symbol),
        price,
        quantity,
        time_secs,
    }))
}

/// Accept either a JSON number or a numeric string.
fn number_field(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
