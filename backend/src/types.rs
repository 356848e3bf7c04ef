// =============================================================================
// Shared types used across the signal engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Predicted price direction over the signal horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
        }
    }
}

/// Lifecycle state of an emitted signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalResult {
    Pending,
    Win,
    Loss,
}

impl Default for SignalResult {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for SignalResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Win => write!(f, "WIN"),
            Self::Loss => write!(f, "LOSS"),
        }
    }
}

/// Structural features detected on a candidate. Also the learner's input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    #[serde(rename = "hasFVG")]
    pub has_fvg: bool,
    pub has_order_block: bool,
    #[serde(rename = "hasBOS")]
    pub has_bos: bool,
    #[serde(rename = "hasCHOCH")]
    pub has_choch: bool,
    pub volume_spike: bool,
    /// Set by the pipeline when the manipulation detector reports a non-zero score.
    #[serde(default)]
    pub manipulation: bool,
}

/// Coarse market class, derived from the instrument name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    Otc,
    Crypto,
    Commodity,
    Real,
}

const CRYPTO_MARKERS: &[&str] = &[
    "BTC", "DOGE", "SHIBA", "PEPE", "ARB", "APTOS", "TRON", "BITCOIN", "BINANCE",
];
const COMMODITY_MARKERS: &[&str] = &["GOLD", "SILVER", "CRUDE", "UKBRENT", "USCRUDE"];

impl InstrumentKind {
    /// Classify an instrument by its display name.
    pub fn classify(symbol: &str) -> Self {
        let upper = symbol.to_uppercase();
        if upper.contains("(OTC)") || upper.ends_with("OTC") {
            Self::Otc
        } else if CRYPTO_MARKERS.iter().any(|m| upper.contains(m)) {
            Self::Crypto
        } else if COMMODITY_MARKERS.iter().any(|m| upper.contains(m)) {
            Self::Commodity
        } else {
            Self::Real
        }
    }
}

/// Instrument entry as exposed on `/pairs` and the WebSocket hello.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairInfo {
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: InstrumentKind,
}

impl PairInfo {
    pub fn from_symbol(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            kind: InstrumentKind::classify(symbol),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_instruments() {
        assert_eq!(InstrumentKind::classify("Bitcoin (OTC)"), InstrumentKind::Otc);
        assert_eq!(InstrumentKind::classify("EURUSD-OTC"), InstrumentKind::Otc);
        assert_eq!(InstrumentKind::classify("BTCUSDT"), InstrumentKind::Crypto);
        assert_eq!(InstrumentKind::classify("Gold"), InstrumentKind::Commodity);
        assert_eq!(InstrumentKind::classify("EUR/USD"), InstrumentKind::Real);
    }

    #[test]
    fn direction_serialises_uppercase() {
        assert_eq!(serde_json::to_string(&Direction::Up).unwrap(), "\"UP\"");
        assert_eq!(serde_json::to_string(&SignalResult::Loss).unwrap(), "\"LOSS\"");
    }
}
