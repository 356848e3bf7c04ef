// =============================================================================
// Simulated tick source (demo mode)
// =============================================================================

use rand::Rng;

use super::bar_store::BarStore;
use crate::types::InstrumentKind;

/// Bars of synthetic history written per instrument at startup.
pub const WARMUP_BARS: i64 = 160;

fn base_price(symbol: &str) -> f64 {
    if symbol.trim().to_uppercase().starts_with("EUR") {
        1.09
    } else {
        1.0
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Write `WARMUP_BARS` one-second ticks ending just before `now_secs` for
/// every instrument.
pub fn warmup<R: Rng>(store: &BarStore, instruments: &[String], now_secs: i64, rng: &mut R) {
    for symbol in instruments {
        let base = base_price(symbol);
        for i in 0..WARMUP_BARS {
            let ts = now_secs - (WARMUP_BARS - i);
            let price = round4(base + (rng.gen::<f64>() - 0.5) * 0.005);
            store.ingest(symbol, price, rng.gen::<f64>() * 100.0, ts);
        }
    }
}

/// Ingest one random tick at `now_secs`. Crypto-like names get a wider range.
pub fn simulate_tick<R: Rng>(store: &BarStore, symbol: &str, now_secs: i64, rng: &mut R) {
    let crypto = InstrumentKind::classify(symbol) == InstrumentKind::Crypto
        || symbol.to_uppercase().contains("BITCOIN");
    let base = if crypto {
        rng.gen::<f64>() * 200.0 + 20.0
    } else {
        base_price(symbol)
    };
    let noise = (rng.gen::<f64>() - 0.5) * if crypto { 2.0 } else { 0.003 };
    let quantity = rng.gen::<f64>() * if crypto { 2.0 } else { 100.0 };
    store.ingest(symbol, round4(base + noise), quantity, now_secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn warmup_fills_every_instrument() {
        let store = BarStore::new(7_200, 1);
        let symbols = vec!["EUR/USD".to_string(), "Gold (OTC)".to_string()];
        let mut rng = StdRng::seed_from_u64(1);
        warmup(&store, &symbols, 10_000, &mut rng);

        for s in &symbols {
            let series = store.snapshot(s);
            assert_eq!(series.len(), WARMUP_BARS as usize);
            assert_eq!(series.last().map(|c| c.time), Some(9_999));
        }
        let eur = store.snapshot("EUR/USD");
        assert!(eur.iter().all(|c| (c.close - 1.09).abs() <= 0.003));
    }

    #[test]
    fn simulated_tick_extends_series() {
        let store = BarStore::new(7_200, 1);
        let mut rng = StdRng::seed_from_u64(2);
        simulate_tick(&store, "BTCUSDT", 50, &mut rng);
        simulate_tick(&store, "BTCUSDT", 51, &mut rng);
        let series = store.snapshot("BTCUSDT");
        assert_eq!(series.len(), 2);
        assert!(series.iter().all(|c| c.close >= 19.0));
    }
}
