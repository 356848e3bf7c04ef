use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLCV candle. `time` is the bucket start in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// A fresh candle opened by a single tick.
    pub fn from_tick(time: i64, price: f64, quantity: f64) -> Self {
        Self {
            time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: quantity,
        }
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// What `BarStore::ingest` did with a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new candle was opened for a new bucket.
    Opened,
    /// The open (last) candle was updated in place.
    Updated,
    /// The tick was rejected and nothing changed.
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Tick belongs to a bucket older than the last stored candle.
    OutOfOrder,
    InvalidPrice,
    InvalidQuantity,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfOrder => write!(f, "out-of-order timestamp"),
            Self::InvalidPrice => write!(f, "invalid price"),
            Self::InvalidQuantity => write!(f, "invalid quantity"),
        }
    }
}

/// Canonical store key for an instrument name.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

// ---------------------------------------------------------------------------
// BarStore -- bounded base-resolution series per instrument
// ---------------------------------------------------------------------------

/// Thread-safe registry of base-resolution candle series, one per instrument.
///
/// The ingestion path is the only writer. Readers get owned copies of the
/// series (`snapshot`, `recent`) so scoring and resolution never observe a
/// series while it is being mutated.
pub struct BarStore {
    series: RwLock<HashMap<String, VecDeque<Candle>>>,
    capacity: usize,
    resolution_secs: i64,
}

impl BarStore {
    /// Create a store keeping at most `capacity` candles per instrument, each
    /// covering `resolution_secs` seconds.
    pub fn new(capacity: usize, resolution_secs: i64) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            resolution_secs: resolution_secs.max(1),
        }
    }

    fn bucket(&self, ts: i64) -> i64 {
        ts.div_euclid(self.resolution_secs) * self.resolution_secs
    }

    /// Fold one tick into the instrument's series.
    ///
    /// * New bucket: append a candle (o=h=l=c=price, v=quantity), evicting the
    ///   oldest candle when the series is over capacity.
    /// * Same bucket as the last candle: update h/l/c/v in place.
    /// * Older bucket: drop the tick, leaving the series untouched.
    pub fn ingest(&self, instrument: &str, price: f64, quantity: f64, ts: i64) -> IngestOutcome {
        if !price.is_finite() || price <= 0.0 {
            debug!(instrument, price, "tick dropped: invalid price");
            return IngestOutcome::Dropped(DropReason::InvalidPrice);
        }
        if !quantity.is_finite() || quantity < 0.0 {
            debug!(instrument, quantity, "tick dropped: invalid quantity");
            return IngestOutcome::Dropped(DropReason::InvalidQuantity);
        }

        let bucket = self.bucket(ts);
        let key = normalize_symbol(instrument);

        let mut map = self.series.write();
        let ring = map
            .entry(key)
            .or_insert_with(|| VecDeque::with_capacity(self.capacity.min(1024)));

        if let Some(last) = ring.back_mut() {
            if bucket < last.time {
                debug!(instrument, ts, last = last.time, "tick dropped: out of order");
                return IngestOutcome::Dropped(DropReason::OutOfOrder);
            }
            if bucket == last.time {
                last.high = last.high.max(price);
                last.low = last.low.min(price);
                last.close = price;
                last.volume += quantity;
                return IngestOutcome::Updated;
            }
        }

        ring.push_back(Candle::from_tick(bucket, price, quantity));
        while ring.len() > self.capacity {
            ring.pop_front();
        }
        IngestOutcome::Opened
    }

    /// Full copy of an instrument's series (oldest first).
    pub fn snapshot(&self, instrument: &str) -> Vec<Candle> {
        let map = self.series.read();
        map.get(&normalize_symbol(instrument))
            .map(|ring| ring.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The most recent `count` candles (oldest first).
    pub fn recent(&self, instrument: &str, count: usize) -> Vec<Candle> {
        let map = self.series.read();
        match map.get(&normalize_symbol(instrument)) {
            Some(ring) => {
                let start = ring.len().saturating_sub(count);
                ring.iter().skip(start).copied().collect()
            }
            None => Vec::new(),
        }
    }

    /// First candle whose bucket starts at or after `time`.
    pub fn first_at_or_after(&self, instrument: &str, time: i64) -> Option<Candle> {
        let map = self.series.read();
        let ring = map.get(&normalize_symbol(instrument))?;
        let idx = ring.partition_point(|c| c.time < time);
        ring.get(idx).copied()
    }

    pub fn latest(&self, instrument: &str) -> Option<Candle> {
        let map = self.series.read();
        map.get(&normalize_symbol(instrument))
            .and_then(|ring| ring.back().copied())
    }

    pub fn len(&self, instrument: &str) -> usize {
        let map = self.series.read();
        map.get(&normalize_symbol(instrument)).map_or(0, VecDeque::len)
    }

    /// Keys of every instrument that has received at least one tick.
    pub fn instruments(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.series.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Integrity sweep: remove candles with non-finite prices or times that do
    /// not strictly increase. Returns how many candles were removed.
    ///
    /// `ingest` never produces such candles; a non-zero return means something
    /// else wrote into the store and is logged as such.
    pub fn sanitize(&self) -> usize {
        let mut removed = 0;
        let mut map = self.series.write();
        for (instrument, ring) in map.iter_mut() {
            let before = ring.len();
            let mut last_time: Option<i64> = None;
            ring.retain(|c| {
                let finite = c.close.is_finite()
                    && c.open.is_finite()
                    && c.high.is_finite()
                    && c.low.is_finite();
                let ordered = last_time.map_or(true, |t| c.time > t);
                let keep = finite && ordered && c.high >= c.low;
                if keep {
                    last_time = Some(c.time);
                }
                keep
            });
            let dropped = before - ring.len();
            if dropped > 0 {
                warn!(instrument = %instrument, dropped, "bar hygiene removed corrupt candles");
                removed += dropped;
            }
        }
        removed
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&self, instrument: &str, candle: Candle) {
        self.series
            .write()
            .entry(normalize_symbol(instrument))
            .or_default()
            .push_back(candle);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn same_bucket_updates_in_place() {
        let store = BarStore::new(100, 1);
        assert_eq!(store.ingest("eur/usd", 1.10, 5.0, 100), IngestOutcome::Opened);
        assert_eq!(store.ingest("EUR/USD", 1.12, 1.0, 100), IngestOutcome::Updated);
        assert_eq!(store.ingest("EUR/USD", 1.09, 2.0, 100), IngestOutcome::Updated);

        let series = store.snapshot("EUR/USD");
        assert_eq!(series.len(), 1);
        let c = series[0];
        assert_eq!(c.open, 1.10);
        assert_eq!(c.high, 1.12);
        assert_eq!(c.low, 1.09);
        assert_eq!(c.close, 1.09);
        assert_eq!(c.volume, 8.0);
    }

    #[test]
    fn out_of_order_tick_is_dropped_without_corruption() {
        let store = BarStore::new(100, 1);
        store.ingest("BTC", 100.0, 1.0, 10);
        store.ingest("BTC", 101.0, 1.0, 11);
        let before = store.snapshot("BTC");

        assert_eq!(
            store.ingest("BTC", 50.0, 9.0, 9),
            IngestOutcome::Dropped(DropReason::OutOfOrder)
        );
        assert_eq!(store.snapshot("BTC"), before);
    }

    #[test]
    fn coarser_resolution_buckets_ticks() {
        let store = BarStore::new(100, 5);
        store.ingest("X", 10.0, 1.0, 101);
        store.ingest("X", 11.0, 1.0, 104);
        store.ingest("X", 12.0, 1.0, 105);
        let series = store.snapshot("X");
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].time, 100);
        assert_eq!(series[1].time, 105);
        // A tick inside the last open bucket but earlier than the previous tick
        // still belongs to that bucket.
        assert_eq!(store.ingest("X", 9.0, 1.0, 105), IngestOutcome::Updated);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let store = BarStore::new(3, 1);
        for i in 0..5 {
            store.ingest("ETH", 100.0 + i as f64, 1.0, i);
        }
        let closes: Vec<f64> = store.snapshot("ETH").iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![102.0, 103.0, 104.0]);
    }

    #[test]
    fn invalid_ticks_rejected() {
        let store = BarStore::new(10, 1);
        assert_eq!(
            store.ingest("X", f64::NAN, 1.0, 1),
            IngestOutcome::Dropped(DropReason::InvalidPrice)
        );
        assert_eq!(
            store.ingest("X", 1.0, -1.0, 1),
            IngestOutcome::Dropped(DropReason::InvalidQuantity)
        );
        assert_eq!(store.len("X"), 0);
    }

    #[test]
    fn random_ticks_keep_series_ordered_and_consistent() {
        let mut rng = StdRng::seed_from_u64(7);
        let store = BarStore::new(500, 1);
        let mut ts = 1_000i64;
        for _ in 0..5_000 {
            // Mostly forward, sometimes duplicate, sometimes backwards.
            ts += rng.gen_range(-2..=3);
            let price = rng.gen_range(0.5..2.0);
            store.ingest("FUZZ", price, rng.gen_range(0.0..10.0), ts);
        }
        let series = store.snapshot("FUZZ");
        assert!(!series.is_empty());
        for w in series.windows(2) {
            assert!(w[0].time < w[1].time);
        }
        for c in &series {
            assert!(c.high >= c.low);
            assert!(c.volume >= 0.0);
        }
    }

    #[test]
    fn first_at_or_after_lookup() {
        let store = BarStore::new(10, 1);
        for t in [10, 12, 15] {
            store.ingest("X", t as f64, 1.0, t);
        }
        assert_eq!(store.first_at_or_after("X", 11).map(|c| c.time), Some(12));
        assert_eq!(store.first_at_or_after("X", 15).map(|c| c.time), Some(15));
        assert!(store.first_at_or_after("X", 16).is_none());
        assert!(store.first_at_or_after("missing", 0).is_none());
    }

    #[test]
    fn sanitize_removes_corrupt_candles() {
        let store = BarStore::new(10, 1);
        store.ingest("X", 1.0, 1.0, 1);
        store.insert_raw("X", Candle::from_tick(1, 2.0, 1.0));
        store.insert_raw("X", Candle::from_tick(3, f64::NAN, 1.0));
        store.insert_raw("X", Candle::from_tick(4, 3.0, 1.0));
        assert_eq!(store.sanitize(), 2);
        let times: Vec<i64> = store.snapshot("X").iter().map(|c| c.time).collect();
        assert_eq!(times, vec![1, 4]);
    }
}
