// =============================================================================
// Signal Ledger — append-only record of emitted signals
// =============================================================================
//
// Ids are strictly increasing.  A signal's `result` moves PENDING -> WIN/LOSS
// exactly once; the transition happens under the write lock so readers see
// either the pending or the fully resolved record, never a mix.  Retention is
// capped: when over capacity the oldest resolved signal is dropped first.
// =============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::confluence::Candidate;
use crate::clock::iso_from_secs;
use crate::types::{Direction, FeatureFlags, SignalResult};

/// An emitted signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: u64,
    pub instrument: String,
    pub direction: Direction,
    pub confidence: i32,
    pub entry_price: f64,
    pub entry_time: i64,
    pub expiry_time: i64,
    pub entry_time_iso: String,
    pub tags: Vec<String>,
    pub flags: FeatureFlags,
    pub notes: String,
    pub result: SignalResult,
    #[serde(default)]
    pub final_price: Option<f64>,
    #[serde(default)]
    pub resolved_at: Option<i64>,
    /// Resolved against the latest candle because nothing existed at expiry.
    #[serde(default)]
    pub resolved_with_fallback: bool,
}

impl Signal {
    pub fn is_pending(&self) -> bool {
        self.result == SignalResult::Pending
    }

    /// WIN iff UP and final >= entry, or DOWN and final <= entry.
    pub fn wins_at(&self, final_price: f64) -> bool {
        match self.direction {
            Direction::Up => final_price >= self.entry_price,
            Direction::Down => final_price <= self.entry_price,
        }
    }
}

/// How a pending signal was settled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settlement {
    pub final_price: f64,
    pub resolved_at: i64,
    pub used_fallback: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total: usize,
    pub pending: usize,
    pub wins: usize,
    pub losses: usize,
    /// Percentage over resolved signals; 0 when none are resolved.
    pub win_rate: f64,
}

pub struct SignalLedger {
    next_id: AtomicU64,
    signals: RwLock<VecDeque<Signal>>,
    capacity: usize,
}

impl SignalLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            signals: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Record `candidate` as a PENDING signal and return a copy of it.
    pub fn emit(&self, candidate: &Candidate) -> Signal {
        let mut signals = self.signals.write();
        // Allocate under the lock so storage order matches id order.
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let signal = Signal {
            id,
            instrument: candidate.instrument.clone(),
            direction: candidate.direction,
            confidence: candidate.confidence,
            entry_price: candidate.entry_price,
            entry_time: candidate.entry_time,
            expiry_time: candidate.expiry_time,
            entry_time_iso: iso_from_secs(candidate.entry_time),
            tags: candidate.tags.iter().cloned().collect(),
            flags: candidate.flags,
            notes: candidate.notes.clone(),
            result: SignalResult::Pending,
            final_price: None,
            resolved_at: None,
            resolved_with_fallback: false,
        };
        signals.push_back(signal.clone());

        while signals.len() > self.capacity {
            match signals.iter().position(|s| !s.is_pending()) {
                Some(idx) => {
                    signals.remove(idx);
                }
                None => {
                    if let Some(dropped) = signals.pop_front() {
                        warn!(id = dropped.id, instrument = %dropped.instrument, "ledger full; dropped pending signal");
                    }
                }
            }
        }

        info!(
            id,
            instrument = %signal.instrument,
            direction = %signal.direction,
            confidence = signal.confidence,
            expiry = signal.expiry_time,
            "signal emitted"
        );
        signal
    }

    #[cfg(test)]
    pub fn get(&self, id: u64) -> Option<Signal> {
        let signals = self.signals.read();
        signals
            .binary_search_by_key(&id, |s| s.id)
            .ok()
            .and_then(|idx| signals.get(idx).cloned())
    }

    /// PENDING signals whose expiry is at or before `now`.
    pub fn expired_pending(&self, now: i64) -> Vec<Signal> {
        self.signals
            .read()
            .iter()
            .filter(|s| s.is_pending() && s.expiry_time <= now)
            .cloned()
            .collect()
    }

    /// Settle a PENDING signal. Returns the resolved record only when this
    /// call performed the transition; `None` if it was missing or already
    /// resolved.
    pub fn resolve(&self, id: u64, settlement: Settlement) -> Option<Signal> {
        let mut signals = self.signals.write();
        let idx = signals.binary_search_by_key(&id, |s| s.id).ok()?;
        let signal = signals.get_mut(idx)?;
        if !signal.is_pending() {
            return None;
        }

        signal.result = if signal.wins_at(settlement.final_price) {
            SignalResult::Win
        } else {
            SignalResult::Loss
        };
        signal.final_price = Some(settlement.final_price);
        signal.resolved_at = Some(settlement.resolved_at);
        signal.resolved_with_fallback = settlement.used_fallback;
        Some(signal.clone())
    }

    /// Newest-first copy of the last `limit` signals.
    pub fn recent(&self, limit: usize) -> Vec<Signal> {
        self.signals.read().iter().rev().take(limit).cloned().collect()
    }

    /// Results of the most recent `window` resolved signals, oldest first.
    pub fn recent_outcomes(&self, window: usize) -> Vec<SignalResult> {
        let signals = self.signals.read();
        let mut out: Vec<SignalResult> = signals
            .iter()
            .rev()
            .filter(|s| !s.is_pending())
            .take(window)
            .map(|s| s.result)
            .collect();
        out.reverse();
        out
    }

    pub fn stats(&self) -> LedgerStats {
        let signals = self.signals.read();
        let mut stats = LedgerStats {
            total: signals.len(),
            ..LedgerStats::default()
        };
        for s in signals.iter() {
            match s.result {
                SignalResult::Pending => stats.pending += 1,
                SignalResult::Win => stats.wins += 1,
                SignalResult::Loss => stats.losses += 1,
            }
        }
        let resolved = stats.wins + stats.losses;
        if resolved > 0 {
            stats.win_rate = stats.wins as f64 / resolved as f64 * 100.0;
        }
        stats
    }

    /// PENDING signals that expired more than `threshold_secs` before `now`.
    pub fn stale_pending(&self, now: i64, threshold_secs: i64) -> usize {
        self.signals
            .read()
            .iter()
            .filter(|s| s.is_pending() && now - s.expiry_time > threshold_secs)
            .count()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.signals.read().len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashSet};

    pub(crate) fn candidate(instrument: &str, direction: Direction, entry: f64, entry_time: i64) -> Candidate {
        Candidate {
            instrument: instrument.to_string(),
            direction,
            confidence: 70,
            entry_price: entry,
            entry_time,
            expiry_time: entry_time + 60,
            tags: BTreeSet::new(),
            flags: FeatureFlags::default(),
            notes: String::new(),
            rsi: 50.0,
            layers: 2,
            bullish_momentum: direction == Direction::Up,
            applied: HashSet::new(),
        }
    }

    fn settle(price: f64) -> Settlement {
        Settlement {
            final_price: price,
            resolved_at: 100,
            used_fallback: false,
        }
    }

    #[test]
    fn ids_strictly_increase() {
        let ledger = SignalLedger::new(10);
        let a = ledger.emit(&candidate("A", Direction::Up, 1.0, 0));
        let b = ledger.emit(&candidate("B", Direction::Up, 1.0, 0));
        assert!(b.id > a.id);
        assert_eq!(a.result, SignalResult::Pending);
    }

    #[test]
    fn equality_is_a_win_for_both_directions() {
        let ledger = SignalLedger::new(10);
        let up = ledger.emit(&candidate("A", Direction::Up, 1.2345, 0));
        let down = ledger.emit(&candidate("A", Direction::Down, 1.2345, 0));
        assert_eq!(ledger.resolve(up.id, settle(1.2345)).unwrap().result, SignalResult::Win);
        assert_eq!(ledger.resolve(down.id, settle(1.2345)).unwrap().result, SignalResult::Win);
    }

    #[test]
    fn direction_decides_outcome() {
        let ledger = SignalLedger::new(10);
        let up = ledger.emit(&candidate("A", Direction::Up, 1.0, 0));
        let down = ledger.emit(&candidate("A", Direction::Down, 1.0, 0));
        assert_eq!(ledger.resolve(up.id, settle(0.99)).unwrap().result, SignalResult::Loss);
        assert_eq!(ledger.resolve(down.id, settle(0.99)).unwrap().result, SignalResult::Win);
    }

    #[test]
    fn resolution_happens_exactly_once() {
        let ledger = SignalLedger::new(10);
        let s = ledger.emit(&candidate("A", Direction::Up, 1.0, 0));
        let first = ledger.resolve(s.id, settle(2.0)).unwrap();
        assert_eq!(first.result, SignalResult::Win);
        // A later, losing price must not flip the result.
        assert!(ledger.resolve(s.id, settle(0.5)).is_none());
        assert_eq!(ledger.get(s.id).unwrap().result, SignalResult::Win);
        assert!(ledger.resolve(999, settle(1.0)).is_none());
    }

    #[test]
    fn capacity_drops_resolved_first() {
        let ledger = SignalLedger::new(2);
        let a = ledger.emit(&candidate("A", Direction::Up, 1.0, 0));
        let b = ledger.emit(&candidate("B", Direction::Up, 1.0, 0));
        ledger.resolve(b.id, settle(1.0));
        let c = ledger.emit(&candidate("C", Direction::Up, 1.0, 0));
        let ids: Vec<u64> = ledger.recent(10).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![c.id, a.id]);
    }

    #[test]
    fn stats_and_stale_pending() {
        let ledger = SignalLedger::new(10);
        let a = ledger.emit(&candidate("A", Direction::Up, 1.0, 0));
        ledger.emit(&candidate("B", Direction::Up, 1.0, 1_000));
        ledger.resolve(a.id, settle(1.5));

        let stats = ledger.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.win_rate, 100.0);

        // B expires at 1060.
        assert_eq!(ledger.stale_pending(1_300, 300), 0);
        assert_eq!(ledger.stale_pending(1_361, 300), 1);
        assert_eq!(ledger.expired_pending(1_059).len(), 0);
        assert_eq!(ledger.expired_pending(1_060).len(), 1);
    }

    #[test]
    fn recent_outcomes_skip_pending() {
        let ledger = SignalLedger::new(10);
        let a = ledger.emit(&candidate("A", Direction::Up, 1.0, 0));
        ledger.emit(&candidate("B", Direction::Up, 1.0, 0));
        let c = ledger.emit(&candidate("C", Direction::Up, 1.0, 0));
        ledger.resolve(a.id, settle(2.0));
        ledger.resolve(c.id, settle(0.5));
        assert_eq!(
            ledger.recent_outcomes(10),
            vec![SignalResult::Win, SignalResult::Loss]
        );
        assert_eq!(ledger.recent_outcomes(1), vec![SignalResult::Loss]);
    }
}
