//! Sampled PnL Curve Statistics
//!
//! Running statistics over the snapshot series: best and worst sampled PnL,
//! drawdown from the running peak, and a fingerprint of the series.
//!
//! # Drawdown
//!
//! ```text
//! Drawdown = PeakPnL - PnL
//! ```
//!
//! The peak starts at 0 (a run opens flat), so a curve that never goes
//! positive still reports its full depth as drawdown. Statistics are kept in
//! `f64` so that valuations outside the ledger's fixed-point range are
//! summarized as reported.
//!
//! # Fingerprint
//!
//! FNV-1a over `(timestamp, pnl bits, position)` of every recorded point. Two
//! runs with identical output have identical fingerprints.

use crate::replay::clock::Nanos;
use crate::replay::events::Snapshot;
use serde::{Deserialize, Serialize};

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Incrementally maintained statistics of the sampled PnL curve.
#[derive(Debug, Clone)]
pub struct PnlCurve {
    points: u64,
    first_time: Option<Nanos>,
    last_time: Option<Nanos>,
    best: Option<f64>,
    worst: Option<f64>,
    peak: f64,
    max_drawdown: f64,
    fingerprint: u64,
}

impl Default for PnlCurve {
    fn default() -> Self {
        Self::new()
    }
}

impl PnlCurve {
    pub fn new() -> Self {
        Self {
            points: 0,
            first_time: None,
            last_time: None,
            best: None,
            worst: None,
            peak: 0.0,
            max_drawdown: 0.0,
            fingerprint: FNV_OFFSET,
        }
    }

    /// Record one emitted snapshot.
    pub fn record(&mut self, snapshot: &Snapshot) {
        let pnl = snapshot.pnl;

        self.points += 1;
        self.first_time.get_or_insert(snapshot.timestamp);
        self.last_time = Some(snapshot.timestamp);
        self.best = Some(self.best.map_or(pnl, |b| b.max(pnl)));
        self.worst = Some(self.worst.map_or(pnl, |w| w.min(pnl)));

        if pnl > self.peak {
            self.peak = pnl;
        }
        self.max_drawdown = self.max_drawdown.max(self.peak - pnl);

        self.hash_bytes(&snapshot.timestamp.to_le_bytes());
        self.hash_bytes(&snapshot.pnl.to_bits().to_le_bytes());
        self.hash_bytes(&snapshot.position.to_le_bytes());
    }

    fn hash_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.fingerprint ^= byte as u64;
            self.fingerprint = self.fingerprint.wrapping_mul(FNV_PRIME);
        }
    }

    pub fn len(&self) -> u64 {
        self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points == 0
    }

    pub fn first_time(&self) -> Option<Nanos> {
        self.first_time
    }

    pub fn last_time(&self) -> Option<Nanos> {
        self.last_time
    }

    pub fn best_pnl(&self) -> Option<f64> {
        self.best
    }

    pub fn worst_pnl(&self) -> Option<f64> {
        self.worst
    }

    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Freeze the statistics into a serializable summary.
    pub fn summary(&self) -> CurveSummary {
        CurveSummary {
            points: self.points,
            first_time: self.first_time,
            last_time: self.last_time,
            best_pnl: self.best_pnl(),
            worst_pnl: self.worst_pnl(),
            max_drawdown: self.max_drawdown(),
            fingerprint: self.fingerprint,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveSummary {
    pub points: u64,
    pub first_time: Option<Nanos>,
    pub last_time: Option<Nanos>,
    pub best_pnl: Option<f64>,
    pub worst_pnl: Option<f64>,
    pub max_drawdown: f64,
    pub fingerprint: u64,
}
