//! PnL Sampler
//!
//! Tracks the latest mid price of each instrument and decides when the
//! replay emits a chart point.
//!
//! The first quote of a run starts the sampling clock without emitting. After
//! that, the first quote at least `interval` past the previous sample emits a
//! [`Snapshot`], provided the anchor instrument has a positive mid. If the
//! anchor has not been quoted yet the sample is skipped but the clock still
//! restarts, so the curve does not open with a burst of points once the
//! anchor appears. A trailing partial interval never emits.

use crate::replay::clock::Nanos;
use crate::replay::events::{Instrument, QuoteEvent, Snapshot};
use crate::replay::ledger::PositionLedger;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplerState {
    pub last_mid_a: f64,
    pub last_mid_b: f64,
    pub last_sample_time: Option<Nanos>,
}

#[derive(Debug, Clone)]
pub struct PnlSampler {
    interval: Nanos,
    anchor: Instrument,
    last_mid: [f64; 2],
    last_sample_time: Option<Nanos>,
    skipped_without_anchor: u64,
}

impl PnlSampler {
    pub fn new(interval: Nanos, anchor: Instrument) -> Self {
        debug_assert!(interval > 0, "PnlSampler: interval must be positive");
        Self {
            interval,
            anchor,
            last_mid: [0.0; 2],
            last_sample_time: None,
            skipped_without_anchor: 0,
        }
    }

    /// Record the quote's mid as the latest price for its instrument.
    #[inline]
    pub fn update_mid(&mut self, quote: &QuoteEvent) {
        self.last_mid[quote.instrument.index()] = quote.mid();
    }

    /// Decide whether the quote at `now` closes a sampling interval.
    pub fn maybe_sample(&mut self, now: Nanos, ledger: &PositionLedger) -> Option<Snapshot> {
        let last = match self.last_sample_time {
            Some(last) => last,
            None => {
                self.last_sample_time = Some(now);
                return None;
            }
        };

        if now.saturating_sub(last) < self.interval {
            return None;
        }
        self.last_sample_time = Some(now);

        let anchor_mid = self.anchor_mid();
        if anchor_mid <= 0.0 {
            self.skipped_without_anchor += 1;
            return None;
        }

        Some(Snapshot {
            timestamp: now,
            price_a: self.last_mid[Instrument::A.index()],
            price_b: self.last_mid[Instrument::B.index()],
            pnl: ledger.mark_to_market(anchor_mid),
            position: ledger.position(),
        })
    }

    pub fn anchor_mid(&self) -> f64 {
        self.last_mid[self.anchor.index()]
    }

    pub fn mid(&self, instrument: Instrument) -> f64 {
        self.last_mid[instrument.index()]
    }

    /// Interval boundaries passed while the anchor had no price.
    pub fn skipped_without_anchor(&self) -> u64 {
        self.skipped_without_anchor
    }

    pub fn state(&self) -> SamplerState {
        SamplerState {
            last_mid_a: self.last_mid[Instrument::A.index()],
            last_mid_b: self.last_mid[Instrument::B.index()],
            last_sample_time: self.last_sample_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b_quote(ts: i64, mid: f64) -> QuoteEvent {
        QuoteEvent::new(ts, Instrument::B, mid - 1.0, mid + 1.0)
    }

    fn feed(sampler: &mut PnlSampler, quote: QuoteEvent, ledger: &PositionLedger) -> Option<Snapshot> {
        sampler.update_mid(&quote);
        sampler.maybe_sample(quote.timestamp, ledger)
    }

    #[test]
    fn test_first_event_starts_clock_without_sampling() {
        let mut sampler = PnlSampler::new(60, Instrument::B);
        let ledger = PositionLedger::new();
        assert!(feed(&mut sampler, b_quote(100, 20.0), &ledger).is_none());
        assert_eq!(sampler.state().last_sample_time, Some(100));
    }

    #[test]
    fn test_sampling_cadence() {
        let mut sampler = PnlSampler::new(60, Instrument::B);
        let ledger = PositionLedger::new();

        let sampled: Vec<i64> = [0, 30, 60, 90, 150]
            .into_iter()
            .filter_map(|ts| feed(&mut sampler, b_quote(ts, 20.0), &ledger))
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(sampled, vec![60, 150]);
    }

    #[test]
    fn test_missing_anchor_skips_and_resets_clock() {
        let mut sampler = PnlSampler::new(60, Instrument::B);
        let ledger = PositionLedger::new();
        let a = |ts| QuoteEvent::new(ts, Instrument::A, 9.0, 11.0);

        assert!(feed(&mut sampler, a(0), &ledger).is_none());
        assert!(feed(&mut sampler, a(60), &ledger).is_none());
        assert_eq!(sampler.skipped_without_anchor(), 1);
        assert_eq!(sampler.state().last_sample_time, Some(60));

        // Anchor appears at 100: only 40 since the reset, no burst.
        assert!(feed(&mut sampler, b_quote(100, 20.0), &ledger).is_none());
        let snap = feed(&mut sampler, b_quote(120, 20.0), &ledger).unwrap();
        assert_eq!(snap.timestamp, 120);
        assert_eq!(snap.price_a, 10.0);
        assert_eq!(snap.price_b, 20.0);
    }

    #[test]
    fn test_snapshot_uses_ledger() {
        use crate::replay::events::{Side, Trade};
        let mut sampler = PnlSampler::new(10, Instrument::B);
        let mut ledger = PositionLedger::new();
        ledger.apply(&Trade::new(0, Side::Buy, Instrument::B, 2, 20.0).unwrap());

        feed(&mut sampler, b_quote(0, 20.0), &ledger);
        let snap = feed(&mut sampler, b_quote(10, 25.0), &ledger).unwrap();
        assert_eq!(snap.position, 2);
        assert_eq!(snap.pnl, 10.0);
    }

    #[test]
    fn test_anchor_a_values_against_a() {
        let mut sampler = PnlSampler::new(10, Instrument::A);
        let ledger = PositionLedger::new();
        feed(&mut sampler, b_quote(0, 20.0), &ledger);
        // B is quoted, A is not: A is the anchor, so no sample.
        assert!(feed(&mut sampler, b_quote(10, 20.0), &ledger).is_none());
        assert_eq!(sampler.anchor_mid(), 0.0);
    }
}
