//! K-Way Quote Merge
//!
//! Unifies the per-instrument quote feeds into one globally time-ordered
//! stream. The merged stream is the single source of truth for replay time.
//!
//! # Ordering Key (Total Order)
//!
//! 1. **Primary**: `timestamp`
//! 2. **Secondary**: `source_rank` - registration order of the feed
//! 3. **Tertiary**: `per_source_seq` - position within the feed
//!
//! The secondary key is the tie-break policy. It is load-bearing: trades are
//! only applied on anchor ticks, so whether an anchor quote sorts before or
//! after a same-timestamp quote from the other instrument decides which
//! valuation the trade is first observed against. Register feeds in the
//! order you want ties resolved.
//!
//! # Laziness
//!
//! The merger holds exactly one pending quote per feed and pulls the next one
//! from a feed only after its pending quote has been emitted.

use crate::replay::clock::Nanos;
use crate::replay::events::{Instrument, QuoteEvent};
use crate::replay::feed::QuoteFeed;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::warn;

// =============================================================================
// ORDERING KEY
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderingKey {
    pub timestamp: Nanos,
    pub source_rank: u8,
    pub per_source_seq: u64,
}

impl PartialOrd for OrderingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderingKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.source_rank.cmp(&other.source_rank))
            .then_with(|| self.per_source_seq.cmp(&other.per_source_seq))
    }
}

/// Pending quote in the merge heap.
///
/// Uses reversed ordering for min-heap behavior with BinaryHeap.
#[derive(Debug, Clone, Copy)]
struct MergeEntry {
    key: OrderingKey,
    source: usize,
    quote: QuoteEvent,
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key.cmp(&self.key)
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Total quotes emitted
    pub total_merged: u64,
    /// Quotes emitted per instrument (indexed by `Instrument::index`)
    pub by_instrument: [u64; 2],
    /// Emissions where another feed's pending quote had the same timestamp
    pub tiebreaks: u64,
}

/// Per-feed accounting, available after (or during) a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub name: String,
    pub instrument: Instrument,
    pub quotes_emitted: u64,
    pub rows_skipped: u64,
    /// Quotes whose timestamp went backwards within their own feed.
    pub out_of_order: u64,
    pub read_error: Option<String>,
}

struct SourceSlot<'a> {
    feed: Box<dyn QuoteFeed + 'a>,
    next_seq: u64,
    last_ts: Option<Nanos>,
    emitted: u64,
    out_of_order: u64,
}

/// FNV-1a over the emitted ordering keys.
#[derive(Debug, Clone)]
struct RunHashState {
    hasher: u64,
}

impl Default for RunHashState {
    fn default() -> Self {
        Self {
            hasher: 0xcbf29ce484222325,
        }
    }
}

impl RunHashState {
    fn update(&mut self, key: &OrderingKey) {
        let bytes = [
            key.timestamp.to_le_bytes().as_slice(),
            &[key.source_rank],
            key.per_source_seq.to_le_bytes().as_slice(),
        ]
        .concat();

        for byte in bytes {
            self.hasher ^= byte as u64;
            self.hasher = self.hasher.wrapping_mul(0x100000001b3);
        }
    }
}

// =============================================================================
// MERGER
// =============================================================================

/// Deterministic k-way merge over quote feeds.
pub struct QuoteMerger<'a> {
    sources: Vec<SourceSlot<'a>>,
    heap: BinaryHeap<MergeEntry>,
    stats: MergeStats,
    run_hash: RunHashState,
}

impl<'a> Default for QuoteMerger<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> QuoteMerger<'a> {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            heap: BinaryHeap::with_capacity(2),
            stats: MergeStats::default(),
            run_hash: RunHashState::default(),
        }
    }

    /// Register a feed. Earlier feeds win timestamp ties.
    ///
    /// The feed's first quote is pulled immediately so it can compete in the
    /// merge; an empty feed is simply exhausted from the start.
    pub fn add_feed(&mut self, feed: Box<dyn QuoteFeed + 'a>) {
        assert!(self.sources.len() < u8::MAX as usize, "QuoteMerger: too many feeds");
        self.sources.push(SourceSlot {
            feed,
            next_seq: 0,
            last_ts: None,
            emitted: 0,
            out_of_order: 0,
        });
        self.refill(self.sources.len() - 1);
    }

    fn refill(&mut self, source: usize) {
        let slot = &mut self.sources[source];
        if let Some(quote) = slot.feed.next_quote() {
            if let Some(last) = slot.last_ts {
                if quote.timestamp < last {
                    slot.out_of_order += 1;
                    if slot.out_of_order == 1 {
                        warn!(
                            source = %slot.feed.name(),
                            previous = last,
                            timestamp = quote.timestamp,
                            "Quote source is not time-sorted; merged order will not be monotone"
                        );
                    }
                }
            }
            slot.last_ts = Some(quote.timestamp);

            let key = OrderingKey {
                timestamp: quote.timestamp,
                source_rank: source as u8,
                per_source_seq: slot.next_seq,
            };
            slot.next_seq += 1;
            self.heap.push(MergeEntry { key, source, quote });
        }
    }

    /// Pop the next quote in merged order.
    ///
    /// Returns `None` when all feeds are exhausted.
    pub fn pop(&mut self) -> Option<QuoteEvent> {
        let entry = self.heap.pop()?;

        if let Some(next) = self.heap.peek() {
            if next.key.timestamp == entry.key.timestamp && next.source != entry.source {
                self.stats.tiebreaks += 1;
            }
        }

        self.run_hash.update(&entry.key);
        self.stats.total_merged += 1;
        self.stats.by_instrument[entry.quote.instrument.index()] += 1;
        self.sources[entry.source].emitted += 1;

        self.refill(entry.source);
        Some(entry.quote)
    }

    /// Timestamp of the next quote, without consuming it.
    pub fn peek_timestamp(&self) -> Option<Nanos> {
        self.heap.peek().map(|e| e.key.timestamp)
    }

    /// Check if all feeds are exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn stats(&self) -> &MergeStats {
        &self.stats
    }

    /// Hash of the emitted order. Identical inputs give identical hashes.
    pub fn run_hash(&self) -> u64 {
        self.run_hash.hasher
    }

    /// Per-feed accounting in registration order.
    pub fn source_reports(&self) -> Vec<SourceReport> {
        self.sources
            .iter()
            .map(|slot| SourceReport {
                name: slot.feed.name().to_string(),
                instrument: slot.feed.instrument(),
                quotes_emitted: slot.emitted,
                rows_skipped: slot.feed.rows_skipped(),
                out_of_order: slot.out_of_order,
                read_error: slot.feed.read_error().map(str::to_string),
            })
            .collect()
    }

    /// Get an iterator over merged quotes.
    pub fn iter(&mut self) -> MergeIterator<'_, 'a> {
        MergeIterator { merger: self }
    }
}

/// Iterator adapter for QuoteMerger.
pub struct MergeIterator<'m, 'a> {
    merger: &'m mut QuoteMerger<'a>,
}

impl<'m, 'a> Iterator for MergeIterator<'m, 'a> {
    type Item = QuoteEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.merger.pop()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::feed::VecFeed;
    use proptest::prelude::*;

    fn merger_ab<'a>(a: &[(i64, f64, f64)], b: &[(i64, f64, f64)]) -> QuoteMerger<'a> {
        let mut merger = QuoteMerger::new();
        merger.add_feed(Box::new(VecFeed::new(Instrument::A, a)));
        merger.add_feed(Box::new(VecFeed::new(Instrument::B, b)));
        merger
    }

    #[test]
    fn test_ordering_key_timestamp_primary() {
        let k1 = OrderingKey { timestamp: 1, source_rank: 1, per_source_seq: 9 };
        let k2 = OrderingKey { timestamp: 2, source_rank: 0, per_source_seq: 0 };
        assert!(k1 < k2);
    }

    #[test]
    fn test_ordering_key_source_secondary() {
        let k1 = OrderingKey { timestamp: 1, source_rank: 0, per_source_seq: 9 };
        let k2 = OrderingKey { timestamp: 1, source_rank: 1, per_source_seq: 0 };
        assert!(k1 < k2);
    }

    #[test]
    fn test_merge_interleaves() {
        let mut merger = merger_ab(
            &[(1000, 1.0, 2.0), (3000, 1.0, 2.0)],
            &[(2000, 1.0, 2.0), (4000, 1.0, 2.0)],
        );
        let times: Vec<i64> = merger.iter().map(|q| q.timestamp).collect();
        assert_eq!(times, vec![1000, 2000, 3000, 4000]);
        assert_eq!(merger.stats().total_merged, 4);
        assert_eq!(merger.stats().by_instrument, [2, 2]);
        assert!(merger.is_exhausted());
    }

    #[test]
    fn test_tie_goes_to_first_registered_feed() {
        let mut merger = merger_ab(&[(1000, 1.0, 2.0)], &[(1000, 3.0, 4.0)]);
        assert_eq!(merger.pop().unwrap().instrument, Instrument::A);
        assert_eq!(merger.pop().unwrap().instrument, Instrument::B);
        assert_eq!(merger.stats().tiebreaks, 1);

        let mut reversed = QuoteMerger::new();
        reversed.add_feed(Box::new(VecFeed::new(Instrument::B, &[(1000, 3.0, 4.0)])));
        reversed.add_feed(Box::new(VecFeed::new(Instrument::A, &[(1000, 1.0, 2.0)])));
        assert_eq!(reversed.pop().unwrap().instrument, Instrument::B);
    }

    #[test]
    fn test_tie_break_deterministic_across_runs() {
        let run = || {
            let mut merger = merger_ab(
                &[(5, 1.0, 2.0), (5, 1.5, 2.5), (9, 1.0, 2.0)],
                &[(5, 3.0, 4.0), (9, 3.0, 4.0)],
            );
            let order: Vec<(i64, Instrument, f64)> =
                merger.iter().map(|q| (q.timestamp, q.instrument, q.bid)).collect();
            (order, merger.run_hash())
        };
        let (first, hash) = run();
        for _ in 0..10 {
            assert_eq!(run(), (first.clone(), hash));
        }
        // Same-source ties keep file order.
        assert_eq!(first[0], (5, Instrument::A, 1.0));
        assert_eq!(first[1], (5, Instrument::A, 1.5));
        assert_eq!(first[2], (5, Instrument::B, 3.0));
    }

    #[test]
    fn test_empty_feed_is_exhausted_source() {
        let mut merger = QuoteMerger::new();
        merger.add_feed(Box::new(VecFeed::empty(Instrument::A)));
        merger.add_feed(Box::new(VecFeed::new(Instrument::B, &[(1, 1.0, 2.0), (2, 1.0, 2.0)])));
        let times: Vec<i64> = merger.iter().map(|q| q.timestamp).collect();
        assert_eq!(times, vec![1, 2]);

        let reports = merger.source_reports();
        assert_eq!(reports[0].quotes_emitted, 0);
        assert_eq!(reports[1].quotes_emitted, 2);
    }

    #[test]
    fn test_all_empty() {
        let mut merger = merger_ab(&[], &[]);
        assert!(merger.is_exhausted());
        assert!(merger.pop().is_none());
    }

    #[test]
    fn test_unsorted_source_is_counted() {
        let mut merger = merger_ab(&[(5, 1.0, 2.0), (3, 1.0, 2.0)], &[]);
        let times: Vec<i64> = merger.iter().map(|q| q.timestamp).collect();
        assert_eq!(times, vec![5, 3]);
        assert_eq!(merger.source_reports()[0].out_of_order, 1);
    }

    #[test]
    fn test_lazy_pull_holds_one_pending_per_feed() {
        let mut merger = merger_ab(&[(1, 1.0, 2.0), (2, 1.0, 2.0), (3, 1.0, 2.0)], &[(10, 1.0, 2.0)]);
        assert_eq!(merger.peek_timestamp(), Some(1));
        merger.pop();
        // A's second quote has been pulled, its third has not.
        assert_eq!(merger.peek_timestamp(), Some(2));
    }

    #[test]
    fn test_three_way_merge() {
        let mut merger = QuoteMerger::new();
        merger.add_feed(Box::new(VecFeed::new(Instrument::A, &[(1, 1.0, 1.0), (7, 1.0, 1.0)])));
        merger.add_feed(Box::new(VecFeed::new(Instrument::B, &[(3, 1.0, 1.0)])));
        merger.add_feed(Box::new(VecFeed::new(Instrument::A, &[(2, 1.0, 1.0), (7, 1.0, 1.0)])));
        let times: Vec<i64> = merger.iter().map(|q| q.timestamp).collect();
        assert_eq!(times, vec![1, 2, 3, 7, 7]);
    }

    fn sorted_quotes() -> impl Strategy<Value = Vec<(i64, f64, f64)>> {
        prop::collection::vec((0i64..1_000, 1.0f64..100.0), 0..40).prop_map(|mut v| {
            v.sort_by_key(|(ts, _)| *ts);
            v.into_iter().map(|(ts, bid)| (ts, bid, bid + 0.5)).collect()
        })
    }

    proptest! {
        /// Property: merged output is non-decreasing and is exactly the union of the inputs.
        #[test]
        fn prop_merge_sorted_and_complete(a in sorted_quotes(), b in sorted_quotes()) {
            let mut merger = merger_ab(&a, &b);
            let merged: Vec<QuoteEvent> = merger.iter().collect();

            prop_assert_eq!(merged.len(), a.len() + b.len());
            for w in merged.windows(2) {
                prop_assert!(w[0].timestamp <= w[1].timestamp);
            }

            let key = |q: &QuoteEvent| (q.instrument, q.timestamp, q.bid.to_bits(), q.ask.to_bits());
            let mut got: Vec<_> = merged.iter().map(key).collect();
            let mut want: Vec<_> = a
                .iter()
                .map(|&(t, bid, ask)| QuoteEvent::new(t, Instrument::A, bid, ask))
                .chain(b.iter().map(|&(t, bid, ask)| QuoteEvent::new(t, Instrument::B, bid, ask)))
                .map(|q| key(&q))
                .collect();
            got.sort();
            want.sort();
            prop_assert_eq!(got, want);
        }
    }
}
