//! Replay Engine
//!
//! Drives one replay run: merge the two quote feeds, gate trades into the
//! ledger on anchor ticks, and sample mark-to-market snapshots.
//!
//! # Per-Quote Dispatch
//!
//! For every quote popped from the merger, in order:
//!
//! 1. Update that instrument's last mid.
//! 2. If the quote is on the anchor instrument, apply every pending trade
//!    stamped at or before it.
//! 3. Ask the sampler whether the quote closes an interval.
//!
//! Trades land before the sampling check, so a snapshot taken on an anchor
//! tick already reflects the trades at that tick.
//!
//! A run is pure: the same feeds, trades and config always yield the same
//! snapshots, the same merge hash and the same snapshot fingerprint.

use crate::config::ReplayConfig;
use crate::replay::clock::Nanos;
use crate::replay::curve::PnlCurve;
use crate::replay::error::ReplayError;
use crate::replay::events::{Instrument, QuoteEvent, Snapshot, Trade};
use crate::replay::feed::QuoteFeed;
use crate::replay::ledger::{PositionLedger, TradeGate};
use crate::replay::merge::{QuoteMerger, SourceReport};
use crate::replay::reader::CsvQuoteReader;
use crate::replay::sampler::PnlSampler;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, trace, Span};

// =============================================================================
// RESULTS
// =============================================================================

/// Statistics of one completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub anchor: Instrument,
    pub sample_interval_ns: Nanos,

    /// Quotes emitted by the merger
    pub events_merged: u64,
    pub events_a: u64,
    pub events_b: u64,
    /// Same-timestamp collisions resolved by the tie-break
    pub tiebreaks: u64,
    /// Per-feed accounting (skipped rows, read errors), in merge priority order
    pub sources: Vec<SourceReport>,
    pub first_event_time: Option<Nanos>,
    pub last_event_time: Option<Nanos>,
    /// Last anchor tick; trades stamped after it are orphaned
    pub last_anchor_time: Option<Nanos>,

    pub trades_total: u64,
    pub trades_applied: u64,
    pub trades_orphaned: u64,

    pub final_position: i64,
    pub final_cash: f64,
    /// Mark-to-market at the last anchor mid; `None` if the anchor never quoted
    pub final_pnl: Option<f64>,
    pub max_abs_exposure: u64,
    pub traded_lots: u64,

    pub snapshots: u64,
    pub best_pnl: Option<f64>,
    pub worst_pnl: Option<f64>,
    pub max_drawdown: f64,
    /// Sample boundaries passed before the anchor had a price
    pub samples_skipped_without_anchor: u64,

    pub merge_hash: u64,
    pub snapshot_fingerprint: u64,
}

impl ReplaySummary {
    /// True if any feed was cut short by an I/O error.
    pub fn has_read_errors(&self) -> bool {
        self.sources.iter().any(|s| s.read_error.is_some())
    }

    pub fn rows_skipped(&self, instrument: Instrument) -> u64 {
        self.sources
            .iter()
            .filter(|s| s.instrument == instrument)
            .map(|s| s.rows_skipped)
            .sum()
    }
}

/// Output of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub snapshots: Vec<Snapshot>,
    pub summary: ReplaySummary,
    /// Trades never applied because no anchor tick reached them.
    pub orphaned_trades: Vec<Trade>,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Entry point for replay runs. Holds only configuration; every run owns
/// its own merger, ledger and sampler.
#[derive(Debug, Clone)]
pub struct ReplayEngine {
    config: ReplayConfig,
}

impl ReplayEngine {
    pub fn new(config: ReplayConfig) -> Result<Self, ReplayError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Run to completion and collect every snapshot.
    pub fn replay<'a>(
        &self,
        feed_a: impl QuoteFeed + 'a,
        feed_b: impl QuoteFeed + 'a,
        trades: Vec<Trade>,
    ) -> Result<ReplayReport, ReplayError> {
        Ok(self.stream(feed_a, feed_b, trades)?.finish())
    }

    /// Open both quote files and replay them.
    pub fn replay_files(
        &self,
        path_a: impl AsRef<Path>,
        path_b: impl AsRef<Path>,
        trades: Vec<Trade>,
    ) -> Result<ReplayReport, ReplayError> {
        let feed_a = CsvQuoteReader::open(path_a, Instrument::A)?;
        let feed_b = CsvQuoteReader::open(path_b, Instrument::B)?;
        self.replay(feed_a, feed_b, trades)
    }

    /// Start a lazy run. Each feed's first quote is read up front, the rest
    /// only as the stream is pulled. Dropping the stream abandons the run.
    ///
    /// Fails fast on a trade that breaks the trade contract or is not on the
    /// anchor instrument, and on feeds passed in the wrong slot.
    pub fn stream<'a>(
        &self,
        feed_a: impl QuoteFeed + 'a,
        feed_b: impl QuoteFeed + 'a,
        trades: Vec<Trade>,
    ) -> Result<SnapshotStream<'a>, ReplayError> {
        check_feed(&feed_a, Instrument::A)?;
        check_feed(&feed_b, Instrument::B)?;

        let anchor = self.config.anchor;
        for trade in &trades {
            trade.validate()?;
            if trade.instrument != anchor {
                return Err(ReplayError::ForeignInstrument {
                    timestamp: trade.timestamp,
                    instrument: trade.instrument,
                    anchor,
                });
            }
        }

        let feed_a: Box<dyn QuoteFeed + 'a> = Box::new(feed_a);
        let feed_b: Box<dyn QuoteFeed + 'a> = Box::new(feed_b);
        let mut feeds = [Some(feed_a), Some(feed_b)];
        let span = tracing::info_span!(
            "replay",
            anchor = %anchor,
            interval_ns = self.config.sample_interval_ns,
        );

        let merger = {
            let _enter = span.enter();
            let mut merger = QuoteMerger::new();
            for instrument in self.config.tie_break.priority() {
                if let Some(feed) = feeds[instrument.index()].take() {
                    merger.add_feed(feed);
                }
            }
            debug!(trades = trades.len(), tie_break = ?self.config.tie_break, "Replay run started");
            merger
        };

        Ok(SnapshotStream {
            merger,
            gate: TradeGate::new(trades),
            ledger: PositionLedger::new(),
            sampler: PnlSampler::new(self.config.sample_interval_ns, anchor),
            curve: PnlCurve::new(),
            anchor,
            sample_interval_ns: self.config.sample_interval_ns,
            first_event_time: None,
            last_event_time: None,
            last_anchor_time: None,
            span,
        })
    }
}

fn check_feed(feed: &impl QuoteFeed, expected: Instrument) -> Result<(), ReplayError> {
    let found = feed.instrument();
    if found != expected {
        return Err(ReplayError::FeedMismatch { expected, found });
    }
    Ok(())
}

// =============================================================================
// STREAM
// =============================================================================

/// A replay run in progress, yielding snapshots as they are sampled.
pub struct SnapshotStream<'a> {
    merger: QuoteMerger<'a>,
    gate: TradeGate,
    ledger: PositionLedger,
    sampler: PnlSampler,
    curve: PnlCurve,
    anchor: Instrument,
    sample_interval_ns: Nanos,
    first_event_time: Option<Nanos>,
    last_event_time: Option<Nanos>,
    last_anchor_time: Option<Nanos>,
    span: Span,
}

impl<'a> SnapshotStream<'a> {
    fn dispatch(&mut self, quote: &QuoteEvent) -> Option<Snapshot> {
        let now = quote.timestamp;
        self.first_event_time.get_or_insert(now);
        self.last_event_time = Some(now);

        self.sampler.update_mid(quote);

        if quote.instrument == self.anchor {
            self.last_anchor_time = Some(now);
            let applied = self.gate.drain_through(now, &mut self.ledger);
            if applied > 0 {
                trace!(timestamp = now, applied, position = self.ledger.position(), "Trades applied");
            }
        }

        let snapshot = self.sampler.maybe_sample(now, &self.ledger)?;
        self.curve.record(&snapshot);
        Some(snapshot)
    }

    /// Current ledger, reflecting every trade applied so far.
    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn sampler(&self) -> &PnlSampler {
        &self.sampler
    }

    /// Trades not yet applied. Once the stream is exhausted these are orphaned.
    pub fn pending_trades(&self) -> &[Trade] {
        self.gate.pending()
    }

    /// Statistics of the run so far.
    pub fn summary(&self) -> ReplaySummary {
        let stats = self.merger.stats();
        let curve = self.curve.summary();
        let anchor_mid = self.sampler.anchor_mid();

        ReplaySummary {
            anchor: self.anchor,
            sample_interval_ns: self.sample_interval_ns,
            events_merged: stats.total_merged,
            events_a: stats.by_instrument[Instrument::A.index()],
            events_b: stats.by_instrument[Instrument::B.index()],
            tiebreaks: stats.tiebreaks,
            sources: self.merger.source_reports(),
            first_event_time: self.first_event_time,
            last_event_time: self.last_event_time,
            last_anchor_time: self.last_anchor_time,
            trades_total: self.gate.len() as u64,
            trades_applied: self.gate.applied().len() as u64,
            trades_orphaned: self.gate.pending().len() as u64,
            final_position: self.ledger.position(),
            final_cash: self.ledger.cash(),
            final_pnl: (anchor_mid > 0.0).then(|| self.ledger.mark_to_market(anchor_mid)),
            max_abs_exposure: self.ledger.max_abs_exposure(),
            traded_lots: self.ledger.traded_lots(),
            snapshots: curve.points,
            best_pnl: curve.best_pnl,
            worst_pnl: curve.worst_pnl,
            max_drawdown: curve.max_drawdown,
            samples_skipped_without_anchor: self.sampler.skipped_without_anchor(),
            merge_hash: self.merger.run_hash(),
            snapshot_fingerprint: curve.fingerprint,
        }
    }

    /// Drain the rest of the run and build the report.
    ///
    /// `snapshots` holds only the snapshots not already pulled through the
    /// iterator; the summary always covers the whole run.
    pub fn finish(mut self) -> ReplayReport {
        let snapshots: Vec<Snapshot> = self.by_ref().collect();
        let summary = self.summary();
        let orphaned_trades = self.gate.pending().to_vec();

        let _enter = self.span.enter();
        if !orphaned_trades.is_empty() {
            info!(
                orphaned = orphaned_trades.len(),
                first = orphaned_trades[0].timestamp,
                last_anchor_tick = ?self.last_anchor_time,
                "Trades never reached by an anchor tick"
            );
        }
        info!(
            events = summary.events_merged,
            snapshots = summary.snapshots,
            trades_applied = summary.trades_applied,
            position = summary.final_position,
            final_pnl = ?summary.final_pnl,
            fingerprint = %format!("{:016x}", summary.snapshot_fingerprint),
            "Replay complete"
        );

        ReplayReport {
            snapshots,
            summary,
            orphaned_trades,
        }
    }
}

impl Iterator for SnapshotStream<'_> {
    type Item = Snapshot;

    fn next(&mut self) -> Option<Snapshot> {
        let span = self.span.clone();
        let _enter = span.enter();

        while let Some(quote) = self.merger.pop() {
            if let Some(snapshot) = self.dispatch(&quote) {
                return Some(snapshot);
            }
        }
        None
    }
}
