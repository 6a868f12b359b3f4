//! Quote Replay
//!
//! Deterministic replay of a two-instrument trading simulation: rebuilds the
//! global quote sequence from per-instrument recordings, applies the
//! simulator's trades at the right points, and samples a mark-to-market PnL
//! curve for charting.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐        ┌──────────────────┐
//! │ QuoteFeed A  │   │ QuoteFeed B  │        │ TradeLogDecoder  │
//! │ (csv reader) │   │ (csv reader) │        │ (simulator log)  │
//! └──────┬───────┘   └──────┬───────┘        └────────┬─────────┘
//!        └────────┬─────────┘                         │ Vec<Trade>
//!                 ▼                                   ▼
//! ┌─────────────────────────────────┐        ┌──────────────────┐
//! │           QuoteMerger           │        │    TradeGate     │
//! │ BinaryHeap<(ts, rank, seq)>     │        │ (sorted, cursor) │
//! └────────────────┬────────────────┘        └────────┬─────────┘
//!                  │ QuoteEvent                       │ anchor ticks only
//!                  ▼                                  ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        SnapshotStream                        │
//! │   mid update ──▶ PositionLedger ──▶ PnlSampler ──▶ PnlCurve  │
//! └────────────────────────────┬─────────────────────────────────┘
//!                              ▼
//!                   Snapshot / ReplayReport
//! ```
//!
//! # Determinism Guarantees
//!
//! - **Clock**: replay time is the merged quote timestamp, never wall time
//! - **Merge**: `(timestamp, source_rank, per_source_seq)` total order
//! - **Ledger**: fixed-point cash, stable trade sort
//! - **Fingerprints**: FNV-1a merge hash and snapshot fingerprint per run

pub mod clock;
pub mod curve;
pub mod engine;
pub mod error;
pub mod events;
pub mod feed;
pub mod ledger;
pub mod merge;
pub mod reader;
pub mod sampler;
pub mod trade_log;


pub use clock::{Nanos, DEFAULT_SAMPLE_INTERVAL_NS, NANOS_PER_SEC};
pub use curve::{CurveSummary, PnlCurve};
pub use engine::{ReplayEngine, ReplayReport, ReplaySummary, SnapshotStream};
pub use error::ReplayError;
pub use events::{Instrument, QuoteEvent, Side, Snapshot, Trade};
pub use feed::{QuoteFeed, QuoteFeedExt, VecFeed};
pub use ledger::{Amount, LedgerState, PositionLedger, TradeGate, AMOUNT_SCALE};
pub use merge::{MergeStats, OrderingKey, QuoteMerger, SourceReport};
pub use reader::CsvQuoteReader;
pub use sampler::{PnlSampler, SamplerState};
pub use trade_log::{FlattenMarker, RunSummary, TradeLog, TradeLogDecoder};
