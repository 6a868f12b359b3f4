//! Replay errors.
//!
//! Data-shape problems (malformed rows, empty sources, unsorted or orphaned
//! trades) are absorbed by the engine and surfaced through the run summary.
//! Only broken calling contracts end up here.

use crate::replay::clock::Nanos;
use crate::replay::events::Instrument;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayError {
    /// A trade violates the trade contract (quantity <= 0, non-finite price).
    InvalidTrade { timestamp: Nanos, reason: String },
    /// A trade is tagged with an instrument other than the valuation anchor.
    ForeignInstrument {
        timestamp: Nanos,
        instrument: Instrument,
        anchor: Instrument,
    },
    /// A feed was passed in the slot of the other instrument.
    FeedMismatch {
        expected: Instrument,
        found: Instrument,
    },
    /// Replay configuration is unusable.
    InvalidConfig { field: &'static str, reason: String },
    /// A quote source could not be opened.
    Source { path: PathBuf, message: String },
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTrade { timestamp, reason } => {
                write!(f, "invalid trade at {}: {}", timestamp, reason)
            }
            Self::ForeignInstrument {
                timestamp,
                instrument,
                anchor,
            } => {
                write!(
                    f,
                    "trade at {} is on {} but the valuation anchor is {}",
                    timestamp, instrument, anchor
                )
            }
            Self::FeedMismatch { expected, found } => {
                write!(f, "feed for {} yields {} quotes", expected, found)
            }
            Self::InvalidConfig { field, reason } => {
                write!(f, "invalid replay config {}: {}", field, reason)
            }
            Self::Source { path, message } => {
                write!(f, "quote source {}: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for ReplayError {}
