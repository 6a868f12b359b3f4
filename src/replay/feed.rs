//! Quote Feeds
//!
//! Trait definition for per-instrument quote sources the merger pulls from.
//! A feed is forward-only: to replay a source again, open a new feed.

use crate::replay::events::{Instrument, QuoteEvent};

/// A pull-based source of quotes for a single instrument.
pub trait QuoteFeed: Send {
    /// Get the next quote, or `None` once the source is exhausted.
    fn next_quote(&mut self) -> Option<QuoteEvent>;

    /// Instrument every quote from this feed is tagged with.
    fn instrument(&self) -> Instrument;

    /// Feed identifier for logging/diagnostics.
    fn name(&self) -> &str {
        self.instrument().label()
    }

    /// Rows dropped as malformed so far.
    fn rows_skipped(&self) -> u64 {
        0
    }

    /// Number of quotes remaining (if known).
    fn remaining(&self) -> Option<usize> {
        None
    }

    /// I/O failure that cut the source short, if any.
    fn read_error(&self) -> Option<&str> {
        None
    }
}

/// A feed backed by an in-memory vector of quotes.
///
/// Quotes are replayed in the order given; the caller is responsible for
/// keeping them time-sorted.
pub struct VecFeed {
    instrument: Instrument,
    quotes: Vec<QuoteEvent>,
    index: usize,
}

impl VecFeed {
    /// Build a feed from `(timestamp, bid, ask)` triples.
    pub fn new(instrument: Instrument, quotes: &[(i64, f64, f64)]) -> Self {
        let quotes = quotes
            .iter()
            .map(|&(ts, bid, ask)| QuoteEvent::new(ts, instrument, bid, ask))
            .collect();
        Self {
            instrument,
            quotes,
            index: 0,
        }
    }

    /// Build a feed from ready-made events, re-tagging them with `instrument`.
    pub fn from_events(instrument: Instrument, mut quotes: Vec<QuoteEvent>) -> Self {
        for q in &mut quotes {
            q.instrument = instrument;
        }
        Self {
            instrument,
            quotes,
            index: 0,
        }
    }

    pub fn empty(instrument: Instrument) -> Self {
        Self::from_events(instrument, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

impl QuoteFeed for VecFeed {
    fn next_quote(&mut self) -> Option<QuoteEvent> {
        let quote = self.quotes.get(self.index).copied()?;
        self.index += 1;
        Some(quote)
    }

    fn instrument(&self) -> Instrument {
        self.instrument
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.quotes.len().saturating_sub(self.index))
    }
}

/// Iterator adapter for QuoteFeed.
pub struct FeedIterator<'a, F: QuoteFeed + ?Sized> {
    feed: &'a mut F,
}

impl<'a, F: QuoteFeed + ?Sized> Iterator for FeedIterator<'a, F> {
    type Item = QuoteEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.feed.next_quote()
    }
}

/// Extension trait to get an iterator from a feed.
pub trait QuoteFeedExt: QuoteFeed {
    fn quotes(&mut self) -> FeedIterator<'_, Self> {
        FeedIterator { feed: self }
    }
}

impl<T: QuoteFeed + ?Sized> QuoteFeedExt for T {}
