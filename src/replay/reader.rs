//! CSV Quote Reader
//!
//! Lazily decodes one instrument's recorded quote file. Rows look like
//!
//! ```text
//! 1544166006144506979,FutureA,2,1,10928,10928.5,1
//! ```
//!
//! Only the timestamp (column 0), bid (column 4) and ask (column 5) are read.
//! The instrument column is ignored; the caller says which instrument the
//! file belongs to. Short rows and rows whose numeric columns do not parse
//! are skipped and counted, never fatal: partial lines at file boundaries are
//! expected in recorded data.

use crate::replay::events::{Instrument, QuoteEvent};
use crate::replay::error::ReplayError;
use crate::replay::feed::QuoteFeed;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{trace, warn};

const COL_TIMESTAMP: usize = 0;
const COL_BID: usize = 4;
const COL_ASK: usize = 5;
/// Minimum number of columns for a usable row.
pub const MIN_QUOTE_FIELDS: usize = 6;

/// Forward-only quote reader over a headerless CSV source.
#[derive(Debug)]
pub struct CsvQuoteReader<R: Read> {
    reader: csv::Reader<R>,
    record: csv::ByteRecord,
    instrument: Instrument,
    name: String,
    rows_read: u64,
    rows_skipped: u64,
    read_error: Option<String>,
    finished: bool,
}

impl CsvQuoteReader<File> {
    /// Open a quote file on disk.
    pub fn open(path: impl AsRef<Path>, instrument: Instrument) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ReplayError::Source {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut reader = Self::from_reader(file, instrument);
        reader.name = path.display().to_string();
        Ok(reader)
    }
}

impl<R: Read> CsvQuoteReader<R> {
    /// Wrap any byte source (in-memory buffers, sockets, decompressors).
    pub fn from_reader(source: R, instrument: Instrument) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(source);
        Self {
            reader,
            record: csv::ByteRecord::new(),
            instrument,
            name: instrument.label().to_string(),
            rows_read: 0,
            rows_skipped: 0,
            read_error: None,
            finished: false,
        }
    }

    /// Rows pulled from the source so far, usable or not.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    fn decode_current(&self) -> Option<QuoteEvent> {
        if self.record.len() < MIN_QUOTE_FIELDS {
            return None;
        }
        let timestamp = parse_field::<i64>(self.record.get(COL_TIMESTAMP)?)?;
        let bid = parse_field::<f64>(self.record.get(COL_BID)?)?;
        let ask = parse_field::<f64>(self.record.get(COL_ASK)?)?;
        if !bid.is_finite() || !ask.is_finite() {
            return None;
        }
        Some(QuoteEvent::new(timestamp, self.instrument, bid, ask))
    }
}

fn parse_field<T: std::str::FromStr>(raw: &[u8]) -> Option<T> {
    std::str::from_utf8(raw).ok()?.parse().ok()
}

impl<R: Read + Send> QuoteFeed for CsvQuoteReader<R> {
    fn next_quote(&mut self) -> Option<QuoteEvent> {
        while !self.finished {
            match self.reader.read_byte_record(&mut self.record) {
                Ok(true) => {
                    self.rows_read += 1;
                    if let Some(quote) = self.decode_current() {
                        return Some(quote);
                    }
                    self.rows_skipped += 1;
                    trace!(
                        source = %self.name,
                        line = self.record.position().map(|p| p.line()).unwrap_or(0),
                        fields = self.record.len(),
                        "Skipping malformed quote row"
                    );
                }
                Ok(false) => self.finished = true,
                Err(e) => {
                    warn!(source = %self.name, error = %e, "Quote source read failed, ending stream");
                    self.read_error = Some(e.to_string());
                    self.finished = true;
                }
            }
        }
        None
    }

    fn instrument(&self) -> Instrument {
        self.instrument
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn rows_skipped(&self) -> u64 {
        self.rows_skipped
    }

    fn read_error(&self) -> Option<&str> {
        self.read_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::feed::QuoteFeedExt;

    fn reader(data: &str, instrument: Instrument) -> CsvQuoteReader<&[u8]> {
        CsvQuoteReader::from_reader(data.as_bytes(), instrument)
    }

    #[test]
    fn test_reads_recorded_rows() {
        let data = "1544166006144506979,FutureA,2,1,10928,10928.5,1\n\
                    1544166006144507000,FutureA,2,1,10928.5,10929,3\n";
        let mut r = reader(data, Instrument::A);
        let quotes: Vec<QuoteEvent> = r.quotes().collect();

        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].timestamp, 1544166006144506979);
        assert_eq!(quotes[0].instrument, Instrument::A);
        assert_eq!(quotes[0].bid, 10928.0);
        assert_eq!(quotes[0].ask, 10928.5);
        assert_eq!(r.rows_read(), 2);
        assert_eq!(r.rows_skipped(), 0);
    }

    #[test]
    fn test_exactly_six_fields_is_enough() {
        let mut r = reader("10,FutureB,0,0,99.5,100.5\n", Instrument::B);
        let q = r.next_quote().unwrap();
        assert_eq!(q.mid(), 100.0);
    }

    #[test]
    fn test_skips_short_and_unparseable_rows() {
        let data = "1,FutureA,2,1,100\n\
                    abc,FutureA,2,1,100,101,1\n\
                    2,FutureA,2,1,x,101,1\n\
                    3,FutureA,2,1,100,,1\n\
                    4,FutureA,2,1,nan,101,1\n\
                    5,FutureA,2,1,100,101,1\n";
        let mut r = reader(data, Instrument::A);
        let ts: Vec<i64> = r.quotes().map(|q| q.timestamp).collect();

        assert_eq!(ts, vec![5]);
        assert_eq!(r.rows_read(), 6);
        assert_eq!(r.rows_skipped(), 5);
        assert!(r.read_error().is_none());
    }

    #[test]
    fn test_tolerates_crlf_blank_lines_and_padding() {
        let data = "1, FutureA ,2,1, 100 ,101,1\r\n\r\n2,FutureA,2,1,102,103,1\r\n";
        let mut r = reader(data, Instrument::A);
        let quotes: Vec<QuoteEvent> = r.quotes().collect();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].bid, 100.0);
        assert_eq!(quotes[1].ask, 103.0);
    }

    #[test]
    fn test_invalid_utf8_row_is_skipped() {
        let mut data = b"1,FutureA,2,1,100,101,1\n".to_vec();
        data.extend_from_slice(b"\xff\xfe,FutureA,2,1,100,101,1\n");
        data.extend_from_slice(b"3,FutureA,2,1,100,101,1\n");
        let mut r = CsvQuoteReader::from_reader(data.as_slice(), Instrument::A);
        let ts: Vec<i64> = r.quotes().map(|q| q.timestamp).collect();
        assert_eq!(ts, vec![1, 3]);
        assert_eq!(r.rows_skipped(), 1);
    }

    #[test]
    fn test_instrument_column_is_not_interpreted() {
        let mut r = reader("1,FutureA,2,1,100,101,1\n", Instrument::B);
        assert_eq!(r.next_quote().unwrap().instrument, Instrument::B);
    }

    #[test]
    fn test_empty_source() {
        let mut r = reader("", Instrument::A);
        assert!(r.next_quote().is_none());
        assert!(r.next_quote().is_none());
        assert_eq!(r.rows_read(), 0);
    }

    #[test]
    fn test_open_missing_file() {
        let err = CsvQuoteReader::open("/nonexistent/futureA.csv", Instrument::A).unwrap_err();
        assert!(matches!(err, ReplayError::Source { .. }));
        assert!(err.to_string().contains("futureA.csv"));
    }
}
