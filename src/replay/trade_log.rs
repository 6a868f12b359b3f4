//! Simulator Trade Log
//!
//! Decodes the line protocol the simulator prints on stdout:
//!
//! ```text
//! 1544166006144506979,BUY,FutureB,1,10928.5
//! 1544166070000000000,FLATTEN,FutureB,0,10930
//! Total PnL: 12.5
//! Best PnL: 20
//! Worst PnL: -3.5
//! Max exposure: 3
//! Traded lots: 14
//! ```
//!
//! Trade lines for other instruments and free-form lines are ignored.
//! Anything on the anchor instrument that does not decode is counted and
//! skipped. Decoding never fails on content.

use crate::replay::clock::Nanos;
use crate::replay::error::ReplayError;
use crate::replay::events::{Instrument, Side, Trade};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, trace};

/// End-of-run figures reported by the simulator itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pnl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_pnl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worst_pnl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_exposure: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traded_lots: Option<i64>,
}

/// A forced position close reported by the simulator.
///
/// Logged with zero quantity; informational only, never applied to the
/// replay ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlattenMarker {
    pub timestamp: Nanos,
    pub price: f64,
    pub end_of_day: bool,
}

/// Everything decoded from one simulator run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeLog {
    pub trades: Vec<Trade>,
    pub flattens: Vec<FlattenMarker>,
    pub summary: RunSummary,
    /// Anchor trade lines and summary lines that failed to decode
    pub lines_skipped: u64,
}

enum TradeLine {
    Trade(Trade),
    Flatten(FlattenMarker),
}

#[derive(Debug, Clone, Copy)]
pub struct TradeLogDecoder {
    anchor: Instrument,
}

impl TradeLogDecoder {
    pub fn new(anchor: Instrument) -> Self {
        Self { anchor }
    }

    pub fn decode(&self, text: &str) -> TradeLog {
        let mut log = TradeLog::default();
        for line in text.lines() {
            self.decode_line(line, &mut log);
        }
        self.finish(log)
    }

    /// Decode from any buffered source, e.g. a captured stdout file.
    pub fn decode_reader(&self, source: impl BufRead) -> std::io::Result<TradeLog> {
        let mut log = TradeLog::default();
        for line in source.lines() {
            self.decode_line(&line?, &mut log);
        }
        Ok(self.finish(log))
    }

    pub fn decode_file(&self, path: impl AsRef<Path>) -> Result<TradeLog, ReplayError> {
        let path = path.as_ref();
        let source_error = |e: std::io::Error| ReplayError::Source {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        let file = std::fs::File::open(path).map_err(source_error)?;
        self.decode_reader(std::io::BufReader::new(file)).map_err(source_error)
    }

    fn finish(&self, log: TradeLog) -> TradeLog {
        debug!(
            anchor = %self.anchor,
            trades = log.trades.len(),
            flattens = log.flattens.len(),
            skipped = log.lines_skipped,
            "Trade log decoded"
        );
        log
    }

    /// Feed one line into `log`.
    pub fn decode_line(&self, line: &str, log: &mut TradeLog) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match decode_summary_line(line, &mut log.summary) {
            Some(true) => return,
            Some(false) => {
                trace!(line, "Skipping malformed summary line");
                log.lines_skipped += 1;
                return;
            }
            None => {}
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 5 || fields[2] != self.anchor.label() {
            return;
        }

        match self.decode_trade_fields(&fields) {
            Some(TradeLine::Trade(trade)) => log.trades.push(trade),
            Some(TradeLine::Flatten(marker)) => log.flattens.push(marker),
            None => {
                trace!(line, "Skipping malformed trade line");
                log.lines_skipped += 1;
            }
        }
    }

    fn decode_trade_fields(&self, fields: &[&str]) -> Option<TradeLine> {
        let timestamp: Nanos = fields[0].parse().ok()?;
        let quantity: i64 = fields[3].parse().ok()?;
        let price: f64 = fields[4].parse().ok()?;

        let end_of_day = match fields[1] {
            "FLATTEN" => false,
            "FLATTEN_EOD" => true,
            side => {
                let side = Side::from_label(side)?;
                return Trade::new(timestamp, side, self.anchor, quantity, price)
                    .ok()
                    .map(TradeLine::Trade);
            }
        };
        Some(TradeLine::Flatten(FlattenMarker {
            timestamp,
            price,
            end_of_day,
        }))
    }
}

/// `Some(true)` if the line was a summary line and decoded, `Some(false)` if
/// it was a summary line with an unreadable value, `None` otherwise.
fn decode_summary_line(line: &str, summary: &mut RunSummary) -> Option<bool> {
    let (key, value) = line.split_once(':')?;
    let value = value.trim();
    let decoded = match key.trim() {
        "Total PnL" => value.parse().map(|v| summary.total_pnl = Some(v)).is_ok(),
        "Best PnL" => value.parse().map(|v| summary.best_pnl = Some(v)).is_ok(),
        "Worst PnL" => value.parse().map(|v| summary.worst_pnl = Some(v)).is_ok(),
        "Max exposure" => value.parse().map(|v| summary.max_exposure = Some(v)).is_ok(),
        "Traded lots" => value.parse().map(|v| summary.traded_lots = Some(v)).is_ok(),
        _ => return None,
    };
    Some(decoded)
}
