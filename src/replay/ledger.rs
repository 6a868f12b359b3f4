//! Position Ledger and Trade Gating
//!
//! The ledger holds the replayed position and cash for the anchor instrument.
//! Trades reach it through a [`TradeGate`], which releases them only when an
//! anchor quote at or after the trade's timestamp is consumed.
//!
//! # Gating Policy
//!
//! Trades are checked and drained on anchor ticks only, never on ticks of the
//! other instrument. Two consequences follow and are kept on purpose:
//!
//! - A trade stamped after the anchor feed's last quote is never applied. It
//!   stays in the gate and is reported as orphaned.
//! - Trades falling in a gap between anchor ticks are applied together on the
//!   next anchor tick.
//!
//! # Fixed-Point Cash
//!
//! Cash is accumulated as a fixed-point [`Amount`] so that long trade
//! sequences do not drift, and mark-to-market PnL is computed in the same
//! domain before converting back to `f64`. Prices beyond the fixed-point
//! range (about 1.7e30) cannot be represented; once a trade or a valuation
//! would overflow, that figure is computed in `f64` instead. An `f64` shadow
//! of cash is always kept so the ledger can fall back at any point.

use crate::replay::clock::Nanos;
use crate::replay::events::Trade;
use serde::{Deserialize, Serialize};
use tracing::debug;

// =============================================================================
// FIXED-POINT AMOUNT
// =============================================================================

/// Fixed-point amount with 8 decimal places.
pub type Amount = i128;

/// Conversion factor: 1.0 = 100_000_000 units
pub const AMOUNT_SCALE: i128 = 100_000_000;

/// Convert f64 to fixed-point Amount, or `None` if it does not fit.
#[inline]
pub fn to_amount(value: f64) -> Option<Amount> {
    let scaled = (value * AMOUNT_SCALE as f64).round();
    // i128::MAX as f64 rounds up to 2^127, which is itself out of range.
    if scaled.is_finite() && scaled.abs() < i128::MAX as f64 {
        Some(scaled as Amount)
    } else {
        None
    }
}

/// Convert fixed-point Amount to f64.
#[inline]
pub fn from_amount(amount: Amount) -> f64 {
    amount as f64 / AMOUNT_SCALE as f64
}

// =============================================================================
// LEDGER
// =============================================================================

/// Point-in-time view of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    pub position: i64,
    pub cash: f64,
}

/// Running position and cash for one replay run. Starts flat.
#[derive(Debug, Clone)]
pub struct PositionLedger {
    position: i64,
    /// Exact cash; `None` once a trade overflowed the fixed-point range.
    cash: Option<Amount>,
    cash_f64: f64,
    traded_lots: u64,
    max_abs_exposure: u64,
    trades_applied: u64,
}

impl Default for PositionLedger {
    fn default() -> Self {
        Self {
            position: 0,
            cash: Some(0),
            cash_f64: 0.0,
            traded_lots: 0,
            max_abs_exposure: 0,
            trades_applied: 0,
        }
    }
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one trade. BUY adds to the position and spends cash, SELL the reverse.
    pub fn apply(&mut self, trade: &Trade) {
        let sign = trade.side.sign();
        self.cash = self.cash.and_then(|cash| {
            let notional = to_amount(trade.price)?.checked_mul(trade.quantity as i128)?;
            cash.checked_sub(notional.checked_mul(sign as i128)?)
        });
        self.cash_f64 -= sign as f64 * trade.quantity as f64 * trade.price;

        self.position = self.position.saturating_add(trade.signed_quantity());
        self.traded_lots = self.traded_lots.saturating_add(trade.quantity as u64);
        self.max_abs_exposure = self.max_abs_exposure.max(self.position.unsigned_abs());
        self.trades_applied += 1;
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn cash(&self) -> f64 {
        match self.cash {
            Some(cash) => from_amount(cash),
            None => self.cash_f64,
        }
    }

    pub fn state(&self) -> LedgerState {
        LedgerState {
            position: self.position,
            cash: self.cash(),
        }
    }

    /// Mark-to-market PnL: cash plus the position valued at `mid`.
    pub fn mark_to_market(&self, mid: f64) -> f64 {
        let exact = self.cash.and_then(|cash| {
            let value = to_amount(mid)?.checked_mul(self.position as i128)?;
            cash.checked_add(value)
        });
        match exact {
            Some(pnl) => from_amount(pnl),
            None => self.cash() + self.position as f64 * mid,
        }
    }

    pub fn traded_lots(&self) -> u64 {
        self.traded_lots
    }

    pub fn max_abs_exposure(&self) -> u64 {
        self.max_abs_exposure
    }

    pub fn trades_applied(&self) -> u64 {
        self.trades_applied
    }
}

// =============================================================================
// TRADE GATE
// =============================================================================

/// Time-sorted trade queue with a single forward-only read cursor.
#[derive(Debug, Clone)]
pub struct TradeGate {
    trades: Vec<Trade>,
    cursor: usize,
}

impl TradeGate {
    /// Build a gate, normalizing the trades into timestamp order.
    ///
    /// The sort is stable, so trades sharing a timestamp keep their log order.
    pub fn new(mut trades: Vec<Trade>) -> Self {
        let unsorted = trades.windows(2).any(|w| w[0].timestamp > w[1].timestamp);
        if unsorted {
            debug!(trades = trades.len(), "Trade list out of timestamp order, sorting");
            trades.sort_by_key(|t| t.timestamp);
        }
        Self { trades, cursor: 0 }
    }

    /// Apply every pending trade stamped at or before `now` to `ledger`.
    ///
    /// Returns the number of trades applied.
    pub fn drain_through(&mut self, now: Nanos, ledger: &mut PositionLedger) -> usize {
        let start = self.cursor;
        while let Some(trade) = self.trades.get(self.cursor) {
            if trade.timestamp > now {
                break;
            }
            ledger.apply(trade);
            self.cursor += 1;
        }
        self.cursor - start
    }

    /// Timestamp of the next trade waiting for an anchor tick.
    pub fn next_timestamp(&self) -> Option<Nanos> {
        self.trades.get(self.cursor).map(|t| t.timestamp)
    }

    /// Trades already released to the ledger.
    pub fn applied(&self) -> &[Trade] {
        &self.trades[..self.cursor]
    }

    /// Trades still waiting. After a run ends these are the orphaned trades.
    pub fn pending(&self) -> &[Trade] {
        &self.trades[self.cursor..]
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }
}
