//! Replay Event Types
//!
//! Quote events flow in from the two per-instrument sources, trades come from
//! the simulator's log, and snapshots flow out to the charting layer. All of
//! them are immutable value types.

use crate::replay::clock::Nanos;
use crate::replay::error::ReplayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Instrument identifier. The simulator trades two futures on the same
/// underlying; B is the traded leg and, by default, the valuation anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Instrument {
    #[serde(rename = "A", alias = "FutureA")]
    A = 0,
    #[serde(rename = "B", alias = "FutureB")]
    B = 1,
}

impl Instrument {
    /// Label used by the simulator's CSV files and trade log.
    pub fn label(self) -> &'static str {
        match self {
            Instrument::A => "FutureA",
            Instrument::B => "FutureB",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "FutureA" => Some(Instrument::A),
            "FutureB" => Some(Instrument::B),
            _ => None,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Instrument {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" | "a" => Ok(Instrument::A),
            "B" | "b" => Ok(Instrument::B),
            other => Instrument::from_label(other)
                .ok_or_else(|| format!("unknown instrument '{}' (expected A, B, FutureA or FutureB)", other)),
        }
    }
}

/// Trade side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Signed position change per lot.
    #[inline]
    pub fn sign(&self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// A top-of-book quote from one instrument's source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteEvent {
    pub timestamp: Nanos,
    pub instrument: Instrument,
    pub bid: f64,
    pub ask: f64,
}

impl QuoteEvent {
    pub fn new(timestamp: Nanos, instrument: Instrument, bid: f64, ask: f64) -> Self {
        Self {
            timestamp,
            instrument,
            bid,
            ask,
        }
    }

    #[inline]
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) * 0.5
    }
}

/// An executed trade reported by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    #[serde(rename = "time")]
    pub timestamp: Nanos,
    pub side: Side,
    pub instrument: Instrument,
    #[serde(rename = "qty")]
    pub quantity: i64,
    pub price: f64,
}

impl Trade {
    /// Build a validated trade.
    pub fn new(
        timestamp: Nanos,
        side: Side,
        instrument: Instrument,
        quantity: i64,
        price: f64,
    ) -> Result<Self, ReplayError> {
        let trade = Self {
            timestamp,
            side,
            instrument,
            quantity,
            price,
        };
        trade.validate()?;
        Ok(trade)
    }

    /// Check the calling contract: strictly positive quantity, finite price.
    pub fn validate(&self) -> Result<(), ReplayError> {
        if self.quantity <= 0 {
            return Err(ReplayError::InvalidTrade {
                timestamp: self.timestamp,
                reason: format!("quantity must be > 0, got {}", self.quantity),
            });
        }
        if !self.price.is_finite() {
            return Err(ReplayError::InvalidTrade {
                timestamp: self.timestamp,
                reason: format!("price must be finite, got {}", self.price),
            });
        }
        Ok(())
    }

    /// Signed position change this trade causes.
    #[inline]
    pub fn signed_quantity(&self) -> i64 {
        self.side.sign() * self.quantity
    }
}

/// A sampled mark-to-market observation, one chart point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "time")]
    pub timestamp: Nanos,
    #[serde(rename = "priceA")]
    pub price_a: f64,
    #[serde(rename = "priceB")]
    pub price_b: f64,
    pub pnl: f64,
    #[serde(rename = "pos")]
    pub position: i64,
}
