//! ArbSim Replay Library
//!
//! Replay engine for the two-future arbitrage simulator, plus the config
//! layer shared by the `arbsim-replay` binary and tests.

pub mod config;
pub mod replay;

pub use config::{ReplayConfig, TieBreak};
