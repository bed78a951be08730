//! TickLab Core — domain types, bar aggregation, simulated exchange, funding.
//!
//! This crate contains the deterministic heart of the backtester:
//! - Domain types (trade prints, bars, orders, positions, book snapshots)
//! - Streaming bar builder with volume/tick/time/dollar completion policies
//! - Simulated exchange: FIFO order queue, latency gating, TTL expiry,
//!   spot and isolated-margin futures accounting, forced liquidation
//! - Funding settlement clock and historical rate tape
//!
//! No I/O lives here; data loading and replay orchestration are in
//! `ticklab-runner`.

pub mod bars;
pub mod config;
pub mod domain;
pub mod exchange;

pub use bars::{BarBuilder, BarPolicy};
pub use config::{ConfigError, ExchangeConfig};
pub use exchange::{FundingClock, FundingTape, OrderError, SimExchange};
