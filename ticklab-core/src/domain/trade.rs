//! Executed trades and raw trade prints.

use super::order::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single trade print from the exchange feed: one aggression event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePrint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub quantity: f64,
    /// Side of the aggressor (taker).
    pub side: Side,
}

impl TradePrint {
    /// Notional value in quote currency.
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }
}

/// A fill executed by the simulated exchange. Append-only ledger entry.
///
/// `pnl` is net of the exit fee and the proportional share of the entry fee;
/// it is 0.0 for opening fills. Liquidation entries carry `fee = 0.0` and
/// the capped loss as a negative `pnl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: DateTime<Utc>,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub fee: f64,
    pub pnl: f64,
    #[serde(default)]
    pub liquidation: bool,
}

impl Trade {
    /// True for fills that closed (all or part of) a position.
    pub fn is_closing(&self) -> bool {
        self.pnl != 0.0
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}
