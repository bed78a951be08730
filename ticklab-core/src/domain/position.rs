//! Position — the exchange's single net position.
//!
//! Positions are replaced, not mutated in place: every fill computes a fresh
//! `Position` value and swaps it in, with the invariants checked at the
//! replacement boundary.

use super::order::Side;
use serde::{Deserialize, Serialize};

/// Net position state. `side` is `None` exactly when `quantity` is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Option<Side>,
    pub quantity: f64,
    /// Weighted-average entry price. Meaningless when flat.
    pub entry_price: f64,
    pub leverage: f64,
    /// Margin committed to this position (leveraged mode only).
    pub margin: f64,
    pub liquidation_price: Option<f64>,
    pub unrealized_pnl: f64,
}

impl Position {
    /// A flat position at the given leverage.
    pub fn flat(leverage: f64) -> Self {
        Self {
            side: None,
            quantity: 0.0,
            entry_price: 0.0,
            leverage,
            margin: 0.0,
            liquidation_price: None,
            unrealized_pnl: 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.side.is_none()
    }

    /// Notional at the entry price.
    pub fn notional(&self) -> f64 {
        self.entry_price * self.quantity
    }

    /// Signed pnl of closing `quantity` units at `price` against the
    /// weighted-average entry. Gross of fees.
    pub fn pnl_at(&self, price: f64, quantity: f64) -> f64 {
        match self.side {
            Some(side) => side.sign() * (price - self.entry_price) * quantity,
            None => 0.0,
        }
    }

    /// Invariants that must hold at every replacement boundary.
    pub fn assert_valid(&self) {
        debug_assert!(self.quantity >= 0.0, "negative position quantity");
        debug_assert_eq!(
            self.side.is_none(),
            self.quantity == 0.0,
            "side must be None exactly when quantity is zero"
        );
        debug_assert!(self.margin >= 0.0, "negative margin");
    }
}
