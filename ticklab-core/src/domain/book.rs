//! Order book snapshots and derived top-of-book metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One price level of an order book side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub quantity: f64,
}

/// A point-in-time order book snapshot.
///
/// Bids are sorted best-first (descending price), asks best-first
/// (ascending price). Levels may be empty on a degenerate snapshot; all
/// derived metrics return `None` in that case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub timestamp: DateTime<Utc>,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl BookSnapshot {
    pub fn best_bid(&self) -> Option<BookLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<BookLevel> {
        self.asks.first().copied()
    }

    pub fn mid_price(&self) -> Option<f64> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        Some((bid.price + ask.price) / 2.0)
    }

    pub fn spread(&self) -> Option<f64> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        Some(ask.price - bid.price)
    }

    /// Spread in basis points of the mid price.
    pub fn spread_bps(&self) -> Option<f64> {
        let spread = self.spread()?;
        let mid = self.mid_price()?;
        if mid > 0.0 {
            Some(spread / mid * 10_000.0)
        } else {
            None
        }
    }

    /// Top-of-book imbalance: (bid_qty - ask_qty) / (bid_qty + ask_qty).
    pub fn imbalance(&self) -> Option<f64> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        let total = bid.quantity + ask.quantity;
        if total > 0.0 {
            Some((bid.quantity - ask.quantity) / total)
        } else {
            None
        }
    }

    /// Quantity-weighted mid: leans toward the thinner side's price.
    pub fn micro_price(&self) -> Option<f64> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        let total = bid.quantity + ask.quantity;
        if total > 0.0 {
            Some((bid.price * ask.quantity + ask.price * bid.quantity) / total)
        } else {
            None
        }
    }
}
