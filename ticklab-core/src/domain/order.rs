//! Order types: side, kind, the strategy-facing `Order`, and the queued
//! `PendingOrder` held by the exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of an order or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1 for buy, -1 for sell. Used in pnl arithmetic.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// How an order fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    /// Fill at the current best bid/ask on the next eligible update.
    Market,
    /// Fill at the limit price once the reference price crosses it.
    Limit,
}

/// Order ID, allocated by the exchange at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An order as a strategy creates it: no identity, no timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub side: Side,
    pub quantity: f64,
    pub kind: OrderKind,
    /// Required for `OrderKind::Limit`, ignored for market orders.
    pub limit_price: Option<f64>,
}

impl Order {
    pub fn market(side: Side, quantity: f64) -> Self {
        Self {
            side,
            quantity,
            kind: OrderKind::Market,
            limit_price: None,
        }
    }

    pub fn limit(side: Side, quantity: f64, limit_price: f64) -> Self {
        Self {
            side,
            quantity,
            kind: OrderKind::Limit,
            limit_price: Some(limit_price),
        }
    }
}

/// An accepted order waiting in the exchange's FIFO queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrder {
    pub id: OrderId,
    pub order: Order,
    pub submitted_at: DateTime<Utc>,
    /// Absolute expiry; `None` means good-till-cancelled.
    pub expires_at: Option<DateTime<Utc>>,
}

impl PendingOrder {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }
}
