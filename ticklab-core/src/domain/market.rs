//! MarketState — the read-only snapshot handed to strategies.

use super::bar::Bar;
use super::book::BookSnapshot;
use super::order::Side;
use super::position::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything a strategy is allowed to see when deciding on an order.
///
/// Strategies receive this snapshot by reference and return an optional
/// order; they never touch engine state directly. In tick-driven replays
/// the best bid/ask are synthetic (both set to the bar close) and the
/// imbalance is the bar's volume imbalance; in book-driven replays they
/// come from the top of the book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub vwap: f64,
    /// Volume imbalance (tick mode) or top-of-book imbalance (book mode).
    pub imbalance: f64,
    pub best_bid: f64,
    pub best_ask: f64,
    pub bid_quantity: f64,
    pub ask_quantity: f64,
    pub spread: f64,
    pub spread_bps: f64,
    pub position_side: Option<Side>,
    pub position_quantity: f64,
}

impl MarketState {
    pub fn mid_price(&self) -> f64 {
        (self.best_bid + self.best_ask) / 2.0
    }

    /// Snapshot built from a completed bar (tick-driven mode).
    pub fn from_bar(bar: &Bar, position: &Position) -> Self {
        Self {
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            vwap: bar.vwap(),
            imbalance: bar.volume_imbalance(),
            best_bid: bar.close,
            best_ask: bar.close,
            bid_quantity: bar.buy_volume,
            ask_quantity: bar.sell_volume,
            spread: 0.0,
            spread_bps: 0.0,
            position_side: position.side,
            position_quantity: position.quantity,
        }
    }

    /// Snapshot built from an order book (book-driven mode). Returns `None`
    /// when either side of the book is empty.
    pub fn from_book(book: &BookSnapshot, position: &Position) -> Option<Self> {
        let bid = book.best_bid()?;
        let ask = book.best_ask()?;
        let mid = book.mid_price()?;
        Some(Self {
            timestamp: book.timestamp,
            open: mid,
            high: mid,
            low: mid,
            close: mid,
            volume: 0.0,
            vwap: book.micro_price().unwrap_or(mid),
            imbalance: book.imbalance().unwrap_or(0.0),
            best_bid: bid.price,
            best_ask: ask.price,
            bid_quantity: bid.quantity,
            ask_quantity: ask.quantity,
            spread: ask.price - bid.price,
            spread_bps: book.spread_bps().unwrap_or(0.0),
            position_side: position.side,
            position_quantity: position.quantity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::book::BookLevel;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn from_bar_uses_close_as_synthetic_quotes() {
        let bar = Bar {
            timestamp: ts(),
            open: 100.0,
            high: 110.0,
            low: 95.0,
            close: 105.0,
            volume: 8.0,
            quote_volume: 820.0,
            trade_count: 5,
            buy_volume: 6.0,
            sell_volume: 2.0,
        };
        let state = MarketState::from_bar(&bar, &Position::flat(1.0));
        assert_eq!(state.best_bid, 105.0);
        assert_eq!(state.best_ask, 105.0);
        assert_eq!(state.mid_price(), 105.0);
        assert!((state.imbalance - 0.5).abs() < 1e-9);
        assert!(state.position_side.is_none());
    }

    #[test]
    fn from_book_requires_both_sides() {
        let book = BookSnapshot {
            timestamp: ts(),
            bids: vec![BookLevel { price: 99.0, quantity: 2.0 }],
            asks: vec![],
        };
        assert!(MarketState::from_book(&book, &Position::flat(1.0)).is_none());
    }

    #[test]
    fn from_book_top_of_book() {
        let book = BookSnapshot {
            timestamp: ts(),
            bids: vec![BookLevel { price: 99.0, quantity: 2.0 }],
            asks: vec![BookLevel { price: 101.0, quantity: 2.0 }],
        };
        let state = MarketState::from_book(&book, &Position::flat(1.0)).unwrap();
        assert_eq!(state.best_bid, 99.0);
        assert_eq!(state.best_ask, 101.0);
        assert_eq!(state.mid_price(), 100.0);
        assert_eq!(state.imbalance, 0.0);
    }
}
