//! Bar — aggregated OHLCV unit with buy/sell volume split.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An aggregated bar of trade prints.
///
/// `volume` is base-asset quantity, `quote_volume` is the summed notional.
/// `buy_volume`/`sell_volume` partition `volume` by aggressor side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Timestamp of the first print in the bar.
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trade_count: u64,
    pub buy_volume: f64,
    pub sell_volume: f64,
}

impl Bar {
    /// Volume-weighted average price. Falls back to the OHLC average for a
    /// zero-volume bar so callers never divide by zero.
    pub fn vwap(&self) -> f64 {
        if self.volume > 0.0 {
            self.quote_volume / self.volume
        } else {
            (self.open + self.high + self.low + self.close) / 4.0
        }
    }

    /// (buy - sell) / (buy + sell), in [-1, 1]. Zero for a zero-volume bar.
    pub fn volume_imbalance(&self) -> f64 {
        let total = self.buy_volume + self.sell_volume;
        if total > 0.0 {
            (self.buy_volume - self.sell_volume) / total
        } else {
            0.0
        }
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// OHLC sanity: high bounds everything above, low below.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= 0.0
    }
}
