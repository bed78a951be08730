//! Streaming bar aggregation from trade prints.
//!
//! The builder folds prints into an accumulator and checks the completion
//! predicate after each fold, so the print that crosses the threshold is
//! included in the emitted bar. Prints must arrive in non-decreasing
//! timestamp order; the builder does not reorder.

use crate::config::ConfigError;
use crate::domain::{Bar, Side, TradePrint};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// When a bar is considered complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarPolicy {
    /// Accumulated base volume >= size.
    Volume,
    /// Trade count >= size (size truncated to an integer count).
    Tick,
    /// Wall-clock span: a print at or past `start + size` seconds completes
    /// the bar.
    Time,
    /// Accumulated quote volume (notional) >= size.
    Dollar,
}

/// In-progress accumulator. Becomes a `Bar` on emission.
#[derive(Debug, Clone)]
struct Accumulator {
    bar: Bar,
}

impl Accumulator {
    fn seed(print: &TradePrint) -> Self {
        let (buy, sell) = match print.side {
            Side::Buy => (print.quantity, 0.0),
            Side::Sell => (0.0, print.quantity),
        };
        Self {
            bar: Bar {
                timestamp: print.timestamp,
                open: print.price,
                high: print.price,
                low: print.price,
                close: print.price,
                volume: print.quantity,
                quote_volume: print.notional(),
                trade_count: 1,
                buy_volume: buy,
                sell_volume: sell,
            },
        }
    }

    fn fold(&mut self, print: &TradePrint) {
        let bar = &mut self.bar;
        bar.high = bar.high.max(print.price);
        bar.low = bar.low.min(print.price);
        bar.close = print.price;
        bar.volume += print.quantity;
        bar.quote_volume += print.notional();
        bar.trade_count += 1;
        match print.side {
            Side::Buy => bar.buy_volume += print.quantity,
            Side::Sell => bar.sell_volume += print.quantity,
        }
    }
}

/// Streaming bar builder. One instance per replay.
#[derive(Debug, Clone)]
pub struct BarBuilder {
    policy: BarPolicy,
    size: f64,
    current: Option<Accumulator>,
}

impl BarBuilder {
    /// `size` is interpreted per policy: base volume, trade count, seconds,
    /// or quote volume. Must be positive.
    pub fn new(policy: BarPolicy, size: f64) -> Result<Self, ConfigError> {
        if size <= 0.0 {
            return Err(ConfigError::NonPositiveBarSize(size));
        }
        Ok(Self {
            policy,
            size,
            current: None,
        })
    }

    pub fn policy(&self) -> BarPolicy {
        self.policy
    }

    /// The in-progress bar, if any prints have arrived since the last
    /// emission.
    pub fn current(&self) -> Option<&Bar> {
        self.current.as_ref().map(|acc| &acc.bar)
    }

    /// Fold one print; returns the completed bar when the policy threshold
    /// is reached. The triggering print is part of the emitted bar.
    pub fn update(&mut self, print: &TradePrint) -> Option<Bar> {
        match self.current.as_mut() {
            Some(acc) => acc.fold(print),
            None => self.current = Some(Accumulator::seed(print)),
        }
        let complete = self
            .current
            .as_ref()
            .is_some_and(|acc| self.is_complete(&acc.bar, print.timestamp));
        if complete {
            self.current.take().map(|acc| acc.bar)
        } else {
            None
        }
    }

    fn is_complete(&self, bar: &Bar, now: DateTime<Utc>) -> bool {
        match self.policy {
            BarPolicy::Volume => bar.volume >= self.size,
            BarPolicy::Tick => bar.trade_count >= self.size as u64,
            BarPolicy::Time => {
                now - bar.timestamp >= Duration::milliseconds((self.size * 1_000.0) as i64)
            }
            BarPolicy::Dollar => bar.quote_volume >= self.size,
        }
    }

    /// Fold an entire print sequence into completed bars. The trailing
    /// partial bar, if any, is discarded (still visible via `current()`).
    pub fn build_all<'a, I>(&mut self, prints: I) -> Vec<Bar>
    where
        I: IntoIterator<Item = &'a TradePrint>,
    {
        prints
            .into_iter()
            .filter_map(|print| self.update(print))
            .collect()
    }
}
