//! The strategy seam and the bundled reference strategies.
//!
//! Strategies see only a [`MarketState`] snapshot and answer with an
//! optional order; they cannot reach into the exchange. Parameters are
//! explicit config structs with defaults, deserializable from the run
//! config.

use serde::{Deserialize, Serialize};
use ticklab_core::domain::{MarketState, Order, Side};

/// A trading strategy driven by completed bars (tick replays) or book
/// snapshots (book replays).
pub trait Strategy {
    fn name(&self) -> &str;

    /// Called once per completed bar or snapshot. Returning `Some` is a
    /// request; the replay may still drop it (duplicate-side guard) and
    /// the exchange may reject or fail to fill it.
    fn on_market_state(&mut self, state: &MarketState) -> Option<Order>;
}

// ── Volume imbalance ──

/// Parameters for [`VolumeImbalanceStrategy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeImbalanceParams {
    #[serde(default = "default_vi_buy")]
    pub buy_threshold: f64,
    #[serde(default = "default_vi_sell")]
    pub sell_threshold: f64,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
}

fn default_vi_buy() -> f64 {
    0.4
}

fn default_vi_sell() -> f64 {
    -0.4
}

fn default_quantity() -> f64 {
    0.01
}

impl Default for VolumeImbalanceParams {
    fn default() -> Self {
        Self {
            buy_threshold: default_vi_buy(),
            sell_threshold: default_vi_sell(),
            quantity: default_quantity(),
        }
    }
}

/// Trades the aggressor-flow imbalance of completed bars: strong buy
/// pressure opens a long with a market order, strong sell pressure exits.
/// Long-only, sized in fixed base quantity.
#[derive(Debug, Clone)]
pub struct VolumeImbalanceStrategy {
    params: VolumeImbalanceParams,
}

impl VolumeImbalanceStrategy {
    pub fn new(params: VolumeImbalanceParams) -> Self {
        Self { params }
    }
}

impl Default for VolumeImbalanceStrategy {
    fn default() -> Self {
        Self::new(VolumeImbalanceParams::default())
    }
}

impl Strategy for VolumeImbalanceStrategy {
    fn name(&self) -> &str {
        "volume_imbalance"
    }

    fn on_market_state(&mut self, state: &MarketState) -> Option<Order> {
        if state.imbalance > self.params.buy_threshold {
            if state.position_side == Some(Side::Buy) {
                return None;
            }
            return Some(Order::market(Side::Buy, self.params.quantity));
        }
        if state.imbalance < self.params.sell_threshold {
            // Exit only: needs an open long.
            if state.position_side != Some(Side::Buy) {
                return None;
            }
            return Some(Order::market(Side::Sell, self.params.quantity));
        }
        None
    }
}

// ── Order book imbalance ──

/// Parameters for [`ObiStrategy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObiParams {
    #[serde(default = "default_obi_buy")]
    pub buy_threshold: f64,
    #[serde(default = "default_obi_sell")]
    pub sell_threshold: f64,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
}

fn default_obi_buy() -> f64 {
    0.3
}

fn default_obi_sell() -> f64 {
    -0.3
}

impl Default for ObiParams {
    fn default() -> Self {
        Self {
            buy_threshold: default_obi_buy(),
            sell_threshold: default_obi_sell(),
            quantity: default_quantity(),
        }
    }
}

/// Trades top-of-book imbalance with taker-style limit orders: buys at
/// the best ask on bid-heavy books, sells the open long at the best bid
/// on ask-heavy books. Crossing the spread keeps fills immediate while
/// pinning the execution price.
#[derive(Debug, Clone)]
pub struct ObiStrategy {
    params: ObiParams,
}

impl ObiStrategy {
    pub fn new(params: ObiParams) -> Self {
        Self { params }
    }
}

impl Default for ObiStrategy {
    fn default() -> Self {
        Self::new(ObiParams::default())
    }
}

impl Strategy for ObiStrategy {
    fn name(&self) -> &str {
        "obi"
    }

    fn on_market_state(&mut self, state: &MarketState) -> Option<Order> {
        if state.imbalance > self.params.buy_threshold {
            if state.position_side == Some(Side::Buy) {
                return None;
            }
            return Some(Order::limit(Side::Buy, self.params.quantity, state.best_ask));
        }
        if state.imbalance < self.params.sell_threshold {
            if state.position_side != Some(Side::Buy) {
                return None;
            }
            return Some(Order::limit(Side::Sell, self.params.quantity, state.best_bid));
        }
        None
    }
}

// ── Buy and hold ──

/// Buys once at the first opportunity and never trades again. Baseline
/// and test scaffold.
#[derive(Debug, Clone)]
pub struct HoldStrategy {
    pub quantity: f64,
    entered: bool,
}

impl HoldStrategy {
    pub fn new(quantity: f64) -> Self {
        Self {
            quantity,
            entered: false,
        }
    }
}

impl Strategy for HoldStrategy {
    fn name(&self) -> &str {
        "hold"
    }

    fn on_market_state(&mut self, _state: &MarketState) -> Option<Order> {
        if self.entered {
            return None;
        }
        self.entered = true;
        Some(Order::market(Side::Buy, self.quantity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ticklab_core::domain::OrderKind;

    fn state(imbalance: f64, position_side: Option<Side>) -> MarketState {
        MarketState {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.0,
            volume: 10.0,
            vwap: 100.0,
            imbalance,
            best_bid: 99.9,
            best_ask: 100.1,
            bid_quantity: 5.0,
            ask_quantity: 5.0,
            spread: 0.2,
            spread_bps: 20.0,
            position_side,
            position_quantity: position_side.map_or(0.0, |_| 0.01),
        }
    }

    #[test]
    fn volume_imbalance_enters_long_on_buy_pressure() {
        let mut strat = VolumeImbalanceStrategy::default();
        let order = strat.on_market_state(&state(0.6, None)).unwrap();
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.kind, OrderKind::Market);
    }

    #[test]
    fn volume_imbalance_skips_duplicate_long() {
        let mut strat = VolumeImbalanceStrategy::default();
        assert!(strat.on_market_state(&state(0.6, Some(Side::Buy))).is_none());
    }

    #[test]
    fn volume_imbalance_exits_only_with_position() {
        let mut strat = VolumeImbalanceStrategy::default();
        assert!(strat.on_market_state(&state(-0.6, None)).is_none());
        let exit = strat.on_market_state(&state(-0.6, Some(Side::Buy))).unwrap();
        assert_eq!(exit.side, Side::Sell);
    }

    #[test]
    fn volume_imbalance_neutral_zone_is_silent() {
        let mut strat = VolumeImbalanceStrategy::default();
        assert!(strat.on_market_state(&state(0.2, None)).is_none());
        assert!(strat.on_market_state(&state(-0.2, Some(Side::Buy))).is_none());
    }

    #[test]
    fn obi_uses_taker_style_limits() {
        let mut strat = ObiStrategy::default();
        let entry = strat.on_market_state(&state(0.5, None)).unwrap();
        assert_eq!(entry.kind, OrderKind::Limit);
        // Buys at the ask to cross the spread.
        assert_eq!(entry.limit_price, Some(100.1));

        let exit = strat.on_market_state(&state(-0.5, Some(Side::Buy))).unwrap();
        assert_eq!(exit.limit_price, Some(99.9));
        assert_eq!(exit.side, Side::Sell);
    }

    #[test]
    fn hold_buys_exactly_once() {
        let mut strat = HoldStrategy::new(0.5);
        assert!(strat.on_market_state(&state(0.0, None)).is_some());
        assert!(strat.on_market_state(&state(0.0, Some(Side::Buy))).is_none());
        assert!(strat.on_market_state(&state(0.9, Some(Side::Buy))).is_none());
    }

    #[test]
    fn params_deserialize_with_defaults() {
        let params: VolumeImbalanceParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params, VolumeImbalanceParams::default());
        let params: ObiParams =
            serde_json::from_str(r#"{"buy_threshold": 0.5}"#).unwrap();
        assert_eq!(params.buy_threshold, 0.5);
        assert_eq!(params.sell_threshold, -0.3);
    }
}
