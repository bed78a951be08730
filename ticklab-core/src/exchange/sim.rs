//! Simulated exchange: FIFO order queue, latency gating, spot and
//! isolated-margin futures fill accounting, forced liquidation.
//!
//! Orders are accepted unconditionally at submission (subject to shape
//! validation) and checked against balances only at fill time, the way a
//! real venue rejects at matching rather than at the gateway. Market
//! orders leave the queue whether or not the fill succeeds; limit orders
//! leave the queue on any fill attempt and otherwise wait.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::config::ExchangeConfig;
use crate::domain::{Order, OrderId, OrderKind, PendingOrder, Position, Side, Trade};

/// Floating point tolerance for balance checks.
const EPSILON: f64 = 1e-9;

/// Rejections at order submission. Fill-time failures (insufficient
/// balance, expiry, liquidation) are outcomes, not errors.
#[derive(Debug, Error, PartialEq)]
pub enum OrderError {
    #[error("order quantity must be positive, got {0}")]
    NonPositiveQuantity(f64),
    #[error("limit order submitted without a limit price")]
    MissingLimitPrice,
    #[error("limit price must be positive, got {0}")]
    NonPositiveLimitPrice(f64),
}

/// The simulated exchange. One instance per replay.
#[derive(Debug, Clone)]
pub struct SimExchange {
    config: ExchangeConfig,
    usd_balance: f64,
    base_balance: f64,
    position: Position,
    pending: VecDeque<PendingOrder>,
    trades: Vec<Trade>,
    realized_pnl: f64,
    /// Entry fees paid for the open position, allocated proportionally on
    /// partial closes and absorbed into the loss on liquidation.
    entry_fee: f64,
    total_fees: f64,
    /// Net funding received (negative when paying).
    funding_total: f64,
    next_order_id: u64,
}

impl SimExchange {
    /// The config must already be validated; see `ExchangeConfig::validate`.
    pub fn new(config: ExchangeConfig) -> Self {
        let leverage = config.leverage;
        let usd_balance = config.initial_capital;
        Self {
            config,
            usd_balance,
            base_balance: 0.0,
            position: Position::flat(leverage),
            pending: VecDeque::new(),
            trades: Vec::new(),
            realized_pnl: 0.0,
            entry_fee: 0.0,
            total_fees: 0.0,
            funding_total: 0.0,
            next_order_id: 1,
        }
    }

    // ── Accessors ──

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn usd_balance(&self) -> f64 {
        self.usd_balance
    }

    pub fn base_balance(&self) -> f64 {
        self.base_balance
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn pending_orders(&self) -> impl Iterator<Item = &PendingOrder> {
        self.pending.iter()
    }

    pub fn has_pending_side(&self, side: Side) -> bool {
        self.pending.iter().any(|p| p.order.side == side)
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    /// Realized plus marked unrealized pnl.
    pub fn total_pnl(&self) -> f64 {
        self.realized_pnl + self.position.unrealized_pnl
    }

    pub fn total_fees(&self) -> f64 {
        self.total_fees
    }

    pub fn funding_total(&self) -> f64 {
        self.funding_total
    }

    pub fn is_leveraged(&self) -> bool {
        self.config.is_leveraged()
    }

    // ── Order queue ──

    /// Queue an order. `ttl` of `None` means good-till-cancelled.
    pub fn submit(
        &mut self,
        order: Order,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<OrderId, OrderError> {
        if !(order.quantity > 0.0) {
            return Err(OrderError::NonPositiveQuantity(order.quantity));
        }
        if order.kind == OrderKind::Limit {
            match order.limit_price {
                None => return Err(OrderError::MissingLimitPrice),
                Some(p) if !(p > 0.0) => return Err(OrderError::NonPositiveLimitPrice(p)),
                Some(_) => {}
            }
        }

        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        self.pending.push_back(PendingOrder {
            id,
            order,
            submitted_at: now,
            expires_at: ttl.map(|d| now + d),
        });
        Ok(id)
    }

    /// Remove one order by id. Returns whether it was found.
    pub fn cancel(&mut self, id: OrderId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.id != id);
        self.pending.len() != before
    }

    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn cancel_by_side(&mut self, side: Side) -> usize {
        let before = self.pending.len();
        self.pending.retain(|p| p.order.side != side);
        before - self.pending.len()
    }

    /// Drop expired orders. Called internally before every fill pass.
    pub fn expire_orders(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.pending.len();
        self.pending.retain(|p| !p.is_expired(now));
        before - self.pending.len()
    }

    // ── Matching ──

    /// Process one price update against the head of the queue.
    ///
    /// Liquidation is checked before any order handling; a forced close
    /// cancels every pending order and yields no trade here (the
    /// liquidation entry is in the ledger). Only the front order gets a
    /// fill attempt per update; use [`on_price_update_all`] to sweep the
    /// whole queue.
    ///
    /// [`on_price_update_all`]: SimExchange::on_price_update_all
    pub fn on_price_update(
        &mut self,
        price: f64,
        best_bid: f64,
        best_ask: f64,
        now: DateTime<Utc>,
        latency_ms: f64,
    ) -> Option<Trade> {
        if self.check_liquidation(price) {
            self.execute_liquidation(now);
            self.cancel_all();
            return None;
        }

        self.expire_orders(now);

        let pending = self.pending.front()?;
        if gated_by_latency(pending, now, latency_ms) {
            return None;
        }

        let order = pending.order.clone();
        let (trade, remove) = self.try_fill(&order, price, best_bid, best_ask, now);
        if remove {
            self.pending.pop_front();
        }
        trade
    }

    /// Process one price update against every queued order. Fill order is
    /// queue order; latency-gated entries are skipped, not dropped.
    pub fn on_price_update_all(
        &mut self,
        price: f64,
        best_bid: f64,
        best_ask: f64,
        now: DateTime<Utc>,
        latency_ms: f64,
    ) -> Vec<Trade> {
        if self.check_liquidation(price) {
            self.execute_liquidation(now);
            self.cancel_all();
            return Vec::new();
        }

        self.expire_orders(now);

        let mut trades = Vec::new();
        let queued: Vec<PendingOrder> = self.pending.drain(..).collect();
        for pending in queued {
            if gated_by_latency(&pending, now, latency_ms) {
                self.pending.push_back(pending);
                continue;
            }
            let (trade, remove) = self.try_fill(&pending.order, price, best_bid, best_ask, now);
            if let Some(trade) = trade {
                trades.push(trade);
            }
            if !remove {
                self.pending.push_back(pending);
            }
        }
        trades
    }

    /// Attempt a fill. Returns the trade (if executed) and whether the
    /// order leaves the queue.
    fn try_fill(
        &mut self,
        order: &Order,
        price: f64,
        best_bid: f64,
        best_ask: f64,
        now: DateTime<Utc>,
    ) -> (Option<Trade>, bool) {
        match order.kind {
            OrderKind::Market => {
                let execution_price = match order.side {
                    Side::Buy => best_ask,
                    Side::Sell => best_bid,
                };
                let trade =
                    self.execute(order, execution_price, self.config.taker_fee_rate, now);
                // Market orders never retry.
                (trade, true)
            }
            OrderKind::Limit => {
                let limit = order
                    .limit_price
                    .unwrap_or_else(|| unreachable!("validated at submit"));
                let crossed = match order.side {
                    Side::Buy => price <= limit,
                    Side::Sell => price >= limit,
                };
                if crossed {
                    let trade = self.execute(order, limit, self.config.maker_fee_rate, now);
                    // Dequeued on the attempt even if the balance check failed.
                    (trade, true)
                } else {
                    (None, false)
                }
            }
        }
    }

    fn sufficient_balance(&self, order: &Order, notional: f64, fee: f64) -> bool {
        if self.is_leveraged() {
            let required = notional / self.config.leverage + fee;
            self.usd_balance >= required - EPSILON
        } else {
            match order.side {
                Side::Buy => self.usd_balance >= notional + fee - EPSILON,
                // No shorting in spot mode: need the inventory.
                Side::Sell => self.base_balance >= order.quantity - EPSILON,
            }
        }
    }

    fn execute(
        &mut self,
        order: &Order,
        execution_price: f64,
        fee_rate: f64,
        now: DateTime<Utc>,
    ) -> Option<Trade> {
        let notional = execution_price * order.quantity;
        let fee = notional * fee_rate;
        if !self.sufficient_balance(order, notional, fee) {
            return None;
        }

        let pnl = if self.is_leveraged() {
            self.settle_leveraged(order, execution_price, notional, fee)
        } else {
            self.settle_spot(order, execution_price, notional, fee)
        };
        self.position.assert_valid();

        let trade = Trade {
            timestamp: now,
            side: order.side,
            price: execution_price,
            quantity: order.quantity,
            fee,
            pnl,
            liquidation: false,
        };
        self.trades.push(trade.clone());
        self.total_fees += fee;
        Some(trade)
    }

    /// Spot settlement: cash and inventory move on every fill, pnl is
    /// realized against the weighted-average entry on closes.
    fn settle_spot(&mut self, order: &Order, price: f64, notional: f64, fee: f64) -> f64 {
        match order.side {
            Side::Buy => {
                self.usd_balance -= notional + fee;
                self.base_balance += order.quantity;
            }
            Side::Sell => {
                self.usd_balance += notional - fee;
                self.base_balance -= order.quantity;
            }
        }
        self.apply_to_position(order, price, 0.0, fee, SettleMode::Spot)
    }

    /// Isolated-margin settlement: cash moves by margin and fees, pnl is
    /// credited on closes together with the released margin.
    fn settle_leveraged(&mut self, order: &Order, price: f64, notional: f64, fee: f64) -> f64 {
        let margin = notional / self.config.leverage;
        self.apply_to_position(order, price, margin, fee, SettleMode::Leveraged)
    }

    /// Shared position bookkeeping for both modes. Returns the realized
    /// pnl recorded on the trade (0.0 for opens and adds).
    fn apply_to_position(
        &mut self,
        order: &Order,
        price: f64,
        margin: f64,
        fee: f64,
        mode: SettleMode,
    ) -> f64 {
        let leveraged = matches!(mode, SettleMode::Leveraged);

        match self.position.side {
            // Opening from flat.
            None => {
                if leveraged {
                    self.usd_balance -= margin + fee;
                }
                self.position = Position {
                    side: Some(order.side),
                    quantity: order.quantity,
                    entry_price: price,
                    leverage: self.config.leverage,
                    margin,
                    liquidation_price: self.liquidation_price(price, order.side),
                    unrealized_pnl: 0.0,
                };
                self.entry_fee = fee;
                0.0
            }

            // Adding to the same side: weighted-average entry, recomputed
            // liquidation price.
            Some(side) if side == order.side => {
                let total_qty = self.position.quantity + order.quantity;
                let avg_price = (self.position.entry_price * self.position.quantity
                    + price * order.quantity)
                    / total_qty;
                if leveraged {
                    self.usd_balance -= margin + fee;
                }
                self.position = Position {
                    side: Some(side),
                    quantity: total_qty,
                    entry_price: avg_price,
                    leverage: self.config.leverage,
                    margin: self.position.margin + margin,
                    liquidation_price: self.liquidation_price(avg_price, side),
                    unrealized_pnl: 0.0,
                };
                self.entry_fee += fee;
                0.0
            }

            // Opposite side: full or partial close. Quantity beyond the
            // position does not flip; the position just goes flat.
            Some(side) => {
                if order.quantity >= self.position.quantity {
                    let gross = self.position.pnl_at(price, self.position.quantity);
                    let pnl = gross - self.entry_fee - fee;
                    self.realized_pnl += pnl;
                    if leveraged {
                        self.usd_balance += self.position.margin + gross - fee;
                    }
                    self.position = Position::flat(self.config.leverage);
                    self.entry_fee = 0.0;
                    pnl
                } else {
                    let close_ratio = order.quantity / self.position.quantity;
                    let gross = self.position.pnl_at(price, order.quantity);
                    let allocated_entry_fee = self.entry_fee * close_ratio;
                    let pnl = gross - allocated_entry_fee - fee;
                    self.realized_pnl += pnl;

                    let released_margin = self.position.margin * close_ratio;
                    if leveraged {
                        self.usd_balance += released_margin + gross - fee;
                    }
                    // Entry price and liquidation price are unchanged by a
                    // partial close.
                    self.position = Position {
                        side: Some(side),
                        quantity: self.position.quantity - order.quantity,
                        entry_price: self.position.entry_price,
                        leverage: self.config.leverage,
                        margin: self.position.margin - released_margin,
                        liquidation_price: self.position.liquidation_price,
                        unrealized_pnl: 0.0,
                    };
                    self.entry_fee -= allocated_entry_fee;
                    pnl
                }
            }
        }
    }

    // ── Liquidation ──

    /// Binance USDT-M isolated-margin liquidation price (tier 1, cum = 0):
    /// long `EP * (1/L - 1) / (MMR - 1)`, short `EP * (1/L + 1) / (MMR + 1)`.
    fn liquidation_price(&self, entry_price: f64, side: Side) -> Option<f64> {
        if !self.is_leveraged() {
            return None;
        }
        let mmr = self.config.maintenance_margin_rate;
        let l = self.config.leverage;
        Some(match side {
            Side::Buy => entry_price * (1.0 / l - 1.0) / (mmr - 1.0),
            Side::Sell => entry_price * (1.0 / l + 1.0) / (mmr + 1.0),
        })
    }

    fn check_liquidation(&self, price: f64) -> bool {
        if !self.is_leveraged() {
            return false;
        }
        let (Some(side), Some(liq_price)) = (self.position.side, self.position.liquidation_price)
        else {
            return false;
        };
        match side {
            Side::Buy => price <= liq_price,
            Side::Sell => price >= liq_price,
        }
    }

    /// Forced close at the liquidation price. The loss is capped at the
    /// committed margin plus the entry fee; any residual margin is
    /// returned to cash. The ledger entry carries no fee and the loss as
    /// negative pnl.
    fn execute_liquidation(&mut self, now: DateTime<Utc>) {
        let Some(side) = self.position.side else {
            return;
        };
        let liq_price = self
            .position
            .liquidation_price
            .unwrap_or(self.position.entry_price);

        let pnl = self.position.pnl_at(liq_price, self.position.quantity);
        let remaining_margin = (self.position.margin + pnl - self.entry_fee).max(0.0);
        self.usd_balance += remaining_margin;

        let loss = self.position.margin - remaining_margin + self.entry_fee;
        self.realized_pnl -= loss;

        self.trades.push(Trade {
            timestamp: now,
            side: side.opposite(),
            price: liq_price,
            quantity: self.position.quantity,
            fee: 0.0,
            pnl: -loss,
            liquidation: true,
        });

        self.position = Position::flat(self.config.leverage);
        self.entry_fee = 0.0;
    }

    // ── Marking and funding ──

    /// Mark the open position to `price`.
    pub fn update_unrealized_pnl(&mut self, price: f64) {
        self.position.unrealized_pnl = self.position.pnl_at(price, self.position.quantity);
    }

    /// Settle one funding period. Longs pay positive rates, shorts
    /// receive them. Returns the signed amount credited to cash (zero in
    /// spot mode or when flat).
    pub fn apply_funding(&mut self, funding_rate: f64, mark_price: f64) -> f64 {
        if !self.is_leveraged() {
            return 0.0;
        }
        let Some(side) = self.position.side else {
            return 0.0;
        };

        let notional = self.position.quantity * mark_price;
        let mut payment = notional * funding_rate;
        if side == Side::Buy {
            payment = -payment;
        }
        self.usd_balance += payment;
        self.funding_total += payment;
        payment
    }
}

fn gated_by_latency(pending: &PendingOrder, now: DateTime<Utc>, latency_ms: f64) -> bool {
    if latency_ms <= 0.0 {
        return false;
    }
    let elapsed_ms = (now - pending.submitted_at).num_milliseconds() as f64;
    elapsed_ms < latency_ms
}

#[derive(Debug, Clone, Copy)]
enum SettleMode {
    Spot,
    Leveraged,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn t_plus_ms(ms: i64) -> DateTime<Utc> {
        t0() + Duration::milliseconds(ms)
    }

    fn spot_exchange() -> SimExchange {
        SimExchange::new(ExchangeConfig::spot(10_000.0).with_fee_rate(0.001))
    }

    fn futures_exchange(leverage: f64) -> SimExchange {
        SimExchange::new(ExchangeConfig::leveraged(10_000.0, leverage).with_fee_rate(0.0005))
    }

    #[test]
    fn submit_rejects_zero_quantity() {
        let mut ex = spot_exchange();
        let err = ex.submit(Order::market(Side::Buy, 0.0), None, t0()).unwrap_err();
        assert_eq!(err, OrderError::NonPositiveQuantity(0.0));
    }

    #[test]
    fn submit_rejects_limit_without_price() {
        let mut ex = spot_exchange();
        let order = Order {
            side: Side::Buy,
            quantity: 1.0,
            kind: OrderKind::Limit,
            limit_price: None,
        };
        assert_eq!(
            ex.submit(order, None, t0()).unwrap_err(),
            OrderError::MissingLimitPrice
        );
    }

    #[test]
    fn market_buy_fills_at_ask() {
        let mut ex = spot_exchange();
        ex.submit(Order::market(Side::Buy, 1.0), None, t0()).unwrap();
        let trade = ex.on_price_update(100.0, 99.0, 101.0, t_plus_ms(1), 0.0).unwrap();
        assert_eq!(trade.price, 101.0);
        assert_eq!(trade.side, Side::Buy);
        // 10000 - 101 - 0.101
        assert!((ex.usd_balance() - 9_898.899).abs() < 1e-9);
        assert!((ex.base_balance() - 1.0).abs() < 1e-12);
        assert_eq!(ex.pending_orders().count(), 0);
    }

    #[test]
    fn market_sell_fills_at_bid() {
        let mut ex = spot_exchange();
        ex.submit(Order::market(Side::Buy, 1.0), None, t0()).unwrap();
        ex.on_price_update(100.0, 99.0, 101.0, t_plus_ms(1), 0.0).unwrap();
        ex.submit(Order::market(Side::Sell, 1.0), None, t_plus_ms(2)).unwrap();
        let trade = ex.on_price_update(100.0, 99.0, 101.0, t_plus_ms(3), 0.0).unwrap();
        assert_eq!(trade.price, 99.0);
        assert!(trade.is_closing());
    }

    #[test]
    fn limit_buy_waits_for_cross() {
        let mut ex = spot_exchange();
        ex.submit(Order::limit(Side::Buy, 1.0, 95.0), None, t0()).unwrap();
        assert!(ex.on_price_update(100.0, 99.9, 100.1, t_plus_ms(1), 0.0).is_none());
        assert_eq!(ex.pending_orders().count(), 1);

        let trade = ex.on_price_update(94.0, 93.9, 94.1, t_plus_ms(2), 0.0).unwrap();
        // Fills at the limit price, not the market price.
        assert_eq!(trade.price, 95.0);
    }

    #[test]
    fn limit_sell_crosses_upward() {
        let mut ex = futures_exchange(5.0);
        ex.submit(Order::limit(Side::Sell, 1.0, 105.0), None, t0()).unwrap();
        assert!(ex.on_price_update(104.0, 103.9, 104.1, t_plus_ms(1), 0.0).is_none());
        let trade = ex.on_price_update(106.0, 105.9, 106.1, t_plus_ms(2), 0.0).unwrap();
        assert_eq!(trade.price, 105.0);
        assert_eq!(ex.position().side, Some(Side::Sell));
    }

    #[test]
    fn market_order_dropped_on_insufficient_balance() {
        let mut ex = spot_exchange();
        // Costs far more than the 10k balance.
        ex.submit(Order::market(Side::Buy, 1_000.0), None, t0()).unwrap();
        let trade = ex.on_price_update(100.0, 99.0, 101.0, t_plus_ms(1), 0.0);
        assert!(trade.is_none());
        // Dropped, not retried.
        assert_eq!(ex.pending_orders().count(), 0);
        assert!(ex.trades().is_empty());
    }

    #[test]
    fn spot_sell_without_inventory_fails() {
        let mut ex = spot_exchange();
        ex.submit(Order::market(Side::Sell, 1.0), None, t0()).unwrap();
        assert!(ex.on_price_update(100.0, 99.0, 101.0, t_plus_ms(1), 0.0).is_none());
        assert_eq!(ex.base_balance(), 0.0);
    }

    #[test]
    fn latency_gates_until_elapsed() {
        let mut ex = spot_exchange();
        ex.submit(Order::market(Side::Buy, 1.0), None, t0()).unwrap();
        // 99 ms elapsed < 100 ms latency: no action.
        assert!(ex.on_price_update(100.0, 99.0, 101.0, t_plus_ms(99), 100.0).is_none());
        assert_eq!(ex.pending_orders().count(), 1);
        // Exactly 100 ms: eligible.
        let trade = ex.on_price_update(100.0, 99.0, 101.0, t_plus_ms(100), 100.0);
        assert!(trade.is_some());
    }

    #[test]
    fn ttl_expiry_removes_before_fill() {
        let mut ex = spot_exchange();
        ex.submit(
            Order::market(Side::Buy, 1.0),
            Some(Duration::seconds(5)),
            t0(),
        )
        .unwrap();
        let trade = ex.on_price_update(100.0, 99.0, 101.0, t0() + Duration::seconds(6), 0.0);
        assert!(trade.is_none());
        assert_eq!(ex.pending_orders().count(), 0);
    }

    #[test]
    fn fifo_fills_head_first() {
        let mut ex = spot_exchange();
        let first = ex.submit(Order::market(Side::Buy, 1.0), None, t0()).unwrap();
        let second = ex.submit(Order::market(Side::Buy, 2.0), None, t0()).unwrap();
        assert_ne!(first, second);
        let trade = ex.on_price_update(100.0, 99.0, 101.0, t_plus_ms(1), 0.0).unwrap();
        assert_eq!(trade.quantity, 1.0);
        assert_eq!(ex.pending_orders().count(), 1);
    }

    #[test]
    fn cancel_by_id_and_side() {
        let mut ex = spot_exchange();
        let id = ex.submit(Order::market(Side::Buy, 1.0), None, t0()).unwrap();
        ex.submit(Order::market(Side::Sell, 1.0), None, t0()).unwrap();
        ex.submit(Order::market(Side::Sell, 2.0), None, t0()).unwrap();

        assert!(ex.cancel(id));
        assert!(!ex.cancel(id));
        assert_eq!(ex.cancel_by_side(Side::Sell), 2);
        assert_eq!(ex.pending_orders().count(), 0);
    }

    #[test]
    fn on_price_update_all_sweeps_queue() {
        let mut ex = futures_exchange(10.0);
        ex.submit(Order::limit(Side::Buy, 0.1, 100.0), None, t0()).unwrap();
        ex.submit(Order::limit(Side::Buy, 0.1, 99.0), None, t0()).unwrap();
        ex.submit(Order::limit(Side::Sell, 0.1, 200.0), None, t0()).unwrap();
        let trades = ex.on_price_update_all(98.0, 97.9, 98.1, t_plus_ms(1), 0.0);
        assert_eq!(trades.len(), 2);
        // The sell order stays queued.
        assert_eq!(ex.pending_orders().count(), 1);
        assert_eq!(ex.position().side, Some(Side::Buy));
        assert!((ex.position().quantity - 0.2).abs() < 1e-12);
    }

    #[test]
    fn maker_fee_for_limit_taker_for_market() {
        let config = ExchangeConfig::leveraged(10_000.0, 2.0).with_fees(0.0002, 0.0005);
        let mut ex = SimExchange::new(config);

        ex.submit(Order::market(Side::Buy, 1.0), None, t0()).unwrap();
        let taker = ex.on_price_update(100.0, 99.0, 100.0, t_plus_ms(1), 0.0).unwrap();
        assert!((taker.fee - 100.0 * 0.0005).abs() < 1e-12);

        ex.submit(Order::limit(Side::Sell, 1.0, 110.0), None, t_plus_ms(2)).unwrap();
        let maker = ex.on_price_update(111.0, 110.9, 111.1, t_plus_ms(3), 0.0).unwrap();
        assert!((maker.fee - 110.0 * 0.0002).abs() < 1e-12);
    }

    #[test]
    fn futures_short_profits_on_drop() {
        let mut ex = futures_exchange(10.0);
        ex.submit(Order::market(Side::Sell, 0.1), None, t0()).unwrap();
        ex.on_price_update(50_000.0, 50_000.0, 50_000.0, t_plus_ms(1), 0.0).unwrap();
        assert_eq!(ex.position().side, Some(Side::Sell));

        ex.submit(Order::market(Side::Buy, 0.1), None, t_plus_ms(2)).unwrap();
        let close = ex.on_price_update(45_000.0, 45_000.0, 45_000.0, t_plus_ms(3), 0.0).unwrap();
        // Gross +500; entry fee 2.5, exit fee 2.25.
        assert!((close.pnl - (500.0 - 2.5 - 2.25)).abs() < 1e-9);
        assert!(ex.position().is_flat());
    }

    #[test]
    fn weighted_average_entry_on_add() {
        let mut ex = futures_exchange(10.0);
        ex.submit(Order::market(Side::Buy, 1.0), None, t0()).unwrap();
        ex.on_price_update(100.0, 100.0, 100.0, t_plus_ms(1), 0.0).unwrap();
        ex.submit(Order::market(Side::Buy, 1.0), None, t_plus_ms(2)).unwrap();
        ex.on_price_update(110.0, 110.0, 110.0, t_plus_ms(3), 0.0).unwrap();

        assert!((ex.position().entry_price - 105.0).abs() < 1e-9);
        assert!((ex.position().quantity - 2.0).abs() < 1e-12);
    }

    #[test]
    fn partial_close_releases_proportional_margin() {
        let mut ex = futures_exchange(10.0);
        ex.submit(Order::market(Side::Buy, 1.0), None, t0()).unwrap();
        ex.on_price_update(100.0, 100.0, 100.0, t_plus_ms(1), 0.0).unwrap();
        let margin_before = ex.position().margin;
        let entry_price = ex.position().entry_price;
        let liq_before = ex.position().liquidation_price;

        ex.submit(Order::market(Side::Sell, 0.4), None, t_plus_ms(2)).unwrap();
        let close = ex.on_price_update(120.0, 120.0, 120.0, t_plus_ms(3), 0.0).unwrap();

        // Gross on the closed slice: (120 - 100) * 0.4 = 8.
        let exit_fee = 120.0 * 0.4 * 0.0005;
        let entry_fee_share = (100.0 * 1.0 * 0.0005) * 0.4;
        assert!((close.pnl - (8.0 - entry_fee_share - exit_fee)).abs() < 1e-9);

        let pos = ex.position();
        assert!((pos.quantity - 0.6).abs() < 1e-12);
        assert!((pos.margin - margin_before * 0.6).abs() < 1e-9);
        // Entry and liquidation prices unchanged by a partial close.
        assert_eq!(pos.entry_price, entry_price);
        assert_eq!(pos.liquidation_price, liq_before);
    }

    #[test]
    fn liquidation_price_anchors() {
        let ex = futures_exchange(10.0);
        let long = ex.liquidation_price(50_000.0, Side::Buy).unwrap();
        let short = ex.liquidation_price(50_000.0, Side::Sell).unwrap();
        assert!((long - 45_180.722891566263).abs() < 0.01);
        assert!((short - 54_780.876494023904).abs() < 0.01);
    }

    #[test]
    fn liquidation_cancels_orders_and_caps_loss() {
        let mut ex = futures_exchange(10.0);
        ex.submit(Order::market(Side::Buy, 0.1), None, t0()).unwrap();
        ex.on_price_update(50_000.0, 50_000.0, 50_000.0, t_plus_ms(1), 0.0).unwrap();
        ex.submit(Order::limit(Side::Sell, 0.1, 60_000.0), None, t_plus_ms(2)).unwrap();

        let margin = ex.position().margin;
        let entry_fee = 50_000.0 * 0.1 * 0.0005;
        let balance_before = ex.usd_balance();

        // Price crashes through the liquidation level.
        let trade = ex.on_price_update(45_000.0, 45_000.0, 45_000.0, t_plus_ms(3), 0.0);
        assert!(trade.is_none());
        assert!(ex.position().is_flat());
        assert_eq!(ex.pending_orders().count(), 0);

        let liq = ex.trades().last().unwrap();
        assert!(liq.liquidation);
        assert_eq!(liq.fee, 0.0);
        assert_eq!(liq.side, Side::Sell);
        // Loss never exceeds margin plus the entry fee.
        assert!(-liq.pnl <= margin + entry_fee + 1e-9);
        assert!((ex.realized_pnl() - liq.pnl).abs() < 1e-9);
        // Residual margin (if any) is all that returns to cash.
        assert!(ex.usd_balance() - balance_before <= margin);
    }

    #[test]
    fn close_with_excess_quantity_goes_flat_without_flip() {
        let mut ex = futures_exchange(10.0);
        ex.submit(Order::market(Side::Buy, 0.5), None, t0()).unwrap();
        ex.on_price_update(100.0, 100.0, 100.0, t_plus_ms(1), 0.0).unwrap();
        ex.submit(Order::market(Side::Sell, 2.0), None, t_plus_ms(2)).unwrap();
        ex.on_price_update(100.0, 100.0, 100.0, t_plus_ms(3), 0.0).unwrap();
        assert!(ex.position().is_flat());
    }

    #[test]
    fn funding_long_pays_positive_rate() {
        let mut ex = futures_exchange(10.0);
        ex.submit(Order::market(Side::Buy, 0.1), None, t0()).unwrap();
        ex.on_price_update(50_000.0, 50_000.0, 50_000.0, t_plus_ms(1), 0.0).unwrap();

        let payment = ex.apply_funding(0.0001, 50_000.0);
        // Long pays: 0.1 * 50000 * 0.0001 = 0.5 debited.
        assert!((payment + 0.5).abs() < 1e-12);
        assert!((ex.funding_total() + 0.5).abs() < 1e-12);
    }

    #[test]
    fn funding_short_receives_positive_rate() {
        let mut ex = futures_exchange(10.0);
        ex.submit(Order::market(Side::Sell, 0.1), None, t0()).unwrap();
        ex.on_price_update(50_000.0, 50_000.0, 50_000.0, t_plus_ms(1), 0.0).unwrap();

        let payment = ex.apply_funding(0.0001, 50_000.0);
        assert!((payment - 0.5).abs() < 1e-12);
    }

    #[test]
    fn funding_ignored_when_flat_or_spot() {
        let mut spot = spot_exchange();
        assert_eq!(spot.apply_funding(0.0001, 50_000.0), 0.0);
        let mut futures = futures_exchange(10.0);
        assert_eq!(futures.apply_funding(0.0001, 50_000.0), 0.0);
    }

    #[test]
    fn mark_to_market_updates_position() {
        let mut ex = futures_exchange(10.0);
        ex.submit(Order::market(Side::Buy, 0.1), None, t0()).unwrap();
        ex.on_price_update(50_000.0, 50_000.0, 50_000.0, t_plus_ms(1), 0.0).unwrap();
        ex.update_unrealized_pnl(51_000.0);
        assert!((ex.position().unrealized_pnl - 100.0).abs() < 1e-9);
        assert!((ex.total_pnl() - ex.realized_pnl() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn spot_full_cycle_conserves_cash() {
        let mut ex = spot_exchange();
        ex.submit(Order::market(Side::Buy, 1.0), None, t0()).unwrap();
        ex.on_price_update(100.0, 100.0, 100.0, t_plus_ms(1), 0.0).unwrap();
        ex.submit(Order::market(Side::Sell, 1.0), None, t_plus_ms(2)).unwrap();
        let close = ex.on_price_update(110.0, 110.0, 110.0, t_plus_ms(3), 0.0).unwrap();

        // Cash out = initial + gross pnl - both fees, and the recorded pnl
        // agrees with the cash delta.
        let expected_cash = 10_000.0 - 100.0 - 0.1 + 110.0 - 0.11;
        assert!((ex.usd_balance() - expected_cash).abs() < 1e-9);
        assert!((close.pnl - (10.0 - 0.1 - 0.11)).abs() < 1e-9);
        assert!((ex.usd_balance() - (10_000.0 + ex.realized_pnl())).abs() < 1e-9);
    }

    #[test]
    fn futures_full_cycle_conserves_cash() {
        let mut ex = futures_exchange(10.0);
        ex.submit(Order::market(Side::Buy, 0.1), None, t0()).unwrap();
        ex.on_price_update(50_000.0, 50_000.0, 50_000.0, t_plus_ms(1), 0.0).unwrap();
        ex.submit(Order::market(Side::Sell, 0.1), None, t_plus_ms(2)).unwrap();
        ex.on_price_update(51_000.0, 51_000.0, 51_000.0, t_plus_ms(3), 0.0).unwrap();

        assert!(ex.position().is_flat());
        assert!((ex.usd_balance() - (10_000.0 + ex.realized_pnl())).abs() < 1e-9);
    }
}
