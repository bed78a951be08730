//! Replay orchestrators: drive the exchange, the bar builder, and a
//! strategy over a recorded event stream.
//!
//! Per event the order is fixed: fill attempt first (so resting orders
//! see the price before the strategy reacts to it), then bar folding,
//! then the strategy on a completed bar, then funding settlement, then
//! mark-to-market. An equity point is recorded on every realized fill.
//!
//! Events must arrive in non-decreasing timestamp order. This is a
//! documented precondition, asserted in debug builds only.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use ticklab_core::domain::{Bar, BookSnapshot, MarketState, Trade, TradePrint};
use ticklab_core::{BarBuilder, FundingClock, FundingTape, SimExchange};

use crate::equity::{EquityCurve, EquityPoint};
use crate::report::PerformanceReport;
use crate::strategy::Strategy;

/// Replay-level knobs, independent of the exchange config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplaySettings {
    /// Minimum milliseconds between submission and fill eligibility.
    #[serde(default)]
    pub latency_ms: f64,
    /// Default TTL applied to strategy orders, in seconds. `None` means
    /// good-till-cancelled.
    #[serde(default)]
    pub ttl_seconds: Option<f64>,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            latency_ms: 0.0,
            ttl_seconds: None,
        }
    }
}

impl ReplaySettings {
    fn ttl(&self) -> Option<Duration> {
        self.ttl_seconds
            .map(|s| Duration::milliseconds((s * 1_000.0) as i64))
    }
}

/// Everything a finished replay hands back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub strategy_name: String,
    pub report: PerformanceReport,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub event_count: u64,
    pub bar_count: u64,
    pub order_count: u64,
    pub trade_count: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Shared state of both replay flavors.
struct ReplayCore {
    exchange: SimExchange,
    strategy: Box<dyn Strategy>,
    settings: ReplaySettings,
    funding: Option<FundingTape>,
    funding_clock: Option<FundingClock>,
    equity: EquityCurve,
    event_count: u64,
    bar_count: u64,
    order_count: u64,
    trade_count: u64,
    start_time: Option<DateTime<Utc>>,
    last_time: Option<DateTime<Utc>>,
}

impl ReplayCore {
    fn new(
        exchange: SimExchange,
        strategy: Box<dyn Strategy>,
        settings: ReplaySettings,
        funding: Option<FundingTape>,
    ) -> Self {
        let initial_capital = exchange.config().initial_capital;
        Self {
            exchange,
            strategy,
            settings,
            funding,
            funding_clock: None,
            equity: EquityCurve::new(initial_capital),
            event_count: 0,
            bar_count: 0,
            order_count: 0,
            trade_count: 0,
            start_time: None,
            last_time: None,
        }
    }

    fn observe_time(&mut self, now: DateTime<Utc>) {
        if let Some(last) = self.last_time {
            debug_assert!(now >= last, "events must be time-ordered");
        }
        self.start_time.get_or_insert(now);
        self.last_time = Some(now);
        self.event_count += 1;
    }

    fn attempt_fill(&mut self, price: f64, best_bid: f64, best_ask: f64, now: DateTime<Utc>) {
        let filled = self.exchange.on_price_update(
            price,
            best_bid,
            best_ask,
            now,
            self.settings.latency_ms,
        );
        if let Some(trade) = filled {
            self.trade_count += 1;
            let realized = self.exchange.realized_pnl();
            self.equity.record(trade.timestamp, realized);
        }
    }

    /// Run the strategy on a snapshot and queue the order unless an order
    /// on the same side is already pending.
    fn consult_strategy(&mut self, state: &MarketState, now: DateTime<Utc>) {
        let Some(order) = self.strategy.on_market_state(state) else {
            return;
        };
        if self.exchange.has_pending_side(order.side) {
            return;
        }
        let ttl = self.settings.ttl();
        if self.exchange.submit(order, ttl, now).is_ok() {
            self.order_count += 1;
        }
    }

    fn settle_funding(&mut self, now: DateTime<Utc>) {
        let Some(tape) = &self.funding else {
            return;
        };
        let clock = self
            .funding_clock
            .get_or_insert_with(|| FundingClock::new(now));
        if !clock.crossed(now) {
            return;
        }
        if let Some(rate) = tape.latest_at_or_before(now) {
            self.exchange.apply_funding(rate.rate, rate.mark_price);
        }
    }

    fn finish(self, strategy_name: String) -> ReplaySummary {
        let trades = self.exchange.trades().to_vec();
        let report = PerformanceReport::compute(
            &trades,
            self.exchange.config().initial_capital,
            self.exchange.funding_total(),
        );
        ReplaySummary {
            strategy_name,
            report,
            trades,
            equity_curve: self.equity.into_points(),
            event_count: self.event_count,
            bar_count: self.bar_count,
            order_count: self.order_count,
            trade_count: self.trade_count,
            start_time: self.start_time,
            end_time: self.last_time,
        }
    }
}

/// Tick-driven replay: aggregates prints into bars and consults the
/// strategy on each completed bar. The print price doubles as both best
/// bid and best ask, there being no book.
pub struct TickReplay {
    core: ReplayCore,
    builder: BarBuilder,
}

impl TickReplay {
    pub fn new(
        exchange: SimExchange,
        builder: BarBuilder,
        strategy: Box<dyn Strategy>,
        settings: ReplaySettings,
        funding: Option<FundingTape>,
    ) -> Self {
        Self {
            core: ReplayCore::new(exchange, strategy, settings, funding),
            builder,
        }
    }

    pub fn exchange(&self) -> &SimExchange {
        &self.core.exchange
    }

    /// The bar still being built, if any.
    pub fn current_bar(&self) -> Option<&Bar> {
        self.builder.current()
    }

    pub fn process_print(&mut self, print: &TradePrint) {
        let now = print.timestamp;
        self.core.observe_time(now);

        self.core.attempt_fill(print.price, print.price, print.price, now);

        if let Some(bar) = self.builder.update(print) {
            self.core.bar_count += 1;
            let state = MarketState::from_bar(&bar, self.core.exchange.position());
            self.core.consult_strategy(&state, now);
        }

        self.core.settle_funding(now);
        self.core.exchange.update_unrealized_pnl(print.price);
    }

    pub fn run<'a, I>(mut self, prints: I) -> ReplaySummary
    where
        I: IntoIterator<Item = &'a TradePrint>,
    {
        for print in prints {
            self.process_print(print);
        }
        let name = self.core.strategy.name().to_string();
        self.core.finish(name)
    }
}

/// Book-driven replay: consults the strategy on every snapshot with the
/// real top of book; fills reference the mid price.
pub struct BookReplay {
    core: ReplayCore,
}

impl BookReplay {
    pub fn new(
        exchange: SimExchange,
        strategy: Box<dyn Strategy>,
        settings: ReplaySettings,
        funding: Option<FundingTape>,
    ) -> Self {
        Self {
            core: ReplayCore::new(exchange, strategy, settings, funding),
        }
    }

    pub fn exchange(&self) -> &SimExchange {
        &self.core.exchange
    }

    pub fn process_snapshot(&mut self, snapshot: &BookSnapshot) {
        let now = snapshot.timestamp;
        self.core.observe_time(now);

        // Degenerate snapshots (an empty side) are counted but otherwise
        // skipped.
        let (Some(bid), Some(ask), Some(mid)) = (
            snapshot.best_bid(),
            snapshot.best_ask(),
            snapshot.mid_price(),
        ) else {
            return;
        };

        self.core.attempt_fill(mid, bid.price, ask.price, now);

        if let Some(state) = MarketState::from_book(snapshot, self.core.exchange.position()) {
            self.core.bar_count += 1;
            self.core.consult_strategy(&state, now);
        }

        self.core.settle_funding(now);
        self.core.exchange.update_unrealized_pnl(mid);
    }

    pub fn run<'a, I>(mut self, snapshots: I) -> ReplaySummary
    where
        I: IntoIterator<Item = &'a BookSnapshot>,
    {
        for snapshot in snapshots {
            self.process_snapshot(snapshot);
        }
        let name = self.core.strategy.name().to_string();
        self.core.finish(name)
    }
}
