//! Performance report — a pure reduction over the trade ledger.
//!
//! Every statistic is computed from the recorded trades and the initial
//! capital; nothing here touches the exchange or the replay. Opening
//! fills carry zero pnl and are excluded from win/loss statistics, so
//! win rate and Sharpe describe round trips, not order flow.

use serde::{Deserialize, Serialize};
use ticklab_core::domain::Trade;

/// Aggregate statistics for one replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub initial_capital: f64,
    pub final_capital: f64,
    /// Percent return on initial capital.
    pub total_return_pct: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percent of closing trades with positive pnl.
    pub win_rate_pct: f64,
    /// Gross profit / gross loss. `+inf` with wins and no losses, 0.0
    /// with no wins.
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// Largest peak-to-trough drop of the running capital, in percent.
    pub max_drawdown_pct: f64,
    /// Non-annualized mean/stdev of closing-trade pnl.
    pub sharpe_ratio: f64,
    pub total_fees: f64,
    /// Net funding received over the replay (negative when paying).
    pub funding_total: f64,
}

impl PerformanceReport {
    /// Reduce a trade ledger to a report. An empty ledger yields the
    /// all-zero report with capital unchanged.
    pub fn compute(trades: &[Trade], initial_capital: f64, funding_total: f64) -> Self {
        if trades.is_empty() {
            return Self::empty(initial_capital);
        }

        let total_fees: f64 = trades.iter().map(|t| t.fee).sum();
        let closing: Vec<&Trade> = trades.iter().filter(|t| t.pnl != 0.0).collect();
        let winning: Vec<&&Trade> = closing.iter().filter(|t| t.pnl > 0.0).collect();
        let losing: Vec<&&Trade> = closing.iter().filter(|t| t.pnl < 0.0).collect();

        let winning_trades = winning.len();
        let losing_trades = losing.len();
        let decided = winning_trades + losing_trades;
        let win_rate_pct = if decided > 0 {
            winning_trades as f64 / decided as f64 * 100.0
        } else {
            0.0
        };

        let gross_profit: f64 = winning.iter().map(|t| t.pnl).sum();
        let gross_loss: f64 = losing.iter().map(|t| t.pnl).sum::<f64>().abs();
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if winning_trades > 0 {
            gross_profit / winning_trades as f64
        } else {
            0.0
        };
        let avg_loss = if losing_trades > 0 {
            gross_loss / losing_trades as f64
        } else {
            0.0
        };

        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
        let final_capital = initial_capital + total_pnl;
        let total_return_pct = if initial_capital > 0.0 {
            (final_capital - initial_capital) / initial_capital * 100.0
        } else {
            0.0
        };

        Self {
            initial_capital,
            final_capital,
            total_return_pct,
            total_trades: trades.len(),
            winning_trades,
            losing_trades,
            win_rate_pct,
            profit_factor,
            avg_win,
            avg_loss,
            max_drawdown_pct: max_drawdown_pct(trades, initial_capital),
            sharpe_ratio: sharpe_ratio(trades),
            total_fees,
            funding_total,
        }
    }

    fn empty(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            final_capital: initial_capital,
            total_return_pct: 0.0,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate_pct: 0.0,
            profit_factor: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            max_drawdown_pct: 0.0,
            sharpe_ratio: 0.0,
            total_fees: 0.0,
            funding_total: 0.0,
        }
    }
}

/// Largest peak-to-trough percent drop of the cumulative capital series.
pub fn max_drawdown_pct(trades: &[Trade], initial_capital: f64) -> f64 {
    let mut capital = initial_capital;
    let mut peak = initial_capital;
    let mut max_dd = 0.0_f64;
    for trade in trades {
        capital += trade.pnl;
        if capital > peak {
            peak = capital;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - capital) / peak * 100.0);
        }
    }
    max_dd
}

/// Mean over sample stdev of closing-trade pnl. Not annualized; needs at
/// least two closing trades.
pub fn sharpe_ratio(trades: &[Trade]) -> f64 {
    let pnls: Vec<f64> = trades.iter().filter(|t| t.pnl != 0.0).map(|t| t.pnl).collect();
    if pnls.len() < 2 {
        return 0.0;
    }
    let n = pnls.len() as f64;
    let mean = pnls.iter().sum::<f64>() / n;
    let var = pnls.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    if std < 1e-15 {
        return 0.0;
    }
    mean / std
}
