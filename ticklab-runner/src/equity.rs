//! Equity curve recording, one point per realized fill.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sample of the realized-pnl equity curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    /// Initial capital plus realized pnl at this point.
    pub equity: f64,
    /// Percent below the running peak.
    pub drawdown_pct: f64,
    pub cumulative_pnl: f64,
    pub cumulative_return_pct: f64,
}

/// Accumulates equity points as fills realize pnl. Unrealized pnl is
/// deliberately excluded so the curve only moves on trades.
#[derive(Debug, Clone)]
pub struct EquityCurve {
    initial_capital: f64,
    peak: f64,
    points: Vec<EquityPoint>,
}

impl EquityCurve {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            peak: initial_capital,
            points: Vec::new(),
        }
    }

    pub fn record(&mut self, timestamp: DateTime<Utc>, realized_pnl: f64) {
        let equity = self.initial_capital + realized_pnl;
        if equity > self.peak {
            self.peak = equity;
        }
        let drawdown_pct = if self.peak > 0.0 {
            (self.peak - equity) / self.peak * 100.0
        } else {
            0.0
        };
        let cumulative_pnl = equity - self.initial_capital;
        let cumulative_return_pct = if self.initial_capital > 0.0 {
            cumulative_pnl / self.initial_capital * 100.0
        } else {
            0.0
        };
        self.points.push(EquityPoint {
            timestamp,
            equity,
            drawdown_pct,
            cumulative_pnl,
            cumulative_return_pct,
        });
    }

    pub fn points(&self) -> &[EquityPoint] {
        &self.points
    }

    pub fn into_points(self) -> Vec<EquityPoint> {
        self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + chrono::Duration::minutes(min)
    }

    #[test]
    fn drawdown_measured_from_peak() {
        let mut curve = EquityCurve::new(1_000.0);
        curve.record(ts(0), 100.0);
        curve.record(ts(1), -100.0);
        curve.record(ts(2), 50.0);

        let points = curve.points();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].equity, 1_100.0);
        assert_eq!(points[0].drawdown_pct, 0.0);
        // 900 against the 1100 peak.
        assert!((points[1].drawdown_pct - (200.0 / 1_100.0 * 100.0)).abs() < 1e-9);
        assert!((points[2].cumulative_return_pct - 5.0).abs() < 1e-9);
    }

    #[test]
    fn empty_curve_has_no_points() {
        assert!(EquityCurve::new(1_000.0).points().is_empty());
    }
}
