//! Funding rate records for perpetual futures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A funding rate observation. Rates apply per 8-hour settlement period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRate {
    pub timestamp: DateTime<Utc>,
    /// Per-period rate, e.g. 0.0001 = 1 bps per 8 hours.
    pub rate: f64,
    pub mark_price: f64,
}

impl FundingRate {
    /// Annualized rate assuming three settlements per day.
    pub fn annual_rate(&self) -> f64 {
        self.rate * 3.0 * 365.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn annualization() {
        let rate = FundingRate {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            rate: 0.0001,
            mark_price: 50_000.0,
        };
        assert!((rate.annual_rate() - 0.1095).abs() < 1e-9);
    }
}
