//! Funding settlement timing and historical rate lookup.
//!
//! Perpetual funding settles at 00:00, 08:00, and 16:00 UTC. Replays
//! rarely have an event exactly on a boundary, so the clock compares
//! (day, period) pairs between the last checked timestamp and the
//! current one instead of testing for an exact settlement hour.

use crate::domain::FundingRate;
use chrono::{DateTime, TimeZone, Timelike, Utc};

/// (days since epoch, 8-hour period index) — ordered lexicographically.
fn period_index(ts: DateTime<Utc>) -> (i64, u8) {
    let epoch = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let days = (ts - epoch).num_days();
    let period = match ts.hour() {
        h if h < 8 => 0,
        h if h < 16 => 1,
        _ => 2,
    };
    (days, period)
}

/// Tracks the last settlement check and fires once per crossed period.
#[derive(Debug, Clone)]
pub struct FundingClock {
    last_checked: DateTime<Utc>,
}

impl FundingClock {
    /// Starts at `origin`; the period containing `origin` itself never
    /// fires.
    pub fn new(origin: DateTime<Utc>) -> Self {
        Self { last_checked: origin }
    }

    /// True when `now` is in a later settlement period than the last
    /// check. Advances the clock either way.
    pub fn crossed(&mut self, now: DateTime<Utc>) -> bool {
        let fired = period_index(now) > period_index(self.last_checked);
        self.last_checked = now;
        fired
    }
}

/// Ordered historical funding rates with as-of lookup.
#[derive(Debug, Clone, Default)]
pub struct FundingTape {
    rates: Vec<FundingRate>,
}

impl FundingTape {
    /// Rates are sorted by timestamp regardless of input order.
    pub fn new(mut rates: Vec<FundingRate>) -> Self {
        rates.sort_by_key(|r| r.timestamp);
        Self { rates }
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Latest rate with `timestamp <= ts`, i.e. the rate in force.
    pub fn latest_at_or_before(&self, ts: DateTime<Utc>) -> Option<&FundingRate> {
        let idx = self.rates.partition_point(|r| r.timestamp <= ts);
        idx.checked_sub(1).map(|i| &self.rates[i])
    }
}
