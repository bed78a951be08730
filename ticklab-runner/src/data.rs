//! CSV data sources and the synthetic print generator.
//!
//! File formats are flat CSVs with epoch-millisecond timestamps, the
//! shape exchange data dumps commonly come in:
//!
//! - prints:   `timestamp_ms,price,quantity,side` (side = `buy`/`sell`)
//! - book:     `timestamp_ms,bid_price,bid_quantity,ask_price,ask_quantity`
//! - funding:  `timestamp_ms,rate,mark_price`

use std::path::Path;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use thiserror::Error;

use ticklab_core::domain::{BookLevel, BookSnapshot, FundingRate, Side, TradePrint};

/// Errors from the data layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid epoch milliseconds: {0}")]
    BadTimestamp(i64),
}

fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>, LoadError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(LoadError::BadTimestamp(ms))
}

#[derive(Debug, Deserialize)]
struct PrintRecord {
    timestamp_ms: i64,
    price: f64,
    quantity: f64,
    side: Side,
}

#[derive(Debug, Deserialize)]
struct BookRecord {
    timestamp_ms: i64,
    bid_price: f64,
    bid_quantity: f64,
    ask_price: f64,
    ask_quantity: f64,
}

#[derive(Debug, Deserialize)]
struct FundingRecord {
    timestamp_ms: i64,
    rate: f64,
    mark_price: f64,
}

/// Load trade prints from a headered CSV file.
pub fn load_trade_prints(path: &Path) -> Result<Vec<TradePrint>, LoadError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut prints = Vec::new();
    for record in reader.deserialize() {
        let record: PrintRecord = record?;
        prints.push(TradePrint {
            timestamp: millis_to_utc(record.timestamp_ms)?,
            price: record.price,
            quantity: record.quantity,
            side: record.side,
        });
    }
    Ok(prints)
}

/// Load top-of-book snapshots from a headered CSV file.
pub fn load_book_snapshots(path: &Path) -> Result<Vec<BookSnapshot>, LoadError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut snapshots = Vec::new();
    for record in reader.deserialize() {
        let record: BookRecord = record?;
        snapshots.push(BookSnapshot {
            timestamp: millis_to_utc(record.timestamp_ms)?,
            bids: vec![BookLevel {
                price: record.bid_price,
                quantity: record.bid_quantity,
            }],
            asks: vec![BookLevel {
                price: record.ask_price,
                quantity: record.ask_quantity,
            }],
        });
    }
    Ok(snapshots)
}

/// Load historical funding rates from a headered CSV file.
pub fn load_funding_rates(path: &Path) -> Result<Vec<FundingRate>, LoadError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rates = Vec::new();
    for record in reader.deserialize() {
        let record: FundingRecord = record?;
        rates.push(FundingRate {
            timestamp: millis_to_utc(record.timestamp_ms)?,
            rate: record.rate,
            mark_price: record.mark_price,
        });
    }
    Ok(rates)
}

/// Seeded random-walk print stream for demos, tests, and benches.
///
/// Prices multiply by a small uniform step per print; quantities and
/// aggressor sides are uniform. Deterministic for a given seed.
pub fn synthetic_prints(
    seed: u64,
    count: usize,
    start: DateTime<Utc>,
    start_price: f64,
) -> Vec<TradePrint> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut price = start_price;
    (0..count)
        .map(|i| {
            price *= 1.0 + rng.gen_range(-0.0008..0.0008);
            TradePrint {
                timestamp: start + Duration::milliseconds(i as i64 * 200),
                price,
                quantity: rng.gen_range(0.001..0.25),
                side: if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell },
            }
        })
        .collect()
}
