//! Artifact export: persist a replay summary to disk.
//!
//! Layout under the output directory:
//! - `report.json` — the full [`ReplaySummary`] (report, counts, window)
//! - `trades.csv`  — the trade ledger
//! - `equity.csv`  — the per-fill equity curve

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::replay::ReplaySummary;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Paths of everything written by [`save_artifacts`].
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub report: PathBuf,
    pub trades: PathBuf,
    pub equity: PathBuf,
}

/// Write the summary's artifacts into `dir`, creating it if needed.
pub fn save_artifacts(summary: &ReplaySummary, dir: &Path) -> Result<ArtifactPaths, ArtifactError> {
    fs::create_dir_all(dir)?;

    let report = dir.join("report.json");
    fs::write(&report, serde_json::to_string_pretty(summary)?)?;

    let trades = dir.join("trades.csv");
    let mut writer = csv::Writer::from_path(&trades)?;
    for trade in &summary.trades {
        writer.serialize(trade)?;
    }
    writer.flush()?;

    let equity = dir.join("equity.csv");
    let mut writer = csv::Writer::from_path(&equity)?;
    for point in &summary.equity_curve {
        writer.serialize(point)?;
    }
    writer.flush()?;

    Ok(ArtifactPaths {
        report,
        trades,
        equity,
    })
}
