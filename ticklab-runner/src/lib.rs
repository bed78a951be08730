//! TickLab Runner — replay orchestration on top of `ticklab-core`.
//!
//! This crate provides:
//! - The `Strategy` trait and bundled reference strategies
//! - Tick-driven and book-driven replay orchestrators
//! - The pure performance report and per-fill equity curve
//! - CSV data sources, a synthetic print generator, artifact export
//! - TOML-loadable run configuration

pub mod artifacts;
pub mod config;
pub mod data;
pub mod equity;
pub mod replay;
pub mod report;
pub mod strategy;

pub use artifacts::{save_artifacts, ArtifactError, ArtifactPaths};
pub use config::{BarConfig, DataConfig, RunConfig, RunConfigError, StrategyConfig};
pub use data::{
    load_book_snapshots, load_funding_rates, load_trade_prints, synthetic_prints, LoadError,
};
pub use equity::{EquityCurve, EquityPoint};
pub use replay::{BookReplay, ReplaySettings, ReplaySummary, TickReplay};
pub use report::PerformanceReport;
pub use strategy::{
    HoldStrategy, ObiParams, ObiStrategy, Strategy, VolumeImbalanceParams,
    VolumeImbalanceStrategy,
};
