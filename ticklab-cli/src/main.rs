//! TickLab CLI — replay and bar-aggregation commands.
//!
//! Commands:
//! - `run` — replay a tick or book stream through a strategy and report
//! - `bars` — aggregate a tick stream into bars and dump them as JSON lines

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use ticklab_core::{BarBuilder, BarPolicy, ExchangeConfig, FundingTape, SimExchange};
use ticklab_runner::{
    load_book_snapshots, load_funding_rates, load_trade_prints, save_artifacts, synthetic_prints,
    BarConfig, BookReplay, DataConfig, ReplaySummary, RunConfig, StrategyConfig, TickReplay,
    VolumeImbalanceParams,
};

#[derive(Parser)]
#[command(
    name = "ticklab",
    about = "TickLab CLI — intraday crypto replay engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a tick or book stream through a strategy and report.
    Run {
        /// Path to a TOML run config.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Tick CSV (timestamp_ms,price,quantity,side). Overrides the config.
        #[arg(long)]
        ticks: Option<PathBuf>,

        /// Top-of-book CSV. Overrides the config.
        #[arg(long)]
        book: Option<PathBuf>,

        /// Funding rate CSV. Overrides the config.
        #[arg(long)]
        funding: Option<PathBuf>,

        /// Bar policy override: volume, tick, time, dollar.
        #[arg(long)]
        policy: Option<String>,

        /// Bar size override, in the policy's unit.
        #[arg(long)]
        size: Option<f64>,

        /// Initial capital override.
        #[arg(long)]
        capital: Option<f64>,

        /// Leverage override (1 = spot).
        #[arg(long)]
        leverage: Option<f64>,

        /// Strategy override: volume_imbalance, obi, hold (default params).
        #[arg(long)]
        strategy: Option<String>,

        /// Replay a seeded synthetic print stream instead of a file.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Number of synthetic prints.
        #[arg(long, default_value_t = 50_000)]
        synthetic_count: usize,

        /// Seed for the synthetic stream.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Output directory for report.json, trades.csv, equity.csv.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Aggregate a tick stream into bars and print them as JSON lines.
    Bars {
        /// Tick CSV (timestamp_ms,price,quantity,side).
        #[arg(long)]
        ticks: Option<PathBuf>,

        /// Aggregate a seeded synthetic print stream instead of a file.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Number of synthetic prints.
        #[arg(long, default_value_t = 50_000)]
        synthetic_count: usize,

        /// Seed for the synthetic stream.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Bar policy: volume, tick, time, dollar.
        #[arg(long, default_value = "volume")]
        policy: String,

        /// Bar size in the policy's unit (base volume, prints, seconds, quote volume).
        #[arg(long, default_value_t = 5.0)]
        size: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            ticks,
            book,
            funding,
            policy,
            size,
            capital,
            leverage,
            strategy,
            synthetic,
            synthetic_count,
            seed,
            output_dir,
        } => {
            let overrides = Overrides {
                policy,
                size,
                capital,
                leverage,
                strategy,
            };
            run_replay_cmd(
                config,
                ticks,
                book,
                funding,
                overrides,
                synthetic,
                synthetic_count,
                seed,
                output_dir,
            )
        }
        Commands::Bars {
            ticks,
            synthetic,
            synthetic_count,
            seed,
            policy,
            size,
        } => run_bars_cmd(ticks, synthetic, synthetic_count, seed, &policy, size),
    }
}

/// Flag-level overrides applied on top of the loaded (or default) config.
struct Overrides {
    policy: Option<String>,
    size: Option<f64>,
    capital: Option<f64>,
    leverage: Option<f64>,
    strategy: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut RunConfig) -> Result<()> {
        if let Some(policy) = &self.policy {
            config.bars.policy = parse_policy(policy)?;
        }
        if let Some(size) = self.size {
            config.bars.size = size;
        }
        if let Some(capital) = self.capital {
            config.exchange.initial_capital = capital;
        }
        if let Some(leverage) = self.leverage {
            config.exchange.leverage = leverage;
        }
        if let Some(name) = &self.strategy {
            config.strategy = match name.as_str() {
                "volume_imbalance" => {
                    StrategyConfig::VolumeImbalance(VolumeImbalanceParams::default())
                }
                "obi" => StrategyConfig::Obi(Default::default()),
                "hold" => StrategyConfig::Hold { quantity: 0.01 },
                other => bail!(
                    "unknown strategy '{other}'. Valid: volume_imbalance, obi, hold"
                ),
            };
        }
        config.validate()?;
        Ok(())
    }
}

fn parse_policy(name: &str) -> Result<BarPolicy> {
    Ok(match name {
        "volume" => BarPolicy::Volume,
        "tick" => BarPolicy::Tick,
        "time" => BarPolicy::Time,
        "dollar" => BarPolicy::Dollar,
        other => bail!("unknown bar policy '{other}'. Valid: volume, tick, time, dollar"),
    })
}

/// Demo config used when `run` is given without `--config`.
fn default_run_config() -> RunConfig {
    RunConfig {
        exchange: ExchangeConfig::leveraged(100_000.0, 5.0),
        bars: BarConfig {
            policy: BarPolicy::Volume,
            size: 5.0,
        },
        replay: Default::default(),
        strategy: StrategyConfig::VolumeImbalance(VolumeImbalanceParams::default()),
        data: DataConfig::default(),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_replay_cmd(
    config_path: Option<PathBuf>,
    ticks: Option<PathBuf>,
    book: Option<PathBuf>,
    funding: Option<PathBuf>,
    overrides: Overrides,
    synthetic: bool,
    synthetic_count: usize,
    seed: u64,
    output_dir: PathBuf,
) -> Result<()> {
    if ticks.is_some() && book.is_some() {
        bail!("--ticks and --book are mutually exclusive");
    }
    if synthetic && book.is_some() {
        bail!("--synthetic replays a print stream; it cannot be combined with --book");
    }

    let mut config = match &config_path {
        Some(path) => RunConfig::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            if !synthetic && ticks.is_none() && book.is_none() {
                bail!("one of --config, --ticks, --book, or --synthetic is required");
            }
            default_run_config()
        }
    };
    overrides.apply(&mut config)?;

    // CLI paths override whatever the config names.
    let tick_path = ticks.or_else(|| config.data.ticks.clone());
    let book_path = book.or_else(|| config.data.book.clone());
    let funding_path = funding.or_else(|| config.data.funding.clone());

    let tape = funding_path
        .map(|path| {
            load_funding_rates(&path)
                .map(FundingTape::new)
                .with_context(|| format!("loading funding {}", path.display()))
        })
        .transpose()?;

    let exchange = SimExchange::new(config.exchange.clone());
    let strategy = config.strategy.build();

    let summary = if synthetic {
        let prints = synthetic_prints(seed, synthetic_count, Utc::now(), 50_000.0);
        println!("Replaying {} synthetic prints (seed {seed})...", prints.len());
        TickReplay::new(exchange, config.bars.build()?, strategy, config.replay, tape)
            .run(&prints)
    } else if let Some(path) = tick_path {
        let prints = load_trade_prints(&path)
            .with_context(|| format!("loading ticks {}", path.display()))?;
        println!("Replaying {} prints from {}...", prints.len(), path.display());
        TickReplay::new(exchange, config.bars.build()?, strategy, config.replay, tape)
            .run(&prints)
    } else if let Some(path) = book_path {
        let snapshots = load_book_snapshots(&path)
            .with_context(|| format!("loading book {}", path.display()))?;
        println!(
            "Replaying {} book snapshots from {}...",
            snapshots.len(),
            path.display()
        );
        BookReplay::new(exchange, strategy, config.replay, tape).run(&snapshots)
    } else {
        bail!("config names no input files; pass --ticks, --book, or --synthetic");
    };

    print_summary(&summary);

    save_artifacts(&summary, &output_dir)?;
    println!("Artifacts saved to: {}", output_dir.display());

    Ok(())
}

fn run_bars_cmd(
    ticks: Option<PathBuf>,
    synthetic: bool,
    synthetic_count: usize,
    seed: u64,
    policy: &str,
    size: f64,
) -> Result<()> {
    let policy = parse_policy(policy)?;

    let prints = match (&ticks, synthetic) {
        (Some(_), true) => bail!("--ticks and --synthetic are mutually exclusive"),
        (Some(path), false) => load_trade_prints(path)
            .with_context(|| format!("loading ticks {}", path.display()))?,
        (None, true) => synthetic_prints(seed, synthetic_count, Utc::now(), 50_000.0),
        (None, false) => bail!("one of --ticks or --synthetic is required"),
    };

    let mut builder = BarBuilder::new(policy, size)?;
    let bars = builder.build_all(&prints);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for bar in &bars {
        writeln!(out, "{}", serde_json::to_string(bar)?)?;
    }
    if let Some(partial) = builder.current() {
        eprintln!(
            "{} bars emitted; trailing partial with volume {:.4} discarded",
            bars.len(),
            partial.volume
        );
    } else {
        eprintln!("{} bars emitted", bars.len());
    }

    Ok(())
}

fn print_summary(summary: &ReplaySummary) {
    let report = &summary.report;
    println!();
    println!("=== Replay Result ===");
    println!("Strategy:       {}", summary.strategy_name);
    match (summary.start_time, summary.end_time) {
        (Some(start), Some(end)) => println!("Window:         {start} to {end}"),
        _ => println!("Window:         (empty stream)"),
    }
    println!("Events:         {}", summary.event_count);
    println!("Bars:           {}", summary.bar_count);
    println!("Orders:         {}", summary.order_count);
    println!("Fills:          {}", summary.trade_count);
    println!();
    println!("--- Performance ---");
    println!("Initial:        {:.2}", report.initial_capital);
    println!("Final:          {:.2}", report.final_capital);
    println!("Total Return:   {:.2}%", report.total_return_pct);
    println!("Trades:         {}", report.total_trades);
    println!(
        "Win Rate:       {:.1}% ({}/{})",
        report.win_rate_pct,
        report.winning_trades,
        report.winning_trades + report.losing_trades
    );
    println!("Profit Factor:  {:.2}", report.profit_factor);
    println!("Avg Win:        {:.2}", report.avg_win);
    println!("Avg Loss:       {:.2}", report.avg_loss);
    println!("Max Drawdown:   {:.2}%", report.max_drawdown_pct);
    println!("Sharpe:         {:.3}", report.sharpe_ratio);
    println!("Fees Paid:      {:.2}", report.total_fees);
    println!("Funding:        {:.2}", report.funding_total);
    println!();
}
