//! arbsim-replay
//!
//! Replays a simulator run against the recorded quote files and prints the
//! chart data as JSON.
//!
//! Usage:
//!   arbsim-replay --quotes-a data/futureA.csv --quotes-b data/futureB.csv --trades run.log
//!   arbsim-replay --config replay.toml --output chart.json
//!   simulator | arbsim-replay --quotes-a a.csv --quotes-b b.csv --trades -

use anyhow::{Context, Result};
use arbsim_replay::config::ReplayConfig;
use arbsim_replay::replay::clock::{display_nanos, NANOS_PER_SEC};
use arbsim_replay::replay::{Instrument, ReplayEngine, ReplaySummary, RunSummary, Snapshot, Trade, TradeLogDecoder};
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Replay simulator trades against recorded quotes
#[derive(Parser, Debug)]
#[command(name = "arbsim-replay")]
#[command(about = "Rebuild the PnL chart of a two-future arbitrage simulation run")]
struct Cli {
    /// Quote recording for instrument A
    #[arg(long)]
    quotes_a: Option<PathBuf>,

    /// Quote recording for instrument B
    #[arg(long)]
    quotes_b: Option<PathBuf>,

    /// Captured simulator stdout ("-" reads stdin)
    #[arg(long)]
    trades: Option<PathBuf>,

    /// Replay config file
    #[arg(short, long, env = "ARBSIM_REPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the sampling interval (seconds)
    #[arg(long)]
    sample_interval_secs: Option<f64>,

    /// Override the valuation anchor (A or B)
    #[arg(long)]
    anchor: Option<Instrument>,

    /// Output file path (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct ChartOutput<'a> {
    summary: &'a RunSummary,
    run: &'a ReplaySummary,
    trades: &'a [Trade],
    chart: &'a [Snapshot],
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arbsim_replay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ReplayConfig::load(path)?,
        None => ReplayConfig::from_env(),
    };
    apply_overrides(&cli, &mut config)?;

    let quotes_a = cli
        .quotes_a
        .clone()
        .or_else(|| config.data.quotes_a.clone())
        .context("no quote file for instrument A (--quotes-a or [data] quotes_a)")?;
    let quotes_b = cli
        .quotes_b
        .clone()
        .or_else(|| config.data.quotes_b.clone())
        .context("no quote file for instrument B (--quotes-b or [data] quotes_b)")?;

    let decoder = TradeLogDecoder::new(config.anchor);
    let trade_log = match cli.trades.clone().or_else(|| config.data.trade_log.clone()) {
        Some(path) if path.as_os_str() == "-" => decoder
            .decode_reader(std::io::stdin().lock())
            .context("reading trade log from stdin")?,
        Some(path) => decoder
            .decode_file(&path)
            .with_context(|| format!("reading trade log {}", path.display()))?,
        None => {
            info!("No trade log given, replaying quotes only");
            Default::default()
        }
    };

    let engine = ReplayEngine::new(config)?;
    let report = engine
        .replay_files(&quotes_a, &quotes_b, trade_log.trades.clone())
        .context("replay failed")?;

    let run = &report.summary;
    info!(
        snapshots = report.snapshots.len(),
        first = %run.first_event_time.map(display_nanos).unwrap_or_default(),
        last = %run.last_event_time.map(display_nanos).unwrap_or_default(),
        orphaned = run.trades_orphaned,
        "Chart ready"
    );

    let output = ChartOutput {
        summary: &trade_log.summary,
        run,
        trades: &trade_log.trades,
        chart: &report.snapshots,
    };
    let json = serde_json::to_string_pretty(&output)?;

    match &cli.output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!("Chart written to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }

    Ok(())
}

fn apply_overrides(cli: &Cli, config: &mut ReplayConfig) -> Result<()> {
    if let Some(secs) = cli.sample_interval_secs {
        anyhow::ensure!(
            secs.is_finite() && secs > 0.0,
            "--sample-interval-secs must be positive, got {}",
            secs
        );
        config.sample_interval_ns = (secs * NANOS_PER_SEC as f64).round() as i64;
    }
    if let Some(anchor) = cli.anchor {
        config.anchor = anchor;
    }
    Ok(())
}
