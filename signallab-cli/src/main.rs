//! SignalLab CLI — backtest, optimize, and inspect commands.
//!
//! Commands:
//! - `backtest` — run the backtest described by a TOML run file
//! - `optimize` — search the run file's parameter space
//! - `inspect` — rank a saved results bundle or a streaming trial file
//! - `signals` — list the built-in signal detectors

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use signallab_core::components::builtin_registry;
use signallab_core::data::SymbolSelector;
use signallab_runner::store::rows_to_markdown;
use signallab_runner::{
    BacktestResults, ExportFormat, MetricSpec, OptimizationResults, RunConfig, Summary,
};

#[derive(Parser)]
#[command(
    name = "signallab",
    about = "SignalLab CLI — signal backtesting and parameter search"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the backtest described by a TOML run file.
    Backtest {
        /// Path to the run file.
        #[arg(long)]
        config: PathBuf,

        /// Symbols overriding the run file's list.
        #[arg(long, num_args = 1..)]
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD) overriding the run file.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD) overriding the run file.
        #[arg(long)]
        end: Option<String>,

        /// Export destination; the extension picks the format unless --format is given.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Export format: csv, workbook, html, markdown.
        #[arg(long)]
        format: Option<ExportFormat>,
    },
    /// Search the run file's parameter space.
    Optimize {
        /// Path to the run file (needs [optimize] and [search_space]).
        #[arg(long)]
        config: PathBuf,

        /// Where to save the results bundle (.json) or ranked table (.csv).
        #[arg(long, default_value = "results/optimization.json")]
        output: PathBuf,

        /// Number of ranked trials to print.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Rank a saved results bundle or an NDJSON trial stream.
    Inspect {
        /// A `.json` bundle, or a `.jsonl` / `.ndjson` stream.
        path: PathBuf,

        /// Metric to rank a stream by (bundles carry their own).
        #[arg(long, default_value = "sharpe_ratio")]
        metric: String,

        /// Number of ranked trials to print.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Print a heatmap over two parameters.
        #[arg(long, num_args = 2, value_names = ["X_PARAM", "Y_PARAM"])]
        heatmap: Option<Vec<String>>,

        /// Metric shown in the heatmap. Defaults to the ranking metric, or
        /// the heaviest component of a weighted ranking.
        #[arg(long, requires = "heatmap")]
        heatmap_metric: Option<String>,
    },
    /// List the built-in signal detectors.
    Signals,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Backtest {
            config,
            symbols,
            start,
            end,
            output,
            format,
        } => run_backtest_cmd(&config, symbols, start, end, output, format),
        Commands::Optimize {
            config,
            output,
            top,
        } => run_optimize_cmd(&config, &output, top),
        Commands::Inspect {
            path,
            metric,
            top,
            heatmap,
            heatmap_metric,
        } => run_inspect_cmd(&path, metric, top, heatmap, heatmap_metric),
        Commands::Signals => {
            for name in builtin_registry().names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("invalid date '{raw}'"))
}

fn load_config(path: &Path) -> Result<RunConfig> {
    RunConfig::from_file(path).with_context(|| format!("failed to load {}", path.display()))
}

/// Explicit symbols, else the run file's list, else the universe's tickers.
fn resolve_symbols(config: &RunConfig, overrides: Vec<String>) -> Result<Vec<String>> {
    if !overrides.is_empty() {
        return Ok(overrides);
    }
    if !config.backtest.symbols.is_empty() {
        return Ok(config.backtest.symbols.clone());
    }
    match config.universe()? {
        Some(universe) => Ok(universe.select(&config.backtest.screener)?),
        None => bail!("no symbols: set [backtest] symbols or universe, or pass --symbols"),
    }
}

fn run_backtest_cmd(
    config_path: &Path,
    symbols: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    output: Option<PathBuf>,
    format: Option<ExportFormat>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(start) = start.as_deref() {
        config.backtest.start = parse_date(start)?;
    }
    if let Some(end) = end.as_deref() {
        config.backtest.end = parse_date(end)?;
    }

    let symbols = resolve_symbols(&config, symbols)?;
    let backtester = config.backtester(config.provider())?;
    let results = backtester.run(
        &symbols,
        config.backtest.start,
        config.backtest.end,
        config.backtest.max_workers,
    )?;

    print_summary(results.summary());
    print_breakdowns(&results, &config)?;

    if let Some(path) = output {
        let written = results.export(&path, format)?;
        println!("Results exported to: {}", written.display());
    }
    Ok(())
}

fn run_optimize_cmd(config_path: &Path, output: &Path, top: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let symbols = resolve_symbols(&config, Vec::new())?;
    let optimizer = config.optimizer(config.provider())?;
    let request = config.optimize_request(symbols)?;

    let results = optimizer.run(&request)?;
    info!(trials = results.len(), metric = %results.metric(), "search finished");

    print_ranking(&results, top)?;
    let saved = results.save(output)?;
    println!("Results saved to: {}", saved.display());
    Ok(())
}

fn run_inspect_cmd(
    path: &Path,
    metric: String,
    top: usize,
    heatmap: Option<Vec<String>>,
    heatmap_metric: Option<String>,
) -> Result<()> {
    let is_stream = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e, "jsonl" | "ndjson"));
    let results = if is_stream {
        OptimizationResults::load_streaming(path, MetricSpec::Single(metric))?
    } else {
        OptimizationResults::load(path)?
    };
    println!("{} trials, ranked by {}", results.len(), results.metric());

    print_ranking(&results, top)?;

    if let Some(axes) = heatmap {
        let [x, y] = axes.as_slice() else {
            bail!("--heatmap takes exactly two parameter names");
        };
        let metric = heatmap_metric.unwrap_or_else(|| default_heatmap_metric(results.metric()));
        println!();
        println!("{}", results.heatmap(x, y, &metric)?);
    }
    Ok(())
}

/// The ranking metric itself, or the largest-weight component of a
/// weighted ranking.
fn default_heatmap_metric(spec: &MetricSpec) -> String {
    match spec {
        MetricSpec::Single(name) => name.clone(),
        MetricSpec::Weighted(weights) => weights
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| "sharpe_ratio".to_string()),
    }
}

fn print_ranking(results: &OptimizationResults, top: usize) -> Result<()> {
    if results.is_empty() {
        println!("No successful trials.");
        return Ok(());
    }
    println!();
    println!("{}", rows_to_markdown(&results.top(top)));
    if let Some(best) = results.best() {
        println!(
            "Best parameters: {}",
            serde_json::to_string(&best.params).context("failed to render parameters")?
        );
    }
    Ok(())
}

fn print_summary(summary: &Summary) {
    println!();
    println!("=== Backtest Summary ===");
    println!("Trades:         {}", summary.total_trades);
    println!("Total Return:   {:.2}%", summary.total_return * 100.0);
    println!("Win Rate:       {:.1}%", summary.win_rate * 100.0);
    println!("Avg Return:     {:.2}%", summary.avg_return * 100.0);
    println!("Best Trade:     {:.2}%", summary.max_return * 100.0);
    println!("Worst Trade:    {:.2}%", summary.max_loss * 100.0);
    println!("Profit Factor:  {:.2}", summary.profit_factor);
    println!("Max Drawdown:   {:.2}%", summary.max_drawdown * 100.0);
    println!("Sharpe:         {:.3}", summary.sharpe_ratio);
    println!("Avg Holding:    {:.1} days", summary.avg_holding_days);
    println!();
}

fn print_breakdowns(results: &BacktestResults, config: &RunConfig) -> Result<()> {
    let by_symbol = results.by_symbol();
    if !by_symbol.is_empty() {
        println!("{:<10} {:>7} {:>9} {:>14}", "Symbol", "Trades", "Win Rate", "P&L");
        println!("{}", "-".repeat(43));
        for row in &by_symbol {
            println!(
                "{:<10} {:>7} {:>8.1}% {:>14.2}",
                row.key,
                row.trades,
                row.win_rate * 100.0,
                row.total_pnl
            );
        }
        println!();
    }

    if let Some(universe) = config.universe()? {
        let by_sector = results.by_sector(&universe.sector_map());
        if !by_sector.is_empty() {
            println!("{:<16} {:>7} {:>14}", "Sector", "Trades", "P&L");
            println!("{}", "-".repeat(39));
            for row in &by_sector {
                println!("{:<16} {:>7} {:>14.2}", row.key, row.trades, row.total_pnl);
            }
            println!();
        }
    }
    Ok(())
}
