//! Reporting and export — CSV, workbook, HTML, and Markdown artifacts.
//!
//! Four formats for backtest results:
//! - **CSV**: the trade tape
//! - **Workbook**: a directory with one CSV per sheet (summary, trades,
//!   by_symbol, monthly); a `.xlsx` destination loses its extension
//! - **HTML**: a self-contained report page
//! - **Markdown**: a human-readable report

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use signallab_core::domain::Trade;
use tracing::info;

use crate::metrics::Summary;
use crate::results::{BacktestResults, BreakdownRow};

/// Output format for [`BacktestResults::export`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Workbook,
    Html,
    Markdown,
}

impl ExportFormat {
    /// Extension appended when an explicit format is given a bare path.
    /// Workbooks are directories and carry none.
    pub fn default_extension(&self) -> Option<&'static str> {
        match self {
            ExportFormat::Csv => Some("csv"),
            ExportFormat::Workbook => None,
            ExportFormat::Html => Some("html"),
            ExportFormat::Markdown => Some("md"),
        }
    }

    /// Format implied by a file extension, if any.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "xlsx" | "xls" => Some(ExportFormat::Workbook),
            "html" | "htm" => Some(ExportFormat::Html),
            "md" => Some(ExportFormat::Markdown),
            _ => None,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Workbook => "workbook",
            ExportFormat::Html => "html",
            ExportFormat::Markdown => "markdown",
        };
        f.write_str(name)
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "workbook" | "excel" | "xlsx" => Ok(ExportFormat::Workbook),
            "html" => Ok(ExportFormat::Html),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            other => bail!("unknown export format '{other}' (expected csv, workbook, html, markdown)"),
        }
    }
}

/// Decide the final path and format.
///
/// Without an explicit format the extension decides; an unrecognized
/// extension falls back to CSV with the extension replaced. An explicit
/// format fills in its default extension when the path has none.
///
/// A workbook is a directory of CSV sheets, so its target never keeps an
/// extension: `report.xlsx` becomes `report/`.
pub fn resolve_target(path: &Path, format: Option<ExportFormat>) -> (PathBuf, ExportFormat) {
    let ext = path.extension().and_then(|e| e.to_str());
    let format = match format {
        Some(format) => format,
        None => match ext.and_then(ExportFormat::from_extension) {
            Some(format) => format,
            None => return (path.with_extension("csv"), ExportFormat::Csv),
        },
    };
    match format.default_extension() {
        None => (path.with_extension(""), format),
        Some(default) if ext.is_none() => (path.with_extension(default), format),
        Some(_) => (path.to_path_buf(), format),
    }
}

impl BacktestResults {
    /// Write the results to `path` and return the path actually written.
    pub fn export(&self, path: impl AsRef<Path>, format: Option<ExportFormat>) -> Result<PathBuf> {
        let requested = path.as_ref();
        let (path, format) = resolve_target(requested, format);
        if path.as_path() != requested {
            info!(
                requested = %requested.display(),
                written = %path.display(),
                %format,
                "export target adjusted"
            );
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        match format {
            ExportFormat::Csv => write_file(&path, &export_trades_csv(self.trades())?)?,
            ExportFormat::Workbook => write_workbook(self, &path)?,
            ExportFormat::Html => write_file(&path, &generate_html(self))?,
            ExportFormat::Markdown => write_file(&path, &generate_report(self))?,
        }
        info!(path = %path.display(), %format, "exported backtest results");
        Ok(path)
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

// ─── CSV export ─────────────────────────────────────────────────────

const TRADE_COLUMNS: [&str; 10] = [
    "symbol",
    "entry_date",
    "entry_price",
    "exit_date",
    "exit_price",
    "shares",
    "pnl",
    "return_pct",
    "holding_days",
    "exit_reason",
];

/// Export a trade list as CSV.
///
/// Columns: symbol, entry_date, entry_price, exit_date, exit_price, shares,
/// pnl, return_pct, holding_days, exit_reason
pub fn export_trades_csv(trades: &[Trade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(TRADE_COLUMNS)?;
    for t in trades {
        wtr.write_record(trade_cells(t))?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

fn trade_cells(t: &Trade) -> [String; 10] {
    [
        t.symbol.clone(),
        t.entry_date.to_string(),
        format!("{:.4}", t.entry_price),
        t.exit_date.to_string(),
        format!("{:.4}", t.exit_price),
        t.shares.to_string(),
        format!("{:.2}", t.pnl),
        format!("{:.6}", t.return_pct),
        t.holding_days.to_string(),
        t.exit_reason.to_string(),
    ]
}

/// Export summary statistics as a two-column `metric,value` CSV.
pub fn export_summary_csv(summary: &Summary) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["metric", "value"])?;
    for (name, value) in summary.entries() {
        wtr.write_record([name.to_string(), value.to_string()])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export breakdown rows with `key_name` as the header of the key column.
pub fn export_breakdown_csv(rows: &[BreakdownRow], key_name: &str) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([key_name, "trades", "win_rate", "avg_return", "total_pnl"])?;
    for r in rows {
        wtr.write_record([
            r.key.clone(),
            r.trades.to_string(),
            format!("{:.4}", r.win_rate),
            format!("{:.6}", r.avg_return),
            format!("{:.2}", r.total_pnl),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Workbook ───────────────────────────────────────────────────────

/// Write one CSV per sheet into the directory `dir`.
///
/// Breakdown sheets are omitted when they have no rows.
fn write_workbook(results: &BacktestResults, dir: &Path) -> Result<()> {
    if dir.is_file() {
        bail!("workbook target {} is an existing file", dir.display());
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create workbook dir: {}", dir.display()))?;

    write_file(&dir.join("summary.csv"), &export_summary_csv(results.summary())?)?;
    write_file(&dir.join("trades.csv"), &export_trades_csv(results.trades())?)?;

    let by_symbol = results.by_symbol();
    if !by_symbol.is_empty() {
        write_file(
            &dir.join("by_symbol.csv"),
            &export_breakdown_csv(&by_symbol, "symbol")?,
        )?;
    }
    let monthly = results.monthly_returns();
    if !monthly.is_empty() {
        write_file(
            &dir.join("monthly.csv"),
            &export_breakdown_csv(&monthly, "year_month")?,
        )?;
    }
    Ok(())
}

// ─── Formatting helpers ─────────────────────────────────────────────

/// Ratios shown as percentages; counts and factors as plain numbers.
fn format_metric(name: &str, value: f64) -> String {
    if name == "total_trades" {
        format!("{value:.0}")
    } else if name.contains("rate")
        || name.contains("return")
        || name.contains("drawdown")
        || name == "max_loss"
    {
        format!("{:.2}%", value * 100.0)
    } else {
        format!("{value:.2}")
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ─── HTML report ────────────────────────────────────────────────────

const HTML_STYLE: &str = "\
body { font-family: sans-serif; margin: 20px; }
h1 { color: #333; }
h2 { color: #666; border-bottom: 1px solid #ccc; }
table { border-collapse: collapse; width: 100%; margin-bottom: 20px; }
th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
th { background-color: #f5f5f5; }
tr:nth-child(even) { background-color: #fafafa; }
.positive { color: green; }
.negative { color: red; }
";

/// Generate a self-contained HTML report.
pub fn generate_html(results: &BacktestResults) -> String {
    let mut html = String::with_capacity(4096);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n");
    html.push_str("<title>Backtest Report</title>\n<style>\n");
    html.push_str(HTML_STYLE);
    html.push_str("</style>\n</head>\n<body>\n<h1>Backtest Report</h1>\n");

    html.push_str("<h2>Summary</h2>\n<table>\n<tr><th>Metric</th><th>Value</th></tr>\n");
    for (name, value) in results.summary().entries() {
        html.push_str(&format!(
            "<tr><td>{name}</td><td>{}</td></tr>\n",
            format_metric(name, value)
        ));
    }
    html.push_str("</table>\n");

    html.push_str("<h2>Trades</h2>\n<table>\n<tr>");
    for col in TRADE_COLUMNS {
        html.push_str(&format!("<th>{col}</th>"));
    }
    html.push_str("</tr>\n");
    for t in results.trades() {
        let class = if t.is_winner() { "positive" } else { "negative" };
        html.push_str(&format!("<tr class=\"{class}\">"));
        for cell in trade_cells(t) {
            html.push_str(&format!("<td>{}</td>", html_escape(&cell)));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>\n");

    push_html_breakdown(&mut html, "By Symbol", "symbol", &results.by_symbol());
    push_html_breakdown(&mut html, "Monthly Returns", "year_month", &results.monthly_returns());

    html.push_str("</body>\n</html>\n");
    html
}

fn push_html_breakdown(html: &mut String, title: &str, key_name: &str, rows: &[BreakdownRow]) {
    if rows.is_empty() {
        return;
    }
    html.push_str(&format!("<h2>{title}</h2>\n<table>\n"));
    html.push_str(&format!(
        "<tr><th>{key_name}</th><th>trades</th><th>win_rate</th><th>avg_return</th><th>total_pnl</th></tr>\n"
    ));
    for r in rows {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{:.1}%</td><td>{:.2}%</td><td>{:.2}</td></tr>\n",
            html_escape(&r.key),
            r.trades,
            r.win_rate * 100.0,
            r.avg_return * 100.0,
            r.total_pnl
        ));
    }
    html.push_str("</table>\n");
}

// ─── Markdown report ────────────────────────────────────────────────

/// Generate a Markdown report.
pub fn generate_report(results: &BacktestResults) -> String {
    let mut md = String::with_capacity(2048);

    md.push_str("# Backtest Report\n\n");

    let equity = results.equity();
    if let (Some(first), Some(last)) = (equity.points.first(), equity.points.last()) {
        md.push_str(&format!("Period: {} to {}\n\n", first.date, last.date));
    }

    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    for (name, value) in results.summary().entries() {
        md.push_str(&format!("| {name} | {} |\n", format_metric(name, value)));
    }
    md.push('\n');

    push_md_breakdown(&mut md, "By Symbol", "Symbol", &results.by_symbol());
    push_md_breakdown(&mut md, "Monthly Returns", "Month", &results.monthly_returns());
    push_md_breakdown(&mut md, "Yearly Returns", "Year", &results.yearly_returns());

    md
}

fn push_md_breakdown(md: &mut String, title: &str, key_name: &str, rows: &[BreakdownRow]) {
    if rows.is_empty() {
        return;
    }
    md.push_str(&format!("## {title}\n\n"));
    md.push_str(&format!(
        "| {key_name} | Trades | Win Rate | Avg Return | Total PnL |\n"
    ));
    md.push_str("| --- | ---: | ---: | ---: | ---: |\n");
    for r in rows {
        md.push_str(&format!(
            "| {} | {} | {:.1}% | {:.2}% | {:.2} |\n",
            r.key,
            r.trades,
            r.win_rate * 100.0,
            r.avg_return * 100.0,
            r.total_pnl
        ));
    }
    md.push('\n');
}
