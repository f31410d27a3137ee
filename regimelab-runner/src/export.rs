//! Artifact export — CSV series and JSON documents for a finished run.
//!
//! Per run, under the output directory:
//! - `signals_{asset}_{strategy}.csv`: Date, Signal, DayReturn, TradeCost, PnL, Equity, Regime
//! - `equity_curve_{asset}_{strategy}.csv`: Date, Equity
//! - `trades_{asset}_{strategy}.csv`: one row per position change
//! - `backtest_log_{asset}_{strategy}.json`: run header plus every log event
//! - `metrics_{asset}_{strategy}.json`: performance summary

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use regimelab_core::engine::{ExecutionLog, SignalRow};
use regimelab_core::portfolio::{EquityPoint, TradeRecord};

use crate::compare::Comparison;
use crate::runner::RunReport;

/// `{kind}_{asset}_{tag}.{ext}`
pub fn artifact_name(kind: &str, asset: &str, tag: &str, ext: &str) -> String {
    format!("{kind}_{asset}_{tag}.{ext}")
}

// ─── CSV export ─────────────────────────────────────────────────────

pub fn export_signals_csv(rows: &[SignalRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "Date",
        "Signal",
        "DayReturn",
        "TradeCost",
        "PnL",
        "Equity",
        "Regime",
    ])?;
    for r in rows {
        wtr.write_record([
            &r.date.to_string(),
            &r.signal.value().to_string(),
            &r.day_return.to_string(),
            &r.trade_cost.to_string(),
            &r.pnl.to_string(),
            &r.equity.to_string(),
            &r.regime,
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_equity_csv(points: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["Date", "Equity"])?;
    for p in points {
        wtr.write_record([p.date.to_string(), p.equity.to_string()])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "Date",
        "prev_signal",
        "new_signal",
        "trade_cost",
        "equity_before",
        "equity_after",
    ])?;
    for t in trades {
        wtr.write_record([
            t.date.to_string(),
            t.prev_position.value().to_string(),
            t.new_position.value().to_string(),
            t.cost.to_string(),
            t.equity_before.to_string(),
            t.equity_after.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_log_json(log: &ExecutionLog) -> Result<String> {
    serde_json::to_string_pretty(log).context("failed to serialize execution log")
}

pub fn import_log_json(json: &str) -> Result<ExecutionLog> {
    serde_json::from_str(json).context("failed to deserialize execution log")
}

fn to_pretty_json<T: Serialize>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string_pretty(value).with_context(|| format!("failed to serialize {what}"))
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Paths of the files written for one run.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub signals: PathBuf,
    pub equity_curve: PathBuf,
    pub trades: PathBuf,
    pub log: PathBuf,
    pub metrics: PathBuf,
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

/// Write the full artifact set for `report` into `dir`.
pub fn save_artifacts(report: &RunReport, dir: &Path) -> Result<ArtifactPaths> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let outcome = &report.outcome;
    let asset = &outcome.fingerprint.asset;
    let tag = outcome.fingerprint.strategy.as_str();
    let path = |kind: &str, ext: &str| dir.join(artifact_name(kind, asset, tag, ext));

    let paths = ArtifactPaths {
        signals: path("signals", "csv"),
        equity_curve: path("equity_curve", "csv"),
        trades: path("trades", "csv"),
        log: path("backtest_log", "json"),
        metrics: path("metrics", "json"),
    };

    write_file(&paths.signals, &export_signals_csv(&outcome.signals)?)?;
    write_file(&paths.equity_curve, &export_equity_csv(&outcome.equity)?)?;
    write_file(&paths.trades, &export_trades_csv(&outcome.trades)?)?;
    write_file(&paths.log, &export_log_json(&outcome.log)?)?;
    write_file(&paths.metrics, &to_pretty_json(&report.summary(), "metrics")?)?;

    info!(dir = %dir.display(), asset = %asset, strategy = tag, "saved run artifacts");
    Ok(paths)
}

/// Write every strategy's artifacts, the baseline signals, and
/// `comparison_{asset}.json`. Returns the comparison document's path.
pub fn save_comparison(comparison: &Comparison, dir: &Path) -> Result<PathBuf> {
    for report in &comparison.runs {
        save_artifacts(report, dir)?;
    }
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let asset = &comparison.asset;
    let baseline = dir.join(artifact_name("signals", asset, "buy_and_hold", "csv"));
    write_file(&baseline, &export_signals_csv(&comparison.baseline.signals)?)?;

    let path = dir.join(format!("comparison_{asset}.json"));
    write_file(&path, &to_pretty_json(&comparison.summary(), "comparison")?)?;
    info!(path = %path.display(), "saved strategy comparison");
    Ok(path)
}
