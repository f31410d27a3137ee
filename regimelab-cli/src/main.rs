//! RegimeLab CLI — walk-forward backtests of ML signals under regime change.
//!
//! Commands:
//! - `run`: one backtest from a TOML config, with optional overrides
//! - `compare`: static, regime-specific, and hybrid side by side plus buy-and-hold
//! - `init-config`: print (or write) the default TOML configuration

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use regimelab_core::engine::default_regime_columns;
use regimelab_runner::compare::compare_strategies;
use regimelab_runner::metrics::PerformanceMetrics;
use regimelab_runner::runner::{prepare, run_from_config, RunReport};
use regimelab_runner::{save_artifacts, save_comparison, Comparison, RunnerConfig};

#[derive(Parser)]
#[command(
    name = "regimelab",
    about = "RegimeLab CLI — walk-forward backtesting with regime-aware retraining"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Settings that override the config file.
#[derive(clap::Args, Debug, Clone)]
struct Overrides {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Feature CSV (overrides `[data] path`).
    #[arg(long)]
    data: Option<PathBuf>,

    /// Asset prefix of the feature columns (overrides `[run] asset`).
    #[arg(long)]
    asset: Option<String>,

    /// Model kind: rf, random_forest, xgb, gbm, gradient_boosting.
    #[arg(long)]
    model: Option<String>,

    /// Master seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Output directory for artifacts (overrides `[output] dir`).
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single walk-forward backtest and save its artifacts.
    Run {
        #[command(flatten)]
        overrides: Overrides,

        /// Strategy: static, regime_specific, hybrid.
        #[arg(long)]
        strategy: Option<String>,

        /// Skip the streaming JSONL journal.
        #[arg(long, default_value_t = false)]
        no_journal: bool,
    },
    /// Run every adaptation strategy plus a buy-and-hold baseline.
    Compare {
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Print the default configuration as TOML.
    InitConfig {
        /// Asset to fill in (also sets the default regime columns).
        #[arg(long, default_value = "SPY")]
        asset: String,

        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            overrides,
            strategy,
            no_journal,
        } => run_cmd(&overrides, strategy, no_journal),
        Commands::Compare { overrides } => compare_cmd(&overrides),
        Commands::InitConfig { asset, output } => init_config_cmd(&asset, output),
    }
}

fn resolve_config(overrides: &Overrides) -> Result<RunnerConfig> {
    let mut cfg = match &overrides.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };
    if let Some(asset) = &overrides.asset {
        cfg.run.asset = asset.clone();
    }
    if let Some(data) = &overrides.data {
        cfg.data.path = data.clone();
    }
    if let Some(model) = &overrides.model {
        cfg.model.kind = model.clone();
    }
    if let Some(seed) = overrides.seed {
        cfg.run.seed = seed;
    }
    if let Some(dir) = &overrides.output_dir {
        cfg.output.dir = dir.clone();
    }
    Ok(cfg)
}

fn run_cmd(overrides: &Overrides, strategy: Option<String>, no_journal: bool) -> Result<()> {
    let mut cfg = resolve_config(overrides)?;
    if let Some(strategy) = strategy {
        cfg.run.strategy = strategy;
    }
    if no_journal {
        cfg.output.journal = false;
    }

    let report = run_from_config(&cfg)?;
    print_run_summary(&report);

    let paths = save_artifacts(&report, &cfg.output.dir)?;
    info!(
        dir = %cfg.output.dir.display(),
        signals = %paths.signals.display(),
        equity_curve = %paths.equity_curve.display(),
        trades = %paths.trades.display(),
        log = %paths.log.display(),
        metrics = %paths.metrics.display(),
        "artifacts saved"
    );
    Ok(())
}

fn compare_cmd(overrides: &Overrides) -> Result<()> {
    let cfg = resolve_config(overrides)?;
    let (engine_config, loaded) = prepare(&cfg)?;
    for warning in &loaded.warnings {
        warn!("{warning}");
    }

    let comparison = compare_strategies(&engine_config, &loaded.table, &loaded.dataset_hash)?;
    print_comparison(&comparison);

    let path = save_comparison(&comparison, &cfg.output.dir)?;
    info!(path = %path.display(), "comparison saved");
    Ok(())
}

fn init_config_cmd(asset: &str, output: Option<PathBuf>) -> Result<()> {
    let mut cfg = RunnerConfig::default();
    cfg.run.asset = asset.to_string();
    cfg.data.path = PathBuf::from(format!("data/processed/features_final_{asset}.csv"));
    cfg.data.regime_columns = Some(default_regime_columns(asset));
    let text = cfg.to_toml_string()?;

    match output {
        Some(path) => {
            fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "config written");
        }
        None => print!("{text}"),
    }
    Ok(())
}

// ─── Output ─────────────────────────────────────────────────────────

fn print_run_summary(report: &RunReport) {
    let fp = &report.outcome.fingerprint;
    let c = &report.outcome.counters;
    println!();
    println!("=== {} | {} | {} ===", fp.asset, fp.strategy, fp.model.as_str());
    println!("Run ID:        {}", fp.run_id);
    println!("Dataset:       {}", fp.dataset_hash);
    println!(
        "Steps:         {} simulated, {} skipped",
        c.steps, c.skips
    );
    println!(
        "Retrains:      {} ({} failed), {} regime changes, {} regimes",
        c.retrains, c.failed_retrains, c.regime_changes, c.distinct_regimes
    );
    println!("Trades:        {}", report.outcome.stats.total_trades);
    print_metrics(&report.metrics);

    if !report.regime_metrics.is_empty() {
        println!();
        println!("{:<12} {:>6} {:>10} {:>8} {:>8}", "Regime", "Days", "AvgRet", "Sharpe", "MaxDD");
        for m in &report.regime_metrics {
            println!(
                "{:<12} {:>6} {:>9.4}% {:>8.2} {:>7.2}%",
                m.regime,
                m.days,
                m.avg_return * 100.0,
                m.sharpe_ratio,
                m.max_drawdown * 100.0
            );
        }
    }
    println!();
}

fn print_metrics(m: &PerformanceMetrics) {
    println!("Cum. return:   {:.2}%", m.cumulative_return * 100.0);
    println!("Ann. return:   {:.2}%", m.annualized_return * 100.0);
    println!("Ann. vol:      {:.2}%", m.annualized_volatility * 100.0);
    println!("Sharpe:        {:.3}", m.sharpe_ratio);
    println!("Sortino:       {:.3}", m.sortino_ratio);
    println!("Max drawdown:  {:.2}%", m.max_drawdown * 100.0);
    println!("Calmar:        {:.3}", m.calmar_ratio);
    println!("Hit ratio:     {:.2}%", m.hit_ratio * 100.0);
    println!("CVaR 5%:       {:.4}%", m.cvar_5 * 100.0);
}

fn print_comparison(comparison: &Comparison) {
    println!();
    println!(
        "{:<16} {:>10} {:>8} {:>8} {:>9} {:>7} {:>9}",
        "Strategy", "CumRet", "Sharpe", "Sortino", "MaxDD", "Trades", "Retrains"
    );
    for report in &comparison.runs {
        let m = &report.metrics;
        println!(
            "{:<16} {:>9.2}% {:>8.3} {:>8.3} {:>8.2}% {:>7} {:>9}",
            report.strategy().as_str(),
            m.cumulative_return * 100.0,
            m.sharpe_ratio,
            m.sortino_ratio,
            m.max_drawdown * 100.0,
            report.outcome.stats.total_trades,
            report.outcome.counters.retrains,
        );
    }
    let b = &comparison.baseline.metrics;
    println!(
        "{:<16} {:>9.2}% {:>8.3} {:>8.3} {:>8.2}% {:>7} {:>9}",
        "buy_and_hold",
        b.cumulative_return * 100.0,
        b.sharpe_ratio,
        b.sortino_ratio,
        b.max_drawdown * 100.0,
        comparison.baseline.stats.total_trades,
        "-",
    );

    println!();
    for d in &comparison.disagreements {
        println!(
            "{} vs {}: {} of {} days differ",
            d.a, d.b, d.differing_days, d.common_days
        );
    }
    println!();
}
