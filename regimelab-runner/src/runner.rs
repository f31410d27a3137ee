//! Backtest runner — wires configuration, data, engine, and metrics together.
//!
//! Entry points:
//! - `run_backtest()`: config + pre-loaded table, no I/O. Used by tests and comparison.
//! - `run_backtest_with()`: same, with a dataset hash and a streaming log sink.
//! - `run_from_config()`: loads the CSV named in a `RunnerConfig`, optionally
//!   journals the log, and runs. Used by the CLI.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use regimelab_core::domain::{DatasetHash, FeatureTable, RunId};
use regimelab_core::engine::{
    BacktestOutcome, EngineError, ExecutionSink, NullSink, RunCounters, WalkForwardConfig,
    WalkForwardEngine,
};
use regimelab_core::model::ModelKind;
use regimelab_core::portfolio::PortfolioStats;
use regimelab_core::strategy::StrategyKind;

use crate::config::{ConfigError, RunnerConfig};
use crate::data_loader::{load_feature_table, LoadError, LoadedData};
use crate::export::artifact_name;
use crate::journal::JournalSink;
use crate::metrics::{
    regime_performance, transition_metrics, PerformanceMetrics, RegimeMetrics, TransitionMetrics,
};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("failed to open journal {path}: {source}")]
    Journal {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A finished run plus everything derived from its signal series.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: BacktestOutcome,
    pub metrics: PerformanceMetrics,
    pub regime_metrics: Vec<RegimeMetrics>,
    pub transitions: Vec<TransitionMetrics>,
}

/// Serializable digest written to `metrics_*.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub run_id: RunId,
    pub dataset_hash: DatasetHash,
    pub asset: String,
    pub strategy: StrategyKind,
    pub model: ModelKind,
    pub metrics: PerformanceMetrics,
    pub regime_performance: Vec<RegimeMetrics>,
    pub transition_metrics: Vec<TransitionMetrics>,
    pub portfolio: PortfolioStats,
    pub counters: RunCounters,
}

impl RunReport {
    pub fn from_outcome(outcome: BacktestOutcome) -> Self {
        let metrics = PerformanceMetrics::compute(&outcome.signals, outcome.stats.initial_equity);
        let regime_metrics = regime_performance(&outcome.signals);
        let transitions = transition_metrics(&outcome.signals);
        Self {
            outcome,
            metrics,
            regime_metrics,
            transitions,
        }
    }

    pub fn strategy(&self) -> StrategyKind {
        self.outcome.fingerprint.strategy
    }

    pub fn summary(&self) -> MetricsReport {
        let fp = &self.outcome.fingerprint;
        MetricsReport {
            run_id: fp.run_id.clone(),
            dataset_hash: fp.dataset_hash.clone(),
            asset: fp.asset.clone(),
            strategy: fp.strategy,
            model: fp.model,
            metrics: self.metrics.clone(),
            regime_performance: self.regime_metrics.clone(),
            transition_metrics: self.transitions.clone(),
            portfolio: self.outcome.stats,
            counters: self.outcome.counters,
        }
    }
}

/// Run one backtest on an in-memory table.
pub fn run_backtest(config: &WalkForwardConfig, table: &FeatureTable) -> Result<RunReport, RunError> {
    run_backtest_with(config, table, DatasetHash::unhashed(), &mut NullSink)
}

/// Run one backtest, tagging it with `dataset_hash` and streaming its log to `sink`.
pub fn run_backtest_with(
    config: &WalkForwardConfig,
    table: &FeatureTable,
    dataset_hash: DatasetHash,
    sink: &mut dyn ExecutionSink,
) -> Result<RunReport, RunError> {
    let engine = WalkForwardEngine::new(config.clone())
        .map_err(ConfigError::from)?
        .with_dataset_hash(dataset_hash);
    let outcome = engine.run_with_sink(table, sink)?;
    let report = RunReport::from_outcome(outcome);
    info!(
        asset = %config.asset,
        strategy = config.strategy.as_str(),
        cumulative_return = report.metrics.cumulative_return,
        sharpe = report.metrics.sharpe_ratio,
        max_drawdown = report.metrics.max_drawdown,
        "backtest complete"
    );
    Ok(report)
}

/// Load the data named by `config` and resolve the engine configuration.
pub fn prepare(config: &RunnerConfig) -> Result<(WalkForwardConfig, LoadedData), RunError> {
    let engine_config = config.to_walk_forward()?;
    let loaded = load_feature_table(&config.data.path, &config.load_options())?;
    Ok((engine_config, loaded))
}

/// Full CLI path: resolve, load, optionally journal, run.
pub fn run_from_config(config: &RunnerConfig) -> Result<RunReport, RunError> {
    let (engine_config, loaded) = prepare(config)?;
    let LoadedData {
        table,
        dataset_hash,
        ..
    } = loaded;

    if !config.output.journal {
        return run_backtest_with(&engine_config, &table, dataset_hash, &mut NullSink);
    }

    let path = config.output.dir.join(artifact_name(
        "journal",
        &engine_config.asset,
        engine_config.strategy.as_str(),
        "jsonl",
    ));
    let mut journal = JournalSink::create(&path).map_err(|source| RunError::Journal {
        path: path.clone(),
        source,
    })?;
    run_backtest_with(&engine_config, &table, dataset_hash, &mut journal)
}
