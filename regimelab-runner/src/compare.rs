//! Strategy comparison — every adaptation strategy on one shared table.
//!
//! Runs share the feature table read-only and own everything else, so they
//! execute as independent rayon tasks. Results come back in `StrategyKind::ALL`
//! order regardless of which finished first.

use std::collections::HashMap;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use regimelab_core::domain::{DatasetHash, FeatureTable, Signal};
use regimelab_core::engine::{EngineError, NullSink, SignalRow, WalkForwardConfig};
use regimelab_core::portfolio::PortfolioStats;
use regimelab_core::strategy::StrategyKind;

use crate::baseline::{buy_and_hold, BaselineResult};
use crate::metrics::PerformanceMetrics;
use crate::runner::{run_backtest_with, MetricsReport, RunError, RunReport};

/// How often two strategies held different positions on the same date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disagreement {
    pub a: StrategyKind,
    pub b: StrategyKind,
    /// Dates both strategies simulated.
    pub common_days: usize,
    pub differing_days: usize,
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub asset: String,
    pub runs: Vec<RunReport>,
    pub disagreements: Vec<Disagreement>,
    pub baseline: BaselineResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineSummary {
    pub metrics: PerformanceMetrics,
    pub portfolio: PortfolioStats,
}

/// Serializable digest written to `comparison_{asset}.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub asset: String,
    pub runs: Vec<MetricsReport>,
    pub buy_and_hold: BaselineSummary,
    pub disagreements: Vec<Disagreement>,
}

impl Comparison {
    pub fn run(&self, kind: StrategyKind) -> Option<&RunReport> {
        self.runs.iter().find(|r| r.strategy() == kind)
    }

    pub fn summary(&self) -> ComparisonSummary {
        ComparisonSummary {
            asset: self.asset.clone(),
            runs: self.runs.iter().map(RunReport::summary).collect(),
            buy_and_hold: BaselineSummary {
                metrics: self.baseline.metrics.clone(),
                portfolio: self.baseline.stats,
            },
            disagreements: self.disagreements.clone(),
        }
    }
}

/// Run Static, Regime-Specific, and Hybrid over `table` in parallel.
///
/// `config.strategy` is ignored; every other setting is shared.
pub fn compare_strategies(
    config: &WalkForwardConfig,
    table: &FeatureTable,
    dataset_hash: &DatasetHash,
) -> Result<Comparison, RunError> {
    let runs = StrategyKind::ALL[..]
        .par_iter()
        .map(|&strategy| {
            let cfg = WalkForwardConfig {
                strategy,
                ..config.clone()
            };
            run_backtest_with(&cfg, table, dataset_hash.clone(), &mut NullSink)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut disagreements = Vec::new();
    for (i, a) in runs.iter().enumerate() {
        for b in &runs[i + 1..] {
            let d = disagreement(a, b);
            info!(
                a = d.a.as_str(),
                b = d.b.as_str(),
                differing_days = d.differing_days,
                common_days = d.common_days,
                "signal disagreement"
            );
            disagreements.push(d);
        }
    }

    // Skips don't depend on the strategy, so every run simulated the same dates.
    let template = runs.first().map(|r| r.outcome.signals.as_slice()).unwrap_or(&[]);
    let cost_model = config.costs.build();
    let baseline = buy_and_hold(template, cost_model.as_ref(), config.initial_equity)
        .map_err(EngineError::from)?;

    Ok(Comparison {
        asset: config.asset.clone(),
        runs,
        disagreements,
        baseline,
    })
}

fn disagreement(a: &RunReport, b: &RunReport) -> Disagreement {
    let (common_days, differing_days) = count_disagreements(&a.outcome.signals, &b.outcome.signals);
    Disagreement {
        a: a.strategy(),
        b: b.strategy(),
        common_days,
        differing_days,
    }
}

/// `(common dates, dates with different signals)`, joined on date.
pub fn count_disagreements(a: &[SignalRow], b: &[SignalRow]) -> (usize, usize) {
    let by_date: HashMap<NaiveDate, Signal> = b.iter().map(|r| (r.date, r.signal)).collect();
    a.iter()
        .filter_map(|r| by_date.get(&r.date).map(|&other| r.signal != other))
        .fold((0, 0), |(common, differ), d| (common + 1, differ + usize::from(d)))
}
