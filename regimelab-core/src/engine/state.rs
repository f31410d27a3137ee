//! Run result types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::log::{ExecutionLog, RunHeader};
use crate::domain::Signal;
use crate::fingerprint::RunFingerprint;
use crate::portfolio::{EquityPoint, PortfolioStats, TradeRecord};

/// One row of the signals output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRow {
    pub date: NaiveDate,
    pub signal: Signal,
    pub day_return: f64,
    pub trade_cost: f64,
    pub pnl: f64,
    pub equity: f64,
    pub regime: String,
}

/// Loop bookkeeping totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub steps: usize,
    pub skips: usize,
    /// Successful fits.
    pub retrains: usize,
    pub failed_retrains: usize,
    /// Steps traded flat because the model failed to predict.
    pub failed_predictions: usize,
    pub regime_changes: usize,
    /// Distinct signatures seen on simulated days.
    pub distinct_regimes: usize,
    /// Cache slots holding a model at the end of the run.
    pub trained_slots: usize,
    /// Steps traded flat because no model had trained yet.
    pub untrained_steps: usize,
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct BacktestOutcome {
    pub fingerprint: RunFingerprint,
    pub log: ExecutionLog,
    pub signals: Vec<SignalRow>,
    pub equity: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub stats: PortfolioStats,
    pub counters: RunCounters,
}

impl BacktestOutcome {
    pub fn header(&self) -> &RunHeader {
        &self.log.header
    }

    pub fn signal_series(&self) -> Vec<Signal> {
        self.signals.iter().map(|r| r.signal).collect()
    }

    pub fn final_equity(&self) -> f64 {
        self.stats.final_equity
    }
}
