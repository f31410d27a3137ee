//! Execution log — run header plus one immutable event per simulated or skipped day.
//!
//! Events are produced in date order. A skipped day never gets a step entry;
//! it gets a [`SkipEntry`] carrying the equity that was carried forward.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io;

use crate::cost::CostParams;
use crate::domain::{ConfigHash, DatasetHash, RunId, Signal};
use crate::model::{ModelKind, ModelParams};
use crate::strategy::{RetrainReason, StrategyKind};

/// Parameters that identify a run, written before the first event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHeader {
    pub run_id: RunId,
    pub config_hash: ConfigHash,
    pub dataset_hash: DatasetHash,
    pub asset: String,
    pub strategy: StrategyKind,
    pub model: ModelKind,
    pub model_params: ModelParams,
    pub window_days: usize,
    pub retrain_interval: usize,
    pub horizon: usize,
    pub step_days: usize,
    pub costs: CostParams,
    pub cost_model: String,
    pub min_train_samples: usize,
    pub seed: u64,
    /// Seed actually handed to the classifier.
    pub model_seed: u64,
    pub regime_columns: Vec<String>,
    pub feature_names: Vec<String>,
    pub rows: usize,
}

/// One simulated day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEntry {
    pub index: usize,
    pub date: NaiveDate,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    /// Valid samples in the training window.
    pub train_samples: usize,
    /// A new model was installed this step.
    pub retrained: bool,
    /// Why a retrain was attempted, whether or not it succeeded.
    pub retrain_reason: Option<RetrainReason>,
    pub retrain_error: Option<String>,
    /// The model could not score this day; the step traded flat.
    pub predict_error: Option<String>,
    pub regime_changed: bool,
    pub regime_signature: String,
    pub signal: Signal,
    pub prev_signal: Signal,
    /// Predictions for rows `index..index + horizon`; `None` where features are missing.
    pub forecast: Vec<Option<Signal>>,
    pub day_return: f64,
    pub trade_cost: f64,
    pub pnl: f64,
    pub equity: f64,
    /// `None` while no model has trained for this step's key.
    pub model_used: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    InsufficientData { valid: usize, required: usize },
    MissingFeatures,
    MissingReturn,
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::InsufficientData { .. } => "insufficient_data",
            SkipReason::MissingFeatures => "missing_features",
            SkipReason::MissingReturn => "missing_return",
        }
    }
}

/// Marker for a day the loop visited but did not simulate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipEntry {
    pub index: usize,
    pub date: NaiveDate,
    pub reason: SkipReason,
    /// Equity carried forward unchanged.
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    Step(StepEntry),
    Skip(SkipEntry),
}

impl LogEvent {
    pub fn date(&self) -> NaiveDate {
        match self {
            LogEvent::Step(s) => s.date,
            LogEvent::Skip(s) => s.date,
        }
    }

    pub fn as_step(&self) -> Option<&StepEntry> {
        match self {
            LogEvent::Step(s) => Some(s),
            LogEvent::Skip(_) => None,
        }
    }

    pub fn as_skip(&self) -> Option<&SkipEntry> {
        match self {
            LogEvent::Skip(s) => Some(s),
            LogEvent::Step(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub header: RunHeader,
    pub events: Vec<LogEvent>,
}

impl ExecutionLog {
    pub fn new(header: RunHeader) -> Self {
        Self {
            header,
            events: Vec::new(),
        }
    }

    pub fn steps(&self) -> impl Iterator<Item = &StepEntry> {
        self.events.iter().filter_map(LogEvent::as_step)
    }

    pub fn skips(&self) -> impl Iterator<Item = &SkipEntry> {
        self.events.iter().filter_map(LogEvent::as_skip)
    }
}

// ─── Sinks ──────────────────────────────────────────────────────────

/// Incremental consumer of the execution log.
///
/// The engine calls `begin` once, `record` once per event in order, and
/// `finish` after the last event. A sink error aborts the run.
pub trait ExecutionSink {
    fn begin(&mut self, header: &RunHeader) -> io::Result<()>;
    fn record(&mut self, event: &LogEvent) -> io::Result<()>;
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ExecutionSink for NullSink {
    fn begin(&mut self, _header: &RunHeader) -> io::Result<()> {
        Ok(())
    }

    fn record(&mut self, _event: &LogEvent) -> io::Result<()> {
        Ok(())
    }
}

/// Collects the log in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub header: Option<RunHeader>,
    pub events: Vec<LogEvent>,
    pub finished: bool,
}

impl ExecutionSink for MemorySink {
    fn begin(&mut self, header: &RunHeader) -> io::Result<()> {
        self.header = Some(header.clone());
        self.events.clear();
        self.finished = false;
        Ok(())
    }

    fn record(&mut self, event: &LogEvent) -> io::Result<()> {
        self.events.push(event.clone());
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.finished = true;
        Ok(())
    }
}
