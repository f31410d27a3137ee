//! Walk-forward engine — configuration, the rolling simulation loop, and its log.
//!
//! The engine owns nothing between runs: each `run` builds a fresh portfolio,
//! model cache and signature interner, so independent runs may share one
//! read-only feature table across threads.

pub mod config;
pub mod log;
pub mod loop_runner;
pub mod state;

pub use config::{default_regime_columns, ConfigError, WalkForwardConfig};
pub use log::{
    ExecutionLog, ExecutionSink, LogEvent, MemorySink, NullSink, RunHeader, SkipEntry, SkipReason,
    StepEntry,
};
pub use loop_runner::{EngineError, WalkForwardEngine};
pub use state::{BacktestOutcome, RunCounters, SignalRow};
