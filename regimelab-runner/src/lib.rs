//! RegimeLab Runner — data loading, run orchestration, metrics, and artifacts.
//!
//! Sits between the simulation core and the CLI:
//! - `config`: TOML run configuration resolved into a `WalkForwardConfig`
//! - `data_loader`: merged features/regimes CSV → `FeatureTable`
//! - `runner`: single backtest plus derived metrics
//! - `compare`: all adaptation strategies in parallel, with disagreement counts
//! - `baseline`: buy-and-hold over the simulated dates
//! - `metrics`: performance, per-regime, and transition statistics
//! - `export` / `journal`: CSV/JSON artifacts and the streaming JSONL log

pub mod baseline;
pub mod compare;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod journal;
pub mod metrics;
pub mod runner;

pub use compare::{compare_strategies, Comparison, Disagreement};
pub use config::{ConfigError, RunnerConfig};
pub use data_loader::{load_feature_table, LoadError, LoadOptions, LoadedData};
pub use export::{save_artifacts, save_comparison};
pub use journal::{read_journal, JournalSink};
pub use metrics::{PerformanceMetrics, RegimeMetrics, TransitionMetrics};
pub use runner::{run_backtest, run_from_config, MetricsReport, RunError, RunReport};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn public_types_are_send_sync() {
        assert_send::<RunnerConfig>();
        assert_sync::<RunnerConfig>();
        assert_send::<RunReport>();
        assert_sync::<RunReport>();
        assert_send::<Comparison>();
        assert_sync::<Comparison>();
        assert_send::<LoadedData>();
        assert_sync::<LoadedData>();
        assert_send::<JournalSink>();
        assert_send::<RunError>();
        assert_sync::<RunError>();
    }
}
