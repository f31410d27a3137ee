//! RegimeLab Core — walk-forward backtesting of ML trading signals under regime change.
//!
//! This crate contains the simulation core:
//! - Domain types (signals, feature table, training sets, run identities)
//! - Regime signatures and their per-run interning
//! - Predictive model contract plus forest and boosting classifiers
//! - Adaptation strategies (static, regime-specific, hybrid) and the model cache
//! - Transaction cost models and the sequential portfolio
//! - The walk-forward loop and its execution log

pub mod cost;
pub mod domain;
pub mod engine;
pub mod fingerprint;
pub mod model;
pub mod portfolio;
pub mod regime;
pub mod rng;
pub mod strategy;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything shared across comparison threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::FeatureTable>();
        require_sync::<domain::FeatureTable>();
        require_send::<domain::TrainingSet>();
        require_sync::<domain::TrainingSet>();
        require_send::<domain::RunId>();
        require_sync::<domain::RunId>();

        // Models
        require_send::<Box<dyn model::Classifier>>();
        require_sync::<Box<dyn model::Classifier>>();
        require_send::<Box<dyn model::TrainedModel>>();
        require_sync::<Box<dyn model::TrainedModel>>();
        require_send::<model::RandomForest>();
        require_sync::<model::GradientBoosting>();

        // Engine
        require_send::<engine::WalkForwardEngine>();
        require_sync::<engine::WalkForwardEngine>();
        require_send::<engine::BacktestOutcome>();
        require_sync::<engine::BacktestOutcome>();
        require_send::<strategy::ModelCache>();
        require_send::<portfolio::Portfolio>();
        require_send::<rng::RngHierarchy>();
        require_sync::<fingerprint::RunFingerprint>();
    }

    /// Architecture contract: a fitted model cannot be retrained in place.
    ///
    /// `TrainedModel` exposes only `&self` methods and `Classifier::fit` returns a
    /// new box, so the only way to "retrain" is to replace the cached instance.
    #[test]
    fn trained_models_are_replaced_not_mutated() {
        fn _fit_yields_new_instance(
            c: &dyn model::Classifier,
            set: &domain::TrainingSet,
        ) -> Result<Box<dyn model::TrainedModel>, model::ModelError> {
            c.fit(set)
        }
    }
}
