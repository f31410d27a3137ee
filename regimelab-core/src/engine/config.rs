//! Walk-forward run configuration and its validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cost::CostParams;
use crate::model::{ModelKind, ModelParams, UnknownModelKind};
use crate::strategy::{StrategyKind, UnknownStrategyKind};

/// Fatal configuration problems, raised before the first simulated day.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error(transparent)]
    UnknownModel(#[from] UnknownModelKind),

    #[error(transparent)]
    UnknownStrategy(#[from] UnknownStrategyKind),

    #[error("asset name must not be empty")]
    EmptyAsset,

    #[error("{field} must be at least 1")]
    Zero { field: &'static str },

    #[error("min_train_samples ({min}) exceeds window_days ({window}); every step would be skipped")]
    MinSamplesExceedWindow { min: usize, window: usize },

    #[error("invalid cost parameter {field}: {value}")]
    InvalidCost { field: &'static str, value: f64 },

    #[error("invalid model parameter: {0}")]
    InvalidModelParam(String),

    #[error("initial equity must be positive and finite, got {0}")]
    InvalidInitialEquity(f64),
}

/// Everything a walk-forward run needs besides the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    pub asset: String,
    /// Training window length in rows.
    pub window_days: usize,
    /// Steps between interval-driven retrains.
    pub retrain_interval: usize,
    /// Rows predicted per step; only the first is traded.
    pub horizon: usize,
    pub step_days: usize,
    pub model: ModelKind,
    pub strategy: StrategyKind,
    pub costs: CostParams,
    pub model_params: ModelParams,
    /// Valid rows a window needs before the step is simulated.
    pub min_train_samples: usize,
    pub seed: u64,
    /// Regime-label columns, in signature order.
    pub regime_columns: Vec<String>,
    pub initial_equity: f64,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            asset: "SPY".into(),
            window_days: 750,
            retrain_interval: 750,
            horizon: 1,
            step_days: 1,
            model: ModelKind::GradientBoosting,
            strategy: StrategyKind::Hybrid,
            costs: CostParams::default(),
            model_params: ModelParams::default(),
            min_train_samples: 50,
            seed: 42,
            regime_columns: Vec::new(),
            initial_equity: 1.0,
        }
    }
}

impl WalkForwardConfig {
    /// Default configuration for `asset`, with its conventional regime columns.
    pub fn for_asset(asset: &str) -> Self {
        Self {
            asset: asset.to_string(),
            regime_columns: default_regime_columns(asset),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.asset.trim().is_empty() {
            return Err(ConfigError::EmptyAsset);
        }
        for (field, value) in [
            ("window_days", self.window_days),
            ("retrain_interval", self.retrain_interval),
            ("horizon", self.horizon),
            ("step_days", self.step_days),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        if self.min_train_samples > self.window_days {
            return Err(ConfigError::MinSamplesExceedWindow {
                min: self.min_train_samples,
                window: self.window_days,
            });
        }
        if let Some((field, value)) = self.costs.invalid_field() {
            return Err(ConfigError::InvalidCost { field, value });
        }
        if let Some(reason) = self.model_params.invalid_reason() {
            return Err(ConfigError::InvalidModelParam(reason));
        }
        if !(self.initial_equity.is_finite() && self.initial_equity > 0.0) {
            return Err(ConfigError::InvalidInitialEquity(self.initial_equity));
        }
        Ok(())
    }
}

/// `{ASSET}_HMM_Regime` and `{ASSET}_CP_Regime`.
pub fn default_regime_columns(asset: &str) -> Vec<String> {
    vec![format!("{asset}_HMM_Regime"), format!("{asset}_CP_Regime")]
}
