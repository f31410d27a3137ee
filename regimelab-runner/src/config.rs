//! Run configuration — TOML file layout and its resolution into an engine config.
//!
//! ```toml
//! [run]
//! asset = "SPY"
//! strategy = "hybrid"
//!
//! [costs]
//! base_rate = 0.0005
//!
//! [model]
//! kind = "xgb"
//!
//! [data]
//! path = "data/processed/features_final_SPY.csv"
//!
//! [output]
//! dir = "results"
//! ```
//!
//! Every section and field is optional. Kind selectors stay strings until
//! [`RunnerConfig::to_walk_forward`] resolves them, so a typo surfaces as a
//! configuration error before any data is touched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use regimelab_core::cost::CostParams;
use regimelab_core::engine::{default_regime_columns, ConfigError as EngineConfigError, WalkForwardConfig};
use regimelab_core::model::{ModelKind, ModelParams};
use regimelab_core::strategy::StrategyKind;

use crate::data_loader::LoadOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error(transparent)]
    Engine(#[from] EngineConfigError),
}

/// Top-level TOML document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub run: RunSection,
    pub costs: CostParams,
    pub model: ModelSection,
    pub data: DataSection,
    pub output: OutputSection,
}

/// `[run]`: loop geometry, strategy selector, and seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub asset: String,
    /// `static`, `regime_specific`, or `hybrid`.
    pub strategy: String,
    pub window_days: usize,
    pub retrain_interval: usize,
    pub horizon: usize,
    pub step_days: usize,
    pub min_train_samples: usize,
    pub seed: u64,
    pub initial_equity: f64,
}

impl Default for RunSection {
    fn default() -> Self {
        let engine = WalkForwardConfig::default();
        Self {
            asset: engine.asset,
            strategy: engine.strategy.as_str().to_string(),
            window_days: engine.window_days,
            retrain_interval: engine.retrain_interval,
            horizon: engine.horizon,
            step_days: engine.step_days,
            min_train_samples: engine.min_train_samples,
            seed: engine.seed,
            initial_equity: engine.initial_equity,
        }
    }
}

/// `[model]`: classifier selector and hyperparameters.
///
/// Unset size fields fall back to the per-kind defaults of [`ModelParams`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// `rf` / `random_forest` or `xgb` / `gbm` / `gradient_boosting`.
    pub kind: String,
    pub n_estimators: Option<usize>,
    pub max_depth: Option<usize>,
    pub learning_rate: f64,
    pub min_samples_leaf: usize,
    pub max_features: Option<usize>,
    pub bootstrap: bool,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self::from_params("xgb", &ModelParams::default())
    }
}

impl ModelSection {
    fn from_params(kind: &str, params: &ModelParams) -> Self {
        Self {
            kind: kind.to_string(),
            n_estimators: params.n_estimators,
            max_depth: params.max_depth,
            learning_rate: params.learning_rate,
            min_samples_leaf: params.min_samples_leaf,
            max_features: params.max_features,
            bootstrap: params.bootstrap,
        }
    }

    pub fn params(&self) -> ModelParams {
        ModelParams {
            n_estimators: self.n_estimators,
            max_depth: self.max_depth,
            learning_rate: self.learning_rate,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
            bootstrap: self.bootstrap,
        }
    }
}

/// `[data]`: input file and column overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    pub path: PathBuf,
    /// Explicit feature columns; auto-detected from the `{ASSET}_` prefix when unset.
    pub feature_columns: Option<Vec<String>>,
    /// Defaults to `{ASSET}_HMM_Regime`, `{ASSET}_CP_Regime`.
    pub regime_columns: Option<Vec<String>>,
    pub target_column: Option<String>,
    pub return_column: Option<String>,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/processed/features_final_SPY.csv"),
            feature_columns: None,
            regime_columns: None,
            target_column: None,
            return_column: None,
        }
    }
}

/// `[output]`: artifact directory and journal toggle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub dir: PathBuf,
    /// Stream the execution log to a JSONL journal while the run progresses.
    pub journal: bool,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            journal: true,
        }
    }
}

impl RunnerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML (used by `init-config`).
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn strategy_kind(&self) -> Result<StrategyKind, ConfigError> {
        let kind = self
            .run
            .strategy
            .parse::<StrategyKind>()
            .map_err(EngineConfigError::from)?;
        Ok(kind)
    }

    pub fn model_kind(&self) -> Result<ModelKind, ConfigError> {
        let kind = self
            .model
            .kind
            .parse::<ModelKind>()
            .map_err(EngineConfigError::from)?;
        Ok(kind)
    }

    /// Effective regime columns: the explicit list, or the asset's conventional pair.
    pub fn regime_columns(&self) -> Vec<String> {
        self.data
            .regime_columns
            .clone()
            .unwrap_or_else(|| default_regime_columns(&self.run.asset))
    }

    /// Resolve selectors and validate, yielding the engine's configuration.
    pub fn to_walk_forward(&self) -> Result<WalkForwardConfig, ConfigError> {
        let config = WalkForwardConfig {
            asset: self.run.asset.clone(),
            window_days: self.run.window_days,
            retrain_interval: self.run.retrain_interval,
            horizon: self.run.horizon,
            step_days: self.run.step_days,
            model: self.model_kind()?,
            strategy: self.strategy_kind()?,
            costs: self.costs.clone(),
            model_params: self.model.params(),
            min_train_samples: self.run.min_train_samples,
            seed: self.run.seed,
            regime_columns: self.regime_columns(),
            initial_equity: self.run.initial_equity,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            asset: self.run.asset.clone(),
            feature_columns: self.data.feature_columns.clone(),
            regime_columns: self.regime_columns(),
            target_column: self.data.target_column.clone(),
            return_column: self.data.return_column.clone(),
        }
    }
}
