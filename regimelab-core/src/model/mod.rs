//! Predictive models — the uniform fit/predict contract and the two built-in classifiers.
//!
//! A [`Classifier`] is the untrained recipe chosen once per run. Each `fit` produces a
//! brand-new [`TrainedModel`]; trained instances are immutable, so retraining always
//! replaces the previous binding instead of mutating it.

mod gradient_boosting;
mod random_forest;
mod tree;

pub use gradient_boosting::{BoostedTrees, GradientBoosting};
pub use random_forest::{RandomForest, TrainedForest};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::{Signal, TrainingSet};

/// Probability threshold above which a model votes `Long`.
pub const DECISION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("insufficient training samples: {found} < {required}")]
    InsufficientSamples { found: usize, required: usize },

    #[error("training window contains a single class (all {class})")]
    SingleClass { class: Signal },

    #[error("feature width mismatch: model expects {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Untrained model recipe. Chosen once at configuration time.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    /// Train a fresh model on `set`. Deterministic for a given set and seed.
    fn fit(&self, set: &TrainingSet) -> Result<Box<dyn TrainedModel>, ModelError>;
}

/// A fitted, immutable model.
pub trait TrainedModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn n_features(&self) -> usize;

    /// Probability of `Long` for one row. Callers guarantee the row width.
    fn prob_long(&self, x: &[f64]) -> f64;

    fn predict_proba(&self, x: &[f64]) -> Result<f64, ModelError> {
        if x.len() != self.n_features() {
            return Err(ModelError::DimensionMismatch {
                expected: self.n_features(),
                found: x.len(),
            });
        }
        Ok(self.prob_long(x))
    }

    fn predict_one(&self, x: &[f64]) -> Result<Signal, ModelError> {
        let p = self.predict_proba(x)?;
        Ok(if p > DECISION_THRESHOLD {
            Signal::Long
        } else {
            Signal::Flat
        })
    }

    /// One direction per row, in input order.
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Signal>, ModelError> {
        rows.iter().map(|x| self.predict_one(x)).collect()
    }
}

/// Reject sets a classifier cannot learn from.
pub(crate) fn check_trainable(set: &TrainingSet, min_samples: usize) -> Result<(), ModelError> {
    let required = min_samples.max(1);
    if set.n_samples() < required {
        return Err(ModelError::InsufficientSamples {
            found: set.n_samples(),
            required,
        });
    }
    match set.class_counts() {
        (_, 0) => Err(ModelError::SingleClass {
            class: Signal::Flat,
        }),
        (0, _) => Err(ModelError::SingleClass {
            class: Signal::Long,
        }),
        _ => Ok(()),
    }
}

// ─── Kind selector ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    RandomForest,
    GradientBoosting,
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::RandomForest => "random_forest",
            ModelKind::GradientBoosting => "gradient_boosting",
        }
    }

    /// Short tag used in artifact names.
    pub fn tag(self) -> &'static str {
        match self {
            ModelKind::RandomForest => "rf",
            ModelKind::GradientBoosting => "xgb",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown model kind '{0}' (expected one of: rf, random_forest, xgb, gbm, gradient_boosting)")]
pub struct UnknownModelKind(pub String);

impl FromStr for ModelKind {
    type Err = UnknownModelKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rf" | "random_forest" => Ok(ModelKind::RandomForest),
            "xgb" | "gbm" | "gradient_boosting" => Ok(ModelKind::GradientBoosting),
            _ => Err(UnknownModelKind(s.to_string())),
        }
    }
}

// ─── Hyperparameters ────────────────────────────────────────────────

/// Model hyperparameters. `None` fields fall back to per-kind defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    /// Trees (forest) or boosting rounds.
    pub n_estimators: Option<usize>,
    pub max_depth: Option<usize>,
    /// Boosting shrinkage. Ignored by the forest.
    pub learning_rate: f64,
    pub min_samples_leaf: usize,
    /// Features tried per forest split; `None` = ceil(sqrt(n_features)).
    pub max_features: Option<usize>,
    /// Bootstrap resampling per forest tree.
    pub bootstrap: bool,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            n_estimators: None,
            max_depth: None,
            learning_rate: 0.1,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
        }
    }
}

impl ModelParams {
    /// Both kinds default to 200.
    pub fn resolved_estimators(&self) -> usize {
        self.n_estimators.unwrap_or(200)
    }

    pub fn resolved_depth(&self, kind: ModelKind) -> usize {
        self.max_depth.unwrap_or(match kind {
            ModelKind::RandomForest => 6,
            ModelKind::GradientBoosting => 4,
        })
    }

    /// Describe the first invalid value, if any.
    pub fn invalid_reason(&self) -> Option<String> {
        if self.n_estimators == Some(0) {
            return Some("n_estimators must be at least 1".into());
        }
        if self.max_depth == Some(0) {
            return Some("max_depth must be at least 1".into());
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Some(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            ));
        }
        if self.min_samples_leaf == 0 {
            return Some("min_samples_leaf must be at least 1".into());
        }
        if self.max_features == Some(0) {
            return Some("max_features must be at least 1".into());
        }
        None
    }
}

/// Build the classifier for `kind`.
///
/// `seed` drives every random choice the classifier makes; `min_samples` is
/// the floor below which `fit` refuses to train.
pub fn build_classifier(
    kind: ModelKind,
    params: &ModelParams,
    seed: u64,
    min_samples: usize,
) -> Box<dyn Classifier> {
    match kind {
        ModelKind::RandomForest => Box::new(RandomForest::new(params, seed, min_samples)),
        ModelKind::GradientBoosting => Box::new(GradientBoosting::new(params, seed, min_samples)),
    }
}
