//! Gradient-boosted trees for binary direction prediction.
//!
//! Log-loss boosting with second-order (Newton) leaf values: each round fits a
//! depth-limited tree to the gradient/hessian of the loss at the current margins
//! and adds it scaled by the learning rate. Margins start at the class-prior
//! log-odds. Every feature is considered at every split, so no randomness is
//! involved and the seed only identifies the run.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use super::tree::{GrowthLimits, NewtonObjective, Presorted, Tree, TreeGrower};
use super::{check_trainable, Classifier, ModelError, ModelKind, ModelParams, TrainedModel};
use crate::domain::TrainingSet;

/// Prior probabilities are clamped to keep the initial log-odds finite.
const PRIOR_CLAMP: f64 = 1e-6;

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[derive(Debug, Clone)]
pub struct GradientBoosting {
    n_rounds: usize,
    max_depth: usize,
    learning_rate: f64,
    min_samples_leaf: usize,
    seed: u64,
    min_samples: usize,
}

impl GradientBoosting {
    pub fn new(params: &ModelParams, seed: u64, min_samples: usize) -> Self {
        Self {
            n_rounds: params.resolved_estimators(),
            max_depth: params.resolved_depth(ModelKind::GradientBoosting),
            learning_rate: params.learning_rate,
            min_samples_leaf: params.min_samples_leaf.max(1),
            seed,
            min_samples,
        }
    }
}

impl Classifier for GradientBoosting {
    fn name(&self) -> &str {
        ModelKind::GradientBoosting.as_str()
    }

    fn fit(&self, set: &TrainingSet) -> Result<Box<dyn TrainedModel>, ModelError> {
        check_trainable(set, self.min_samples)?;

        let x = set.features();
        let n = set.n_samples();
        let y: Vec<f64> = set.labels().iter().map(|l| l.exposure()).collect();
        let presorted = Presorted::new(x, set.n_features());
        let include = vec![true; n];
        let limits = GrowthLimits {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            max_features: None,
        };

        let (_, long) = set.class_counts();
        let prior = (long as f64 / n as f64).clamp(PRIOR_CLAMP, 1.0 - PRIOR_CLAMP);
        let base_margin = (prior / (1.0 - prior)).ln();

        let mut margins = vec![base_margin; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut trees = Vec::with_capacity(self.n_rounds);
        // Unused with max_features = None, but the grower wants one.
        let mut rng = StdRng::seed_from_u64(self.seed);

        for _ in 0..self.n_rounds {
            for i in 0..n {
                let p = sigmoid(margins[i]);
                grad[i] = p - y[i];
                hess[i] = p * (1.0 - p);
            }
            let objective = NewtonObjective {
                grad: &grad,
                hess: &hess,
            };
            let tree = TreeGrower::grow(x, &objective, &presorted, &include, limits, &mut rng);
            for (margin, row) in margins.iter_mut().zip(x) {
                *margin += self.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        debug!(rounds = trees.len(), samples = n, "gradient boosting fitted");
        Ok(Box::new(BoostedTrees {
            trees,
            base_margin,
            learning_rate: self.learning_rate,
            n_features: set.n_features(),
        }))
    }
}

/// Fitted boosting ensemble.
#[derive(Debug, Clone)]
pub struct BoostedTrees {
    trees: Vec<Tree>,
    base_margin: f64,
    learning_rate: f64,
    n_features: usize,
}

impl BoostedTrees {
    pub fn n_rounds(&self) -> usize {
        self.trees.len()
    }

    fn margin(&self, x: &[f64]) -> f64 {
        self.base_margin + self.learning_rate * self.trees.iter().map(|t| t.predict(x)).sum::<f64>()
    }
}

impl TrainedModel for BoostedTrees {
    fn name(&self) -> &str {
        ModelKind::GradientBoosting.as_str()
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn prob_long(&self, x: &[f64]) -> f64 {
        sigmoid(self.margin(x))
    }
}
