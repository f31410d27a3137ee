//! Bagged random forest classifier (Gini splits, per-split feature subsampling).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::tree::{GiniObjective, GrowthLimits, Presorted, Tree, TreeGrower};
use super::{check_trainable, Classifier, ModelError, ModelKind, ModelParams, TrainedModel};
use crate::domain::TrainingSet;

#[derive(Debug, Clone)]
pub struct RandomForest {
    n_trees: usize,
    max_depth: usize,
    min_samples_leaf: usize,
    max_features: Option<usize>,
    bootstrap: bool,
    seed: u64,
    min_samples: usize,
}

impl RandomForest {
    pub fn new(params: &ModelParams, seed: u64, min_samples: usize) -> Self {
        Self {
            n_trees: params.resolved_estimators().max(1),
            max_depth: params.resolved_depth(ModelKind::RandomForest),
            min_samples_leaf: params.min_samples_leaf.max(1),
            max_features: params.max_features,
            bootstrap: params.bootstrap,
            seed,
            min_samples,
        }
    }
}

impl Classifier for RandomForest {
    fn name(&self) -> &str {
        ModelKind::RandomForest.as_str()
    }

    fn fit(&self, set: &TrainingSet) -> Result<Box<dyn TrainedModel>, ModelError> {
        check_trainable(set, self.min_samples)?;

        let x = set.features();
        let n = set.n_samples();
        let n_features = set.n_features();
        let labels: Vec<bool> = set.labels().iter().map(|l| l.is_long()).collect();
        let presorted = Presorted::new(x, n_features);

        let max_features = self
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().ceil() as usize)
            .clamp(1, n_features.max(1));
        let limits = GrowthLimits {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            max_features: Some(max_features),
        };

        let mut trees = Vec::with_capacity(self.n_trees);
        let mut weights = vec![0.0; n];
        let mut include = vec![false; n];
        for t in 0..self.n_trees {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(t as u64));

            if self.bootstrap {
                weights.iter_mut().for_each(|w| *w = 0.0);
                for _ in 0..n {
                    weights[rng.gen_range(0..n)] += 1.0;
                }
            } else {
                weights.iter_mut().for_each(|w| *w = 1.0);
            }
            for (inc, w) in include.iter_mut().zip(&weights) {
                *inc = *w > 0.0;
            }

            let objective = GiniObjective {
                labels: &labels,
                weights: &weights,
            };
            trees.push(TreeGrower::grow(
                x, &objective, &presorted, &include, limits, &mut rng,
            ));
        }

        debug!(
            trees = trees.len(),
            samples = n,
            features = n_features,
            "random forest fitted"
        );
        Ok(Box::new(TrainedForest { trees, n_features }))
    }
}

/// Fitted forest: probability is the mean leaf class frequency across trees.
#[derive(Debug, Clone)]
pub struct TrainedForest {
    trees: Vec<Tree>,
    n_features: usize,
}

impl TrainedForest {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl TrainedModel for TrainedForest {
    fn name(&self) -> &str {
        ModelKind::RandomForest.as_str()
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn prob_long(&self, x: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict(x)).sum::<f64>() / self.trees.len() as f64
    }
}
