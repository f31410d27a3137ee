//! CART tree growth shared by the forest and boosting classifiers.
//!
//! Trees are stored as a flat node arena (root at index 0). Split search walks
//! per-feature presorted sample orders, so a node costs O(samples × features)
//! instead of re-sorting at every level. What a split optimizes is supplied by
//! an [`Objective`]: Gini impurity on labels for the forest, second-order
//! gradient statistics for boosting.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Minimum improvement for a split to be taken.
const MIN_GAIN: f64 = 1e-12;

/// L2 regularization on boosted leaf values.
pub(crate) const NEWTON_LAMBDA: f64 = 1.0;

/// Additive sufficient statistics of a node.
pub(crate) trait NodeStats: Copy + Default {
    fn accumulate(&mut self, other: Self);
    fn without(self, other: Self) -> Self;
    /// Effective sample count (bootstrap multiplicity included).
    fn weight(&self) -> f64;
    /// Node quality; split gain = left + right - parent.
    fn score(&self) -> f64;
    fn leaf_value(&self) -> f64;
}

/// Per-sample statistics provider.
pub(crate) trait Objective {
    type Stats: NodeStats;
    fn sample_stats(&self, sample: usize) -> Self::Stats;
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct GiniStats {
    weight: f64,
    positive: f64,
}

impl NodeStats for GiniStats {
    fn accumulate(&mut self, other: Self) {
        self.weight += other.weight;
        self.positive += other.positive;
    }

    fn without(self, other: Self) -> Self {
        Self {
            weight: self.weight - other.weight,
            positive: self.positive - other.positive,
        }
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn score(&self) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        // -(weight * gini), gini = 2p(1-p)
        -2.0 * self.positive * (self.weight - self.positive) / self.weight
    }

    fn leaf_value(&self) -> f64 {
        if self.weight <= 0.0 {
            return 0.5;
        }
        self.positive / self.weight
    }
}

/// Weighted binary labels; weight 0 means out-of-bag.
pub(crate) struct GiniObjective<'a> {
    pub labels: &'a [bool],
    pub weights: &'a [f64],
}

impl Objective for GiniObjective<'_> {
    type Stats = GiniStats;

    fn sample_stats(&self, sample: usize) -> GiniStats {
        let w = self.weights[sample];
        GiniStats {
            weight: w,
            positive: if self.labels[sample] { w } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NewtonStats {
    count: f64,
    grad: f64,
    hess: f64,
}

impl NodeStats for NewtonStats {
    fn accumulate(&mut self, other: Self) {
        self.count += other.count;
        self.grad += other.grad;
        self.hess += other.hess;
    }

    fn without(self, other: Self) -> Self {
        Self {
            count: self.count - other.count,
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
        }
    }

    fn weight(&self) -> f64 {
        self.count
    }

    fn score(&self) -> f64 {
        self.grad * self.grad / (self.hess + NEWTON_LAMBDA)
    }

    fn leaf_value(&self) -> f64 {
        -self.grad / (self.hess + NEWTON_LAMBDA)
    }
}

/// First and second derivatives of the log-loss at the current margins.
pub(crate) struct NewtonObjective<'a> {
    pub grad: &'a [f64],
    pub hess: &'a [f64],
}

impl Objective for NewtonObjective<'_> {
    type Stats = NewtonStats;

    fn sample_stats(&self, sample: usize) -> NewtonStats {
        NewtonStats {
            count: 1.0,
            grad: self.grad[sample],
            hess: self.hess[sample],
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct GrowthLimits {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` = all.
    pub max_features: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub(crate) fn predict(&self, x: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub(crate) fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    pub(crate) fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Per-feature sample orderings, computed once per fit and shared by every tree.
pub(crate) struct Presorted {
    orders: Vec<Vec<u32>>,
}

impl Presorted {
    pub(crate) fn new(x: &[Vec<f64>], n_features: usize) -> Self {
        let orders = (0..n_features)
            .map(|f| {
                let mut order: Vec<u32> = (0..x.len() as u32).collect();
                order.sort_by(|&a, &b| {
                    x[a as usize][f]
                        .total_cmp(&x[b as usize][f])
                        .then(a.cmp(&b))
                });
                order
            })
            .collect();
        Self { orders }
    }

    fn restricted(&self, include: &[bool]) -> Vec<Vec<u32>> {
        self.orders
            .iter()
            .map(|order| {
                order
                    .iter()
                    .copied()
                    .filter(|&s| include[s as usize])
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

pub(crate) struct TreeGrower<'a, O: Objective> {
    x: &'a [Vec<f64>],
    objective: &'a O,
    limits: GrowthLimits,
    goes_left: Vec<bool>,
    nodes: Vec<Node>,
}

impl<'a, O: Objective> TreeGrower<'a, O> {
    /// Grow one tree over the samples flagged in `include`.
    pub(crate) fn grow(
        x: &'a [Vec<f64>],
        objective: &'a O,
        presorted: &Presorted,
        include: &[bool],
        limits: GrowthLimits,
        rng: &mut StdRng,
    ) -> Tree {
        let lists = presorted.restricted(include);
        let mut grower = Self {
            x,
            objective,
            limits,
            goes_left: vec![false; x.len()],
            nodes: Vec::new(),
        };
        grower.build(lists, 0, rng);
        Tree {
            nodes: grower.nodes,
        }
    }

    fn build(&mut self, lists: Vec<Vec<u32>>, depth: usize, rng: &mut StdRng) -> usize {
        let mut total = O::Stats::default();
        if let Some(first) = lists.first() {
            for &s in first {
                total.accumulate(self.objective.sample_stats(s as usize));
            }
        }

        let index = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: total.leaf_value(),
        });

        if depth >= self.limits.max_depth
            || total.weight() < 2.0 * self.limits.min_samples_leaf as f64
        {
            return index;
        }
        let Some(split) = self.best_split(&lists, total, rng) else {
            return index;
        };

        for &s in &lists[0] {
            self.goes_left[s as usize] = self.x[s as usize][split.feature] <= split.threshold;
        }
        let goes_left = &self.goes_left;
        let (left_lists, right_lists): (Vec<Vec<u32>>, Vec<Vec<u32>>) = lists
            .into_iter()
            .map(|list| {
                list.into_iter()
                    .partition::<Vec<u32>, _>(|&s| goes_left[s as usize])
            })
            .unzip();

        let left = self.build(left_lists, depth + 1, rng);
        let right = self.build(right_lists, depth + 1, rng);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    fn best_split(&self, lists: &[Vec<u32>], total: O::Stats, rng: &mut StdRng) -> Option<Split> {
        let n_features = lists.len();
        let mut candidates: Vec<usize> = (0..n_features).collect();
        if let Some(k) = self.limits.max_features {
            if k < n_features {
                candidates.shuffle(rng);
                candidates.truncate(k.max(1));
            }
        }

        let parent_score = total.score();
        let min_leaf = self.limits.min_samples_leaf as f64;
        let mut best: Option<Split> = None;

        for &feature in &candidates {
            let list = &lists[feature];
            let mut left = O::Stats::default();
            for pos in 0..list.len().saturating_sub(1) {
                let sample = list[pos] as usize;
                left.accumulate(self.objective.sample_stats(sample));

                let here = self.x[sample][feature];
                let next = self.x[list[pos + 1] as usize][feature];
                if next <= here {
                    continue;
                }
                let right = total.without(left);
                if left.weight() < min_leaf || right.weight() < min_leaf {
                    continue;
                }

                let gain = left.score() + right.score() - parent_score;
                if gain > best.map_or(MIN_GAIN, |b| b.gain) {
                    let mid = here + (next - here) / 2.0;
                    best = Some(Split {
                        feature,
                        threshold: if mid < next { mid } else { here },
                        gain,
                    });
                }
            }
        }
        best
    }
}
