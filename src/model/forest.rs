//! Random forest classifier.
//!
//! Bagged Gini trees with a random feature subset per split. Sample weights
//! and (optionally) balanced class weights multiply into every impurity
//! computation, so a weak vote counts half as much as a strong one when
//! choosing splits and when computing leaf probabilities.

use anyhow::{bail, Result};
use log::trace;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::Classifier;

/// Forest hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// Depth bounds; the actual depth is `total_votes / 2` clamped to them.
    pub min_depth: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Reweight classes inversely to their frequency.
    pub balanced_class_weight: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            min_depth: 3,
            max_depth: 8,
            min_samples_leaf: 2,
            balanced_class_weight: true,
            seed: 42,
        }
    }
}

impl ForestParams {
    /// Tree depth for a history of `total_votes` entries.
    #[must_use]
    pub fn depth_for(&self, total_votes: usize) -> usize {
        (total_votes / 2).clamp(self.min_depth, self.max_depth.max(self.min_depth))
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        probability: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { probability } => return *probability,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row.get(*feature).copied().unwrap_or_default() <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// Position in the sorted index slice where the right child starts.
    boundary: usize,
    decrease: f64,
}

/// Grows one tree on a bootstrap sample.
struct TreeBuilder<'a> {
    features: &'a [Vec<f64>],
    labels: &'a [u8],
    /// Per-sample weight including bootstrap multiplicity.
    weights: Vec<f64>,
    max_depth: usize,
    min_samples_leaf: usize,
    max_features: usize,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

fn gini(positive: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let p = positive / total;
    2.0 * p * (1.0 - p)
}

impl TreeBuilder<'_> {
    fn weight_totals(&self, indices: &[usize]) -> (f64, f64) {
        indices.iter().fold((0.0, 0.0), |(total, positive), &i| {
            let w = self.weights[i];
            (total + w, positive + if self.labels[i] == 1 { w } else { 0.0 })
        })
    }

    fn grow(&mut self, indices: &mut [usize], depth: usize, rng: &mut StdRng) -> usize {
        let (total, positive) = self.weight_totals(indices);
        let probability = if total > 0.0 { positive / total } else { 0.5 };
        let impurity = gini(positive, total);

        let node_index = self.nodes.len();
        self.nodes.push(Node::Leaf { probability });

        if depth >= self.max_depth || impurity <= f64::EPSILON || indices.len() < 2 * self.min_samples_leaf {
            return node_index;
        }

        let Some(split) = self.best_split(indices, total, impurity, rng) else {
            return node_index;
        };

        self.importances[split.feature] += split.decrease;
        let feature = split.feature;
        indices.sort_by(|&a, &b| {
            self.features[a][feature]
                .partial_cmp(&self.features[b][feature])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let (left_indices, right_indices) = indices.split_at_mut(split.boundary);

        let left = self.grow(left_indices, depth + 1, rng);
        let right = self.grow(right_indices, depth + 1, rng);
        self.nodes[node_index] = Node::Split {
            feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_index
    }

    /// Best weighted-Gini split over a random subset of non-constant features.
    fn best_split(
        &self,
        indices: &[usize],
        total: f64,
        impurity: f64,
        rng: &mut StdRng,
    ) -> Option<SplitCandidate> {
        let width = self.features[indices[0]].len();
        let mut order: Vec<usize> = (0..width).collect();
        order.shuffle(rng);

        let (_, positive) = self.weight_totals(indices);
        let mut sorted = indices.to_vec();
        let mut best: Option<SplitCandidate> = None;
        let mut visited = 0;

        for feature in order {
            if visited >= self.max_features {
                break;
            }
            sorted.sort_by(|&a, &b| {
                self.features[a][feature]
                    .partial_cmp(&self.features[b][feature])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let lowest = self.features[sorted[0]][feature];
            let highest = self.features[sorted[sorted.len() - 1]][feature];
            if highest <= lowest {
                continue;
            }
            visited += 1;

            let mut left_total = 0.0;
            let mut left_positive = 0.0;

            for position in 1..sorted.len() {
                let previous = sorted[position - 1];
                left_total += self.weights[previous];
                if self.labels[previous] == 1 {
                    left_positive += self.weights[previous];
                }

                if position < self.min_samples_leaf || sorted.len() - position < self.min_samples_leaf {
                    continue;
                }
                let here = self.features[previous][feature];
                let next = self.features[sorted[position]][feature];
                if next <= here {
                    continue;
                }

                let right_total = total - left_total;
                let right_positive = positive - left_positive;
                let decrease = total * impurity
                    - left_total * gini(left_positive, left_total)
                    - right_total * gini(right_positive, right_total);

                if decrease > best.as_ref().map_or(0.0, |b| b.decrease) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        boundary: position,
                        decrease,
                    });
                }
            }
        }

        best
    }
}

/// Bagged ensemble of Gini decision trees.
#[derive(Debug, Clone)]
pub struct RandomForest {
    params: ForestParams,
    max_depth: usize,
    trees: Vec<Tree>,
    importances: Vec<f64>,
}

impl RandomForest {
    #[must_use]
    pub fn new(params: ForestParams, max_depth: usize) -> Self {
        Self {
            params,
            max_depth,
            trees: Vec::new(),
            importances: Vec::new(),
        }
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[u8], weights: &[f64]) -> Result<()> {
        let n = features.len();
        if n == 0 {
            bail!("Cannot fit a forest on zero rows");
        }
        if labels.len() != n || weights.len() != n {
            bail!("Forest inputs disagree in length");
        }
        let width = features[0].len();

        let class_weights = if self.params.balanced_class_weight {
            let positives = labels.iter().filter(|&&l| l == 1).count();
            let negatives = n - positives;
            #[allow(clippy::cast_precision_loss)]
            let balanced = |count: usize| if count == 0 { 0.0 } else { n as f64 / (2.0 * count as f64) };
            [balanced(negatives), balanced(positives)]
        } else {
            [1.0, 1.0]
        };
        let effective: Vec<f64> = weights
            .iter()
            .zip(labels)
            .map(|(w, &label)| w * class_weights[usize::from(label.min(1))])
            .collect();

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let max_features = ((width as f64).sqrt() as usize).max(1);

        // Tiny histories would otherwise never split.
        let min_samples_leaf = self.params.min_samples_leaf.min(n / 2).max(1);

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut importances = vec![0.0; width];
        self.trees.clear();

        for _ in 0..self.params.n_estimators {
            let mut counts = vec![0u32; n];
            for _ in 0..n {
                counts[rng.gen_range(0..n)] += 1;
            }
            let mut indices: Vec<usize> = (0..n).filter(|&i| counts[i] > 0).collect();

            let mut builder = TreeBuilder {
                features,
                labels,
                weights: effective
                    .iter()
                    .zip(&counts)
                    .map(|(w, &c)| w * f64::from(c))
                    .collect(),
                max_depth: self.max_depth,
                min_samples_leaf,
                max_features,
                nodes: Vec::new(),
                importances: vec![0.0; width],
            };
            builder.grow(&mut indices, 0, &mut rng);

            let tree_total: f64 = builder.importances.iter().sum();
            if tree_total > 0.0 {
                for (acc, value) in importances.iter_mut().zip(&builder.importances) {
                    *acc += value / tree_total;
                }
            }
            self.trees.push(Tree { nodes: builder.nodes });
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        self.importances = importances;

        trace!(
            "Fitted forest: {} trees, depth <= {}, {} features per split",
            self.trees.len(),
            self.max_depth,
            max_features
        );
        Ok(())
    }

    fn predict_probability(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.trees.len() as f64;
        self.trees.iter().map(|tree| tree.predict(features)).sum::<f64>() / n
    }

    fn feature_importances(&self) -> Option<&[f64]> {
        (!self.importances.is_empty()).then_some(self.importances.as_slice())
    }
}
