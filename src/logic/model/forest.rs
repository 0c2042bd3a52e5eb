//! Bagged decision-tree classifier (the tree-ensemble member).
//!
//! Each tree trains on a seeded bootstrap sample and a random feature
//! subset per split; the ensemble probability is the mean of the leaf
//! values across trees. All randomness is seeded, so a given training
//! matrix always produces the same forest.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::ProbabilityModel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 30,
            max_depth: 6,
            min_samples_split: 4,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf(f32),
    Split {
        feature: usize,
        threshold: f32,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, features: &[f32]) -> f32 {
        match self {
            Self::Leaf(value) => *value,
            Self::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                let value = features.get(*feature).copied().unwrap_or(0.0);
                if value <= *threshold {
                    left.predict(features)
                } else {
                    right.predict(features)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestModel {
    config: ForestConfig,
    trees: Vec<Node>,
    trained: bool,
}

impl ForestModel {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            trained: false,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Fit on row-major features with labels in {0.0, 1.0}.
    pub fn fit(&mut self, features: &[Vec<f32>], labels: &[f32]) {
        if features.is_empty() || features.len() != labels.len() {
            return;
        }
        let n_features = features[0].len();
        self.trees.clear();

        for tree_idx in 0..self.config.n_trees {
            let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(tree_idx as u64));

            // Bootstrap sample with replacement.
            let indices: Vec<usize> = (0..features.len())
                .map(|_| rng.gen_range(0..features.len()))
                .collect();
            let sample: Vec<&[f32]> = indices.iter().map(|&i| features[i].as_slice()).collect();
            let sample_labels: Vec<f32> = indices.iter().map(|&i| labels[i]).collect();

            let tree = self.grow(&sample, &sample_labels, n_features, 0, &mut rng);
            self.trees.push(tree);
        }
        self.trained = true;
    }

    fn grow(
        &self,
        rows: &[&[f32]],
        labels: &[f32],
        n_features: usize,
        depth: usize,
        rng: &mut StdRng,
    ) -> Node {
        let leaf = Node::Leaf(mean(labels));
        if depth >= self.config.max_depth
            || rows.len() < self.config.min_samples_split
            || is_pure(labels)
        {
            return leaf;
        }

        // Random feature subset, roughly sqrt of the feature count.
        let subset_size = ((n_features as f32).sqrt().ceil() as usize).max(1);
        let candidates: Vec<usize> = (0..subset_size)
            .map(|_| rng.gen_range(0..n_features))
            .collect();

        let mut best: Option<(usize, f32, f32)> = None; // (feature, threshold, gain)
        for &feature in &candidates {
            let mut values: Vec<f32> = rows.iter().map(|r| r[feature]).collect();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            values.dedup();

            for pair in values.windows(2) {
                let threshold = (pair[0] + pair[1]) / 2.0;
                let mut left = Vec::new();
                let mut right = Vec::new();
                for (row, &label) in rows.iter().zip(labels.iter()) {
                    if row[feature] <= threshold {
                        left.push(label);
                    } else {
                        right.push(label);
                    }
                }
                if left.is_empty() || right.is_empty() {
                    continue;
                }

                let weight_l = left.len() as f32 / labels.len() as f32;
                let weight_r = right.len() as f32 / labels.len() as f32;
                let gain =
                    variance(labels) - (weight_l * variance(&left) + weight_r * variance(&right));
                if best.map(|(_, _, g)| gain > g).unwrap_or(gain > 1e-7) {
                    best = Some((feature, threshold, gain));
                }
            }
        }

        let Some((feature, threshold, _)) = best else {
            return leaf;
        };

        let mut left_rows = Vec::new();
        let mut left_labels = Vec::new();
        let mut right_rows = Vec::new();
        let mut right_labels = Vec::new();
        for (row, &label) in rows.iter().zip(labels.iter()) {
            if row[feature] <= threshold {
                left_rows.push(*row);
                left_labels.push(label);
            } else {
                right_rows.push(*row);
                right_labels.push(label);
            }
        }

        Node::Split {
            feature,
            threshold,
            left: Box::new(self.grow(&left_rows, &left_labels, n_features, depth + 1, rng)),
            right: Box::new(self.grow(&right_rows, &right_labels, n_features, depth + 1, rng)),
        }
    }
}

impl Default for ForestModel {
    fn default() -> Self {
        Self::new(ForestConfig::default())
    }
}

impl ProbabilityModel for ForestModel {
    fn name(&self) -> &'static str {
        "forest"
    }

    fn predict_proba(&self, features: &[f32]) -> f32 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.trees.iter().map(|t| t.predict(features)).sum();
        (sum / self.trees.len() as f32).clamp(0.0, 1.0)
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

fn variance(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f32>() / values.len() as f32
}

fn is_pure(labels: &[f32]) -> bool {
    labels.windows(2).all(|w| (w[0] - w[1]).abs() < 1e-7)
}
