//! Gradient-boosted stump classifier (the boosting member).
//!
//! A chain of depth-one trees fit to residuals, each on a seeded
//! subsample of rows. Predictions start from the base score (the
//! training label mean) and add every stump's contribution scaled by
//! the learning rate.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::ProbabilityModel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostConfig {
    pub n_rounds: usize,
    pub learning_rate: f32,
    pub subsample: f32,
    pub seed: u64,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            n_rounds: 60,
            learning_rate: 0.1,
            subsample: 0.8,
            seed: 42,
        }
    }
}

/// One depth-one tree: a single feature threshold with two output
/// values in residual space.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Stump {
    feature: usize,
    threshold: f32,
    left_value: f32,
    right_value: f32,
}

impl Stump {
    fn predict(&self, features: &[f32]) -> f32 {
        let value = features.get(self.feature).copied().unwrap_or(0.0);
        if value <= self.threshold {
            self.left_value
        } else {
            self.right_value
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostModel {
    config: BoostConfig,
    base_score: f32,
    stumps: Vec<Stump>,
    trained: bool,
}

impl BoostModel {
    pub fn new(config: BoostConfig) -> Self {
        Self {
            config,
            base_score: 0.0,
            stumps: Vec::new(),
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
        self.base_score = labels.iter().sum::<f32>() / labels.len() as f32;
        self.stumps.clear();

        let mut predictions = vec![self.base_score; labels.len()];
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        for _ in 0..self.config.n_rounds {
            let residuals: Vec<f32> = labels
                .iter()
                .zip(predictions.iter())
                .map(|(l, p)| l - p)
                .collect();

            let rows: Vec<usize> = (0..features.len())
                .filter(|_| rng.gen::<f32>() < self.config.subsample)
                .collect();
            if rows.len() < 2 {
                continue;
            }

            let Some(stump) = best_stump(features, &residuals, &rows, n_features) else {
                break;
            };

            for (pred, row) in predictions.iter_mut().zip(features.iter()) {
                *pred += self.config.learning_rate * stump.predict(row);
            }
            self.stumps.push(stump);
        }
        self.trained = true;
    }
}

/// Exhaustive search over all feature midpoints for the split with the
/// lowest squared residual error on the subsample.
fn best_stump(
    features: &[Vec<f32>],
    residuals: &[f32],
    rows: &[usize],
    n_features: usize,
) -> Option<Stump> {
    let mut best: Option<(Stump, f32)> = None;

    for feature in 0..n_features {
        let mut values: Vec<f32> = rows.iter().map(|&i| features[i][feature]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup();

        for pair in values.windows(2) {
            let threshold = (pair[0] + pair[1]) / 2.0;
            let mut left = Vec::new();
            let mut right = Vec::new();
            for &i in rows {
                if features[i][feature] <= threshold {
                    left.push(residuals[i]);
                } else {
                    right.push(residuals[i]);
                }
            }
            if left.is_empty() || right.is_empty() {
                continue;
            }

            let left_value = left.iter().sum::<f32>() / left.len() as f32;
            let right_value = right.iter().sum::<f32>() / right.len() as f32;
            let error: f32 = left.iter().map(|r| (r - left_value).powi(2)).sum::<f32>()
                + right.iter().map(|r| (r - right_value).powi(2)).sum::<f32>();

            if best.as_ref().map(|(_, e)| error < *e).unwrap_or(true) {
                best = Some((
                    Stump {
                        feature,
                        threshold,
                        left_value,
                        right_value,
                    },
                    error,
                ));
            }
        }
    }

    best.map(|(stump, _)| stump)
}

impl Default for BoostModel {
    fn default() -> Self {
        Self::new(BoostConfig::default())
    }
}

impl ProbabilityModel for BoostModel {
    fn name(&self) -> &'static str {
        "boost"
    }

    fn predict_proba(&self, features: &[f32]) -> f32 {
        let mut score = self.base_score;
        for stump in &self.stumps {
            score += self.config.learning_rate * stump.predict(features);
        }
        score.clamp(0.0, 1.0)
    }
}
