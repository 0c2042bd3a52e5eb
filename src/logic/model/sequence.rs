//! Sequence scorer (the third ensemble member).
//!
//! The flat feature vector is padded and reshaped into fixed-width
//! steps, forming a short trajectory. Training computes a per-class
//! mean trajectory; inference scores a sample by its relative distance
//! to the clean and malicious centroids. The reshape is internal; the
//! member takes the same flat vector as every other member.

use serde::{Deserialize, Serialize};

use super::ProbabilityModel;

/// Width of each trajectory step.
pub const STEP_WIDTH: usize = 16;

const EPS: f32 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceModel {
    step_width: usize,
    n_steps: usize,
    clean_centroid: Vec<f32>,
    malicious_centroid: Vec<f32>,
    trained: bool,
}

impl SequenceModel {
    pub fn new() -> Self {
        Self {
            step_width: STEP_WIDTH,
            n_steps: 0,
            clean_centroid: Vec::new(),
            malicious_centroid: Vec::new(),
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
        self.n_steps = (features[0].len() + self.step_width - 1) / self.step_width;
        let width = self.n_steps * self.step_width;

        let reshaped: Vec<Vec<f32>> = features.iter().map(|f| self.pad(f, width)).collect();

        let overall = centroid(reshaped.iter(), width);
        let clean: Vec<&Vec<f32>> = reshaped
            .iter()
            .zip(labels.iter())
            .filter(|(_, &l)| l < 0.5)
            .map(|(r, _)| r)
            .collect();
        let malicious: Vec<&Vec<f32>> = reshaped
            .iter()
            .zip(labels.iter())
            .filter(|(_, &l)| l >= 0.5)
            .map(|(r, _)| r)
            .collect();

        // A class absent from training falls back to the overall mean,
        // which pushes its distance term toward indifference.
        self.clean_centroid = if clean.is_empty() {
            overall.clone()
        } else {
            centroid(clean.into_iter(), width)
        };
        self.malicious_centroid = if malicious.is_empty() {
            overall
        } else {
            centroid(malicious.into_iter(), width)
        };
        self.trained = true;
    }

    fn pad(&self, features: &[f32], width: usize) -> Vec<f32> {
        let mut padded = features.to_vec();
        padded.truncate(width);
        padded.resize(width, 0.0);
        padded
    }
}

impl Default for SequenceModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbabilityModel for SequenceModel {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn predict_proba(&self, features: &[f32]) -> f32 {
        if !self.trained {
            return 0.0;
        }
        let width = self.n_steps * self.step_width;
        let padded = self.pad(features, width);

        let d_clean = distance(&padded, &self.clean_centroid);
        let d_mal = distance(&padded, &self.malicious_centroid);
        // Near the malicious centroid the ratio approaches 1.
        d_clean / (d_clean + d_mal + EPS)
    }
}

fn centroid<'a>(rows: impl Iterator<Item = &'a Vec<f32>>, width: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; width];
    let mut count = 0usize;
    for row in rows {
        for (acc, v) in sum.iter_mut().zip(row.iter()) {
            *acc += v;
        }
        count += 1;
    }
    if count > 0 {
        for v in &mut sum {
            *v /= count as f32;
        }
    }
    sum
}

fn distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable_data() -> (Vec<Vec<f32>>, Vec<f32>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..30 {
            let base = if i % 2 == 0 { 0.0 } else { 1.0 };
            features.push(vec![base; 20]);
            labels.push(base);
        }
        (features, labels)
    }

    #[test]
    fn test_fit_separates_clusters() {
        let (features, labels) = separable_data();
        let mut model = SequenceModel::new();
        model.fit(&features, &labels);
        assert!(model.is_trained());

        assert!(model.predict_proba(&vec![0.0; 20]) < 0.5);
        assert!(model.predict_proba(&vec![1.0; 20]) > 0.5);
    }

    #[test]
    fn test_short_vector_is_padded() {
        let (features, labels) = separable_data();
        let mut model = SequenceModel::new();
        model.fit(&features, &labels);

        // 5 values instead of 20; still scores without panicking.
        let p = model.predict_proba(&[1.0, 1.0, 1.0, 1.0, 1.0]);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn test_single_class_training_stays_indifferent() {
        let features = vec![vec![0.5; 20]; 10];
        let labels = vec![1.0; 10];
        let mut model = SequenceModel::new();
        model.fit(&features, &labels);

        // Clean centroid fell back to the overall mean, so both
        // distance terms match and the ratio sits at one half.
        let p = model.predict_proba(&vec![0.5; 20]);
        assert!((p - 0.5).abs() < 0.1 || p <= 0.5);
    }

    #[test]
    fn test_untrained_returns_zero() {
        let model = SequenceModel::new();
        assert_eq!(model.predict_proba(&[0.3; 8]), 0.0);
    }
}
