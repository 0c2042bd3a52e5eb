//! Evaluation metrics over a held-out split.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positive: usize,
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f32,
    pub precision: f32,
    pub recall: f32,
    pub confusion: ConfusionMatrix,
}

/// Compute binary metrics from probabilities against {0, 1} labels,
/// thresholding at 0.5. Undefined ratios (no positive predictions, no
/// positive labels) report as 0.
pub fn evaluate(probabilities: &[f32], labels: &[f32]) -> Metrics {
    let mut confusion = ConfusionMatrix::default();
    for (p, l) in probabilities.iter().zip(labels.iter()) {
        let predicted = *p >= 0.5;
        let actual = *l >= 0.5;
        match (predicted, actual) {
            (true, true) => confusion.true_positive += 1,
            (false, false) => confusion.true_negative += 1,
            (true, false) => confusion.false_positive += 1,
            (false, true) => confusion.false_negative += 1,
        }
    }

    let total = probabilities.len();
    let accuracy = if total == 0 {
        0.0
    } else {
        (confusion.true_positive + confusion.true_negative) as f32 / total as f32
    };
    let precision = ratio(
        confusion.true_positive,
        confusion.true_positive + confusion.false_positive,
    );
    let recall = ratio(
        confusion.true_positive,
        confusion.true_positive + confusion.false_negative,
    );

    Metrics {
        accuracy,
        precision,
        recall,
        confusion,
    }
}

fn ratio(numerator: usize, denominator: usize) -> f32 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f32 / denominator as f32
    }
}
