//! Verdict aggregation.
//!
//! Member probabilities fold into a single 0-10 score:
//!
//!   score = round(((forest + boost + 1) / 3) * 10, 1 decimal)
//!
//! The sequence member does not enter the numeric score; it is carried
//! in the verdict and in the hybrid probability (the plain mean of all
//! three members). A sample is labelled malicious when the score
//! exceeds 5.0.

use serde::{Deserialize, Serialize};

use super::model::ModelProbabilities;

/// Score threshold above which a sample is labelled malicious.
pub const MALICIOUS_THRESHOLD: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Clean,
    Malicious,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "Clean",
            Self::Malicious => "Malicious",
        }
    }
}

/// The final classification output for one sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub score: f32,
    pub label: Label,
    pub probabilities: ModelProbabilities,
    /// Plain mean of all three member probabilities.
    pub hybrid: f32,
}

/// Fold member probabilities into the final verdict.
pub fn aggregate(probabilities: ModelProbabilities) -> Verdict {
    let raw = ((probabilities.forest + probabilities.boost + 1.0) / 3.0) * 10.0;
    let score = (raw * 10.0).round() / 10.0;
    let hybrid =
        (probabilities.forest + probabilities.boost + probabilities.sequence) / 3.0;

    Verdict {
        score,
        label: if score > MALICIOUS_THRESHOLD {
            Label::Malicious
        } else {
            Label::Clean
        },
        probabilities,
        hybrid,
    }
}

impl Verdict {
    /// Human-readable block for logs and CLI output.
    pub fn summary(&self) -> String {
        format!(
            "label: {}\nscore: {:.1}/10\nforest: {:.3}\nboost: {:.3}\nsequence: {:.3}\nhybrid: {:.3}",
            self.label.as_str(),
            self.score,
            self.probabilities.forest,
            self.probabilities.boost,
            self.probabilities.sequence,
            self.hybrid,
        )
    }
}
