//! Ensemble members and the model registry.
//!
//! Every member exposes exactly one capability: given a transformed
//! numeric feature vector, return a probability in [0, 1] that the
//! sample is malicious. The three members are structurally different
//! (bagged trees, boosted stumps, a sequence scorer) but live behind
//! the same trait; the sequence member's reshaping is its own adapter
//! concern, invisible to callers.

pub mod boost;
pub mod forest;
pub mod sequence;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use boost::BoostModel;
pub use forest::ForestModel;
pub use sequence::SequenceModel;

/// The single capability shared by all ensemble members.
pub trait ProbabilityModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Probability of malicious, in [0, 1].
    fn predict_proba(&self, features: &[f32]) -> f32;
}

/// The three ensemble member kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    Forest,
    Boost,
    Sequence,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Forest, ModelKind::Boost, ModelKind::Sequence];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Forest => "forest",
            Self::Boost => "boost",
            Self::Sequence => "sequence",
        }
    }
}

/// Serializable parameters for one trained member, stored inside its
/// artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelParams {
    Forest(ForestModel),
    Boost(BoostModel),
    Sequence(SequenceModel),
}

impl ModelParams {
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Forest(_) => ModelKind::Forest,
            Self::Boost(_) => ModelKind::Boost,
            Self::Sequence(_) => ModelKind::Sequence,
        }
    }

    pub fn into_member(self) -> Box<dyn ProbabilityModel> {
        match self {
            Self::Forest(m) => Box::new(m),
            Self::Boost(m) => Box::new(m),
            Self::Sequence(m) => Box::new(m),
        }
    }
}

/// Per-member probabilities for one vector. A value exists for every
/// member or the prediction failed as a whole; no partial output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelProbabilities {
    pub forest: f32,
    pub boost: f32,
    pub sequence: f32,
}

/// Read-only registry of loaded members. Built once from persisted
/// artifacts; inference never mutates it.
pub struct Ensemble {
    members: Vec<Box<dyn ProbabilityModel>>,
}

impl Ensemble {
    pub fn new(members: Vec<Box<dyn ProbabilityModel>>) -> Self {
        Self { members }
    }

    /// Run every member over the identical vector.
    pub fn predict(&self, features: &[f32]) -> Result<ModelProbabilities> {
        let mut by_name: HashMap<&str, f32> = HashMap::new();
        for member in &self.members {
            by_name.insert(member.name(), member.predict_proba(features));
        }

        let get = |kind: ModelKind| -> Result<f32> {
            by_name.get(kind.name()).copied().ok_or_else(|| {
                Error::Training(format!("ensemble member '{}' is not loaded", kind.name()))
            })
        };

        Ok(ModelProbabilities {
            forest: get(ModelKind::Forest)?,
            boost: get(ModelKind::Boost)?,
            sequence: get(ModelKind::Sequence)?,
        })
    }

    pub fn member_names(&self) -> Vec<&'static str> {
        self.members.iter().map(|m| m.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, f32);

    impl ProbabilityModel for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }
        fn predict_proba(&self, _features: &[f32]) -> f32 {
            self.1
        }
    }

    #[test]
    fn test_predict_collects_all_members() {
        let ensemble = Ensemble::new(vec![
            Box::new(Fixed("forest", 0.9)),
            Box::new(Fixed("boost", 0.8)),
            Box::new(Fixed("sequence", 0.4)),
        ]);
        let probs = ensemble.predict(&[0.0; 4]).unwrap();
        assert_eq!(probs.forest, 0.9);
        assert_eq!(probs.boost, 0.8);
        assert_eq!(probs.sequence, 0.4);
    }

    #[test]
    fn test_missing_member_is_an_error_not_a_partial_result() {
        let ensemble = Ensemble::new(vec![
            Box::new(Fixed("forest", 0.9)),
            Box::new(Fixed("boost", 0.8)),
        ]);
        assert!(ensemble.predict(&[0.0; 4]).is_err());
    }
}
