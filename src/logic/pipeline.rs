//! End-to-end scoring pipeline.
//!
//! Loads the fitted transformer and all three trained members from the
//! artifact store once, then scores any number of reports: extract,
//! transform, predict with every member, aggregate into a verdict.

use log::info;

use crate::error::Result;
use crate::logic::features::{extract, FittedTransformer};
use crate::logic::model::{Ensemble, ModelKind};
use crate::logic::report::Report;
use crate::logic::score::{aggregate, Verdict};
use crate::logic::training::ArtifactStore;

pub struct ScoringPipeline {
    transformer: FittedTransformer,
    ensemble: Ensemble,
}

impl ScoringPipeline {
    /// Load every artifact the pipeline needs. Fails when any member is
    /// missing or stale; a partial ensemble never scores.
    pub fn load(store: &ArtifactStore) -> Result<Self> {
        let transformer = store.load_transformer()?;

        let mut members = Vec::with_capacity(ModelKind::ALL.len());
        for kind in ModelKind::ALL {
            members.push(store.load_model(kind)?.into_member());
        }
        let ensemble = Ensemble::new(members);

        info!(
            "Scoring pipeline loaded ({} feature columns, members: {:?})",
            transformer.schema.len(),
            ensemble.member_names()
        );
        Ok(Self {
            transformer,
            ensemble,
        })
    }

    pub fn new(transformer: FittedTransformer, ensemble: Ensemble) -> Self {
        Self {
            transformer,
            ensemble,
        }
    }

    /// Score one sandbox report.
    pub fn score_report(&self, report: &Report) -> Result<Verdict> {
        let record = extract(report);
        let vector = self.transformer.transform(&record)?;
        let probabilities = self.ensemble.predict(&vector)?;
        Ok(aggregate(probabilities))
    }
}
