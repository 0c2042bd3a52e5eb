//! Training orchestration.
//!
//! The controller owns the full train cycle: load labelled reports,
//! fit the transformer, build the design matrix, fingerprint the
//! corpus, then train each ensemble member whose stored fingerprint no
//! longer matches. Members trained on the current corpus are skipped
//! unless forced.

pub mod fingerprint;
pub mod metrics;
pub mod store;

use std::path::Path;

use log::info;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::logic::features::{extract, fit, FeatureRecord, FittedTransformer};
use crate::logic::model::{
    BoostModel, ForestModel, ModelKind, ModelParams, SequenceModel,
};
use crate::logic::report::load_labeled_dir;

pub use fingerprint::fingerprint as data_fingerprint;
pub use metrics::{evaluate, Metrics};
pub use store::ArtifactStore;

/// Fraction of the corpus held out for evaluation.
const HOLDOUT_FRACTION: f32 = 0.2;

/// Split seed, fixed so reruns evaluate on the same rows.
const SPLIT_SEED: u64 = 42;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberResult {
    pub kind: ModelKind,
    pub skipped: bool,
    pub metrics: Option<Metrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub fingerprint: String,
    pub samples: usize,
    pub features: usize,
    pub members: Vec<MemberResult>,
}

impl TrainingReport {
    pub fn summary(&self) -> String {
        let mut out = format!(
            "corpus: {} samples x {} features\nfingerprint: {}\n",
            self.samples, self.features, self.fingerprint
        );
        for member in &self.members {
            let status = if member.skipped { "up to date" } else { "trained" };
            match &member.metrics {
                Some(m) => out.push_str(&format!(
                    "{}: {} - accuracy {:.3} precision {:.3} recall {:.3}\n",
                    member.kind.name(),
                    status,
                    m.accuracy,
                    m.precision,
                    m.recall
                )),
                None => out.push_str(&format!("{}: {}\n", member.kind.name(), status)),
            }
        }
        out
    }
}

pub struct TrainingController {
    store: ArtifactStore,
}

impl TrainingController {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Train every stale member from a labelled report directory.
    pub fn ensure_trained(&self, dataset_dir: &Path, force: bool) -> Result<TrainingReport> {
        let labelled = load_labeled_dir(dataset_dir)?;
        info!("loaded {} labelled reports from {}", labelled.len(), dataset_dir.display());

        let records: Vec<FeatureRecord> =
            labelled.iter().map(|l| extract(&l.report)).collect();
        let labels: Vec<f32> = labelled.iter().map(|l| l.label as f32).collect();

        let transformer = fit(&records);
        let vectors = transformer.transform_all(&records)?;
        self.train_on_vectors(&transformer, vectors, labels, force)
    }

    /// Train from already-transformed vectors. Shared by tests and the
    /// report-directory entry point.
    pub fn train_on_vectors(
        &self,
        transformer: &FittedTransformer,
        vectors: Vec<Vec<f32>>,
        labels: Vec<f32>,
        force: bool,
    ) -> Result<TrainingReport> {
        if vectors.is_empty() {
            return Err(Error::Training("empty training corpus".into()));
        }
        let n_features = transformer.schema.len();
        let matrix = design_matrix(&vectors, n_features)?;
        let fp = data_fingerprint(&vectors, &labels);

        let (train_idx, holdout_idx) = split_indices(vectors.len());
        let train_x: Vec<Vec<f32>> = train_idx.iter().map(|&i| matrix.row(i).to_vec()).collect();
        let train_y: Vec<f32> = train_idx.iter().map(|&i| labels[i]).collect();
        let holdout_x: Vec<Vec<f32>> =
            holdout_idx.iter().map(|&i| matrix.row(i).to_vec()).collect();
        let holdout_y: Vec<f32> = holdout_idx.iter().map(|&i| labels[i]).collect();

        self.store.save_transformer(transformer, &fp)?;

        let holdout_metrics = |params: &ModelParams| {
            if holdout_x.is_empty() {
                return None;
            }
            let member = params.clone().into_member();
            let probs: Vec<f32> = holdout_x.iter().map(|v| member.predict_proba(v)).collect();
            Some(evaluate(&probs, &holdout_y))
        };

        let mut members = Vec::new();
        for kind in ModelKind::ALL {
            if !force {
                // A member trained on this exact corpus loads as-is;
                // its held-out metrics are still recomputed for the
                // report.
                if let Some(params) = self.load_fresh(kind, &fp) {
                    info!("{} model is current, skipping", kind.name());
                    members.push(MemberResult {
                        kind,
                        skipped: true,
                        metrics: holdout_metrics(&params),
                    });
                    continue;
                }
            }

            let params = train_member(kind, &train_x, &train_y);
            let metrics = holdout_metrics(&params);
            self.store.save_model(&params, &fp)?;
            info!("trained and saved {} model", kind.name());
            members.push(MemberResult {
                kind,
                skipped: false,
                metrics,
            });
        }

        let report = TrainingReport {
            fingerprint: fp,
            samples: vectors.len(),
            features: n_features,
            members,
        };
        self.store.write_results(&report.summary())?;
        Ok(report)
    }

    fn load_fresh(&self, kind: ModelKind, fp: &str) -> Option<ModelParams> {
        if self.store.stored_fingerprint(kind).as_deref() != Some(fp) {
            return None;
        }
        self.store.load_model(kind).ok()
    }
}

fn train_member(kind: ModelKind, features: &[Vec<f32>], labels: &[f32]) -> ModelParams {
    match kind {
        ModelKind::Forest => {
            let mut model = ForestModel::default();
            model.fit(features, labels);
            ModelParams::Forest(model)
        }
        ModelKind::Boost => {
            let mut model = BoostModel::default();
            model.fit(features, labels);
            ModelParams::Boost(model)
        }
        ModelKind::Sequence => {
            let mut model = SequenceModel::new();
            model.fit(features, labels);
            ModelParams::Sequence(model)
        }
    }
}

fn design_matrix(vectors: &[Vec<f32>], n_features: usize) -> Result<Array2<f32>> {
    let flat: Vec<f32> = vectors.iter().flatten().copied().collect();
    Array2::from_shape_vec((vectors.len(), n_features), flat)
        .map_err(|e| Error::Training(format!("ragged feature matrix: {}", e)))
}

/// Seeded shuffled 80/20 split. Corpora too small to hold anything out
/// train on everything.
fn split_indices(n: usize) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(SPLIT_SEED);
    indices.shuffle(&mut rng);

    let holdout = ((n as f32) * HOLDOUT_FRACTION) as usize;
    if holdout == 0 || holdout == n {
        return (indices, Vec::new());
    }
    let train = indices.split_off(holdout);
    (train, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::features::FeatureRecord;

    fn synthetic_corpus() -> (FittedTransformer, Vec<Vec<f32>>, Vec<f32>) {
        let mut records = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let malicious = i % 2 == 1;
            let mut record = FeatureRecord::new();
            record.push_number("size", if malicious { 900.0 } else { 100.0 });
            record.push_number("malscore", if malicious { 9.0 } else { 0.5 });
            record.push_number("behavior_process_count", i as f64 % 5.0);
            records.push(record);
            labels.push(if malicious { 1.0 } else { 0.0 });
        }
        let transformer = fit(&records);
        let vectors = transformer.transform_all(&records).unwrap();
        (transformer, vectors, labels)
    }

    #[test]
    fn test_trains_all_members_and_reports_metrics() {
        let tmp = tempfile::tempdir().unwrap();
        let controller = TrainingController::new(ArtifactStore::new(tmp.path()).unwrap());
        let (transformer, vectors, labels) = synthetic_corpus();

        let report = controller
            .train_on_vectors(&transformer, vectors, labels, false)
            .unwrap();
        assert_eq!(report.members.len(), 3);
        for member in &report.members {
            assert!(!member.skipped);
            assert!(member.metrics.is_some());
        }
        for kind in ModelKind::ALL {
            assert!(controller.store().has_model(kind));
        }
    }

    #[test]
    fn test_second_run_skips_fresh_members() {
        let tmp = tempfile::tempdir().unwrap();
        let controller = TrainingController::new(ArtifactStore::new(tmp.path()).unwrap());
        let (transformer, vectors, labels) = synthetic_corpus();

        controller
            .train_on_vectors(&transformer, vectors.clone(), labels.clone(), false)
            .unwrap();
        let second = controller
            .train_on_vectors(&transformer, vectors, labels, false)
            .unwrap();
        assert!(second.members.iter().all(|m| m.skipped));
    }

    #[test]
    fn test_force_retrains_fresh_members() {
        let tmp = tempfile::tempdir().unwrap();
        let controller = TrainingController::new(ArtifactStore::new(tmp.path()).unwrap());
        let (transformer, vectors, labels) = synthetic_corpus();

        controller
            .train_on_vectors(&transformer, vectors.clone(), labels.clone(), false)
            .unwrap();
        let forced = controller
            .train_on_vectors(&transformer, vectors, labels, true)
            .unwrap();
        assert!(forced.members.iter().all(|m| !m.skipped));
    }

    #[test]
    fn test_changed_corpus_retrains() {
        let tmp = tempfile::tempdir().unwrap();
        let controller = TrainingController::new(ArtifactStore::new(tmp.path()).unwrap());
        let (transformer, mut vectors, labels) = synthetic_corpus();

        controller
            .train_on_vectors(&transformer, vectors.clone(), labels.clone(), false)
            .unwrap();
        vectors[0][0] += 1.0;
        let rerun = controller
            .train_on_vectors(&transformer, vectors, labels, false)
            .unwrap();
        assert!(rerun.members.iter().all(|m| !m.skipped));
    }

    #[test]
    fn test_empty_corpus_is_a_training_error() {
        let tmp = tempfile::tempdir().unwrap();
        let controller = TrainingController::new(ArtifactStore::new(tmp.path()).unwrap());
        let (transformer, _, _) = synthetic_corpus();
        assert!(matches!(
            controller.train_on_vectors(&transformer, Vec::new(), Vec::new(), false),
            Err(Error::Training(_))
        ));
    }

    #[test]
    fn test_split_is_deterministic_and_disjoint() {
        let (a_train, a_hold) = split_indices(100);
        let (b_train, b_hold) = split_indices(100);
        assert_eq!(a_train, b_train);
        assert_eq!(a_hold, b_hold);
        assert_eq!(a_train.len() + a_hold.len(), 100);
        assert!(a_hold.iter().all(|i| !a_train.contains(i)));
    }
}
