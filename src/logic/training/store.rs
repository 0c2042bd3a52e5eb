//! Model artifact store.
//!
//! Every trained member persists as three files in the artifact
//! directory: `<name>.json` (the serialized parameters),
//! `<name>.fingerprint` (the training-corpus fingerprint) and
//! `<name>.checksum` (SHA-256 of the artifact bytes). The fitted
//! transformer persists the same way under `transformer`. Loading
//! verifies the checksum first; a mismatch is a stale artifact, not a
//! parse error.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::logic::features::FittedTransformer;
use crate::logic::model::{ModelKind, ModelParams};

use super::fingerprint::checksum;

const TRANSFORMER_NAME: &str = "transformer";

pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fingerprint recorded for a member, if it was ever trained.
    pub fn stored_fingerprint(&self, kind: ModelKind) -> Option<String> {
        let path = self.sidecar(kind.name(), "fingerprint");
        match fs::read_to_string(&path) {
            Ok(text) => Some(text.trim().to_string()),
            Err(_) => None,
        }
    }

    pub fn save_model(
        &self,
        params: &ModelParams,
        data_fingerprint: &str,
    ) -> Result<()> {
        self.save_artifact(params.kind().name(), params, Some(data_fingerprint))
    }

    pub fn load_model(&self, kind: ModelKind) -> Result<ModelParams> {
        let params: ModelParams = self.load_artifact(kind.name())?;
        if params.kind() != kind {
            return Err(Error::Storage(format!(
                "artifact '{}' holds a {} model",
                kind.name(),
                params.kind().name()
            )));
        }
        Ok(params)
    }

    pub fn save_transformer(
        &self,
        transformer: &FittedTransformer,
        data_fingerprint: &str,
    ) -> Result<()> {
        self.save_artifact(TRANSFORMER_NAME, transformer, Some(data_fingerprint))
    }

    pub fn load_transformer(&self) -> Result<FittedTransformer> {
        self.load_artifact(TRANSFORMER_NAME)
    }

    pub fn has_model(&self, kind: ModelKind) -> bool {
        self.artifact_path(kind.name()).exists()
    }

    /// Persist the combined training results next to the artifacts.
    pub fn write_results(&self, summary: &str) -> Result<()> {
        fs::write(self.dir.join("results.txt"), summary)?;
        Ok(())
    }

    fn save_artifact<T: Serialize>(
        &self,
        name: &str,
        value: &T,
        data_fingerprint: Option<&str>,
    ) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| Error::Storage(format!("serialize {}: {}", name, e)))?;

        fs::write(self.artifact_path(name), &bytes)?;
        fs::write(self.sidecar(name, "checksum"), checksum(&bytes))?;
        if let Some(fp) = data_fingerprint {
            fs::write(self.sidecar(name, "fingerprint"), fp)?;
        }
        debug!("saved artifact '{}' ({} bytes)", name, bytes.len());
        Ok(())
    }

    fn load_artifact<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.artifact_path(name);
        let bytes = fs::read(&path)
            .map_err(|e| Error::Storage(format!("read {}: {}", path.display(), e)))?;

        let expected = fs::read_to_string(self.sidecar(name, "checksum"))
            .map(|s| s.trim().to_string())
            .map_err(|e| Error::Storage(format!("read {} checksum: {}", name, e)))?;
        let actual = checksum(&bytes);
        if expected != actual {
            warn!("artifact '{}' checksum mismatch", name);
            return Err(Error::StaleArtifact {
                model: name.to_string(),
                expected,
                actual,
            });
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| Error::Storage(format!("parse {}: {}", name, e)))
    }

    fn artifact_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    fn sidecar(&self, name: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, ext))
    }
}
