//! Central error taxonomy.
//!
//! Extraction and transformation never fail on missing data; everything
//! that does fail ends up here and propagates to the task orchestrator,
//! which is the single place that turns an error into a `Failed` task.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Report could not be parsed, or parsed to something that is not
    /// a JSON object. Fatal for that report.
    MalformedReport(String),

    /// The aligned vector length does not match the schema. This is a
    /// programming-error signal, never a runtime-data signal.
    SchemaMismatch { expected: usize, actual: usize },

    /// Sandbox / network failure. Fatal per attempt, no internal retry.
    ExternalService(String),

    /// Artifact bytes on disk do not match their recorded checksum.
    /// Forces retraining before further inference.
    StaleArtifact { model: String, expected: String, actual: String },

    /// Task store / artifact store I/O.
    Storage(String),

    /// Model fitting failed (empty matrix, degenerate labels, ...).
    Training(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedReport(msg) => write!(f, "Malformed report: {}", msg),
            Self::SchemaMismatch { expected, actual } => {
                write!(f, "Schema mismatch: expected {} columns, got {}", expected, actual)
            }
            Self::ExternalService(msg) => write!(f, "External service error: {}", msg),
            Self::StaleArtifact { model, expected, actual } => write!(
                f,
                "Stale artifact for '{}': checksum {} != recorded {}",
                model, actual, expected
            ),
            Self::Storage(msg) => write!(f, "Storage error: {}", msg),
            Self::Training(msg) => write!(f, "Training error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedReport(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::ExternalService(err.to_string())
    }
}
