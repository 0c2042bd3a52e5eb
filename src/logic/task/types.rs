//! Task lifecycle types.
//!
//! A task tracks one submitted sample from upload through its final
//! verdict. States move strictly forward:
//!
//!   Uploaded -> Processing -> Completed
//!                          -> Failed
//!
//! Completed and Failed are terminal. Writes against a terminal task
//! are ignored, never an error, so a duplicate sandbox callback cannot
//! corrupt a finished task. The store's state-guarded updates are the
//! single enforcement point for these rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::score::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(Self::Uploaded),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One tracked sample submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub filename: String,
    pub state: TaskState,
    /// Sandbox-side tracking id, set once submission succeeds.
    pub tracking_id: Option<u64>,
    pub verdict: Option<Verdict>,
    /// Failure reason, set only in the Failed state.
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            state: TaskState::Uploaded,
            tracking_id: None,
            verdict: None,
            reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}
