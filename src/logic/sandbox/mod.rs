//! Sandbox integration.
//!
//! The analysis sandbox is an external HTTP service: samples are
//! submitted for detonation and full behavioural reports are fetched
//! back by tracking id. `SandboxApi` is the seam the orchestrator works
//! against; `SandboxClient` is the real HTTP implementation.

pub mod client;

use std::path::Path;

use serde_json::Value;

use crate::error::Result;

pub use client::{SandboxClient, SandboxConfig, SubmitResponse};

/// What the task orchestrator needs from a sandbox. Implementations
/// must be cheap to clone so submissions can run on spawned tasks.
pub trait SandboxApi: Clone + Send + Sync + 'static {
    /// Submit a sample file for detonation, returning its tracking id.
    fn submit_file(
        &self,
        path: &Path,
    ) -> impl std::future::Future<Output = Result<SubmitResponse>> + Send;

    /// Fetch the full analysis report for a tracking id.
    fn fetch_report(
        &self,
        tracking_id: u64,
    ) -> impl std::future::Future<Output = Result<Value>> + Send;
}
