//! HTTP client for the analysis sandbox.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::constants;
use crate::error::{Error, Result};

use super::SandboxApi;

/// Sandbox server configuration.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub server_url: String,
    pub api_token: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            server_url: constants::get_sandbox_url(),
            api_token: constants::get_sandbox_token(),
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub tracking_id: u64,
}

#[derive(Debug, Deserialize)]
struct SubmitEnvelope {
    data: SubmitData,
}

#[derive(Debug, Deserialize)]
struct SubmitData {
    task_ids: Vec<u64>,
}

/// Sandbox API client.
#[derive(Clone)]
pub struct SandboxClient {
    config: SandboxConfig,
    http_client: reqwest::Client,
}

impl SandboxClient {
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::ExternalService(format!("http client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.header("Authorization", format!("Token {}", token)),
            None => request,
        }
    }
}

impl SandboxApi for SandboxClient {
    async fn submit_file(&self, path: &Path) -> Result<SubmitResponse> {
        let url = format!("{}/apiv2/tasks/create/file/", self.config.server_url);

        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "sample.bin".to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(filename));

        log::info!("Submitting {} to sandbox", path.display());

        let response = self
            .authorized(self.http_client.post(&url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::ExternalService(format!("submit: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::ExternalService(format!(
                "sandbox submit returned {}",
                response.status()
            )));
        }

        let envelope: SubmitEnvelope = response
            .json()
            .await
            .map_err(|e| Error::ExternalService(format!("submit response: {}", e)))?;

        let tracking_id = envelope
            .data
            .task_ids
            .first()
            .copied()
            .ok_or_else(|| Error::ExternalService("sandbox returned no task id".into()))?;

        log::info!("Sandbox accepted sample, tracking id {}", tracking_id);
        Ok(SubmitResponse { tracking_id })
    }

    async fn fetch_report(&self, tracking_id: u64) -> Result<Value> {
        let url = format!(
            "{}/apiv2/tasks/get/report/{}/json/",
            self.config.server_url, tracking_id
        );

        let response = self
            .authorized(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| Error::ExternalService(format!("fetch report: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::ExternalService(format!(
                "sandbox report fetch returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::ExternalService(format!("report body: {}", e)))
    }
}
