//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.

/// Default sandbox server URL
///
/// Fallback when no environment variable is set.
pub const DEFAULT_SANDBOX_URL: &str = "http://localhost:8000";

/// Default artifact directory for trained models
pub const DEFAULT_ARTIFACT_DIR: &str = "artifacts";

/// Default task database file
pub const DEFAULT_TASK_DB: &str = "tasks.db";

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "malscan";

/// Get sandbox server URL from environment or use default
pub fn get_sandbox_url() -> String {
    std::env::var("MALSCAN_SANDBOX_URL").unwrap_or_else(|_| DEFAULT_SANDBOX_URL.to_string())
}

/// Get sandbox API token from environment, if set
pub fn get_sandbox_token() -> Option<String> {
    std::env::var("MALSCAN_SANDBOX_TOKEN").ok()
}

/// Get artifact directory from environment or use default
pub fn get_artifact_dir() -> String {
    std::env::var("MALSCAN_ARTIFACT_DIR").unwrap_or_else(|_| DEFAULT_ARTIFACT_DIR.to_string())
}

/// Get task database path from environment or use default
pub fn get_task_db() -> String {
    std::env::var("MALSCAN_TASK_DB").unwrap_or_else(|_| DEFAULT_TASK_DB.to_string())
}

/// Processing-expiry sweep threshold in seconds, 0 disables the sweep
pub fn get_processing_expiry_secs() -> u64 {
    std::env::var("MALSCAN_PROCESSING_EXPIRY_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}
