//! Credential loading and runtime settings.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;

/// Default Datadog API root. Version segments are appended to this.
pub const DEFAULT_BASE_URL: &str = "https://api.datadoghq.com/api/";

/// Environment variable holding the JSON credential array.
pub const CREDENTIALS_ENV: &str = "DATADOG_CREDENTIALS";

/// One organization's static API credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct Credential {
    #[serde(rename = "appKey")]
    pub app_key: String,
    #[serde(rename = "apiKey")]
    pub api_key: String,
    #[serde(rename = "org")]
    pub organization: String,
}

impl Credential {
    /// Both keys must be present before a transport is built for the org.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.app_key.is_empty()
    }
}

/// Versioned API roots derived from the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiUrls {
    pub v1: String,
    pub v2: String,
}

impl ApiUrls {
    #[must_use]
    pub fn from_base(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            v1: format!("{base}/v1"),
            v2: format!("{base}/v2"),
        }
    }
}

/// Runtime knobs shared by every organization in a run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// API root; v1/v2 segments are appended.
    pub base_url: String,
    /// Steady-state request budget per second.
    pub requests_per_second: usize,
    /// Maximum 429 retries per request before giving up.
    pub max_rate_limit_retries: u32,
    /// Trailing window for the active metric listing. Never unbounded; the
    /// listing endpoint requires a starting timestamp.
    pub metrics_window_days: i64,
    /// Trailing window for the related-assets tag listing.
    pub related_window_seconds: u64,
    /// Concurrent dashboard detail fetches.
    pub dashboard_concurrency: usize,
    /// Log decisions without deleting or writing tag configurations.
    pub dry_run: bool,
}

/// Parse the credential array from the environment.
///
/// A missing or malformed value is a fatal startup error; an empty array is
/// valid and means there is nothing to do.
///
/// # Errors
///
/// Returns an error if `DATADOG_CREDENTIALS` is unset or is not a JSON
/// array of `{appKey, apiKey, org}` objects.
pub fn credentials_from_env() -> Result<Vec<Credential>> {
    let raw = env::var(CREDENTIALS_ENV)
        .with_context(|| format!("{CREDENTIALS_ENV} environment variable is not set"))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {CREDENTIALS_ENV} as a JSON credential array"))
}
