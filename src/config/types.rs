//! Core configuration types for the agent: LLM backends, storage/export
//! settings, and scraping-runtime tuning, grouped into namespaces under
//! [`AppConfig`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which wire protocol a configured LLM backend speaks. The concrete request
/// framing for each is intentionally opaque here — building it is a vendor
/// integration concern, not part of orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// A locally-running model (e.g. an Ollama-compatible server).
    Local,
    /// A hosted chat-completion API.
    RemoteChat,
    /// A hosted, task-specific model endpoint (not a chat API).
    RemoteHostedModel,
}

/// One configured LLM backend in the priority fan-out list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub kind: BackendKind,
    /// Base URL for remote backends. Ignored for `Local`.
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the API key, if any.
    pub api_key_env: Option<String>,
    /// Lower values are tried first; ties broken by declaration order.
    pub priority: u8,
    pub rate_limit_rps: f64,
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_retry_delay_secs: u64,
    pub request_timeout_secs: u64,
}

/// C1 configuration: the set of backends to fan out to and shared tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub backends: Vec<BackendConfig>,
    /// How long a generated strategy may be reused for the same (domain, task) pair.
    pub strategy_cache_ttl_secs: u64,
    /// When true, the `Local` backend returns a canned strategy instead of
    /// calling out to a real model — used for tests and offline development.
    pub local_mock_mode: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backends: Vec::new(),
            strategy_cache_ttl_secs: 3600,
            local_mock_mode: false,
        }
    }
}

/// Anti-detection pacing profile, from least to most conservative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingProfile {
    Aggressive,
    Balanced,
    Conservative,
    Stealth,
}

impl Default for PacingProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

/// C2 configuration: browser pool sizing, anti-detection, and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    pub headless: bool,
    pub min_pool_size: usize,
    pub max_pool_size: usize,
    /// Evict a pooled browser after this many requests even if it's healthy.
    pub max_browser_requests: u32,
    /// Evict a pooled browser once it has been alive this long, regardless of use.
    pub max_browser_age_secs: u64,
    pub pacing_profile: PacingProfile,
    pub max_concurrent_browsers: usize,
    pub page_load_timeout_secs: u64,
    pub navigation_timeout_secs: u64,
    pub max_page_retries: u8,
    /// Maximum sessions retained by the session manager's LRU before eviction.
    pub max_sessions: usize,
    pub session_idle_timeout_secs: u64,
    pub session_max_age_secs: u64,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            headless: true,
            min_pool_size: 2,
            max_pool_size: 10,
            max_browser_requests: 100,
            max_browser_age_secs: 1800,
            pacing_profile: PacingProfile::Balanced,
            max_concurrent_browsers: 5,
            page_load_timeout_secs: 30,
            navigation_timeout_secs: 30,
            max_page_retries: 3,
            max_sessions: 50,
            session_idle_timeout_secs: 900,
            session_max_age_secs: 28_800,
        }
    }
}

/// What tabular sinks the pipeline should export finished rows to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Json,
    Excel,
    Spreadsheet,
}

/// C3 configuration: where output lands and in what formats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    pub export_formats: Vec<ExportFormat>,
    /// `sqlx` connection string for the durable tabular sink (row persistence
    /// layout: one document per extracted row, indexed by source URL and
    /// extraction time). `"sqlite::memory:"` is valid for tests.
    pub document_store_uri: String,
    /// Base64-encoded service-account JSON, required only when
    /// `ExportFormat::Spreadsheet` is requested.
    pub spreadsheet_credentials_b64: Option<String>,
}

impl StorageConfig {
    pub(crate) fn new_for_builder(output_dir: PathBuf) -> Self {
        let document_store_uri = format!("sqlite://{}", output_dir.join("iwsa.sqlite").display());
        Self {
            output_dir,
            export_formats: vec![ExportFormat::Json, ExportFormat::Csv],
            document_store_uri,
            spreadsheet_credentials_b64: None,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub scraping: ScrapingConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    #[must_use]
    pub fn builder() -> super::builder::AppConfigBuilder<()> {
        super::builder::AppConfigBuilder::default()
    }
}
