//! Crate-wide error types
//!
//! Each module exposes its own `thiserror` enum for the failures it can
//! produce; this module aggregates them into a single [`AppError`] that the
//! public API returns. `anyhow` is reserved for the binary entry point, where
//! error causes only need to be reported, not matched on.

use thiserror::Error;

/// Errors produced by the LLM strategy orchestrator (C1).
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("backend '{backend}' request failed: {source}")]
    Request {
        backend: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("backend '{backend}' returned HTTP {status}: {body}")]
    Http {
        backend: String,
        status: u16,
        body: String,
    },

    #[error("circuit open for backend '{backend}', retry after {retry_after_secs}s")]
    CircuitOpen {
        backend: String,
        retry_after_secs: u64,
    },

    #[error("strategy response was not valid JSON: {0}")]
    InvalidStrategyJson(String),

    #[error("strategy response missing required field '{0}'")]
    MissingStrategyField(String),

    #[error("no configured backend could service the request")]
    AllBackendsExhausted,

    #[error("local backend unavailable: {0}")]
    LocalUnavailable(String),
}

/// Errors produced by the adaptive scraping runtime (C2).
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("browser pool exhausted: {0} browsers in use, max {1}")]
    PoolExhausted(usize, usize),

    #[error("browser launch failed: {0}")]
    BrowserLaunch(#[from] anyhow::Error),

    #[error("navigation to '{url}' failed: {source}")]
    Navigation {
        url: String,
        #[source]
        source: chromiumoxide::error::CdpError,
    },

    #[error("page timed out waiting for '{step}' after {duration:?}")]
    Timeout {
        step: String,
        duration: std::time::Duration,
    },

    #[error("challenge detected on '{url}': {kind}")]
    ChallengeDetected { url: String, kind: String },

    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Distinguished from every other variant: the operation didn't fail, it
    /// was asked to stop.
    #[error("cancelled")]
    Cancelled,
}

/// Errors produced by the data-processing pipeline (C3).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("exporter '{format}' failed: {source}")]
    Export {
        format: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv serialization failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet write failed: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),

    #[error("spreadsheet-service request failed: {0}")]
    SpreadsheetService(#[from] reqwest::Error),

    #[error("invalid spreadsheet service credentials: {0}")]
    Credentials(String),

    #[error("row serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tabular sink error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("no rows to export")]
    EmptyInput,

    #[error("cancelled")]
    Cancelled,
}

/// Top-level error returned from the public API.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// True when this error represents a cooperative cancellation rather
    /// than a genuine failure — callers use this to choose the process
    /// exit code (130 vs. 1).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            AppError::Scrape(ScrapeError::Cancelled) | AppError::Pipeline(PipelineError::Cancelled)
        )
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
