//! Export sinks: each format gets a small adapter behind a common
//! [`Exporter`] trait so the pipeline can fan rows out to all of them
//! concurrently.

pub mod csv;
pub mod excel;
pub mod json;
pub mod spreadsheet;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::pipeline::row::Row;

#[derive(Debug, Clone)]
pub struct ExportResult {
    pub format: &'static str,
    pub success: bool,
    pub record_count: usize,
    pub destination: String,
    pub error: Option<String>,
}

impl ExportResult {
    fn ok(format: &'static str, record_count: usize, destination: impl Into<String>) -> Self {
        Self { format, success: true, record_count, destination: destination.into(), error: None }
    }
}

#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, rows: &[Row], source_label: &str) -> Result<ExportResult, PipelineError>;
}

/// `iwsa_<sanitized source>_<YYYYMMDD_HHMMSS>.<ext>`, matching the naming
/// every file-based exporter uses so outputs from the same run are easy to
/// spot side by side.
pub(crate) fn generate_filename(source_label: &str, extension: &str) -> String {
    let sanitized = sanitize_filename::sanitize(source_label);
    let timestamp = timestamp_suffix();
    format!("iwsa_{sanitized}_{timestamp}.{extension}")
}

fn timestamp_suffix() -> String {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    let datetime = chrono::DateTime::from_timestamp(secs as i64, 0).unwrap_or(chrono::DateTime::UNIX_EPOCH);
    datetime.format("%Y%m%d_%H%M%S").to_string()
}

pub(crate) fn output_path(output_dir: &Path, source_label: &str, extension: &str) -> PathBuf {
    output_dir.join(generate_filename(source_label, extension))
}

pub(crate) fn metadata_allowlisted_rows(rows: &[Row]) -> Vec<serde_json::Map<String, serde_json::Value>> {
    rows.iter().map(Row::for_export).collect()
}
