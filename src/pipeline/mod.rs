//! C3: the data-processing pipeline. Raw extracted rows are cleaned,
//! validated, enriched, then fanned out to the configured exporters.

pub mod cleaner;
pub mod enricher;
pub mod exporters;
pub mod row;
pub mod validator;

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::{ExportFormat, StorageConfig};
use crate::error::PipelineError;
use crate::storage::{StorageStats, TabularSink};
use exporters::{ExportResult, Exporter};
use row::Row;

/// Per-stage counters produced by each of the cleaning/validation/enrichment
/// passes. Mirrors the shape of the corresponding Python dataclass: running
/// totals plus a capped tail of error messages, not a full audit log.
#[derive(Debug, Clone, Default)]
pub struct ProcessingStats {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub modifications: usize,
    pub time: Duration,
    pub errors: Vec<String>,
}

const MAX_STAGE_ERRORS: usize = 10;

impl ProcessingStats {
    pub fn push_error(&mut self, err: impl ToString) {
        if self.errors.len() >= MAX_STAGE_ERRORS {
            self.errors.remove(0);
        }
        self.errors.push(err.to_string());
    }
}

/// Outcome of a full `process_and_export` run.
#[derive(Debug, Default)]
pub struct PipelineResult {
    pub success: bool,
    pub total_input_records: usize,
    pub total_output_records: usize,
    pub cleaning_stats: ProcessingStats,
    pub validation_stats: ProcessingStats,
    pub enrichment_stats: ProcessingStats,
    /// `None` when the tabular sink connection itself failed; a row-storage
    /// failure doesn't abort the run, only fails the corresponding count.
    pub storage_stats: Option<StorageStats>,
    pub export_results: Vec<ExportResult>,
    pub pipeline_time: Duration,
    pub errors: Vec<String>,
}

impl PipelineResult {
    fn add_error(&mut self, err: impl ToString) {
        self.errors.push(err.to_string());
    }
}

pub struct Pipeline {
    storage: StorageConfig,
}

impl Pipeline {
    #[must_use]
    pub fn new(storage: StorageConfig) -> Self {
        Self { storage }
    }

    /// Runs every row through clean -> validate -> enrich, then exports the
    /// survivors to every requested format concurrently. Overall success
    /// requires at least one output record and at least one export to
    /// succeed; a stage that produces zero rows short-circuits the rest.
    pub async fn process_and_export(
        &self,
        rows: Vec<Row>,
        formats: &[ExportFormat],
    ) -> Result<PipelineResult, PipelineError> {
        let start = Instant::now();
        let mut result = PipelineResult { total_input_records: rows.len(), ..PipelineResult::default() };

        if rows.is_empty() {
            result.add_error("no rows to process");
            result.pipeline_time = start.elapsed();
            return Ok(result);
        }

        let (cleaned, cleaning_stats) = cleaner::clean_rows(rows);
        result.cleaning_stats = cleaning_stats;

        let (validated, validation_stats) = validator::validate_rows(cleaned);
        result.validation_stats = validation_stats;

        let (enriched, enrichment_stats) = enricher::enrich_rows(validated);
        result.enrichment_stats = enrichment_stats;

        if enriched.is_empty() {
            result.add_error("no data survived the processing pipeline");
            result.pipeline_time = start.elapsed();
            return Ok(result);
        }

        result.total_output_records = enriched.len();

        match self.store_rows(&enriched).await {
            Ok(stats) => {
                if stats.failed_count > 0 {
                    warn!(failed = stats.failed_count, total = stats.total_documents, "some rows failed to persist");
                }
                result.storage_stats = Some(stats);
            }
            Err(err) => warn!(error = %err, "tabular sink unavailable, continuing without row persistence"),
        }

        let formats = if formats.is_empty() { &[ExportFormat::Json][..] } else { formats };
        let exports = self.export_all(&enriched, formats).await;
        for export in exports {
            match export {
                Ok(outcome) => result.export_results.push(outcome),
                Err(err) => result.add_error(format!("export failed: {err}")),
            }
        }

        result.success = result.total_output_records > 0
            && result.errors.is_empty()
            && result.export_results.iter().any(|e| e.success);

        result.pipeline_time = start.elapsed();

        info!(
            success = result.success,
            input = result.total_input_records,
            output = result.total_output_records,
            exports_ok = result.export_results.iter().filter(|e| e.success).count(),
            elapsed_ms = result.pipeline_time.as_millis() as u64,
            "pipeline run complete"
        );

        Ok(result)
    }

    /// Persists the processed rows to the tabular sink before export. A
    /// fresh connection per run keeps `Pipeline` cheap to construct; SQLite
    /// pooling makes repeated connects to the same file/URI inexpensive.
    async fn store_rows(&self, rows: &[Row]) -> Result<StorageStats, PipelineError> {
        let sink = TabularSink::connect(&self.storage.document_store_uri).await?;
        sink.store_rows(rows, &HashMap::new()).await
    }

    async fn export_all(
        &self,
        rows: &[Row],
        formats: &[ExportFormat],
    ) -> Vec<Result<ExportResult, PipelineError>> {
        let output_dir: &Path = self.storage.output_dir.as_path();
        let tasks = formats.iter().map(|format| {
            let rows = rows.to_vec();
            let storage = self.storage.clone();
            let format = *format;
            async move {
                let exporter: Box<dyn Exporter> = match format {
                    ExportFormat::Csv => Box::new(exporters::csv::CsvExporter::new(output_dir)),
                    ExportFormat::Json => Box::new(exporters::json::JsonExporter::new(output_dir)),
                    ExportFormat::Excel => Box::new(exporters::excel::ExcelExporter::new(output_dir)),
                    ExportFormat::Spreadsheet => {
                        Box::new(exporters::spreadsheet::SpreadsheetExporter::new(&storage)?)
                    }
                };
                exporter.export(&rows, "scrape").await
            }
        });

        let results = futures::future::join_all(tasks).await;
        for outcome in &results {
            if let Err(err) = outcome {
                warn!(error = %err, "export task failed");
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_row() -> Row {
        let mut row = Row::new();
        row.insert("title", json!("Widget"));
        row.insert("price", json!("$19.99"));
        row.insert("_source_url", json!("https://example.com/widget"));
        row
    }

    #[tokio::test]
    async fn empty_input_short_circuits_with_no_success() {
        let pipeline = Pipeline::new(StorageConfig::new_for_builder(std::env::temp_dir()));
        let result = pipeline.process_and_export(vec![], &[ExportFormat::Json]).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.total_input_records, 0);
    }

    #[tokio::test]
    async fn stats_are_populated_for_nonempty_input() {
        let pipeline = Pipeline::new(StorageConfig::new_for_builder(std::env::temp_dir()));
        let result = pipeline.process_and_export(vec![sample_row()], &[ExportFormat::Json]).await.unwrap();
        assert_eq!(result.cleaning_stats.total, 1);
        assert_eq!(result.validation_stats.total, 1);
        assert_eq!(result.enrichment_stats.total, 1);
    }

    #[tokio::test]
    async fn rows_that_survive_enrichment_land_in_the_tabular_sink() {
        let mut storage = StorageConfig::new_for_builder(std::env::temp_dir());
        storage.document_store_uri = "sqlite::memory:".to_string();
        let pipeline = Pipeline::new(storage);
        let result = pipeline.process_and_export(vec![sample_row()], &[ExportFormat::Json]).await.unwrap();
        let storage_stats = result.storage_stats.expect("tabular sink should have been reachable");
        assert_eq!(storage_stats.total_documents, 1);
        assert_eq!(storage_stats.stored_count, 1);
    }
}
