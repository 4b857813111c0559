use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use super::{metadata_allowlisted_rows, output_path, ExportResult, Exporter};
use crate::error::PipelineError;
use crate::pipeline::row::Row;

pub struct CsvExporter {
    output_dir: PathBuf,
}

impl CsvExporter {
    #[must_use]
    pub fn new(output_dir: &Path) -> Self {
        Self { output_dir: output_dir.to_path_buf() }
    }
}

#[async_trait]
impl Exporter for CsvExporter {
    async fn export(&self, rows: &[Row], source_label: &str) -> Result<ExportResult, PipelineError> {
        if rows.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let data = metadata_allowlisted_rows(rows);
        let path = output_path(&self.output_dir, source_label, "csv");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|source| PipelineError::Export {
                format: "csv".into(),
                source,
            })?;
        }

        let record_count = data.len();
        let write_path = path.clone();
        tokio::task::spawn_blocking(move || write_csv(&write_path, &data))
            .await
            .map_err(|e| PipelineError::Export {
                format: "csv".into(),
                source: std::io::Error::other(format!("csv write task panicked: {e}")),
            })??;

        Ok(ExportResult::ok("csv", record_count, path.display().to_string()))
    }
}

fn write_csv(path: &Path, rows: &[serde_json::Map<String, Value>]) -> Result<(), PipelineError> {
    let mut headers: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }
    headers.sort();

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&headers)?;
    for row in rows {
        let record: Vec<String> = headers.iter().map(|h| scalar_to_string(row.get(h))).collect();
        writer.write_record(&record)?;
    }
    writer.flush().map_err(|e| PipelineError::Export {
        format: "csv".into(),
        source: std::io::Error::other(e),
    })?;
    Ok(())
}

fn scalar_to_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn exports_rows_with_a_sorted_header_row() {
        let dir = std::env::temp_dir().join(format!("iwsa_csv_test_{}", std::process::id()));
        let exporter = CsvExporter::new(&dir);
        let mut row = Row::new();
        row.insert("title", json!("Widget"));
        row.insert("price", json!("19.99"));
        let result = exporter.export(&[row], "example.com").await.unwrap();
        assert!(result.success);
        let contents = tokio::fs::read_to_string(&result.destination).await.unwrap();
        assert!(contents.starts_with("price,title"));
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
