use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;

use super::{metadata_allowlisted_rows, output_path, ExportResult, Exporter};
use crate::error::PipelineError;
use crate::pipeline::row::Row;

pub struct JsonExporter {
    output_dir: PathBuf,
}

impl JsonExporter {
    #[must_use]
    pub fn new(output_dir: &Path) -> Self {
        Self { output_dir: output_dir.to_path_buf() }
    }
}

#[async_trait]
impl Exporter for JsonExporter {
    async fn export(&self, rows: &[Row], source_label: &str) -> Result<ExportResult, PipelineError> {
        if rows.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let data = metadata_allowlisted_rows(rows);
        let envelope = json!({
            "metadata": {
                "exported_at": chrono::Utc::now().to_rfc3339(),
                "total_records": data.len(),
                "source": source_label,
                "export_format": "json",
            },
            "data": data,
        });

        let path = output_path(&self.output_dir, source_label, "json");
        let parent = path.parent().map(Path::to_path_buf);
        let rendered = tokio::task::spawn_blocking(move || serde_json::to_string_pretty(&envelope))
            .await
            .map_err(|e| PipelineError::Export {
                format: "json".into(),
                source: std::io::Error::other(format!("serialization task panicked: {e}")),
            })??;

        if let Some(parent) = parent {
            tokio::fs::create_dir_all(&parent).await.map_err(|source| PipelineError::Export {
                format: "json".into(),
                source,
            })?;
        }

        tokio::fs::write(&path, rendered).await.map_err(|source| PipelineError::Export {
            format: "json".into(),
            source,
        })?;

        Ok(ExportResult::ok("json", data.len(), path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json as j;

    #[tokio::test]
    async fn exporting_empty_rows_is_an_error() {
        let exporter = JsonExporter::new(std::env::temp_dir().as_path());
        let result = exporter.export(&[], "test").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn exports_rows_to_a_json_file() {
        let dir = assert_fs::TempDir::new().unwrap();
        let exporter = JsonExporter::new(dir.path());
        let mut row = Row::new();
        row.insert("title", j!("Widget"));
        let result = exporter.export(&[row], "example.com").await.unwrap();
        assert!(result.success);
        assert_eq!(result.record_count, 1);

        let contents = tokio::fs::read_to_string(&result.destination).await.unwrap();
        assert!(contents.contains("\"data\""));
    }
}
