use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rust_xlsxwriter::{Color, Format, Workbook};
use serde_json::Value;

use super::{metadata_allowlisted_rows, output_path, ExportResult, Exporter};
use crate::error::PipelineError;
use crate::pipeline::row::Row;

const MAX_COLUMN_WIDTH: f64 = 50.0;

pub struct ExcelExporter {
    output_dir: PathBuf,
}

impl ExcelExporter {
    #[must_use]
    pub fn new(output_dir: &Path) -> Self {
        Self { output_dir: output_dir.to_path_buf() }
    }
}

#[async_trait]
impl Exporter for ExcelExporter {
    async fn export(&self, rows: &[Row], source_label: &str) -> Result<ExportResult, PipelineError> {
        if rows.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let data = metadata_allowlisted_rows(rows);
        let path = output_path(&self.output_dir, source_label, "xlsx");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|source| PipelineError::Export {
                format: "excel".into(),
                source,
            })?;
        }

        let record_count = data.len();
        let write_path = path.clone();
        tokio::task::spawn_blocking(move || write_workbook(&write_path, &data))
            .await
            .map_err(|e| PipelineError::Export {
                format: "excel".into(),
                source: std::io::Error::other(format!("workbook write task panicked: {e}")),
            })??;

        Ok(ExportResult::ok("excel", record_count, path.display().to_string()))
    }
}

fn write_workbook(path: &Path, rows: &[serde_json::Map<String, Value>]) -> Result<(), PipelineError> {
    let mut headers: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }
    headers.sort();

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    let header_format = Format::new().set_bold().set_background_color(Color::RGB(0xD9E1F2));
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, header, &header_format)?;
    }

    for (row_idx, row) in rows.iter().enumerate() {
        for (col, header) in headers.iter().enumerate() {
            let text = scalar_to_string(row.get(header));
            sheet.write_string((row_idx + 1) as u32, col as u16, &text)?;
        }
    }

    for (col, header) in headers.iter().enumerate() {
        let widest = rows
            .iter()
            .map(|r| scalar_to_string(r.get(header)).len())
            .max()
            .unwrap_or(0)
            .max(header.len());
        let width = (widest as f64 + 2.0).min(MAX_COLUMN_WIDTH);
        sheet.set_column_width(col as u16, width)?;
    }

    workbook.save(path)?;
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
    async fn exports_rows_to_a_workbook_file() {
        let dir = std::env::temp_dir().join(format!("iwsa_excel_test_{}", std::process::id()));
        let exporter = ExcelExporter::new(&dir);
        let mut row = Row::new();
        row.insert("title", json!("Widget"));
        let result = exporter.export(&[row], "example.com").await.unwrap();
        assert!(result.success);
        assert!(tokio::fs::metadata(&result.destination).await.is_ok());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
