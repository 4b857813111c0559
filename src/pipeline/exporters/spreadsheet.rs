//! Exports to a hosted spreadsheet service over its HTTP API, the way the
//! other exporters write to a file: one authenticated POST of the full row
//! batch rather than a cell-by-cell client SDK.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::json;

use super::{metadata_allowlisted_rows, ExportResult, Exporter};
use crate::config::StorageConfig;
use crate::error::PipelineError;
use crate::pipeline::row::Row;

/// Decoded shape of `storage.spreadsheet_credentials_b64`: a base64 JSON
/// blob naming the service endpoint and bearer token, mirroring the
/// service-account-JSON convention the other exporters use for auth.
#[derive(Debug, Deserialize)]
struct SpreadsheetCredentials {
    api_base_url: String,
    api_key: String,
    #[serde(default = "default_sheet_name")]
    sheet_name: String,
}

fn default_sheet_name() -> String {
    "Scraped Data".to_string()
}

pub struct SpreadsheetExporter {
    client: reqwest::Client,
    credentials: SpreadsheetCredentials,
}

impl SpreadsheetExporter {
    pub fn new(storage: &StorageConfig) -> Result<Self, PipelineError> {
        let encoded = storage
            .spreadsheet_credentials_b64
            .as_deref()
            .ok_or_else(|| PipelineError::Credentials("spreadsheet_credentials_b64 not configured".into()))?;

        let decoded = STANDARD
            .decode(encoded)
            .map_err(|e| PipelineError::Credentials(format!("invalid base64: {e}")))?;
        let credentials: SpreadsheetCredentials = serde_json::from_slice(&decoded)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Ok(Self { client, credentials })
    }
}

#[async_trait]
impl Exporter for SpreadsheetExporter {
    async fn export(&self, rows: &[Row], source_label: &str) -> Result<ExportResult, PipelineError> {
        if rows.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let data = metadata_allowlisted_rows(rows);
        let spreadsheet_name = format!("IWSA_{}", sanitize_filename::sanitize(source_label));

        let payload = json!({
            "spreadsheet_name": spreadsheet_name,
            "worksheet_name": self.credentials.sheet_name,
            "clear_existing": true,
            "rows": data,
        });

        let url = format!("{}/v1/spreadsheets/values:batchUpdate", self.credentials.api_base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.credentials.api_key)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or(url);

        Ok(ExportResult::ok("spreadsheet", data.len(), location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials_for(base_url: &str) -> String {
        let json = json!({"api_base_url": base_url, "api_key": "secret"});
        STANDARD.encode(json.to_string())
    }

    #[test]
    fn rejects_missing_credentials() {
        let storage = StorageConfig::new_for_builder(std::env::temp_dir());
        assert!(SpreadsheetExporter::new(&storage).is_err());
    }

    #[tokio::test]
    async fn exports_rows_via_http_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/spreadsheets/values:batchUpdate"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut storage = StorageConfig::new_for_builder(std::env::temp_dir());
        storage.spreadsheet_credentials_b64 = Some(credentials_for(&server.uri()));

        let exporter = SpreadsheetExporter::new(&storage).unwrap();
        let mut row = Row::new();
        row.insert("title", json!("Widget"));
        let result = exporter.export(&[row], "example.com").await.unwrap();
        assert!(result.success);
    }
}
