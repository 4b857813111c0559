//! Tabular sink: durable row persistence behind the processing pipeline.
//!
//! Every enriched row is written as a document carrying the extracted
//! fields plus a fixed set of reserved, indexed keys (`_source_url`,
//! `_extracted_at`, `_content_hash`, `_processed_at`) alongside any
//! caller-supplied `_meta_`-prefixed metadata. Built on `sqlx`'s SQLite
//! driver so a bare `sqlite::memory:` connection string is enough for
//! tests, with a file-backed database for real runs.

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use std::str::FromStr;

use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row as _;
use tracing::warn;

use crate::error::PipelineError;
use crate::pipeline::row::Row;

/// Outcome of one `store_rows` batch: a running total plus counts for how
/// many documents actually landed.
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    pub total_documents: usize,
    pub stored_count: usize,
    pub failed_count: usize,
    pub operation_time: Duration,
}

/// A connected handle to the tabular sink.
pub struct TabularSink {
    pool: SqlitePool,
}

impl TabularSink {
    /// Connects to `document_store_uri` and ensures the schema and indexes
    /// described by the row persistence layout exist. Safe to call against
    /// `sqlite::memory:` for tests and against a file path for real runs.
    pub async fn connect(document_store_uri: &str) -> Result<Self, PipelineError> {
        let options = SqliteConnectOptions::from_str(document_store_uri)
            .map_err(PipelineError::Storage)?
            .create_if_missing(true);
        // An in-memory database only exists for the lifetime of its one
        // connection; a pool would silently hand back empty databases.
        let max_connections = if document_store_uri.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(PipelineError::Storage)?;
        let sink = Self { pool };
        sink.ensure_schema().await?;
        Ok(sink)
    }

    async fn ensure_schema(&self) -> Result<(), PipelineError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rows (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_url TEXT NOT NULL,
                extracted_at TEXT,
                content_hash TEXT NOT NULL,
                processed_at TEXT NOT NULL,
                document TEXT NOT NULL,
                search_text TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(PipelineError::Storage)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rows_source_url ON rows (source_url)")
            .execute(&self.pool)
            .await
            .map_err(PipelineError::Storage)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rows_extracted_at ON rows (extracted_at DESC)")
            .execute(&self.pool)
            .await
            .map_err(PipelineError::Storage)?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_rows_source_extracted ON rows (source_url, extracted_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(PipelineError::Storage)?;

        sqlx::query("CREATE VIRTUAL TABLE IF NOT EXISTS rows_fts USING fts5(search_text)")
            .execute(&self.pool)
            .await
            .map_err(PipelineError::Storage)?;

        Ok(())
    }

    /// Persists every row, tagging each document with `_processed_at` and
    /// any caller-supplied metadata under a `_meta_` prefix. A failure on
    /// one row is recorded in `failed_count` and does not abort the batch,
    /// matching the "continue on duplicates/errors" behaviour of the
    /// bulk-insert it's grounded on.
    pub async fn store_rows(
        &self,
        rows: &[Row],
        metadata: &HashMap<String, String>,
    ) -> Result<StorageStats, PipelineError> {
        let start = Instant::now();
        let mut stats = StorageStats { total_documents: rows.len(), ..StorageStats::default() };

        if rows.is_empty() {
            return Ok(stats);
        }

        let processed_at = now_unix_secs().to_string();

        for row in rows {
            let mut document = row.0.clone();
            for (key, value) in metadata {
                document.insert(format!("_meta_{key}"), Value::String(value.clone()));
            }
            document.entry("_processed_at").or_insert_with(|| Value::String(processed_at.clone()));

            let source_url = document
                .get("_source_url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let extracted_at = document.get("_extracted_at").and_then(Value::as_str).map(str::to_string);
            let content_hash = row.content_hash();
            let search_text = row
                .0
                .values()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ");
            let document_json = match serde_json::to_string(&document) {
                Ok(json) => json,
                Err(err) => {
                    stats.failed_count += 1;
                    warn!(error = %err, "failed to serialize row for storage");
                    continue;
                }
            };

            let insert = sqlx::query(
                "INSERT INTO rows (source_url, extracted_at, content_hash, processed_at, document, search_text)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&source_url)
            .bind(&extracted_at)
            .bind(&content_hash)
            .bind(&processed_at)
            .bind(&document_json)
            .bind(&search_text)
            .execute(&self.pool)
            .await;

            match insert {
                Ok(result) => {
                    stats.stored_count += 1;
                    let fts_insert = sqlx::query("INSERT INTO rows_fts (rowid, search_text) VALUES (?, ?)")
                        .bind(result.last_insert_rowid())
                        .bind(&search_text)
                        .execute(&self.pool)
                        .await;
                    if let Err(err) = fts_insert {
                        warn!(error = %err, source_url, "failed to index row for full-text search");
                    }
                }
                Err(err) => {
                    stats.failed_count += 1;
                    warn!(error = %err, source_url, "failed to store row");
                }
            }
        }

        stats.operation_time = start.elapsed();
        Ok(stats)
    }

    /// Rows for a given source URL, most recently extracted first. Exercises
    /// the `(_source_url, _extracted_at DESC)` index the schema creates.
    pub async fn rows_for_source(&self, source_url: &str, limit: i64) -> Result<Vec<Value>, PipelineError> {
        let records = sqlx::query(
            "SELECT document FROM rows WHERE source_url = ? ORDER BY extracted_at DESC LIMIT ?",
        )
        .bind(source_url)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(PipelineError::Storage)?;

        records
            .into_iter()
            .map(|record| {
                let raw: String = record.get("document");
                serde_json::from_str(&raw).map_err(PipelineError::Json)
            })
            .collect()
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn now_unix_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_row(source_url: &str) -> Row {
        let mut row = Row::new();
        row.insert("title", json!("Widget"));
        row.insert("_source_url", json!(source_url));
        row.insert("_extracted_at", json!("2026-08-01T00:00:00Z"));
        row
    }

    #[tokio::test]
    async fn empty_batch_stores_nothing() {
        let sink = TabularSink::connect("sqlite::memory:").await.unwrap();
        let stats = sink.store_rows(&[], &HashMap::new()).await.unwrap();
        assert_eq!(stats.total_documents, 0);
        assert_eq!(stats.stored_count, 0);
    }

    #[tokio::test]
    async fn stores_rows_and_reports_counts() {
        let sink = TabularSink::connect("sqlite::memory:").await.unwrap();
        let rows = vec![sample_row("https://example.com/a"), sample_row("https://example.com/b")];
        let stats = sink.store_rows(&rows, &HashMap::new()).await.unwrap();
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.stored_count, 2);
        assert_eq!(stats.failed_count, 0);
    }

    #[tokio::test]
    async fn retrieves_rows_for_a_source_most_recent_first() {
        let sink = TabularSink::connect("sqlite::memory:").await.unwrap();
        let rows = vec![sample_row("https://example.com/a")];
        sink.store_rows(&rows, &HashMap::new()).await.unwrap();

        let found = sink.rows_for_source("https://example.com/a", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["title"], json!("Widget"));
    }

    #[tokio::test]
    async fn caller_metadata_is_stored_under_a_meta_prefix() {
        let sink = TabularSink::connect("sqlite::memory:").await.unwrap();
        let mut metadata = HashMap::new();
        metadata.insert("run_id".to_string(), "abc123".to_string());
        sink.store_rows(&[sample_row("https://example.com/a")], &metadata).await.unwrap();

        let found = sink.rows_for_source("https://example.com/a", 10).await.unwrap();
        assert_eq!(found[0]["_meta_run_id"], json!("abc123"));
    }
}
