//! Backend for a locally-running, Ollama-compatible chat model.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::LlmError;

use super::backend::LlmBackend;
use super::types::ScrapeTask;

pub struct LocalBackend {
    name: String,
    endpoint: String,
    client: reqwest::Client,
    /// When true, skip the network call and return a canned strategy. Used
    /// for tests and offline development — see `AppConfig::llm.local_mock_mode`.
    mock_mode: bool,
}

impl LocalBackend {
    #[must_use]
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, timeout: Duration, mock_mode: bool) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            mock_mode,
        }
    }

    fn mock_response(task: &ScrapeTask) -> String {
        format!(
            r#"{{"actions":[{{"type":"wait","milliseconds":250}},{{"type":"extract_field","name":"result","selector":"body"}}],"confidence":0.5,"rationale":"mock strategy for {}"}}"#,
            task.target_url
        )
    }
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl LlmBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, task: &ScrapeTask) -> Result<String, LlmError> {
        if self.mock_mode {
            return Ok(Self::mock_response(task));
        }

        let prompt = build_prompt(task);
        let body = serde_json::json!({
            "model": "default",
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|source| LlmError::Request {
                backend: self.name.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Http {
                backend: self.name.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|source| LlmError::Request {
                backend: self.name.clone(),
                source,
            })?;

        Ok(parsed.response)
    }
}

fn build_prompt(task: &ScrapeTask) -> String {
    let mut prompt = format!(
        "Produce a JSON scraping strategy for {} with goal: {}\n\nPage context:\n{}",
        task.target_url, task.goal, task.page_context
    );
    if let Some(failure) = &task.prior_failure {
        prompt.push_str(&format!("\n\nA previous attempt failed with: {failure}\nAdjust the strategy to recover from it."));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_mode_returns_parseable_strategy() {
        let backend = LocalBackend::new("local", "http://127.0.0.1:11434", Duration::from_secs(5), true);
        let task = ScrapeTask {
            target_url: "https://example.com".into(),
            goal: "list prices".into(),
            page_context: String::new(),
            prior_failure: None,
        };
        let raw = backend.complete(&task).await.unwrap();
        let strategy = super::super::strategy::parse_strategy(&raw).unwrap();
        assert!(!strategy.actions.is_empty());
    }
}
