//! Backend for hosted, task-specific model endpoints that take a structured
//! request instead of a chat transcript (e.g. a dedicated strategy-generation
//! endpoint rather than a general chat completion API).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::LlmError;

use super::backend::LlmBackend;
use super::types::ScrapeTask;

pub struct RemoteHostedModelBackend {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl RemoteHostedModelBackend {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct HostedRequest<'a> {
    target_url: &'a str,
    goal: &'a str,
    page_context: &'a str,
    prior_failure: Option<&'a str>,
}

#[derive(Deserialize)]
struct HostedResponse {
    strategy_json: String,
}

#[async_trait]
impl LlmBackend for RemoteHostedModelBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, task: &ScrapeTask) -> Result<String, LlmError> {
        let request = HostedRequest {
            target_url: &task.target_url,
            goal: &task.goal,
            page_context: &task.page_context,
            prior_failure: task.prior_failure.as_deref(),
        };

        let mut req = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }

        let response = req.send().await.map_err(|source| LlmError::Request {
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

        let parsed: HostedResponse = response.json().await.map_err(|source| LlmError::Request {
            backend: self.name.clone(),
            source,
        })?;

        Ok(parsed.strategy_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn parses_hosted_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "strategy_json": "{\"actions\":[],\"confidence\":0.7}"
            })))
            .mount(&server)
            .await;

        let backend =
            RemoteHostedModelBackend::new("hosted", server.uri(), None, Duration::from_secs(5));
        let task = ScrapeTask {
            target_url: "https://example.com".into(),
            goal: "extract prices".into(),
            page_context: String::new(),
            prior_failure: None,
        };

        let raw = backend.complete(&task).await.unwrap();
        let strategy = super::super::strategy::parse_strategy(&raw).unwrap();
        assert!((strategy.confidence - 0.7).abs() < f32::EPSILON);
    }
}
