//! Backend for hosted chat-completion APIs (OpenAI-compatible wire format).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::LlmError;

use super::backend::LlmBackend;
use super::types::ScrapeTask;

pub struct RemoteChatBackend {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl RemoteChatBackend {
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
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl LlmBackend for RemoteChatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, task: &ScrapeTask) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You generate JSON web-scraping strategies. Respond with JSON only.".into(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(task),
                },
            ],
            temperature: 0.2,
        };

        let mut req = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
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

        let parsed: ChatResponse = response.json().await.map_err(|source| LlmError::Request {
            backend: self.name.clone(),
            source,
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Http {
                backend: self.name.clone(),
                status: status.as_u16(),
                body: "no choices returned".into(),
            })
    }
}

fn build_prompt(task: &ScrapeTask) -> String {
    let mut prompt = format!(
        "Target URL: {}\nGoal: {}\nPage context:\n{}",
        task.target_url, task.goal, task.page_context
    );
    if let Some(failure) = &task.prior_failure {
        prompt.push_str(&format!("\n\nPrevious attempt failed: {failure}\nRecover."));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn parses_successful_chat_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "{\"actions\":[],\"confidence\":0.8}"}}]
            })))
            .mount(&server)
            .await;

        let backend = RemoteChatBackend::new(
            "openai",
            format!("{}/v1/chat/completions", server.uri()),
            Some("test-key".into()),
            Duration::from_secs(5),
        );

        let task = ScrapeTask {
            target_url: "https://example.com".into(),
            goal: "extract prices".into(),
            page_context: String::new(),
            prior_failure: None,
        };

        let raw = backend.complete(&task).await.unwrap();
        let strategy = super::super::strategy::parse_strategy(&raw).unwrap();
        assert!((strategy.confidence - 0.8).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let backend = RemoteChatBackend::new(
            "openai",
            format!("{}/v1/chat/completions", server.uri()),
            None,
            Duration::from_secs(5),
        );
        let task = ScrapeTask {
            target_url: "https://example.com".into(),
            goal: "extract prices".into(),
            page_context: String::new(),
            prior_failure: None,
        };

        let err = backend.complete(&task).await.unwrap_err();
        assert!(matches!(err, LlmError::Http { status: 429, .. }));
    }
}
