//! Polymorphic LLM backend abstraction. Local, remote-chat, and
//! remote-hosted-model backends all implement this trait so the
//! orchestrator can fan out across them uniformly.

use async_trait::async_trait;

use crate::error::LlmError;

use super::types::ScrapeTask;

#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Stable name used as the circuit-breaker/rate-limiter channel key.
    fn name(&self) -> &str;

    /// Returns the raw text response for `task`. Callers are responsible for
    /// extracting and validating the strategy JSON via
    /// [`super::strategy::parse_strategy`] — a backend only owns transport.
    async fn complete(&self, task: &ScrapeTask) -> Result<String, LlmError>;
}
