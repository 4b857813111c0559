//! Multi-provider LLM strategy orchestrator (C1): fans a [`ScrapeTask`] out
//! across configured backends in priority order, guarding each with a
//! circuit breaker and rate limiter, and caching successful strategies.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{AppConfig, BackendConfig, BackendKind};
use crate::error::LlmError;
use crate::resilience::{BackoffConfig, CircuitBreaker, RateLimiter};

use super::backend::LlmBackend;
use super::local::LocalBackend;
use super::remote_chat::RemoteChatBackend;
use super::remote_hosted::RemoteHostedModelBackend;
use super::strategy::parse_strategy;
use super::types::{ScrapeTask, Strategy};

struct ConfiguredBackend {
    backend: Arc<dyn LlmBackend>,
    priority: u8,
    rate_limit_rps: f64,
    /// Each backend gets its own breaker, sized from its own config, instead
    /// of sharing one instance keyed by name — a flaky backend's threshold
    /// and recovery timeout apply only to that backend.
    circuit_breaker: CircuitBreaker,
}

struct CachedStrategy {
    strategy: Strategy,
    cached_at: Instant,
}

/// Orchestrates strategy generation across every configured LLM backend.
pub struct LlmOrchestrator {
    backends: Vec<ConfiguredBackend>,
    rate_limiter: RateLimiter,
    backoff: BackoffConfig,
    cache: DashMap<String, CachedStrategy>,
    cache_ttl: Duration,
    // Serializes cache-miss generation per key so concurrent callers asking
    // for the same (url, goal) don't all hit every backend at once, while
    // callers for different keys never block on each other.
    generation_locks: DashMap<String, Arc<Mutex<()>>>,
}

fn resolve_api_key(env_var: &Option<String>) -> Option<String> {
    env_var.as_ref().and_then(|var| std::env::var(var).ok())
}

fn build_backend(cfg: &BackendConfig, local_mock_mode: bool) -> Arc<dyn LlmBackend> {
    let timeout = Duration::from_secs(cfg.request_timeout_secs);
    match cfg.kind {
        BackendKind::Local => Arc::new(LocalBackend::new(
            &cfg.name,
            cfg.endpoint.clone().unwrap_or_else(|| "http://127.0.0.1:11434".into()),
            timeout,
            local_mock_mode,
        )),
        BackendKind::RemoteChat => Arc::new(RemoteChatBackend::new(
            &cfg.name,
            cfg.endpoint.clone().unwrap_or_default(),
            resolve_api_key(&cfg.api_key_env),
            timeout,
        )),
        BackendKind::RemoteHostedModel => Arc::new(RemoteHostedModelBackend::new(
            &cfg.name,
            cfg.endpoint.clone().unwrap_or_default(),
            resolve_api_key(&cfg.api_key_env),
            timeout,
        )),
    }
}

impl LlmOrchestrator {
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        let mut backends: Vec<ConfiguredBackend> = config
            .llm
            .backends
            .iter()
            .map(|cfg| ConfiguredBackend {
                backend: build_backend(cfg, config.llm.local_mock_mode),
                priority: cfg.priority,
                rate_limit_rps: cfg.rate_limit_rps,
                circuit_breaker: CircuitBreaker::new(
                    cfg.circuit_breaker_failure_threshold,
                    Duration::from_secs(cfg.circuit_breaker_retry_delay_secs),
                ),
            })
            .collect();
        // Stable sort by priority (ascending); declaration order breaks ties.
        backends.sort_by_key(|b| b.priority);

        Self {
            backends,
            rate_limiter: RateLimiter::new(),
            backoff: BackoffConfig::default(),
            cache: DashMap::new(),
            cache_ttl: Duration::from_secs(config.llm.strategy_cache_ttl_secs),
            generation_locks: DashMap::new(),
        }
    }

    fn cache_key(task: &ScrapeTask) -> String {
        format!("{}::{}", task.target_url, task.goal)
    }

    /// Generates (or reuses a cached) strategy for `task`, trying each
    /// configured backend in priority order and falling through on failure.
    pub async fn generate_strategy(&self, task: &ScrapeTask) -> Result<Strategy, LlmError> {
        let key = Self::cache_key(task);

        // A prior-failure recovery request always bypasses the cache — the
        // whole point is to get a strategy different from the cached one.
        if task.prior_failure.is_none() {
            if let Some(entry) = self.cache.get(&key) {
                if entry.cached_at.elapsed() < self.cache_ttl {
                    return Ok(entry.strategy.clone());
                }
            }
        }

        let lock = Arc::clone(&self.generation_locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))));
        let _guard = lock.lock().await;
        // Re-check after acquiring the lock in case another caller just filled it.
        if task.prior_failure.is_none() {
            if let Some(entry) = self.cache.get(&key) {
                if entry.cached_at.elapsed() < self.cache_ttl {
                    self.generation_locks.remove(&key);
                    return Ok(entry.strategy.clone());
                }
            }
        }

        if self.backends.is_empty() {
            self.generation_locks.remove(&key);
            return Err(LlmError::AllBackendsExhausted);
        }

        for configured in &self.backends {
            let name = configured.backend.name().to_string();

            if !configured.circuit_breaker.should_attempt(&name) {
                info!(backend = %name, "skipping backend, circuit open");
                continue;
            }

            self.rate_limiter.acquire(&name, configured.rate_limit_rps).await;

            let result = crate::resilience::retry_with_backoff(&self.backoff, |_attempt| {
                configured.backend.complete(task)
            })
            .await;

            match result {
                Ok(raw) => match parse_strategy(&raw) {
                    Ok(strategy) => {
                        configured.circuit_breaker.record_success(&name);
                        if task.prior_failure.is_none() {
                            self.cache.insert(
                                key.clone(),
                                CachedStrategy {
                                    strategy: strategy.clone(),
                                    cached_at: Instant::now(),
                                },
                            );
                        }
                        self.generation_locks.remove(&key);
                        return Ok(strategy);
                    }
                    Err(parse_err) => {
                        // A malformed strategy is a backend-quality problem,
                        // not a transport failure: don't trip the breaker,
                        // just fall through to the next backend.
                        warn!(backend = %name, error = %parse_err, "backend returned unparseable strategy");
                        continue;
                    }
                },
                Err(err) => {
                    configured.circuit_breaker.record_failure(&name, &err.to_string());
                    warn!(backend = %name, error = %err, "backend request failed");
                }
            }
        }

        self.generation_locks.remove(&key);
        Err(LlmError::AllBackendsExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn mock_config() -> AppConfig {
        AppConfig::builder()
            .output_dir("/tmp/iwsa-orchestrator-test")
            .local_mock_mode(true)
            .llm_backend(BackendConfig {
                name: "local".into(),
                kind: BackendKind::Local,
                endpoint: None,
                api_key_env: None,
                priority: 0,
                rate_limit_rps: 50.0,
                circuit_breaker_failure_threshold: 5,
                circuit_breaker_retry_delay_secs: 300,
                request_timeout_secs: 5,
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn generates_and_caches_strategy() {
        let orchestrator = LlmOrchestrator::new(&mock_config());
        let task = ScrapeTask {
            target_url: "https://example.com".into(),
            goal: "extract prices".into(),
            page_context: String::new(),
            prior_failure: None,
        };

        let first = orchestrator.generate_strategy(&task).await.unwrap();
        let second = orchestrator.generate_strategy(&task).await.unwrap();
        assert_eq!(first.actions.len(), second.actions.len());
    }

    #[tokio::test]
    async fn no_backends_configured_errors() {
        let config = AppConfig {
            llm: crate::config::LlmConfig::default(),
            ..mock_config()
        };
        let orchestrator = LlmOrchestrator::new(&config);
        let task = ScrapeTask {
            target_url: "https://example.com".into(),
            goal: "extract prices".into(),
            page_context: String::new(),
            prior_failure: None,
        };
        let err = orchestrator.generate_strategy(&task).await.unwrap_err();
        assert!(matches!(err, LlmError::AllBackendsExhausted));
    }
}
