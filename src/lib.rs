//! Intelligent web-scraping agent.
//!
//! Three components compose into [`run`]:
//! - **C1** ([`llm`]) — a multi-provider LLM strategy orchestrator.
//! - **C2** ([`browser_pool`], [`session`], [`anti_detection`], [`executor`]) —
//!   an adaptive scraping runtime.
//! - **C3** ([`pipeline`]) — clean/validate/enrich/export for extracted rows.

pub mod anti_detection;
pub mod browser_pool;
pub mod browser_profile;
pub mod browser_setup;
pub mod cancellation;
pub mod config;
pub mod error;
pub mod executor;
pub mod llm;
pub mod pipeline;
pub mod resilience;
pub mod session;
pub mod storage;
pub mod utils;

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

pub use cancellation::CancellationToken;
pub use config::AppConfig;
pub use error::{AppError, LlmError, PipelineError, Result, ScrapeError};
pub use executor::{ExecutionResult, ExtractedRow, StrategyExecutor};
pub use llm::{LlmOrchestrator, ScrapeTask, Strategy};
pub use pipeline::{Pipeline, PipelineResult};

/// A single scrape-and-export request: what to extract, and from where.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub target_url: String,
    pub goal: String,
    /// Optional hint used to seed the first strategy request; left empty the
    /// orchestrator asks backends to infer structure from the goal alone.
    pub page_context: String,
}

impl ScrapeRequest {
    #[must_use]
    pub fn new(target_url: impl Into<String>, goal: impl Into<String>) -> Self {
        Self { target_url: target_url.into(), goal: goal.into(), page_context: String::new() }
    }
}

/// A running instance of the agent: owns the browser pool, session manager,
/// and LLM orchestrator for the lifetime of the process.
pub struct Agent {
    config: AppConfig,
    executor: StrategyExecutor,
    cancellation: CancellationToken,
}

impl Agent {
    /// Builds every shared component and pre-warms the browser pool.
    pub async fn start(config: AppConfig) -> Result<Self> {
        let pool_config = browser_pool::BrowserPoolConfig {
            min_pool_size: config.scraping.min_pool_size,
            max_pool_size: config.scraping.max_pool_size,
            headless: config.scraping.headless,
            max_requests: config.scraping.max_browser_requests,
            max_age: std::time::Duration::from_secs(config.scraping.max_browser_age_secs),
        };
        let browser_pool = browser_pool::BrowserPool::new(pool_config);
        browser_pool.start().await.map_err(AppError::Other)?;

        let session_manager = Arc::new(session::SessionManager::new(&config.scraping));
        session_manager.clone().start_cleanup_task();

        let orchestrator = Arc::new(LlmOrchestrator::new(&config));
        let executor = StrategyExecutor::new(browser_pool, session_manager, orchestrator, &config.scraping);

        info!(backends = config.llm.backends.len(), "agent started");
        Ok(Self { config, executor, cancellation: CancellationToken::new() })
    }

    /// Requests cancellation of any scrape currently in flight. Idempotent;
    /// safe to call from a signal handler.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Executes one scrape and fans the extracted rows out to every
    /// configured export format. Returns [`ScrapeError::Cancelled`] (wrapped
    /// in [`AppError`]) if [`Agent::cancel`] is called before the run
    /// finishes, distinguished from any other failure.
    pub async fn scrape(&self, request: ScrapeRequest) -> Result<PipelineResult> {
        if !utils::is_valid_url(&request.target_url) {
            return Err(AppError::Config(format!("not a fetchable URL: {}", request.target_url)));
        }

        let task = ScrapeTask {
            target_url: request.target_url,
            goal: request.goal,
            page_context: request.page_context,
            prior_failure: None,
        };

        let execution = match self.cancellation.run_until_cancelled(self.executor.execute(&task)).await {
            Some(result) => result?,
            None => return Err(ScrapeError::Cancelled.into()),
        };
        let rows: Vec<pipeline::row::Row> = execution
            .rows
            .into_iter()
            .map(|fields| pipeline::row::Row::from(fields.into_iter().collect::<serde_json::Map<String, Value>>()))
            .collect();

        let pipeline = Pipeline::new(self.config.storage.clone());
        let export_fut = pipeline.process_and_export(rows, &self.config.storage.export_formats);
        match self.cancellation.run_until_cancelled(export_fut).await {
            Some(result) => Ok(result?),
            None => Err(PipelineError::Cancelled.into()),
        }
    }
}

/// Runs a single scrape end to end: start the agent, run one request, tear
/// the browser pool down. Convenience wrapper for callers that don't need a
/// long-lived [`Agent`]. Installs a `Ctrl+C` handler so an external
/// interrupt cancels the in-flight run rather than killing the process
/// mid-navigation.
pub async fn run(config: AppConfig, request: ScrapeRequest) -> Result<PipelineResult> {
    let agent = Agent::start(config).await?;
    let agent = Arc::new(agent);

    let signal_agent = agent.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_agent.cancel();
        }
    });

    agent.scrape(request).await
}
