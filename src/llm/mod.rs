//! C1: multi-provider LLM strategy orchestrator.
//!
//! Given a [`types::ScrapeTask`], [`orchestrator::LlmOrchestrator`] fans out
//! across configured backends (local, hosted chat, hosted task-specific
//! model) in priority order, each guarded by its own circuit breaker and
//! rate limiter, and returns a validated [`types::Strategy`].

pub mod backend;
pub mod local;
pub mod orchestrator;
pub mod remote_chat;
pub mod remote_hosted;
pub mod strategy;
pub mod types;

pub use backend::LlmBackend;
pub use orchestrator::LlmOrchestrator;
pub use strategy::parse_strategy;
pub use types::{PaginationKind, PaginationStrategy, ScrapeTask, Strategy, StrategyAction};
