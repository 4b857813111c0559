//! Wire-level and orchestration types for strategy generation.

use serde::{Deserialize, Serialize};

/// What the orchestrator is asking a backend to figure out for a given page.
#[derive(Debug, Clone)]
pub struct ScrapeTask {
    pub target_url: String,
    /// Natural-language description of what data to extract. Intent
    /// extraction from a raw user prompt happens upstream of this crate.
    pub goal: String,
    /// Truncated HTML/text snippet of the page, used as grounding context.
    pub page_context: String,
    /// Set when this call is a recovery attempt after a prior strategy failed.
    pub prior_failure: Option<String>,
}

/// A single browser action the executor should perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyAction {
    Click { selector: String },
    Fill { selector: String, value: String },
    Wait { milliseconds: u64 },
    Scroll { pixels: i64 },
    ExtractField { name: String, selector: String },
}

/// Which pagination mechanism a page uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaginationKind {
    /// Numbered page links, advanced by clicking `next_page_selector`.
    Numbered,
    /// A "load more" button that appends to the current page.
    LoadMore,
    /// Scrolling to the bottom repeatedly until no new content appears.
    InfiniteScroll,
    /// Single page, nothing to advance.
    None,
}

impl Default for PaginationKind {
    fn default() -> Self {
        Self::None
    }
}

/// How to advance to the next page of results, if the task needs more than one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationStrategy {
    #[serde(default)]
    pub kind: PaginationKind,
    pub next_page_selector: Option<String>,
    pub max_pages: u32,
}

/// A complete, validated scraping strategy returned by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub actions: Vec<StrategyAction>,
    pub pagination: Option<PaginationStrategy>,
    /// Backend-reported confidence in [0.0, 1.0], used to decide whether a
    /// strategy is worth caching and reusing.
    pub confidence: f32,
    /// Free-form explanation surfaced in logs and error-recovery prompts.
    pub rationale: Option<String>,
}

/// Required top-level keys in the strategy JSON schema; anything else is
/// soft-ignored rather than rejected, so backends may attach extra fields.
pub const REQUIRED_STRATEGY_KEYS: &[&str] = &["actions", "confidence"];
