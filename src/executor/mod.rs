//! Strategy executor: runs an [`LlmOrchestrator`]-generated [`Strategy`]
//! against a pooled browser, pacing interactions through the configured
//! [`PacingBounds`] and recovering from failures by asking the orchestrator
//! for a fresh strategy with the failure attached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::anti_detection::{self, PacingBounds};
use crate::browser_pool::BrowserPool;
use crate::config::ScrapingConfig;
use crate::error::ScrapeError;
use crate::llm::{LlmOrchestrator, PaginationKind, PaginationStrategy, ScrapeTask, Strategy, StrategyAction};
use crate::session::{SessionCookie, SessionManager};

/// One extracted record, keyed by the field name from `ExtractField`.
pub type ExtractedRow = HashMap<String, Value>;

#[derive(Debug, Default)]
pub struct ExecutionResult {
    pub rows: Vec<ExtractedRow>,
    pub pages_processed: u32,
    pub errors: Vec<String>,
}

impl ExecutionResult {
    fn push_error(&mut self, err: impl ToString) {
        self.errors.push(err.to_string());
        if self.errors.len() > 10 {
            self.errors.remove(0);
        }
    }
}

pub struct StrategyExecutor {
    browser_pool: Arc<BrowserPool>,
    session_manager: Arc<SessionManager>,
    orchestrator: Arc<LlmOrchestrator>,
    pacing: PacingBounds,
    max_page_retries: u8,
    navigation_timeout: Duration,
}

impl StrategyExecutor {
    #[must_use]
    pub fn new(
        browser_pool: Arc<BrowserPool>,
        session_manager: Arc<SessionManager>,
        orchestrator: Arc<LlmOrchestrator>,
        config: &ScrapingConfig,
    ) -> Self {
        Self {
            browser_pool,
            session_manager,
            orchestrator,
            pacing: anti_detection::bounds_for(config.pacing_profile),
            max_page_retries: config.max_page_retries,
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
        }
    }

    pub async fn execute(&self, task: &ScrapeTask) -> Result<ExecutionResult, ScrapeError> {
        let mut result = ExecutionResult::default();
        let session = self.session_manager.create_session(task.target_url.clone()).await;
        let guard = self
            .browser_pool
            .acquire()
            .await
            .map_err(ScrapeError::BrowserLaunch)?;

        let page = guard
            .browser()
            .new_page(&task.target_url)
            .await
            .map_err(|source| ScrapeError::Navigation {
                url: task.target_url.clone(),
                source,
            })?;

        if let Err(e) = crate::browser_setup::apply_stealth_measures(&page).await {
            warn!(error = %e, "failed to apply stealth measures to page");
        }

        anti_detection::pace_page_settle(&self.pacing).await;

        let mut strategy = self.orchestrator.generate_strategy(task).await?;
        let mut attempt = 0u8;

        loop {
            match self.run_strategy_once(&page, &strategy, &session.id, &mut result).await {
                Ok(()) => break,
                Err(err) if attempt < self.max_page_retries => {
                    attempt += 1;
                    warn!(attempt, error = %err, "strategy execution failed, asking for a recovery strategy");
                    result.push_error(&err);

                    let mut recovery_task = task.clone();
                    recovery_task.prior_failure = Some(err.to_string());
                    if let Ok(content) = page.content().await {
                        recovery_task.page_context = crate::utils::safe_truncate_chars(&content, 4000).to_string();
                    }
                    strategy = self.orchestrator.generate_strategy(&recovery_task).await?;
                }
                Err(err) => {
                    result.push_error(&err);
                    return Err(err);
                }
            }
        }

        self.snapshot_session(&page, &session.id).await;
        Ok(result)
    }

    async fn run_strategy_once(
        &self,
        page: &chromiumoxide::Page,
        strategy: &Strategy,
        session_id: &str,
        result: &mut ExecutionResult,
    ) -> Result<(), ScrapeError> {
        let mut row = ExtractedRow::new();
        for action in &strategy.actions {
            self.run_action(page, action, &mut row).await?;
            anti_detection::pace_action(&self.pacing).await;
        }
        self.check_for_challenge(page).await?;

        if !row.is_empty() {
            result.rows.push(row);
        }
        result.pages_processed += 1;

        if let Some(pagination) = &strategy.pagination {
            self.paginate(page, pagination, strategy, session_id, result).await?;
        }

        Ok(())
    }

    async fn paginate(
        &self,
        page: &chromiumoxide::Page,
        pagination: &PaginationStrategy,
        strategy: &Strategy,
        session_id: &str,
        result: &mut ExecutionResult,
    ) -> Result<(), ScrapeError> {
        match pagination.kind {
            PaginationKind::None => Ok(()),
            PaginationKind::Numbered | PaginationKind::LoadMore => {
                self.paginate_by_selector(page, pagination, strategy, session_id, result).await
            }
            PaginationKind::InfiniteScroll => self.paginate_by_scroll(page, pagination, strategy, session_id, result).await,
        }
    }

    /// Numbered pages and "load more" buttons both advance by clicking the
    /// same element repeatedly; `next_page_selector` just happens to mean
    /// "next page link" for one and "load more button" for the other.
    async fn paginate_by_selector(
        &self,
        page: &chromiumoxide::Page,
        pagination: &PaginationStrategy,
        strategy: &Strategy,
        session_id: &str,
        result: &mut ExecutionResult,
    ) -> Result<(), ScrapeError> {
        let Some(selector) = &pagination.next_page_selector else {
            return Ok(());
        };

        for page_number in 2..=pagination.max_pages {
            let Ok(element) = page.find_element(selector.as_str()).await else {
                debug!(page_number, "no further pagination element found, stopping");
                break;
            };
            if element.click().await.is_err() {
                break;
            }
            anti_detection::pace_page_settle(&self.pacing).await;
            self.check_for_challenge(page).await?;

            let row = extract_strategy_row(page, strategy).await;
            if !row.is_empty() {
                result.rows.push(row);
            }
            result.pages_processed += 1;

            if let Ok(Some(url)) = page.url().await {
                let _ = self.session_manager.record_navigation(session_id, url).await;
            }
        }

        Ok(())
    }

    /// Scrolls to the bottom of the page, waits for lazy-loaded content to
    /// settle, then re-extracts and compares the row count against the
    /// previous iteration. Stops the moment a scroll produces no new rows —
    /// the content-count delta is the only reliable end-of-feed signal an
    /// infinite scroller gives you, since there's no "next" element to miss.
    async fn paginate_by_scroll(
        &self,
        page: &chromiumoxide::Page,
        pagination: &PaginationStrategy,
        strategy: &Strategy,
        session_id: &str,
        result: &mut ExecutionResult,
    ) -> Result<(), ScrapeError> {
        let mut previous_row_count = result.rows.len();

        for page_number in 2..=pagination.max_pages {
            let _ = page.evaluate("window.scrollTo(0, document.body.scrollHeight)").await;
            anti_detection::pace_page_settle(&self.pacing).await;
            self.check_for_challenge(page).await?;

            let row = extract_strategy_row(page, strategy).await;
            if !row.is_empty() {
                result.rows.push(row);
            }
            result.pages_processed += 1;

            if result.rows.len() == previous_row_count {
                debug!(page_number, "scroll produced no new content, stopping");
                break;
            }
            previous_row_count = result.rows.len();

            if let Ok(Some(url)) = page.url().await {
                let _ = self.session_manager.record_navigation(session_id, url).await;
            }
        }

        Ok(())
    }

    async fn run_action(
        &self,
        page: &chromiumoxide::Page,
        action: &StrategyAction,
        row: &mut ExtractedRow,
    ) -> Result<(), ScrapeError> {
        match action {
            StrategyAction::Click { selector } => {
                let element = page.find_element(selector.as_str()).await.map_err(|source| {
                    ScrapeError::Navigation { url: selector.clone(), source }
                })?;
                element
                    .click()
                    .await
                    .map_err(|source| ScrapeError::Navigation { url: selector.clone(), source })?;
            }
            StrategyAction::Fill { selector, value } => {
                let element = page.find_element(selector.as_str()).await.map_err(|source| {
                    ScrapeError::Navigation { url: selector.clone(), source }
                })?;
                element
                    .click()
                    .await
                    .map_err(|source| ScrapeError::Navigation { url: selector.clone(), source })?;
                element
                    .type_str(value.as_str())
                    .await
                    .map_err(|source| ScrapeError::Navigation { url: selector.clone(), source })?;
            }
            StrategyAction::Wait { milliseconds } => {
                tokio::time::sleep(Duration::from_millis(*milliseconds)).await;
            }
            StrategyAction::Scroll { pixels } => {
                let script = format!("window.scrollBy(0, {pixels})");
                let _ = page.evaluate(script).await;
            }
            StrategyAction::ExtractField { name, selector } => {
                if let Some(value) = extract_field(page, name, selector).await {
                    row.insert(name.clone(), value);
                }
            }
        }
        Ok(())
    }

    async fn check_for_challenge(&self, page: &chromiumoxide::Page) -> Result<(), ScrapeError> {
        let Ok(content) = page.content().await else {
            return Ok(());
        };
        if let Some(detection) = anti_detection::detect_challenge(&content) {
            let url = page.url().await.ok().flatten().unwrap_or_default();
            return Err(ScrapeError::ChallengeDetected {
                url,
                kind: detection.matched_marker,
            });
        }
        Ok(())
    }

    async fn snapshot_session(&self, page: &chromiumoxide::Page, session_id: &str) {
        let current_url = page.url().await.ok().flatten().unwrap_or_default();
        let local_storage = read_storage(page, "localStorage").await;
        let session_storage = read_storage(page, "sessionStorage").await;
        let cookies = read_cookies(page).await;

        if let Err(err) = self
            .session_manager
            .save_state(session_id, cookies, local_storage, session_storage, current_url)
            .await
        {
            warn!(session_id, error = %err, "failed to persist session snapshot");
        }
    }
}

async fn extract_strategy_row(page: &chromiumoxide::Page, strategy: &Strategy) -> ExtractedRow {
    let mut row = ExtractedRow::new();
    for action in &strategy.actions {
        if let StrategyAction::ExtractField { name, selector } = action {
            if let Some(value) = extract_field(page, name, selector).await {
                row.insert(name.clone(), value);
            }
        }
    }
    row
}

async fn extract_field(page: &chromiumoxide::Page, name: &str, selector: &str) -> Option<Value> {
    let element = page.find_element(selector).await.ok()?;
    if let Ok(Some(href)) = element.attribute("href").await {
        return Some(Value::String(resolve_url(page, &href).await));
    }
    if let Ok(Some(src)) = element.attribute("src").await {
        return Some(Value::String(resolve_url(page, &src).await));
    }
    let text = element.inner_text().await.ok().flatten()?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        debug!(field = name, selector, "extracted empty text, skipping field");
        return None;
    }
    Some(Value::String(trimmed.to_string()))
}

async fn resolve_url(page: &chromiumoxide::Page, value: &str) -> String {
    if value.starts_with("http://") || value.starts_with("https://") {
        return value.to_string();
    }
    match page.url().await {
        Ok(Some(base)) => url::Url::parse(&base)
            .and_then(|b| b.join(value))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| value.to_string()),
        _ => value.to_string(),
    }
}

async fn read_storage(page: &chromiumoxide::Page, object: &str) -> HashMap<String, String> {
    let script = format!(
        "(() => {{ const out = {{}}; for (let i = 0; i < {object}.length; i++) {{ const k = {object}.key(i); out[k] = {object}.getItem(k); }} return out; }})()"
    );
    let Ok(eval) = page.evaluate(script).await else {
        return HashMap::new();
    };
    eval.into_value::<HashMap<String, String>>().unwrap_or_default()
}

async fn read_cookies(page: &chromiumoxide::Page) -> Vec<SessionCookie> {
    match page.get_cookies().await {
        Ok(cookies) => cookies
            .into_iter()
            .map(|c| SessionCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                http_only: c.http_only,
                secure: c.secure,
            })
            .collect(),
        Err(err) => {
            warn!(error = %err, "failed to read cookies for session snapshot");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_result_caps_error_history() {
        let mut result = ExecutionResult::default();
        for i in 0..15 {
            result.push_error(format!("error {i}"));
        }
        assert_eq!(result.errors.len(), 10);
        assert_eq!(result.errors[0], "error 5");
    }
}
