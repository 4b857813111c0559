//! Scraping session state: cookies, storage, and navigation history kept
//! across a sequence of page visits so a multi-step strategy doesn't have to
//! re-authenticate or re-navigate from scratch on every action.
//!
//! This module owns state only — it never touches a browser directly. The
//! executor reads cookies/storage off a live page and hands them to
//! [`SessionManager::save_state`]; on restore it reads the state back out and
//! replays it onto a (possibly different) page.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::ScrapingConfig;
use crate::error::ScrapeError;

/// A single cookie, independent of any particular browser automation crate's
/// wire representation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: String,
    pub base_url: String,
    pub cookies: Vec<SessionCookie>,
    pub local_storage: HashMap<String, String>,
    pub session_storage: HashMap<String, String>,
    pub current_page: String,
    pub visited_pages: Vec<String>,
    pub created_at: Instant,
    pub last_activity: Instant,
    pub request_count: u32,
}

impl SessionState {
    fn new(id: String, base_url: String) -> Self {
        let now = Instant::now();
        Self {
            current_page: base_url.clone(),
            id,
            base_url,
            cookies: Vec::new(),
            local_storage: HashMap::new(),
            session_storage: HashMap::new(),
            visited_pages: Vec::new(),
            created_at: now,
            last_activity: now,
            request_count: 0,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
        self.request_count += 1;
    }

    fn record_visit(&mut self, url: String) {
        if !self.visited_pages.contains(&url) {
            self.visited_pages.push(url.clone());
        }
        self.current_page = url;
    }

    /// Cookies that survive a rotation: `HttpOnly` cookies are tied to the
    /// server-set session that's being rotated away from, so only carry
    /// forward cookies JS (and by extension the next session) could see too.
    fn transferable_cookies(&self) -> Vec<SessionCookie> {
        self.cookies
            .iter()
            .filter(|c| !c.http_only)
            .cloned()
            .collect()
    }
}

/// Tracks live scraping sessions, evicting them by age, idle time, and an
/// LRU cap once the configured ceiling is exceeded.
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<String, SessionState>>>,
    max_sessions: usize,
    idle_timeout: Duration,
    max_age: Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(config: &ScrapingConfig) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            max_sessions: config.max_sessions,
            idle_timeout: Duration::from_secs(config.session_idle_timeout_secs),
            max_age: Duration::from_secs(config.session_max_age_secs),
        }
    }

    pub async fn create_session(&self, base_url: impl Into<String>) -> SessionState {
        let id = uuid::Uuid::new_v4().to_string();
        let session = SessionState::new(id.clone(), base_url.into());
        let mut sessions = self.sessions.lock().await;
        sessions.insert(id, session.clone_for_caller());
        drop(sessions);
        self.enforce_capacity().await;
        session
    }

    pub async fn get(&self, id: &str) -> Option<SessionState> {
        let sessions = self.sessions.lock().await;
        sessions.get(id).map(SessionState::clone_for_caller)
    }

    pub async fn save_state(
        &self,
        id: &str,
        cookies: Vec<SessionCookie>,
        local_storage: HashMap<String, String>,
        session_storage: HashMap<String, String>,
        current_page: String,
    ) -> Result<(), ScrapeError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| ScrapeError::SessionNotFound(id.to_string()))?;
        session.cookies = cookies;
        session.local_storage = local_storage;
        session.session_storage = session_storage;
        session.record_visit(current_page);
        session.touch();
        Ok(())
    }

    pub async fn record_navigation(&self, id: &str, url: String) -> Result<(), ScrapeError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| ScrapeError::SessionNotFound(id.to_string()))?;
        session.record_visit(url);
        session.touch();
        Ok(())
    }

    pub async fn should_rotate(&self, id: &str) -> bool {
        let sessions = self.sessions.lock().await;
        let Some(session) = sessions.get(id) else {
            return true;
        };
        session.created_at.elapsed() > self.max_age || session.request_count > 100
    }

    /// Creates a fresh session for `new_base_url`, carrying forward any
    /// non-`HttpOnly` cookies from `old_id`, then drops the old session.
    pub async fn rotate(&self, old_id: &str, new_base_url: impl Into<String>) -> SessionState {
        let carried = {
            let sessions = self.sessions.lock().await;
            sessions
                .get(old_id)
                .map(SessionState::transferable_cookies)
                .unwrap_or_default()
        };

        let new_session = self.create_session(new_base_url).await;
        {
            let mut sessions = self.sessions.lock().await;
            if let Some(session) = sessions.get_mut(&new_session.id) {
                session.cookies = carried;
            }
        }
        self.remove(old_id).await;
        self.get(&new_session.id).await.unwrap_or(new_session)
    }

    pub async fn remove(&self, id: &str) -> Option<SessionState> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(id)
    }

    /// Removes sessions past `max_age`/`idle_timeout`, then evicts the least
    /// recently active sessions until `max_sessions` is satisfied.
    pub async fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        let max_age = self.max_age;
        let idle_timeout = self.idle_timeout;
        sessions.retain(|_, session| {
            session.created_at.elapsed() <= max_age && session.last_activity.elapsed() <= idle_timeout
        });
        Self::evict_lru(&mut sessions, self.max_sessions);
        before - sessions.len()
    }

    async fn enforce_capacity(&self) {
        let mut sessions = self.sessions.lock().await;
        Self::evict_lru(&mut sessions, self.max_sessions);
    }

    fn evict_lru(sessions: &mut HashMap<String, SessionState>, max_sessions: usize) {
        while sessions.len() > max_sessions {
            let Some(lru_id) = sessions
                .iter()
                .min_by_key(|(_, s)| s.last_activity)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            sessions.remove(&lru_id);
        }
    }

    /// Spawns a background task that runs [`Self::cleanup_expired`] every
    /// 60 seconds. Call once after wrapping the manager in an `Arc`.
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                let removed = self.cleanup_expired().await;
                if removed > 0 {
                    tracing::debug!(removed, "cleaned up expired scraping sessions");
                }
            }
        });
    }
}

impl SessionState {
    /// Sessions are kept behind a lock; callers get an owned snapshot rather
    /// than a reference so they can inspect state without holding the lock.
    fn clone_for_caller(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        let config = ScrapingConfig {
            max_sessions: 2,
            session_idle_timeout_secs: 900,
            session_max_age_secs: 28800,
            ..ScrapingConfig::default()
        };
        SessionManager::new(&config)
    }

    #[tokio::test]
    async fn creates_and_fetches_session() {
        let manager = manager();
        let session = manager.create_session("https://example.com").await;
        let fetched = manager.get(&session.id).await.unwrap();
        assert_eq!(fetched.base_url, "https://example.com");
        assert_eq!(fetched.current_page, "https://example.com");
    }

    #[tokio::test]
    async fn save_state_updates_cookies_and_visited_pages() {
        let manager = manager();
        let session = manager.create_session("https://example.com").await;
        let cookies = vec![SessionCookie {
            name: "sid".into(),
            value: "abc".into(),
            domain: "example.com".into(),
            path: "/".into(),
            http_only: true,
            secure: true,
        }];
        manager
            .save_state(
                &session.id,
                cookies.clone(),
                HashMap::new(),
                HashMap::new(),
                "https://example.com/page2".into(),
            )
            .await
            .unwrap();

        let updated = manager.get(&session.id).await.unwrap();
        assert_eq!(updated.cookies, cookies);
        assert_eq!(updated.visited_pages, vec!["https://example.com/page2"]);
        assert_eq!(updated.request_count, 1);
    }

    #[tokio::test]
    async fn rotate_carries_non_http_only_cookies_only() {
        let manager = manager();
        let old = manager.create_session("https://example.com").await;
        let cookies = vec![
            SessionCookie {
                name: "auth".into(),
                value: "secret".into(),
                domain: "example.com".into(),
                path: "/".into(),
                http_only: true,
                secure: true,
            },
            SessionCookie {
                name: "pref".into(),
                value: "dark-mode".into(),
                domain: "example.com".into(),
                path: "/".into(),
                http_only: false,
                secure: false,
            },
        ];
        manager
            .save_state(&old.id, cookies, HashMap::new(), HashMap::new(), old.base_url.clone())
            .await
            .unwrap();

        let rotated = manager.rotate(&old.id, "https://example.com").await;
        assert_eq!(rotated.cookies.len(), 1);
        assert_eq!(rotated.cookies[0].name, "pref");
        assert!(manager.get(&old.id).await.is_none());
    }

    #[tokio::test]
    async fn enforces_max_sessions_via_lru_eviction() {
        let manager = manager();
        let first = manager.create_session("https://a.example.com").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let _second = manager.create_session("https://b.example.com").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let _third = manager.create_session("https://c.example.com").await;

        assert!(manager.get(&first.id).await.is_none());
    }

    #[tokio::test]
    async fn missing_session_reports_not_found() {
        let manager = manager();
        let err = manager
            .record_navigation("does-not-exist", "https://example.com".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::SessionNotFound(_)));
    }
}
