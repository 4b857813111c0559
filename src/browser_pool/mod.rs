//! Chrome browser pool: a bounded set of pre-warmed browser instances handed
//! out via blocking acquisition rather than a background scaler. `acquire`
//! blocks up to [`ACQUIRE_SOFT_DEADLINE`]; past that point it evicts the
//! least-recently-used idle instance to make room, and fails outright once
//! [`ACQUIRE_HARD_DEADLINE`] has elapsed with every instance still checked
//! out.

use anyhow::{Context, Result};
use chromiumoxide::browser::Browser;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long `acquire` waits for an idle instance before forcing an LRU eviction.
const ACQUIRE_SOFT_DEADLINE: Duration = Duration::from_secs(30);
/// Total time `acquire` will wait before giving up when every instance is in use.
const ACQUIRE_HARD_DEADLINE: Duration = Duration::from_secs(60);
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Static configuration for a [`BrowserPool`].
#[derive(Debug, Clone)]
pub struct BrowserPoolConfig {
    /// Browsers to pre-warm on `start` (default: 2).
    pub min_pool_size: usize,
    /// `|pool|` never exceeds this (default: 10).
    pub max_pool_size: usize,
    /// Run browsers in headless mode (default: true).
    pub headless: bool,
    /// Destroy an instance once it has been handed out this many times
    /// (default: 100) — bounds per-process memory growth from long-lived
    /// renderer state.
    pub max_requests: u32,
    /// Destroy an instance once it has been alive this long, regardless of
    /// use (default: 30 minutes).
    pub max_age: Duration,
}

impl Default for BrowserPoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: 2,
            max_pool_size: 10,
            headless: true,
            max_requests: 100,
            max_age: Duration::from_secs(1800),
        }
    }
}

/// RAII wrapper for a pooled browser instance.
///
/// The browser is stored in an `Arc` to allow sharing across concurrent tasks
/// while the guard manages the lifecycle.
#[derive(Debug)]
pub struct PooledBrowserWrapper {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl PooledBrowserWrapper {
    pub(crate) fn new(browser: Browser, handler: JoinHandle<()>, user_data_dir: PathBuf) -> Self {
        Self { browser: Arc::new(browser), handler, user_data_dir: Some(user_data_dir) }
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Arc-wrapped browser for sharing across concurrent tasks.
    pub fn browser_arc(&self) -> Arc<Browser> {
        Arc::clone(&self.browser)
    }

    /// Mutable reference to the inner browser; only succeeds if no other `Arc` refs exist.
    pub fn browser_mut(&mut self) -> Option<&mut Browser> {
        Arc::get_mut(&mut self.browser)
    }

    pub fn cleanup_temp_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            debug!(path = %path.display(), "cleaning up pool browser temp directory");
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(path = %path.display(), error = %e, "failed to clean up temp directory");
            }
        }
    }
}

impl Drop for PooledBrowserWrapper {
    fn drop(&mut self) {
        self.handler.abort();
        if self.user_data_dir.is_some() {
            self.cleanup_temp_dir();
        }
    }
}

/// A browser instance with pool metadata.
#[derive(Debug)]
pub struct PooledBrowser {
    pub id: u64,
    pub wrapper: PooledBrowserWrapper,
    pub created_at: Instant,
    /// Last time this instance was acquired or released; the front of the
    /// idle queue is always the least-recently-used instance.
    pub last_used: Instant,
    /// Number of times this instance has been handed out via `acquire`.
    pub request_count: u32,
}

impl PooledBrowser {
    fn new(id: u64, wrapper: PooledBrowserWrapper) -> Self {
        let now = Instant::now();
        Self { id, wrapper, created_at: now, last_used: now, request_count: 0 }
    }

    fn exceeds_lifetime(&self, config: &BrowserPoolConfig) -> bool {
        self.request_count >= config.max_requests || self.created_at.elapsed() >= config.max_age
    }
}

/// Bounded, blocking-acquire Chrome browser pool.
#[derive(Debug)]
pub struct BrowserPool {
    config: BrowserPoolConfig,
    /// Idle instances, ordered least-recently-used at the front. `Arc`-wrapped
    /// so `release` can hand a clone to a spawned task without borrowing `self`.
    available: Arc<Mutex<VecDeque<PooledBrowser>>>,
    in_use_count: AtomicUsize,
    next_id: AtomicU64,
}

impl BrowserPool {
    #[must_use]
    pub fn new(config: BrowserPoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            available: Arc::new(Mutex::new(VecDeque::new())),
            in_use_count: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
        })
    }

    /// Pre-warms the pool to `min_pool_size`. No background tasks are
    /// started — every eviction and health check happens inline in `acquire`.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        info!(config = ?self.config, "starting browser pool");
        self.launch_up_to(self.config.min_pool_size).await;
        info!(prewarmed = self.available.lock().await.len(), "browser pool started");
        Ok(())
    }

    async fn launch_up_to(&self, target: usize) {
        let current = self.available.lock().await.len();
        if current >= target {
            return;
        }
        let futs: Vec<_> = (0..target - current).map(|_| self.launch_browser_internal()).collect();
        let results = futures::future::join_all(futs).await;

        let mut available = self.available.lock().await;
        for result in results {
            match result {
                Ok(browser) => available.push_back(browser),
                Err(e) => warn!(error = %e, "failed to launch browser while pre-warming pool"),
            }
        }
    }

    /// Acquires a browser, blocking per the contract described on
    /// [`BrowserPool`]: up to [`ACQUIRE_SOFT_DEADLINE`] for an idle instance
    /// to become available or for room to launch a fresh one, then forcing
    /// an LRU eviction, then failing after [`ACQUIRE_HARD_DEADLINE`].
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledBrowserGuard> {
        self.acquire_inner(false).await
    }

    /// Same as `acquire`, but skips reuse of any existing idle instance even
    /// if one is healthy — always launches a fresh browser (subject to the
    /// same pool-capacity blocking rules).
    pub async fn acquire_force_new(self: &Arc<Self>) -> Result<PooledBrowserGuard> {
        self.acquire_inner(true).await
    }

    async fn acquire_inner(self: &Arc<Self>, force_new: bool) -> Result<PooledBrowserGuard> {
        let start = Instant::now();

        loop {
            if !force_new {
                if let Some(guard) = self.try_take_idle().await? {
                    return Ok(guard);
                }
            }

            let total = self.in_use_count.load(Ordering::Relaxed) + self.available.lock().await.len();
            if total < self.config.max_pool_size {
                let browser = self.launch_browser_internal().await?;
                self.in_use_count.fetch_add(1, Ordering::Relaxed);
                debug!(id = browser.id, "launched new browser for acquire");
                return Ok(PooledBrowserGuard { browser: Some(browser), pool: Arc::clone(self) });
            }

            let elapsed = start.elapsed();
            if elapsed >= ACQUIRE_SOFT_DEADLINE {
                if let Some(evicted) = self.evict_lru_idle().await {
                    warn!(id = evicted.id, waited_ms = elapsed.as_millis() as u64, "evicting LRU idle browser to satisfy acquire");
                    let browser = self.launch_browser_internal().await?;
                    self.in_use_count.fetch_add(1, Ordering::Relaxed);
                    return Ok(PooledBrowserGuard { browser: Some(browser), pool: Arc::clone(self) });
                }
            }

            if elapsed >= ACQUIRE_HARD_DEADLINE {
                anyhow::bail!(
                    "browser pool exhausted: all {} instances busy after {:?}",
                    self.config.max_pool_size,
                    elapsed
                );
            }

            tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
        }
    }

    /// Pops idle instances until it finds one that's still within its
    /// lifetime and passes a health check, evicting anything stale along
    /// the way. Returns `Ok(None)` if the idle queue is empty.
    async fn try_take_idle(self: &Arc<Self>) -> Result<Option<PooledBrowserGuard>> {
        loop {
            let mut available = self.available.lock().await;
            let Some(mut browser) = available.pop_front() else {
                return Ok(None);
            };
            drop(available);

            if browser.exceeds_lifetime(&self.config) {
                debug!(id = browser.id, requests = browser.request_count, age = ?browser.created_at.elapsed(), "retiring stale browser");
                browser.wrapper.cleanup_temp_dir();
                continue;
            }

            match browser.wrapper.browser().version().await {
                Ok(_) => {
                    browser.last_used = Instant::now();
                    browser.request_count += 1;
                    self.in_use_count.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(PooledBrowserGuard { browser: Some(browser), pool: Arc::clone(self) }));
                }
                Err(e) => {
                    warn!(id = browser.id, error = %e, "browser failed health check during acquire");
                    continue;
                }
            }
        }
    }

    /// Evicts and returns the front (least-recently-used) idle instance, if any.
    async fn evict_lru_idle(&self) -> Option<PooledBrowser> {
        let mut browser = self.available.lock().await.pop_front()?;
        browser.wrapper.cleanup_temp_dir();
        Some(browser)
    }

    fn release(&self, mut browser: PooledBrowser) {
        self.in_use_count.fetch_sub(1, Ordering::Relaxed);
        browser.last_used = Instant::now();

        if browser.exceeds_lifetime(&self.config) {
            browser.wrapper.cleanup_temp_dir();
            debug!(id = browser.id, "destroying browser on release, past its lifetime");
            return;
        }

        let id = browser.id;
        // Pool push happens off the drop path since BrowserPool::release
        // itself is sync (called from Drop) but the mutex guard is async.
        let available = Arc::clone(&self.available);
        tokio::spawn(async move {
            available.lock().await.push_back(browser);
            debug!(id, "released browser back to pool");
        });
    }

    pub async fn shutdown(&self) -> Result<()> {
        info!("shutting down browser pool");
        let mut available = self.available.lock().await;
        while let Some(mut browser) = available.pop_front() {
            if let Some(b) = browser.wrapper.browser_mut() {
                if let Err(e) = b.close().await {
                    warn!(id = browser.id, error = %e, "failed to close browser");
                }
                let _ = b.wait().await;
            } else {
                warn!(id = browser.id, "browser has outstanding references, skipping graceful close");
            }
            browser.wrapper.cleanup_temp_dir();
        }
        info!("browser pool shutdown complete");
        Ok(())
    }

    async fn launch_browser_internal(&self) -> Result<PooledBrowser> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let profile = crate::browser_profile::create_unique_profile_with_prefix("iwsa_chrome_pool")
            .context("failed to create unique pool browser profile")?;
        let user_data_dir = profile.into_path();

        let (browser, handler, _returned_dir) =
            crate::browser_setup::launch_browser(self.config.headless, Some(user_data_dir.clone()))
                .await
                .context("failed to launch browser for pool")?;

        let wrapper = PooledBrowserWrapper::new(browser, handler, user_data_dir);
        Ok(PooledBrowser::new(id, wrapper))
    }
}

/// RAII guard that returns its browser to the pool on drop.
pub struct PooledBrowserGuard {
    browser: Option<PooledBrowser>,
    pool: Arc<BrowserPool>,
}

impl PooledBrowserGuard {
    pub fn browser(&self) -> &Browser {
        self.browser.as_ref().expect("browser should be present").wrapper.browser()
    }

    /// Arc-wrapped browser for sharing across concurrent tasks — the primary
    /// accessor used by the executor, which clones it into spawned tasks.
    pub fn browser_arc(&self) -> Arc<Browser> {
        self.browser.as_ref().expect("browser should be present").wrapper.browser_arc()
    }

    pub fn id(&self) -> u64 {
        self.browser.as_ref().expect("browser should be present").id
    }
}

impl Drop for PooledBrowserGuard {
    fn drop(&mut self) {
        if let Some(browser) = self.browser.take() {
            self.pool.release(browser);
        }
    }
}
