//! Browser Pool - amortizes browser startup across scrapes
//!
//! Owns one headless browser, a pool of reusable browser contexts, and a
//! fast-path pool of pre-warmed pages. [`BrowserPool::with_page`] borrows
//! a page, runs the caller's logic, and guarantees cleanup on every exit
//! path, including cancellation mid-borrow.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::{
    ClearBrowserCookiesParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::js_protocol::heap_profiler::CollectGarbageParams;
use chromiumoxide::Page;
use rand::Rng;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::context::{ContextLease, ContextPool, PoolState};
use super::manager::{BrowserManager, BrowserOptions, BrowserState, USER_AGENT};
use super::routing::install_resource_filter;
use crate::error::{Result, ScrapeError};

/// Probability of trying the warm page pool before leasing a context
const WARM_BORROW_PROBABILITY: f64 = 0.8;
/// Probability of clearing cookies when resetting a warm page
const COOKIE_CLEAR_PROBABILITY: f64 = 0.3;
/// Probability of closing a page-less surplus context on release
const CONTEXT_CLOSE_PROBABILITY: f64 = 0.3;
/// Deadline for resetting a warm page before falling back
const WARM_RESET_TIMEOUT: Duration = Duration::from_millis(500);
/// Draining-recovery retry spacing
const DRAIN_RETRY_DELAY: Duration = Duration::from_secs(1);
const DRAIN_RETRY_ATTEMPTS: u32 = 3;
/// Startup retry attempts with linear backoff (2s, 4s, 6s)
const START_ATTEMPTS: u32 = 3;

const STORAGE_RESET_JS: &str = r#"
    (() => {
        try { localStorage.clear(); } catch (e) {}
        try { sessionStorage.clear(); } catch (e) {}
        window.scrollTo(0, 0);
        return true;
    })()
"#;

/// Configuration for the browser pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on pooled browser contexts
    pub max_contexts: usize,
    /// Contexts kept warm at all times
    pub min_contexts: usize,
    /// Pages allowed per context before it stops accepting borrows
    pub max_pages_per_context: usize,
    /// Deadline for page creation and per-page operations
    pub page_timeout: Duration,
    /// Deadline for acquiring a context from the pool
    pub acquire_timeout: Duration,
    /// Idle age after which surplus contexts are evicted
    pub idle_timeout: Duration,
    /// Idle age used by aggressive eviction under memory pressure
    pub soft_idle: Duration,
    /// Browser options for the managed instance
    pub browser_options: BrowserOptions,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_contexts: 20,
            min_contexts: 2,
            max_pages_per_context: 10,
            page_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            soft_idle: Duration::from_secs(30),
            browser_options: BrowserOptions::default(),
        }
    }
}

/// Where a borrowed page came from, deciding its release path
enum PageOrigin {
    /// Borrowed from the warm page pool; returned there on clean release
    Warm,
    /// Freshly created inside a leased context; disposed on release
    Fresh { lease: ContextLease },
}

/// Scope guard for a borrowed page.
///
/// If the `with_page` future is dropped mid-flight (timeout, caller
/// cancellation), `Drop` spawns the release path so the page and its
/// context lease are never leaked.
struct PageGuard {
    page: Option<Page>,
    origin: Option<PageOrigin>,
    pool: BrowserPool,
}

impl PageGuard {
    fn disarm(&mut self) -> (Page, PageOrigin) {
        (
            self.page.take().expect("guard disarmed twice"),
            self.origin.take().expect("guard disarmed twice"),
        )
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let (Some(page), Some(origin)) = (self.page.take(), self.origin.take()) {
            let pool = self.pool.clone();
            tokio::spawn(async move {
                pool.release_page(page, origin).await;
            });
        }
    }
}

/// Point-in-time pool status for the health surface
#[derive(Debug, Clone, Serialize)]
pub struct BrowserStatus {
    pub state: String,
    pub connected: bool,
    pub contexts_live: usize,
    pub contexts_leased: usize,
    pub contexts_idle: usize,
    pub warm_pages: usize,
    pub pages_in_use: usize,
}

/// Cumulative pool metrics
#[derive(Debug, Clone, Serialize)]
pub struct BrowserMetrics {
    pub pages_processed: u64,
    pub warm_hits: u64,
    pub fresh_pages: u64,
    pub contexts_live: usize,
    pub pages_in_use: usize,
}

struct PoolInner {
    config: PoolConfig,
    manager: BrowserManager,
    contexts: ContextPool,
    warm_pages: Mutex<Vec<Page>>,
    pages_in_use: AtomicUsize,
    warm_hits: std::sync::atomic::AtomicU64,
    fresh_pages: std::sync::atomic::AtomicU64,
    shut_down: AtomicBool,
}

/// Browser Pool - the borrowing facade over browser, contexts and pages
#[derive(Clone)]
pub struct BrowserPool {
    inner: Arc<PoolInner>,
}

impl BrowserPool {
    /// Prepare a pool. The browser is not launched until [`BrowserPool::start`].
    pub fn new(config: PoolConfig) -> Result<Self> {
        let manager = BrowserManager::new(config.browser_options.clone())?;
        let contexts = ContextPool::new(
            manager.clone(),
            config.max_contexts,
            config.min_contexts,
            config.max_pages_per_context,
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                manager,
                contexts,
                warm_pages: Mutex::new(Vec::new()),
                pages_in_use: AtomicUsize::new(0),
                warm_hits: std::sync::atomic::AtomicU64::new(0),
                fresh_pages: std::sync::atomic::AtomicU64::new(0),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    /// Launch the browser and warm the minimum contexts, retrying up to
    /// three times with linear backoff (2s, 4s, 6s).
    pub async fn start(&self) -> Result<()> {
        let mut last_err = None;
        for attempt in 1..=START_ATTEMPTS {
            match self.try_start().await {
                Ok(()) => {
                    info!(
                        "Browser pool started ({} contexts warm)",
                        self.inner.contexts.idle_contexts().await
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!("Pool start attempt {}/{} failed: {}", attempt, START_ATTEMPTS, e);
                    last_err = Some(e);
                    if attempt < START_ATTEMPTS {
                        tokio::time::sleep(Duration::from_secs(2 * attempt as u64)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or(ScrapeError::Internal(
            "pool start failed without error".to_string(),
        )))
    }

    async fn try_start(&self) -> Result<()> {
        self.inner.manager.launch().await?;
        self.inner
            .contexts
            .prewarm(self.inner.config.min_contexts)
            .await;

        // Fast-path page pool, one warm page per minimum context.
        for _ in 0..self.inner.config.min_contexts {
            match self.create_fresh_warm_page().await {
                Ok(page) => self.inner.warm_pages.lock().await.push(page),
                Err(e) => {
                    debug!("Skipping warm page pre-creation: {}", e);
                    break;
                }
            }
        }
        Ok(())
    }

    /// A warm-pool page lives in the browser's default context.
    async fn create_fresh_warm_page(&self) -> Result<Page> {
        let page = tokio::time::timeout(
            self.inner.config.page_timeout,
            self.inner.manager.new_page(None),
        )
        .await
        .map_err(|_| ScrapeError::Browser {
            reason: "warm page creation timed out".to_string(),
        })??;
        self.init_page(&page).await?;
        Ok(page)
    }

    /// One-time page setup: realistic user agent and the resource filter.
    async fn init_page(&self, page: &Page) -> Result<()> {
        page.execute(SetUserAgentOverrideParams::new(USER_AGENT))
            .await?;
        install_resource_filter(page).await?;
        Ok(())
    }

    /// Borrow a page, run `f` against it, and release it on every exit
    /// path. Successful completions count toward the restart threshold.
    pub async fn with_page<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Page) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(ScrapeError::PoolClosed);
        }
        if self.inner.manager.state() == BrowserState::Shutdown {
            return Err(ScrapeError::PoolClosed);
        }

        let (page, origin) = self.acquire_page().await?;
        self.inner.pages_in_use.fetch_add(1, Ordering::SeqCst);

        let mut guard = PageGuard {
            page: Some(page.clone()),
            origin: Some(origin),
            pool: self.clone(),
        };

        let result = f(page).await;

        let (page, origin) = guard.disarm();
        drop(guard);
        self.release_page(page, origin).await;

        if result.is_ok() && self.inner.manager.record_page_processed() {
            let pool = self.clone();
            info!("Restart threshold reached, scheduling browser restart");
            tokio::spawn(async move {
                if let Err(e) = pool.force_cleanup_and_restart().await {
                    warn!("Scheduled browser restart failed: {}", e);
                }
            });
        }

        result
    }

    /// Page acquisition: warm pool fast path, context lease otherwise.
    async fn acquire_page(&self) -> Result<(Page, PageOrigin)> {
        let try_warm = {
            let mut rng = rand::thread_rng();
            rng.gen_bool(WARM_BORROW_PROBABILITY)
        };

        if try_warm {
            if let Some(page) = self.borrow_warm_page().await {
                self.inner.warm_hits.fetch_add(1, Ordering::SeqCst);
                return Ok((page, PageOrigin::Warm));
            }
        }

        let lease = self.acquire_context_with_recovery().await?;
        let page = match tokio::time::timeout(
            self.inner.config.page_timeout,
            self.inner.manager.new_page(Some(&lease.context_id())),
        )
        .await
        {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                lease.discard().await;
                return Err(e);
            }
            Err(_) => {
                lease.discard().await;
                return Err(ScrapeError::Browser {
                    reason: "page creation timed out".to_string(),
                });
            }
        };

        if let Err(e) = self.init_page(&page).await {
            let _ = page.close().await;
            lease.discard().await;
            return Err(e);
        }

        let mut lease = lease;
        lease.note_page_opened();
        self.inner.fresh_pages.fetch_add(1, Ordering::SeqCst);
        Ok((page, PageOrigin::Fresh { lease }))
    }

    /// Pop a warm page and reset it under a short deadline. A page that
    /// will not reset in time is closed rather than waited on.
    async fn borrow_warm_page(&self) -> Option<Page> {
        let page = self.inner.warm_pages.lock().await.pop()?;

        let clear_cookies = {
            let mut rng = rand::thread_rng();
            rng.gen_bool(COOKIE_CLEAR_PROBABILITY)
        };

        match tokio::time::timeout(WARM_RESET_TIMEOUT, self.reset_warm_page(&page, clear_cookies))
            .await
        {
            Ok(Ok(())) => Some(page),
            Ok(Err(e)) => {
                debug!("Warm page reset failed, disposing: {}", e);
                let _ = page.close().await;
                None
            }
            Err(_) => {
                debug!("Warm page reset timed out, disposing");
                let _ = page.close().await;
                None
            }
        }
    }

    async fn reset_warm_page(&self, page: &Page, clear_cookies: bool) -> Result<()> {
        page.evaluate(STORAGE_RESET_JS).await?;
        if clear_cookies {
            page.execute(ClearBrowserCookiesParams::default()).await?;
        }
        Ok(())
    }

    /// Context acquisition with draining recovery: a drain-state failure
    /// resets the context pool and retries with 1s spacing.
    async fn acquire_context_with_recovery(&self) -> Result<ContextLease> {
        let mut last_err = None;
        for attempt in 1..=DRAIN_RETRY_ATTEMPTS {
            match self
                .inner
                .contexts
                .acquire(self.inner.config.acquire_timeout)
                .await
            {
                Ok(lease) => return Ok(lease),
                Err(e) => {
                    if self.inner.contexts.is_draining() {
                        warn!(
                            "Context acquire hit draining pool (attempt {}/{}), resetting",
                            attempt, DRAIN_RETRY_ATTEMPTS
                        );
                        if let Err(reset_err) = self.inner.contexts.reset().await {
                            warn!("Context pool reset failed: {}", reset_err);
                        }
                        last_err = Some(e);
                        tokio::time::sleep(DRAIN_RETRY_DELAY).await;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
        Err(last_err.unwrap_or(ScrapeError::Browser {
            reason: "context pool unavailable".to_string(),
        }))
    }

    /// Always-runs cleanup for a borrowed page.
    async fn release_page(&self, page: Page, origin: PageOrigin) {
        self.inner.pages_in_use.fetch_sub(1, Ordering::SeqCst);

        match origin {
            PageOrigin::Warm => {
                // Attempt to make the page reusable; dispose on any failure.
                let reusable = self.reset_warm_page(&page, false).await.is_ok();
                let pooled = reusable && !self.inner.shut_down.load(Ordering::SeqCst);
                if pooled {
                    self.inner.warm_pages.lock().await.push(page);
                } else {
                    let _ = page.close().await;
                }
            }
            PageOrigin::Fresh { mut lease } => {
                if let Err(e) = self.reset_warm_page(&page, false).await {
                    debug!("Best-effort storage clear failed on release: {}", e);
                }
                if let Err(e) = page.close().await {
                    debug!("Failed to close page on release: {}", e);
                }
                lease.note_page_closed();

                let close_context = lease.active_pages() == 0
                    && self.inner.contexts.live_contexts() > self.inner.contexts.min_contexts()
                    && {
                        let mut rng = rand::thread_rng();
                        rng.gen_bool(CONTEXT_CLOSE_PROBABILITY)
                    };

                if close_context {
                    lease.discard().await;
                } else {
                    lease.release().await;
                }
            }
        }
    }

    /// Proactively close idle contexts exceeding the minimum.
    pub async fn release_unused_contexts(&self) -> usize {
        self.inner
            .contexts
            .evict_idle(self.inner.config.idle_timeout)
            .await
    }

    /// Aggressive variant used under memory pressure: shorter idle bar.
    pub async fn release_unused_contexts_aggressive(&self) -> usize {
        self.inner
            .contexts
            .evict_idle(self.inner.config.soft_idle)
            .await
    }

    /// Close one idle context immediately, ignoring idle age.
    pub async fn close_one_context(&self) -> bool {
        self.inner.contexts.evict_one().await
    }

    /// Replace the browser and rebuild the context pool. In-flight pages
    /// finish against the old instance, which lingers 10s after the swap.
    pub async fn force_cleanup_and_restart(&self) -> Result<()> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(ScrapeError::PoolClosed);
        }

        info!("Forcing browser cleanup and restart");
        self.inner.contexts.begin_drain();

        // Warm pages belong to the outgoing browser.
        let stale_pages: Vec<Page> = self.inner.warm_pages.lock().await.drain(..).collect();
        for page in stale_pages {
            let _ = page.close().await;
        }

        self.inner.manager.restart().await?;
        self.inner.contexts.reset().await?;

        // Rebuild the fast path against the fresh browser.
        for _ in 0..self.inner.config.min_contexts {
            match self.create_fresh_warm_page().await {
                Ok(page) => self.inner.warm_pages.lock().await.push(page),
                Err(e) => {
                    debug!("Warm page rebuild skipped: {}", e);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Ask the renderer to collect garbage, best-effort.
    pub async fn request_gc(&self) {
        let pages = self.inner.warm_pages.lock().await;
        if let Some(page) = pages.first() {
            if let Err(e) = page.execute(CollectGarbageParams::default()).await {
                debug!("GC request failed: {}", e);
            }
        }
    }

    /// Drain both pools and close the browser. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Shutting down browser pool");
        let pages: Vec<Page> = self.inner.warm_pages.lock().await.drain(..).collect();
        for page in pages {
            if let Err(e) = page.close().await {
                debug!("Failed to close warm page during shutdown: {}", e);
            }
        }
        self.inner.contexts.close().await;
        self.inner.manager.close().await;
        Ok(())
    }

    pub async fn status(&self) -> BrowserStatus {
        BrowserStatus {
            state: self.inner.manager.state().to_string(),
            connected: self.inner.manager.is_connected().await,
            contexts_live: self.inner.contexts.live_contexts(),
            contexts_leased: self.inner.contexts.leased_contexts(),
            contexts_idle: self.inner.contexts.idle_contexts().await,
            warm_pages: self.inner.warm_pages.lock().await.len(),
            pages_in_use: self.inner.pages_in_use.load(Ordering::SeqCst),
        }
    }

    pub fn metrics(&self) -> BrowserMetrics {
        BrowserMetrics {
            pages_processed: self.inner.manager.pages_processed(),
            warm_hits: self.inner.warm_hits.load(Ordering::SeqCst),
            fresh_pages: self.inner.fresh_pages.load(Ordering::SeqCst),
            contexts_live: self.inner.contexts.live_contexts(),
            pages_in_use: self.inner.pages_in_use.load(Ordering::SeqCst),
        }
    }

    /// Pages currently borrowed out of the pool.
    pub fn pages_in_use(&self) -> usize {
        self.inner.pages_in_use.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub(crate) fn context_pool_state(&self) -> PoolState {
        self.inner.contexts.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_contexts, 20);
        assert_eq!(config.min_contexts, 2);
        assert_eq!(config.max_pages_per_context, 10);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_probabilities_are_sane() {
        assert!(WARM_BORROW_PROBABILITY > 0.0 && WARM_BORROW_PROBABILITY < 1.0);
        assert!(COOKIE_CLEAR_PROBABILITY > 0.0 && COOKIE_CLEAR_PROBABILITY < 1.0);
        assert!(CONTEXT_CLOSE_PROBABILITY > 0.0 && CONTEXT_CLOSE_PROBABILITY < 1.0);
    }
}
