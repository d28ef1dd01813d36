//! Browser context pool
//!
//! A browser context is the unit of lease: exactly one borrower at a time,
//! its own cookies/storage/cache. The pool keeps contexts warm between
//! borrows (LIFO, so recently used contexts stay hot), evicts idle ones
//! beyond the minimum, and supports a background-draining reset used for
//! recovery and browser restarts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use super::manager::BrowserManager;
use crate::error::{Result, ScrapeError};

/// Per-context pre-warm deadline during reset
const PREWARM_TIMEOUT: Duration = Duration::from_secs(10);

/// Context pool lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Running,
    Draining,
    Closed,
}

/// A pooled browser context with usage bookkeeping
#[derive(Debug)]
pub struct PooledContext {
    pub id: BrowserContextId,
    /// Pages currently open in this context
    pub active_pages: usize,
    pub last_used: Instant,
    pub created_at: Instant,
    /// Cleared when the context is known to be unusable
    pub valid: bool,
    /// Pool generation this context belongs to
    generation: u64,
}

struct ContextPoolInner {
    manager: BrowserManager,
    max_contexts: usize,
    min_contexts: usize,
    max_pages_per_context: usize,
    available: Mutex<VecDeque<PooledContext>>,
    /// Gates the number of simultaneously leased contexts
    semaphore: Arc<Semaphore>,
    /// Contexts alive in the current generation (available + leased)
    live: AtomicUsize,
    leased: AtomicUsize,
    state: std::sync::RwLock<PoolState>,
    generation: AtomicU64,
}

/// Pool of reusable browser contexts. Clones share state.
#[derive(Clone)]
pub struct ContextPool {
    inner: Arc<ContextPoolInner>,
}

/// Exclusive lease on a pooled context.
///
/// Consume with [`ContextLease::release`] or [`ContextLease::discard`];
/// a lease dropped without either disposes its context in the background.
pub struct ContextLease {
    ctx: Option<PooledContext>,
    pool: ContextPool,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl ContextLease {
    pub fn context_id(&self) -> BrowserContextId {
        self.ctx.as_ref().expect("lease already consumed").id.clone()
    }

    pub fn note_page_opened(&mut self) {
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.active_pages += 1;
        }
    }

    pub fn note_page_closed(&mut self) {
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.active_pages = ctx.active_pages.saturating_sub(1);
        }
    }

    pub fn active_pages(&self) -> usize {
        self.ctx.as_ref().map(|c| c.active_pages).unwrap_or(0)
    }

    /// Return the context to the pool for reuse.
    pub async fn release(mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.pool.checkin(ctx).await;
        }
    }

    /// Destroy the context instead of returning it.
    pub async fn discard(mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.pool.dispose(ctx).await;
        }
    }
}

impl Drop for ContextLease {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            let pool = self.pool.clone();
            tokio::spawn(async move {
                pool.dispose(ctx).await;
            });
        }
    }
}

impl ContextPool {
    pub fn new(
        manager: BrowserManager,
        max_contexts: usize,
        min_contexts: usize,
        max_pages_per_context: usize,
    ) -> Self {
        Self {
            inner: Arc::new(ContextPoolInner {
                manager,
                max_contexts,
                min_contexts,
                max_pages_per_context,
                available: Mutex::new(VecDeque::new()),
                semaphore: Arc::new(Semaphore::new(max_contexts)),
                live: AtomicUsize::new(0),
                leased: AtomicUsize::new(0),
                state: std::sync::RwLock::new(PoolState::Running),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> PoolState {
        *self.inner.state.read().expect("pool state lock poisoned")
    }

    fn set_state(&self, state: PoolState) {
        *self.inner.state.write().expect("pool state lock poisoned") = state;
    }

    /// Whether the pool is currently draining (resets and shutdown).
    pub fn is_draining(&self) -> bool {
        self.state() == PoolState::Draining
    }

    /// Contexts alive in the current generation.
    pub fn live_contexts(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Contexts currently leased out.
    pub fn leased_contexts(&self) -> usize {
        self.inner.leased.load(Ordering::SeqCst)
    }

    /// Contexts sitting warm in the pool.
    pub async fn idle_contexts(&self) -> usize {
        self.inner.available.lock().await.len()
    }

    /// Acquire an exclusive context lease.
    ///
    /// Borrowing is LIFO-biased: the most recently returned context is
    /// handed out first. Invalid or page-saturated contexts found on the
    /// way are disposed or skipped.
    pub async fn acquire(&self, timeout: Duration) -> Result<ContextLease> {
        match self.state() {
            PoolState::Running => {}
            PoolState::Draining => {
                return Err(ScrapeError::Browser {
                    reason: "context pool is draining".to_string(),
                })
            }
            PoolState::Closed => return Err(ScrapeError::PoolClosed),
        }

        let permit = tokio::time::timeout(
            timeout,
            Arc::clone(&self.inner.semaphore).acquire_owned(),
        )
        .await
        .map_err(|_| ScrapeError::PoolTimeout {
            timeout_secs: timeout.as_secs(),
        })?
        .map_err(|_| ScrapeError::PoolClosed)?;

        // LIFO borrow with validation; saturated contexts are parked at
        // the front so they are retried last.
        let mut parked = Vec::new();
        let borrowed = {
            let mut available = self.inner.available.lock().await;
            let mut found = None;
            while let Some(ctx) = available.pop_back() {
                if !ctx.valid {
                    self.inner.live.fetch_sub(1, Ordering::SeqCst);
                    let pool = self.clone();
                    let id = ctx.id.clone();
                    tokio::spawn(async move { pool.inner.manager.dispose_context(id).await });
                    continue;
                }
                if ctx.active_pages >= self.inner.max_pages_per_context {
                    parked.push(ctx);
                    continue;
                }
                found = Some(ctx);
                break;
            }
            for ctx in parked {
                available.push_front(ctx);
            }
            found
        };

        if let Some(mut ctx) = borrowed {
            ctx.last_used = Instant::now();
            self.inner.leased.fetch_add(1, Ordering::SeqCst);
            debug!("Reusing pooled browser context");
            return Ok(ContextLease {
                ctx: Some(ctx),
                pool: self.clone(),
                _permit: permit,
            });
        }

        let ctx = self.create_context().await?;
        self.inner.leased.fetch_add(1, Ordering::SeqCst);
        Ok(ContextLease {
            ctx: Some(ctx),
            pool: self.clone(),
            _permit: permit,
        })
    }

    async fn create_context(&self) -> Result<PooledContext> {
        let id = self.inner.manager.new_context().await?;
        self.inner.live.fetch_add(1, Ordering::SeqCst);
        let now = Instant::now();
        debug!(
            "Created browser context ({} live)",
            self.inner.live.load(Ordering::SeqCst)
        );
        Ok(PooledContext {
            id,
            active_pages: 0,
            last_used: now,
            created_at: now,
            valid: true,
            generation: self.inner.generation.load(Ordering::SeqCst),
        })
    }

    /// Return a leased context to the pool. Contexts from a superseded
    /// generation are disposed instead of re-pooled.
    async fn checkin(&self, mut ctx: PooledContext) {
        self.inner.leased.fetch_sub(1, Ordering::SeqCst);

        let current_gen = self.inner.generation.load(Ordering::SeqCst);
        if ctx.generation != current_gen || self.state() != PoolState::Running {
            self.dispose_inner(ctx).await;
            return;
        }

        ctx.last_used = Instant::now();
        let mut available = self.inner.available.lock().await;
        available.push_back(ctx);
    }

    /// Dispose a leased context.
    async fn dispose(&self, ctx: PooledContext) {
        self.inner.leased.fetch_sub(1, Ordering::SeqCst);
        self.dispose_inner(ctx).await;
    }

    async fn dispose_inner(&self, ctx: PooledContext) {
        self.inner.live.fetch_sub(1, Ordering::SeqCst);
        self.inner.manager.dispose_context(ctx.id).await;
    }

    /// Pre-warm up to `count` contexts, one at a time, each under a 10s
    /// deadline. Returns how many were actually created.
    pub async fn prewarm(&self, count: usize) -> usize {
        let mut created = 0;
        for _ in 0..count {
            if self.live_contexts() >= self.inner.max_contexts {
                break;
            }
            match tokio::time::timeout(PREWARM_TIMEOUT, self.create_context()).await {
                Ok(Ok(ctx)) => {
                    self.inner.available.lock().await.push_back(ctx);
                    created += 1;
                }
                Ok(Err(e)) => {
                    warn!("Failed to pre-warm context: {}", e);
                    break;
                }
                Err(_) => {
                    warn!("Context pre-warm timed out after 10s");
                    break;
                }
            }
        }
        if created > 0 {
            debug!("Pre-warmed {} contexts", created);
        }
        created
    }

    /// Close idle contexts beyond the minimum that have not been used for
    /// `idle_timeout`. Returns the number closed.
    pub async fn evict_idle(&self, idle_timeout: Duration) -> usize {
        let to_close = {
            let mut available = self.inner.available.lock().await;
            let min = self.inner.min_contexts;
            let mut close = Vec::new();
            // Oldest contexts live at the front of the deque.
            loop {
                if self.inner.live.load(Ordering::SeqCst) <= min + close.len() {
                    break;
                }
                match available.front() {
                    Some(ctx) if ctx.last_used.elapsed() >= idle_timeout => {
                        close.push(available.pop_front().expect("front checked"));
                    }
                    _ => break,
                }
            }
            close
        };

        let count = to_close.len();
        for ctx in to_close {
            self.dispose_inner(ctx).await;
        }
        if count > 0 {
            info!("Evicted {} idle contexts", count);
        }
        count
    }

    /// Close at most one idle context regardless of idle age, preferring
    /// the least recently used one. Used under critical memory pressure.
    pub async fn evict_one(&self) -> bool {
        let ctx = self.inner.available.lock().await.pop_front();
        match ctx {
            Some(ctx) => {
                self.dispose_inner(ctx).await;
                info!("Evicted one context under memory pressure");
                true
            }
            None => false,
        }
    }

    /// Drain the current generation in the background and start a fresh
    /// one, pre-warming `min_contexts`.
    pub async fn reset(&self) -> Result<()> {
        if self.state() == PoolState::Closed {
            return Err(ScrapeError::PoolClosed);
        }

        info!("Resetting context pool");
        self.set_state(PoolState::Draining);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);

        let drained: Vec<PooledContext> = {
            let mut available = self.inner.available.lock().await;
            available.drain(..).collect()
        };

        // Old contexts are disposed in the background; leased ones from
        // the previous generation dispose themselves on checkin.
        let pool = self.clone();
        tokio::spawn(async move {
            for ctx in drained {
                pool.dispose_inner(ctx).await;
            }
        });

        self.set_state(PoolState::Running);
        self.prewarm(self.inner.min_contexts).await;
        Ok(())
    }

    /// Mark the pool draining without starting a new generation. Used
    /// while the browser itself is being replaced.
    pub fn begin_drain(&self) {
        self.set_state(PoolState::Draining);
    }

    /// Close everything; the pool refuses further acquires.
    pub async fn close(&self) {
        self.set_state(PoolState::Closed);
        self.inner.semaphore.close();
        let drained: Vec<PooledContext> = {
            let mut available = self.inner.available.lock().await;
            available.drain(..).collect()
        };
        for ctx in drained {
            self.dispose_inner(ctx).await;
        }
    }

    pub fn min_contexts(&self) -> usize {
        self.inner.min_contexts
    }

    pub fn max_contexts(&self) -> usize {
        self.inner.max_contexts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_state_transitions() {
        // State plumbing is testable without a browser by poking the lock.
        let state = std::sync::RwLock::new(PoolState::Running);
        assert_eq!(*state.read().unwrap(), PoolState::Running);
        *state.write().unwrap() = PoolState::Draining;
        assert_eq!(*state.read().unwrap(), PoolState::Draining);
    }
}
