//! Memory pressure controller
//!
//! Samples process RSS on a fixed interval, keeps a small rolling window
//! to judge the trend, and drives graduated cleanup on the browser pool:
//! release idle contexts, then aggressive release with a scheduled
//! restart, then immediate eviction when memory is critical.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sysinfo::{ProcessesToUpdate, System};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::BrowserPool;
use crate::queue::RequestQueue;

/// Rolling window size for trend detection
const TREND_WINDOW: usize = 10;
/// Relative change that counts as a trend
const TREND_EPSILON: f64 = 0.05;
/// Delay before a scheduled restart fires
const RESTART_DELAY: Duration = Duration::from_secs(2);

/// Memory controller configuration
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Sampling interval
    pub metrics_interval: Duration,
    /// Idle sweep interval
    pub idle_sweep_interval: Duration,
    /// RSS above which the idle sweep acts (MB)
    pub idle_rss_threshold_mb: u64,
    /// Band edges in MB: below the first nothing happens
    pub moderate_mb: u64,
    pub high_mb: u64,
    pub critical_mb: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            metrics_interval: Duration::from_secs(10),
            idle_sweep_interval: Duration::from_secs(300),
            idle_rss_threshold_mb: 500,
            moderate_mb: 400,
            high_mb: 800,
            critical_mb: 1_500,
        }
    }
}

/// RSS trend over the rolling window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTrend {
    Stable,
    Increasing,
    Decreasing,
}

/// Point-in-time memory snapshot
#[derive(Debug, Clone, Serialize)]
pub struct MemorySnapshot {
    pub rss_mb: u64,
    pub trend: MemoryTrend,
    pub samples: Vec<u64>,
    pub releases: u64,
    pub restarts_scheduled: u64,
}

/// Read this process's resident set size in MB.
pub fn current_rss_mb() -> u64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid)
        .map(|p| p.memory() / (1024 * 1024))
        .unwrap_or(0)
}

struct ControllerInner {
    config: MemoryConfig,
    pool: BrowserPool,
    queue: RequestQueue,
    samples: Mutex<VecDeque<u64>>,
    releases: AtomicU64,
    restarts_scheduled: AtomicU64,
    restart_pending: AtomicBool,
    shutdown: CancellationToken,
}

/// Periodic memory-pressure controller. Clones share state.
#[derive(Clone)]
pub struct MemoryController {
    inner: Arc<ControllerInner>,
}

impl MemoryController {
    pub fn new(config: MemoryConfig, pool: BrowserPool, queue: RequestQueue) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                config,
                pool,
                queue,
                samples: Mutex::new(VecDeque::with_capacity(TREND_WINDOW)),
                releases: AtomicU64::new(0),
                restarts_scheduled: AtomicU64::new(0),
                restart_pending: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Spawn the sampling loop and the idle sweep.
    pub fn start(&self) {
        let controller = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(controller.inner.config.metrics_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = controller.inner.shutdown.cancelled() => break,
                    _ = ticker.tick() => controller.tick().await,
                }
            }
        });

        let controller = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(controller.inner.config.idle_sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = controller.inner.shutdown.cancelled() => break,
                    _ = ticker.tick() => controller.idle_sweep().await,
                }
            }
        });
    }

    pub fn stop(&self) {
        self.inner.shutdown.cancel();
    }

    /// One sampling step: record RSS, act on the band it falls in.
    async fn tick(&self) {
        let rss = current_rss_mb();
        {
            let mut samples = self.inner.samples.lock().await;
            if samples.len() == TREND_WINDOW {
                samples.pop_front();
            }
            samples.push_back(rss);
        }

        let config = &self.inner.config;
        if rss < config.moderate_mb {
            return;
        }

        if rss < config.high_mb {
            let released = self.inner.pool.release_unused_contexts().await;
            self.inner
                .releases
                .fetch_add(released as u64, Ordering::SeqCst);
            self.inner.pool.request_gc().await;
            debug!("Moderate memory pressure ({}MB): released {}", rss, released);
            return;
        }

        if rss < config.critical_mb {
            let released = self.inner.pool.release_unused_contexts_aggressive().await;
            self.inner
                .releases
                .fetch_add(released as u64, Ordering::SeqCst);
            warn!("High memory pressure ({}MB): released {}", rss, released);

            if released == 0 && !self.inner.restart_pending.swap(true, Ordering::SeqCst) {
                self.inner.restarts_scheduled.fetch_add(1, Ordering::SeqCst);
                info!("Nothing to release, scheduling pool restart in 2s");
                let controller = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(RESTART_DELAY).await;
                    if let Err(e) = controller.inner.pool.force_cleanup_and_restart().await {
                        warn!("Scheduled restart failed: {}", e);
                    }
                    controller
                        .inner
                        .restart_pending
                        .store(false, Ordering::SeqCst);
                });
            }
            return;
        }

        // Critical band: take a context away right now and lean on GC.
        warn!("Critical memory pressure ({}MB)", rss);
        if self.inner.pool.close_one_context().await {
            self.inner.releases.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.pool.request_gc().await;
        self.inner.pool.request_gc().await;
    }

    /// Low-traffic cleanup: when nearly idle but still heavy, give
    /// contexts back.
    async fn idle_sweep(&self) {
        let rss = current_rss_mb();
        if self.inner.queue.active() <= 1 && rss > self.inner.config.idle_rss_threshold_mb {
            let released = self.inner.pool.release_unused_contexts().await;
            self.inner
                .releases
                .fetch_add(released as u64, Ordering::SeqCst);
            info!("Idle sweep at {}MB released {} contexts", rss, released);
        }
    }

    pub async fn snapshot(&self) -> MemorySnapshot {
        let samples: Vec<u64> = self.inner.samples.lock().await.iter().copied().collect();
        MemorySnapshot {
            rss_mb: samples.last().copied().unwrap_or_else(current_rss_mb),
            trend: trend_of(&samples),
            samples,
            releases: self.inner.releases.load(Ordering::SeqCst),
            restarts_scheduled: self.inner.restarts_scheduled.load(Ordering::SeqCst),
        }
    }
}

/// Classify the window's movement: ±5% between the window's ends.
fn trend_of(samples: &[u64]) -> MemoryTrend {
    let (Some(&first), Some(&last)) = (samples.first(), samples.last()) else {
        return MemoryTrend::Stable;
    };
    if first == 0 || samples.len() < 2 {
        return MemoryTrend::Stable;
    }
    let change = (last as f64 - first as f64) / first as f64;
    if change > TREND_EPSILON {
        MemoryTrend::Increasing
    } else if change < -TREND_EPSILON {
        MemoryTrend::Decreasing
    } else {
        MemoryTrend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_config_defaults() {
        let config = MemoryConfig::default();
        assert_eq!(config.metrics_interval, Duration::from_secs(10));
        assert_eq!(config.moderate_mb, 400);
        assert_eq!(config.high_mb, 800);
        assert_eq!(config.critical_mb, 1_500);
        assert_eq!(config.idle_rss_threshold_mb, 500);
    }

    #[test]
    fn test_trend_classification() {
        assert_eq!(trend_of(&[]), MemoryTrend::Stable);
        assert_eq!(trend_of(&[500]), MemoryTrend::Stable);
        assert_eq!(trend_of(&[500, 510]), MemoryTrend::Stable);
        assert_eq!(trend_of(&[500, 560]), MemoryTrend::Increasing);
        assert_eq!(trend_of(&[500, 440]), MemoryTrend::Decreasing);
    }

    #[test]
    fn test_current_rss_is_nonzero() {
        // The test process itself should report some resident memory.
        assert!(current_rss_mb() > 0);
    }
}
