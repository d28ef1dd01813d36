//! Request Queue - bounded FIFO admission in front of the browser pool
//!
//! Callers enqueue a task future; up to `max_concurrent` run at once and
//! the rest wait in arrival order. Each item carries two deadlines: a
//! wait-in-queue deadline and an execution deadline. Cancellation is
//! honored at admission, before dispatch, and while running.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, ScrapeError};

/// Queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Tasks allowed to run simultaneously
    pub max_concurrent: usize,
    /// Execution deadline once a task starts
    pub request_timeout: Duration,
    /// Wait deadline while queued
    pub queue_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 50,
            request_timeout: Duration::from_secs(60),
            queue_timeout: Duration::from_secs(120),
        }
    }
}

/// Point-in-time queue counters
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct QueueSnapshot {
    /// Tasks currently executing
    pub active: usize,
    /// Tasks waiting for a slot
    pub pending: usize,
    /// Tasks admitted over the queue's lifetime
    pub total_enqueued: u64,
    /// Tasks that timed out waiting
    pub total_queue_timeouts: u64,
}

struct QueueInner {
    config: QueueConfig,
    /// Fair semaphore: waiters are served in arrival order, which is
    /// what gives the queue its FIFO start guarantee.
    slots: Semaphore,
    active: AtomicUsize,
    pending: AtomicUsize,
    total_enqueued: AtomicU64,
    total_queue_timeouts: AtomicU64,
}

/// Bounded FIFO request queue. Clones share state.
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<QueueInner>,
}

impl RequestQueue {
    pub fn new(config: QueueConfig) -> Self {
        let slots = Semaphore::new(config.max_concurrent);
        Self {
            inner: Arc::new(QueueInner {
                config,
                slots,
                active: AtomicUsize::new(0),
                pending: AtomicUsize::new(0),
                total_enqueued: AtomicU64::new(0),
                total_queue_timeouts: AtomicU64::new(0),
            }),
        }
    }

    /// Enqueue a task under the given id and cancellation token.
    ///
    /// Dispatches immediately while capacity remains, otherwise waits in
    /// FIFO order. The task future is never polled if the token fires or
    /// the queue-wait deadline expires first.
    pub async fn enqueue<F, T>(&self, id: &str, token: CancellationToken, task: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if token.is_cancelled() {
            debug!("Request '{}' cancelled before admission", id);
            return Err(ScrapeError::Cancelled { id: id.to_string() });
        }

        self.inner.total_enqueued.fetch_add(1, Ordering::SeqCst);
        self.inner.pending.fetch_add(1, Ordering::SeqCst);

        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => {
                self.inner.pending.fetch_sub(1, Ordering::SeqCst);
                debug!("Request '{}' cancelled while queued", id);
                return Err(ScrapeError::Cancelled { id: id.to_string() });
            }
            acquired = tokio::time::timeout(
                self.inner.config.queue_timeout,
                self.inner.slots.acquire(),
            ) => {
                self.inner.pending.fetch_sub(1, Ordering::SeqCst);
                match acquired {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => {
                        return Err(ScrapeError::Internal(
                            "request queue semaphore closed".to_string(),
                        ))
                    }
                    Err(_) => {
                        self.inner.total_queue_timeouts.fetch_add(1, Ordering::SeqCst);
                        warn!(
                            "Request '{}' timed out after {}ms in queue",
                            id,
                            self.inner.config.queue_timeout.as_millis()
                        );
                        return Err(ScrapeError::QueueTimeout {
                            id: id.to_string(),
                            timeout_ms: self.inner.config.queue_timeout.as_millis() as u64,
                        });
                    }
                }
            }
        };

        // Dispatch: the slot is held for the task's whole execution; the
        // permit drop on every path below pulls the next queued item.
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        debug!(
            "Request '{}' dispatched ({} active)",
            id,
            self.inner.active.load(Ordering::SeqCst)
        );

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Request '{}' cancelled in flight", id);
                Err(ScrapeError::Cancelled { id: id.to_string() })
            }
            finished = tokio::time::timeout(self.inner.config.request_timeout, task) => {
                match finished {
                    Ok(result) => result,
                    Err(_) => Err(ScrapeError::Timeout {
                        url: id.to_string(),
                        timeout_ms: self.inner.config.request_timeout.as_millis() as u64,
                    }),
                }
            }
        };

        self.inner.active.fetch_sub(1, Ordering::SeqCst);
        drop(permit);
        outcome
    }

    /// Tasks currently executing.
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Tasks waiting for a slot.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            active: self.active(),
            pending: self.pending(),
            total_enqueued: self.inner.total_enqueued.load(Ordering::SeqCst),
            total_queue_timeouts: self.inner.total_queue_timeouts.load(Ordering::SeqCst),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_config_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_concurrent, 50);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.queue_timeout, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_immediate_dispatch_under_capacity() {
        let queue = RequestQueue::new(QueueConfig::default());
        let token = CancellationToken::new();
        let result = queue.enqueue("t1", token, async { Ok(41 + 1) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(queue.active(), 0);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_admission_never_runs() {
        let queue = RequestQueue::new(QueueConfig::default());
        let token = CancellationToken::new();
        token.cancel();

        let ran = std::sync::Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        let result = queue
            .enqueue("t1", token, async move {
                ran_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ScrapeError::Cancelled { .. })));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_execution_deadline() {
        let queue = RequestQueue::new(QueueConfig {
            max_concurrent: 1,
            request_timeout: Duration::from_millis(50),
            queue_timeout: Duration::from_secs(1),
        });
        let token = CancellationToken::new();
        let result: Result<()> = queue
            .enqueue("slow", token, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ScrapeError::Timeout { .. })));
        assert_eq!(queue.active(), 0);
    }
}
