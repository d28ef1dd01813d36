//! Scraper Service - the exposed surface
//!
//! Wires configuration into the browser pool, request queue, scraper,
//! crawler and memory controller, and presents the operations a
//! transport layer would call: scrape one page, crawl a site, health,
//! metrics, shutdown.

use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::browser::{BrowserMetrics, BrowserOptions, BrowserPool, BrowserStatus, PoolConfig};
use crate::config::ServiceConfig;
use crate::crawl::{CrawlOptions, CrawlerConfig, WebsiteCrawler};
use crate::error::Result;
use crate::memory::{MemoryConfig, MemoryController, MemorySnapshot};
use crate::queue::{QueueConfig, QueueSnapshot, RequestQueue};
use crate::scrape::{AggregatedResult, PageScraper, ScrapeResult, ScraperConfig};

/// Health report for the whole service
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub uptime_secs: u64,
    pub memory: MemorySnapshot,
    pub browser: BrowserStatus,
    pub queue: QueueSnapshot,
}

/// Cumulative service metrics
#[derive(Debug, Clone, Serialize)]
pub struct ServiceMetrics {
    pub browser: BrowserMetrics,
    pub queue: QueueSnapshot,
    pub memory: MemorySnapshot,
}

/// The scraping service: owns every long-lived component.
#[derive(Clone)]
pub struct ScraperService {
    pool: BrowserPool,
    queue: RequestQueue,
    scraper: PageScraper,
    crawler: WebsiteCrawler,
    memory: MemoryController,
    started_at: Instant,
}

impl ScraperService {
    /// Build and start the service: browser launched, contexts warmed,
    /// memory controller running.
    pub async fn start(config: ServiceConfig, browser_options: BrowserOptions) -> Result<Self> {
        config
            .validate()
            .map_err(crate::error::ScrapeError::Config)?;

        let pool_config = PoolConfig {
            max_contexts: config.max_contexts,
            min_contexts: config.min_contexts,
            max_pages_per_context: config.max_pages_per_context,
            page_timeout: config.page_timeout,
            browser_options: BrowserOptions {
                restart_threshold: config.restart_threshold,
                ..browser_options
            },
            ..PoolConfig::default()
        };
        let pool = BrowserPool::new(pool_config)?;
        pool.start().await?;

        let queue = RequestQueue::new(QueueConfig {
            max_concurrent: config.max_concurrent_requests,
            request_timeout: config.request_timeout,
            queue_timeout: config.queue_timeout,
        });

        let scraper = PageScraper::new(
            pool.clone(),
            ScraperConfig {
                navigation_timeout: config.navigation_timeout,
                max_retries: config.max_retries,
                limits: config.limits.clone(),
                ..ScraperConfig::default()
            },
        );

        let crawler = WebsiteCrawler::new(
            scraper.clone(),
            queue.clone(),
            pool.clone(),
            CrawlerConfig {
                max_concurrent_subpages: config.max_concurrent_subpages,
                subpage_timeout: config.subpage_request_timeout,
            },
        );

        let memory = MemoryController::new(MemoryConfig::default(), pool.clone(), queue.clone());
        memory.start();

        info!("Scraper service started");
        Ok(Self {
            pool,
            queue,
            scraper,
            crawler,
            memory,
            started_at: Instant::now(),
        })
    }

    /// Scrape a single page through the admission queue.
    pub async fn scrape_page(&self, url: &str) -> Result<ScrapeResult> {
        self.scrape_page_with_token(url, CancellationToken::new())
            .await
    }

    /// Scrape a single page; the token lets the caller cancel at any
    /// point, queued or in flight.
    pub async fn scrape_page_with_token(
        &self,
        url: &str,
        token: CancellationToken,
    ) -> Result<ScrapeResult> {
        let scraper = self.scraper.clone();
        let task_token = token.clone();
        let task_url = url.to_string();
        self.queue
            .enqueue(url, token, async move {
                scraper.scrape(&task_url, &task_token).await
            })
            .await
    }

    /// Crawl a site: root plus the K best subpages, merged.
    pub async fn scrape_website(
        &self,
        url: &str,
        options: CrawlOptions,
    ) -> Result<AggregatedResult> {
        self.scrape_website_with_token(url, options, CancellationToken::new())
            .await
    }

    pub async fn scrape_website_with_token(
        &self,
        url: &str,
        options: CrawlOptions,
        token: CancellationToken,
    ) -> Result<AggregatedResult> {
        self.crawler.crawl(url, options, token).await
    }

    pub async fn health(&self) -> Health {
        Health {
            uptime_secs: self.started_at.elapsed().as_secs(),
            memory: self.memory.snapshot().await,
            browser: self.pool.status().await,
            queue: self.queue.snapshot(),
        }
    }

    pub async fn metrics(&self) -> ServiceMetrics {
        ServiceMetrics {
            browser: self.pool.metrics(),
            queue: self.queue.snapshot(),
            memory: self.memory.snapshot().await,
        }
    }

    /// Stop the controller and drain the pool. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down scraper service");
        self.memory.stop();
        self.pool.shutdown().await
    }
}
