//! sitegrab - Headless-browser web scraping service
//!
//! Scrapes structured content (readable article, navigation, social and
//! contact links, images, footer) from a URL and optionally from the
//! best subpages of its site, coordinating a bounded pool of browser
//! contexts under memory-pressure control.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sitegrab::browser::BrowserOptions;
//! use sitegrab::config::ServiceConfig;
//! use sitegrab::crawl::CrawlOptions;
//! use sitegrab::service::ScraperService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Launch the browser and warm the context pool
//!     let service =
//!         ScraperService::start(ServiceConfig::from_env(), BrowserOptions::default()).await?;
//!
//!     // One page
//!     let page = service.scrape_page("https://example.com").await?;
//!     println!("{}", page.markdown);
//!
//!     // Whole site: root plus the 5 best subpages
//!     let site = service
//!         .scrape_website("https://example.com", CrawlOptions::default())
//!         .await?;
//!     println!("{} subpages", site.subpages.len());
//!
//!     service.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`browser`]: Chrome detection, the browser-context pool, resource routing
//! - [`queue`]: Bounded FIFO admission queue with dual deadlines
//! - [`scrape`]: Per-page scraping pipeline and result types
//! - [`crawl`]: Subpage selection and the site crawler
//! - [`memory`]: RSS observation and graduated cleanup
//! - [`service`]: The wired-together service surface
//! - [`cli`]: Command-line interface
//! - [`error`]: Error types

pub mod browser;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod error;
pub mod memory;
pub mod queue;
pub mod scrape;
pub mod service;

// Re-export commonly used types
pub use browser::{BrowserManager, BrowserOptions, BrowserPool, PoolConfig};
pub use config::{ContentLimits, ServiceConfig};
pub use crawl::{CrawlOptions, WebsiteCrawler};
pub use error::{Result, ScrapeError};
pub use memory::{MemoryController, MemoryTrend};
pub use queue::{QueueConfig, RequestQueue};
pub use scrape::{
    AggregatedResult, LinkBundle, PageMetadata, PageScraper, ScrapeResult, SubpageSummary,
};
pub use service::{Health, ScraperService, ServiceMetrics};
