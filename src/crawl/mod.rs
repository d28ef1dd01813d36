//! Website crawling module
//!
//! Subpage selection over the root's link graph plus the bounded
//! fan-out that scrapes and merges the winners.

mod crawler;
mod selection;

pub use crawler::{CrawlOptions, CrawlerConfig, WebsiteCrawler};
pub use selection::{
    normalize_root_url, select_subpages, SelectionConfig, DEFAULT_EXCLUDE_PATTERNS,
};
