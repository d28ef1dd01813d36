//! Website Crawler - root page plus K best subpages, merged
//!
//! The root is scraped through the request queue; selected subpages fan
//! out in batches under the crawler's own concurrency cap, each with its
//! own deadline. A failed subpage becomes a failure entry, never a
//! failed crawl.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::BrowserPool;
use crate::error::{Result, ScrapeError};
use crate::memory::current_rss_mb;
use crate::queue::RequestQueue;
use crate::scrape::{
    AggregatedResult, CrawlStats, ErrorInfo, LinkBundle, PageScraper, ScrapeResult,
    SubpageSummary,
};

use super::selection::{self, SelectionConfig, DEFAULT_EXCLUDE_PATTERNS};

/// RSS level above which contexts are released between batches (MB)
const BATCH_RSS_RELEASE_MB: u64 = 1_228;

/// Per-crawl options supplied by the caller
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Number of subpages to crawl beyond the root (K)
    pub subpages_count: usize,
    /// Keywords boosting subpage selection
    pub keywords: Vec<String>,
    /// Path fragments that disqualify subpages
    pub exclude_patterns: Vec<String>,
    /// Maximum subpage path depth
    pub max_depth: usize,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            subpages_count: 5,
            keywords: Vec::new(),
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_depth: 2,
        }
    }
}

/// Crawler-level configuration
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Fan-out cap for concurrent subpage scrapes
    pub max_concurrent_subpages: usize,
    /// Per-subpage deadline
    pub subpage_timeout: Duration,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_subpages: 10,
            subpage_timeout: Duration::from_secs(15),
        }
    }
}

/// Crawls a site: root scrape, subpage selection, bounded fan-out, merge
#[derive(Clone)]
pub struct WebsiteCrawler {
    scraper: PageScraper,
    queue: RequestQueue,
    pool: BrowserPool,
    config: CrawlerConfig,
}

impl WebsiteCrawler {
    pub fn new(
        scraper: PageScraper,
        queue: RequestQueue,
        pool: BrowserPool,
        config: CrawlerConfig,
    ) -> Self {
        Self {
            scraper,
            queue,
            pool,
            config,
        }
    }

    /// Crawl a site. Cancelling the token cancels the whole crawl.
    pub async fn crawl(
        &self,
        input_url: &str,
        options: CrawlOptions,
        token: CancellationToken,
    ) -> Result<AggregatedResult> {
        let root = selection::normalize_root_url(input_url)?;
        let root_str = root.to_string();
        info!(
            "Crawling {} (up to {} subpages)",
            root_str, options.subpages_count
        );

        let scraper = self.scraper.clone();
        let root_token = token.clone();
        let root_url_for_task = root_str.clone();
        let main_result = self
            .queue
            .enqueue(&root_str, token.clone(), async move {
                scraper.scrape(&root_url_for_task, &root_token).await
            })
            .await?;

        let selection_config = SelectionConfig {
            max_depth: options.max_depth,
            keywords: options.keywords.clone(),
            exclude_patterns: options.exclude_patterns.clone(),
        };
        let selected = selection::select_subpages(
            &root,
            &main_result.links.page_urls,
            options.subpages_count,
            &selection_config,
        );
        debug!(
            "Selected {}/{} candidate subpages",
            selected.len(),
            main_result.links.page_urls.len()
        );

        let subpages = self.fan_out(&selected, &token).await?;
        Ok(self.merge(main_result, selected, subpages, &options))
    }

    /// Scrape subpages in batches of `min(2 × cap, remaining)` under the
    /// fan-out semaphore. Cancellation is checked between batches; memory
    /// is given back to the pool when RSS climbs past the release bar.
    async fn fan_out(
        &self,
        selected: &[String],
        token: &CancellationToken,
    ) -> Result<Vec<(SubpageSummary, Option<LinkBundle>)>> {
        let cap = self.config.max_concurrent_subpages.max(1);
        let semaphore = Arc::new(Semaphore::new(cap));
        let mut summaries = Vec::with_capacity(selected.len());

        for batch in selected.chunks(2 * cap) {
            if token.is_cancelled() {
                return Err(ScrapeError::Cancelled {
                    id: "crawl".to_string(),
                });
            }

            let mut handles = Vec::with_capacity(batch.len());
            for url in batch {
                let scraper = self.scraper.clone();
                let semaphore = Arc::clone(&semaphore);
                let token = token.clone();
                let timeout = self.config.subpage_timeout;
                let url = url.clone();

                handles.push(tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("fan-out semaphore closed");
                    if token.is_cancelled() {
                        let err = ScrapeError::Cancelled { id: url.clone() };
                        return (url, Err(err));
                    }

                    let outcome =
                        match tokio::time::timeout(timeout, scraper.scrape(&url, &token)).await {
                            Ok(result) => result,
                            Err(_) => Err(ScrapeError::Timeout {
                                url: url.clone(),
                                timeout_ms: timeout.as_millis() as u64,
                            }),
                        };
                    (url, outcome)
                }));
            }

            for handle in handles {
                match handle.await {
                    Ok((url, Ok(result))) => {
                        let summary = SubpageSummary {
                            url,
                            title: result.metadata.title.clone(),
                            success: true,
                            markdown: Some(result.markdown.clone()),
                            error: None,
                        };
                        summaries.push((summary, Some(result.links)));
                    }
                    Ok((url, Err(e))) => {
                        debug!("Subpage {} failed: {}", url, e);
                        let summary = SubpageSummary {
                            url,
                            title: None,
                            success: false,
                            markdown: None,
                            error: Some(ErrorInfo::from(&e)),
                        };
                        summaries.push((summary, None));
                    }
                    Err(e) => warn!("Subpage task panicked: {}", e),
                }
            }

            let rss = current_rss_mb();
            if rss > BATCH_RSS_RELEASE_MB {
                let released = self.pool.release_unused_contexts().await;
                info!(
                    "Released {} contexts between batches (RSS {}MB)",
                    released, rss
                );
            }
        }

        Ok(summaries)
    }

    /// Union the link bundles, build the combined markdown, count stats.
    fn merge(
        &self,
        main_result: ScrapeResult,
        selected: Vec<String>,
        outcomes: Vec<(SubpageSummary, Option<LinkBundle>)>,
        options: &CrawlOptions,
    ) -> AggregatedResult {
        let mut links = main_result.links.clone();
        let mut subpages = Vec::with_capacity(outcomes.len());
        for (summary, bundle) in outcomes {
            if let Some(bundle) = bundle {
                links.merge(&bundle);
            }
            subpages.push(summary);
        }

        let mut combined = String::with_capacity(main_result.markdown.len() + 1024);
        combined.push_str(&main_result.markdown);

        let mut processed = 0;
        for (index, subpage) in subpages.iter().enumerate() {
            if !subpage.success {
                continue;
            }
            processed += 1;
            let title = subpage.title.as_deref().unwrap_or(&subpage.url);
            combined.push_str(&format!("\n\n## Subpage {}: {}\n\n", index + 1, title));
            if let Some(markdown) = &subpage.markdown {
                combined.push_str(markdown);
            }
        }

        links.remove_social_from_external();
        let combined = crate::scrape::markdown::collapse_blank_lines(&combined);

        let failed = subpages.len() - processed;
        let stats = CrawlStats {
            requested: options.subpages_count,
            selected: selected.len(),
            processed,
            failed,
            page_urls: links.page_urls.len(),
            social_urls: links.social_urls.len(),
            contact_urls: links.contact_urls.len(),
            image_urls: links.image_urls.len(),
            external_urls: links.external_urls.len(),
        };

        info!(
            "Crawl finished: {} subpages processed, {} failed, {} links",
            processed,
            failed,
            links.total()
        );

        AggregatedResult {
            main_result,
            subpages,
            links,
            combined_markdown: combined,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawl_options_defaults() {
        let options = CrawlOptions::default();
        assert_eq!(options.subpages_count, 5);
        assert_eq!(options.max_depth, 2);
        assert!(options.exclude_patterns.contains(&"/login".to_string()));
        assert!(options.exclude_patterns.contains(&"/checkout".to_string()));
    }

    #[test]
    fn test_crawler_config_defaults() {
        let config = CrawlerConfig::default();
        assert_eq!(config.max_concurrent_subpages, 10);
        assert_eq!(config.subpage_timeout, Duration::from_secs(15));
    }
}
