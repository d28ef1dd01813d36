//! Page Scraper - turns one URL into a ScrapeResult
//!
//! Borrows a page from the pool, navigates, stabilizes, scrolls when the
//! page shows lazy-content signals, extracts everything in one round
//! trip, then builds the article and markdown outside the borrow so the
//! page goes back to the pool as early as possible.

use std::time::{Duration, Instant};

use chromiumoxide::Page;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::BrowserPool;
use crate::config::ContentLimits;
use crate::error::{Result, ScrapeError};

use super::article;
use super::extract::{self, RawPageData};
use super::links;
use super::markdown::{self, NavEntry};
use super::types::{ContactKind, LinkBundle, ScrapeResult};

/// Scroll step in pixels per tick
const SCROLL_STEP: u64 = 250;
/// Tick interval while scrolling
const SCROLL_INTERVAL: Duration = Duration::from_millis(100);
/// Hard cap on total scroll time
const MAX_SCROLL_TIME: Duration = Duration::from_secs(10);
/// Bottom proximity that counts as "reached the end"
const BOTTOM_MARGIN: u64 = 50;
/// Consecutive no-growth scrolls before giving up on lazy content
const STATIC_HEIGHT_LIMIT: u32 = 3;
/// Maximum email contacts harvested from body text
const MAX_SCANNED_EMAILS: usize = 5;

/// Scraper configuration
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Navigation (goto) ceiling
    pub navigation_timeout: Duration,
    /// Settle time after load before extraction
    pub stability_delay: Duration,
    /// Additional attempts beyond the first
    pub max_retries: u32,
    /// Extraction content caps
    pub limits: ContentLimits,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            stability_delay: Duration::from_millis(500),
            max_retries: 1,
            limits: ContentLimits::default(),
        }
    }
}

/// The unit of work submitted to the request queue
#[derive(Clone)]
pub struct PageScraper {
    pool: BrowserPool,
    config: ScraperConfig,
}

/// Ensure a URL has a scheme and parses; returns the normalized form.
pub fn normalize_url(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ScrapeError::MissingParam("url".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&with_scheme).map_err(|e| ScrapeError::InvalidUrl {
        url: input.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ScrapeError::InvalidUrl {
            url: input.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// Exponential backoff between scrape attempts, capped at 5s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let ms = 1000u64.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
    Duration::from_millis(ms.min(5_000))
}

impl PageScraper {
    pub fn new(pool: BrowserPool, config: ScraperConfig) -> Self {
        Self { pool, config }
    }

    /// Scrape a URL, retrying transient failures with backoff.
    pub async fn scrape(&self, input_url: &str, token: &CancellationToken) -> Result<ScrapeResult> {
        let url = normalize_url(input_url)?;
        let url_str = url.to_string();
        let started = Instant::now();

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if token.is_cancelled() {
                return Err(ScrapeError::Cancelled {
                    id: url_str.clone(),
                });
            }
            if attempt > 1 {
                let delay = backoff_delay(attempt - 1);
                debug!(
                    "Retrying {} (attempt {}/{}) after {:?}",
                    url_str,
                    attempt,
                    self.config.max_retries + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            match self.scrape_once(&url).await {
                Ok(result) => {
                    info!(
                        "Scraped {} in {}ms ({} links)",
                        url_str,
                        started.elapsed().as_millis(),
                        result.links.total()
                    );
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt <= self.config.max_retries => {
                    warn!("Scrape attempt {} failed for {}: {}", attempt, url_str, e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One attempt: page borrow, navigate, stabilize, scroll, extract.
    async fn scrape_once(&self, url: &Url) -> Result<ScrapeResult> {
        let started = Instant::now();
        let url_str = url.to_string();
        let limits = self.config.limits.clone();
        let navigation_timeout = self.config.navigation_timeout;
        let stability_delay = self.config.stability_delay;

        let (raw, html, final_url) = self
            .pool
            .with_page(|page| {
                let url_str = url_str.clone();
                async move {
                    navigate(&page, &url_str, navigation_timeout).await?;
                    tokio::time::sleep(stability_delay).await;

                    if extract::has_dynamic_content(&page).await {
                        if let Err(e) = auto_scroll(&page).await {
                            debug!("Auto-scroll failed on {}: {}", url_str, e);
                        }
                    }

                    let raw = extract::extract_page_data(&page, &limits).await?;
                    let html = extract::page_html(&page).await?;
                    let final_url = page
                        .url()
                        .await
                        .ok()
                        .flatten()
                        .unwrap_or_else(|| url_str.clone());
                    Ok((raw, html, final_url))
                }
            })
            .await?;

        let base = Url::parse(&final_url).unwrap_or_else(|_| url.clone());
        self.assemble(base, raw, &html, started)
    }

    /// Build the result from extracted data; runs outside the page borrow.
    fn assemble(
        &self,
        base: Url,
        raw: RawPageData,
        html: &str,
        started: Instant,
    ) -> Result<ScrapeResult> {
        let url_str = base.to_string();
        let article = article::extract_article(html, &url_str)?;

        let mut bundle = LinkBundle::default();
        for link in &raw.links {
            let Some(resolved) = links::resolve_href(&base, &link.href) else {
                continue;
            };

            if let Some(kind) = links::contact_kind(&resolved) {
                bundle.add_contact(resolved.clone(), kind);
                if kind == ContactKind::Email {
                    continue;
                }
            }

            if links::social_platform(&resolved).is_some() {
                bundle.add_social_url(resolved.clone());
            }

            match Url::parse(&resolved) {
                Ok(parsed) if links::is_same_origin(&base, &parsed) => {
                    bundle.add_page_url(resolved);
                }
                Ok(_) => bundle.add_external_url(resolved),
                Err(_) => {}
            }
        }

        for src in &raw.images {
            if let Some(resolved) = links::resolve_href(&base, src) {
                bundle.add_image_url(resolved);
            }
        }

        for email in links::extract_emails(
            &raw.body_text,
            self.config.limits.email_scan_limit,
            MAX_SCANNED_EMAILS,
        ) {
            bundle.add_contact(format!("mailto:{}", email), ContactKind::Email);
        }

        bundle.remove_social_from_external();

        let nav: Vec<NavEntry> = raw
            .nav_links
            .iter()
            .filter_map(|link| {
                links::resolve_href(&base, &link.href).map(|url| NavEntry {
                    text: link.text.clone(),
                    url,
                })
            })
            .collect();

        let mut metadata = raw.metadata();
        if metadata.title.is_none() && !article.title.is_empty() {
            metadata.title = Some(article.title.clone());
        }
        if metadata.site_name.is_none() {
            metadata.site_name = article.site_name.clone();
        }
        if metadata.lang.is_none() {
            metadata.lang = article.lang.clone();
        }

        let title = metadata.title.clone().unwrap_or_else(|| url_str.clone());
        let markdown =
            markdown::build_page_markdown(&title, &article.html_content, &nav, &bundle, &raw.footer)?;

        Ok(ScrapeResult {
            url: url_str,
            metadata,
            main_content: article.text_content,
            markdown,
            links: bundle,
            footer: raw.footer,
            success: true,
            error: None,
            scraped_at: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Navigate with domcontentloaded semantics under the given deadline,
/// then wait up to 5s for the load event to have fired.
async fn navigate(page: &Page, url: &str, timeout: Duration) -> Result<()> {
    tokio::time::timeout(timeout, page.goto(url))
        .await
        .map_err(|_| ScrapeError::Navigation {
            url: url.to_string(),
            reason: format!("navigation timed out after {}ms", timeout.as_millis()),
        })?
        .map_err(|e| ScrapeError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    // Bounded wait for loadEventEnd via Navigation Timing, best-effort.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let loaded = page
            .evaluate(
                "(() => { const nav = performance.getEntriesByType('navigation')[0]; \
                 return nav ? nav.loadEventEnd > 0 : true; })()",
            )
            .await
            .ok()
            .and_then(|v| v.value().and_then(|v| v.as_bool()))
            .unwrap_or(true);
        if loaded || Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    Ok(())
}

#[derive(Debug, serde::Deserialize)]
struct ScrollState {
    height: u64,
    y: u64,
    inner: u64,
}

async fn scroll_state(page: &Page) -> Result<ScrollState> {
    let value = page
        .evaluate(
            "(() => JSON.stringify({ height: document.body.scrollHeight, \
             y: Math.round(window.scrollY), inner: window.innerHeight }))()",
        )
        .await?;
    let json = value
        .value()
        .and_then(|v| v.as_str())
        .ok_or_else(|| ScrapeError::Internal("scroll state returned no payload".to_string()))?;
    Ok(serde_json::from_str(json)?)
}

/// Heuristic scroll for lazily loaded content.
///
/// Steps 250px every 100ms until the bottom is within 50px, 10s have
/// elapsed, or three consecutive steps saw no height growth. At least
/// one viewport of scrolling happens even on short pages, and the page
/// is returned to the top afterwards.
async fn auto_scroll(page: &Page) -> Result<()> {
    let started = Instant::now();
    let initial = scroll_state(page).await?;
    let mut last_height = initial.height;
    let mut static_count = 0u32;
    let mut scrolled: u64 = 0;

    loop {
        let state = scroll_state(page).await?;
        if state.y + state.inner + BOTTOM_MARGIN >= state.height {
            break;
        }
        if started.elapsed() >= MAX_SCROLL_TIME {
            break;
        }
        if static_count >= STATIC_HEIGHT_LIMIT {
            break;
        }

        page.evaluate(format!("window.scrollBy(0, {})", SCROLL_STEP))
            .await?;
        scrolled += SCROLL_STEP;
        tokio::time::sleep(SCROLL_INTERVAL).await;

        let after = scroll_state(page).await?;
        if after.height == last_height {
            static_count += 1;
        } else {
            static_count = 0;
            last_height = after.height;
        }
    }

    if scrolled < initial.inner {
        page.evaluate(format!("window.scrollBy(0, {})", initial.inner))
            .await?;
    }
    page.evaluate("window.scrollTo(0, 0)").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url_adds_scheme() {
        assert_eq!(
            normalize_url("example.com").unwrap().to_string(),
            "https://example.com/"
        );
        assert_eq!(
            normalize_url("http://example.com/page").unwrap().to_string(),
            "http://example.com/page"
        );
    }

    #[test]
    fn test_normalize_url_rejects_garbage() {
        assert!(matches!(
            normalize_url("not a url at all"),
            Err(ScrapeError::InvalidUrl { .. })
        ));
        assert!(matches!(
            normalize_url(""),
            Err(ScrapeError::MissingParam(_))
        ));
        assert!(matches!(
            normalize_url("ftp://example.com"),
            Err(ScrapeError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(3), Duration::from_millis(4000));
        assert_eq!(backoff_delay(4), Duration::from_millis(5000));
        assert_eq!(backoff_delay(10), Duration::from_millis(5000));
    }

    #[test]
    fn test_scroll_constants() {
        assert_eq!(SCROLL_STEP, 250);
        assert_eq!(SCROLL_INTERVAL, Duration::from_millis(100));
        assert_eq!(MAX_SCROLL_TIME, Duration::from_secs(10));
    }
}
