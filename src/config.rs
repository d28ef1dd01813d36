//! Service configuration
//!
//! All knobs are optional environment variables with defaults, so the
//! service runs unconfigured. CLI flags override per-invocation values.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Top-level service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Queue ceiling for concurrently running scrapes
    pub max_concurrent_requests: usize,
    /// Per-request execution deadline
    pub request_timeout: Duration,
    /// Per-item wait-in-queue deadline
    pub queue_timeout: Duration,
    /// Additional attempts per scrape beyond the first
    pub max_retries: u32,
    /// Default deadline for per-page operations (page creation, evaluate)
    pub page_timeout: Duration,
    /// Navigation (goto) ceiling
    pub navigation_timeout: Duration,
    /// Crawler fan-out cap
    pub max_concurrent_subpages: usize,
    /// Per-subpage deadline
    pub subpage_request_timeout: Duration,
    /// Default number of subpages selected per crawl (K)
    pub default_subpages_count: usize,
    /// Upper bound on pooled browser contexts
    pub max_contexts: usize,
    /// Contexts kept warm at all times
    pub min_contexts: usize,
    /// Pages allowed per context before it stops accepting borrows
    pub max_pages_per_context: usize,
    /// Successful pages before the browser is replaced
    pub restart_threshold: u64,
    /// Content-size floors for in-page extraction
    pub limits: ContentLimits,
}

/// Truncation floors applied during extraction.
///
/// These bound work per page, they are not correctness limits.
#[derive(Debug, Clone)]
pub struct ContentLimits {
    /// Body-text prefix scanned for email addresses (chars)
    pub email_scan_limit: usize,
    /// Footer text cap (chars)
    pub footer_max_chars: usize,
    /// Navigation links collected per page
    pub nav_links_cap: usize,
    /// Image URLs collected per page
    pub image_links_cap: usize,
}

impl Default for ContentLimits {
    fn default() -> Self {
        Self {
            email_scan_limit: 15_000,
            footer_max_chars: 1_000,
            nav_links_cap: 30,
            image_links_cap: 50,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 50,
            request_timeout: Duration::from_millis(60_000),
            queue_timeout: Duration::from_millis(120_000),
            max_retries: 1,
            page_timeout: Duration::from_millis(30_000),
            navigation_timeout: Duration::from_millis(180_000),
            max_concurrent_subpages: 10,
            subpage_request_timeout: Duration::from_millis(15_000),
            default_subpages_count: 5,
            max_contexts: 20,
            min_contexts: 2,
            max_pages_per_context: 10,
            restart_threshold: 1_000,
            limits: ContentLimits::default(),
        }
    }
}

impl ServiceConfig {
    /// Build a configuration from the environment, falling back to defaults.
    ///
    /// Unparseable values are ignored with a warning rather than failing
    /// startup.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_concurrent_requests: env_or("MAX_CONCURRENT_REQUESTS", d.max_concurrent_requests),
            request_timeout: env_ms_or("REQUEST_TIMEOUT_MS", d.request_timeout),
            queue_timeout: env_ms_or("QUEUE_TIMEOUT_MS", d.queue_timeout),
            max_retries: env_or("MAX_RETRIES", d.max_retries),
            page_timeout: env_ms_or("PAGE_TIMEOUT_MS", d.page_timeout),
            navigation_timeout: env_ms_or("NAVIGATION_TIMEOUT_MS", d.navigation_timeout),
            max_concurrent_subpages: env_or(
                "MAX_CONCURRENT_SUBPAGE_REQUESTS",
                d.max_concurrent_subpages,
            ),
            subpage_request_timeout: env_ms_or(
                "SUBPAGE_REQUEST_TIMEOUT_MS",
                d.subpage_request_timeout,
            ),
            default_subpages_count: env_or("DEFAULT_SUBPAGES_COUNT", d.default_subpages_count),
            max_contexts: env_or("MAX_CONTEXTS", d.max_contexts),
            min_contexts: env_or("MIN_CONTEXTS", d.min_contexts),
            max_pages_per_context: env_or("MAX_PAGES_PER_CONTEXT", d.max_pages_per_context),
            restart_threshold: env_or("RESTART_THRESHOLD", d.restart_threshold),
            limits: ContentLimits {
                email_scan_limit: env_or("EMAIL_SCAN_LIMIT", d.limits.email_scan_limit),
                footer_max_chars: env_or("FOOTER_MAX_CHARS", d.limits.footer_max_chars),
                nav_links_cap: env_or("NAV_LINKS_CAP", d.limits.nav_links_cap),
                image_links_cap: env_or("IMAGE_LINKS_CAP", d.limits.image_links_cap),
            },
        }
    }

    /// Sanity-check bounds that would otherwise wedge the pool.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_requests == 0 {
            return Err("MAX_CONCURRENT_REQUESTS must be at least 1".to_string());
        }
        if self.max_contexts == 0 {
            return Err("MAX_CONTEXTS must be at least 1".to_string());
        }
        if self.min_contexts > self.max_contexts {
            return Err(format!(
                "MIN_CONTEXTS ({}) cannot exceed MAX_CONTEXTS ({})",
                self.min_contexts, self.max_contexts
            ));
        }
        if self.max_concurrent_subpages == 0 {
            return Err("MAX_CONCURRENT_SUBPAGE_REQUESTS must be at least 1".to_string());
        }
        Ok(())
    }
}

fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!("Ignoring unparseable {}={:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_ms_or(key: &str, default: Duration) -> Duration {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!("Ignoring unparseable {}={:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.max_concurrent_requests, 50);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.queue_timeout, Duration::from_secs(120));
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.max_contexts, 20);
        assert_eq!(config.min_contexts, 2);
        assert_eq!(config.default_subpages_count, 5);
        assert_eq!(config.restart_threshold, 1_000);
    }

    #[test]
    fn test_content_limit_defaults() {
        let limits = ContentLimits::default();
        assert_eq!(limits.email_scan_limit, 15_000);
        assert_eq!(limits.footer_max_chars, 1_000);
        assert_eq!(limits.nav_links_cap, 30);
        assert_eq!(limits.image_links_cap, 50);
    }

    #[test]
    fn test_validate_rejects_inverted_pool_bounds() {
        let config = ServiceConfig {
            min_contexts: 30,
            max_contexts: 20,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = ServiceConfig {
            max_concurrent_requests: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
