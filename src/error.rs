//! Error types for sitegrab
//!
//! Centralized error handling using thiserror for derive macros
//! and anyhow for error context propagation at the binary level.

use thiserror::Error;

/// Main error type for the sitegrab service
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Chrome/Chromium browser not found on the system
    #[error("Chrome/Chromium not found!\n\nInstallation:\n  macOS:   brew install --cask google-chrome\n  Linux:   sudo apt install chromium-browser\n  Windows: Download from https://www.google.com/chrome/\n\nOr specify manually:\n  sitegrab --chrome-path /path/to/chrome <url>")]
    ChromeNotFound,

    /// Browser failed to launch
    #[error("Failed to launch browser: {reason}")]
    BrowserLaunchFailed { reason: String },

    /// Pool could not acquire a healthy context or page
    #[error("Browser pool error: {reason}")]
    Browser { reason: String },

    /// Browser pool timeout waiting for a context
    #[error("Browser pool timeout: no context available after {timeout_secs} seconds")]
    PoolTimeout { timeout_secs: u64 },

    /// Browser pool has been shut down
    #[error("Browser pool has been shut down")]
    PoolClosed,

    /// Syntactically invalid URL
    #[error("Invalid URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Required input absent
    #[error("Missing parameter: {0}")]
    MissingParam(String),

    /// Navigation to URL failed (DNS/TCP/TLS/HTTP)
    #[error("Failed to navigate to '{url}': {reason}")]
    Navigation { url: String, reason: String },

    /// Execution deadline exceeded
    #[error("Request timed out for '{url}' after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    /// Wait-in-queue deadline exceeded
    #[error("Request '{id}' timed out waiting in queue after {timeout_ms}ms")]
    QueueTimeout { id: String, timeout_ms: u64 },

    /// Upstream cancellation
    #[error("Request '{id}' was cancelled")]
    Cancelled { id: String },

    /// Article extractor returned empty or failed
    #[error("Content extraction failed for '{url}': {reason}")]
    Extraction { url: String, reason: String },

    /// Scraping step failed inside the page
    #[error("Scraping failed for '{url}': {reason}")]
    Scraping { url: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// CDP (Chrome DevTools Protocol) error
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Generic IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unexpected internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for ScrapeError
pub type Result<T> = std::result::Result<T, ScrapeError>;

impl From<chromiumoxide::error::CdpError> for ScrapeError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ScrapeError::Cdp(err.to_string())
    }
}

impl ScrapeError {
    /// Stable machine-readable kind, used in serialized error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::ChromeNotFound | ScrapeError::BrowserLaunchFailed { .. } => {
                "browser_launch"
            }
            ScrapeError::Browser { .. }
            | ScrapeError::PoolTimeout { .. }
            | ScrapeError::PoolClosed => "browser_error",
            ScrapeError::InvalidUrl { .. } => "invalid_url",
            ScrapeError::MissingParam(_) => "missing_param",
            ScrapeError::Navigation { .. } => "navigation",
            ScrapeError::Timeout { .. } => "timeout",
            ScrapeError::QueueTimeout { .. } => "queue_timeout",
            ScrapeError::Cancelled { .. } => "cancelled",
            ScrapeError::Extraction { .. } => "extraction",
            ScrapeError::Scraping { .. } => "scraping",
            ScrapeError::Config(_) => "config",
            ScrapeError::Cdp(_) => "cdp",
            ScrapeError::Io(_) => "io",
            ScrapeError::UrlParse(_) => "invalid_url",
            ScrapeError::Json(_) => "internal",
            ScrapeError::Internal(_) => "internal",
        }
    }

    /// Whether the scrape driver may retry the request locally.
    ///
    /// Navigation, pool and extraction failures are transient; everything
    /// else either reflects bad input or has already consumed its deadline.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapeError::Navigation { .. }
                | ScrapeError::Browser { .. }
                | ScrapeError::PoolTimeout { .. }
                | ScrapeError::Extraction { .. }
                | ScrapeError::Cdp(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chrome_not_found_error_message() {
        let err = ScrapeError::ChromeNotFound;
        let msg = err.to_string();
        assert!(msg.contains("Chrome/Chromium not found"));
        assert!(msg.contains("brew install"));
        assert!(msg.contains("apt install"));
    }

    #[test]
    fn test_navigation_error_retryable() {
        let err = ScrapeError::Navigation {
            url: "https://example.com".to_string(),
            reason: "Connection refused".to_string(),
        };
        assert!(err.to_string().contains("example.com"));
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "navigation");
    }

    #[test]
    fn test_terminal_errors_not_retryable() {
        let invalid = ScrapeError::InvalidUrl {
            url: "not a url".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        let cancelled = ScrapeError::Cancelled {
            id: "req-1".to_string(),
        };
        let timeout = ScrapeError::Timeout {
            url: "https://example.com".to_string(),
            timeout_ms: 60_000,
        };
        assert!(!invalid.is_retryable());
        assert!(!cancelled.is_retryable());
        assert!(!timeout.is_retryable());
    }

    #[test]
    fn test_queue_timeout_kind() {
        let err = ScrapeError::QueueTimeout {
            id: "req-2".to_string(),
            timeout_ms: 120_000,
        };
        assert_eq!(err.kind(), "queue_timeout");
        assert!(err.to_string().contains("req-2"));
    }
}
