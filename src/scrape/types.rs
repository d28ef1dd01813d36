//! Scrape result types
//!
//! The data shapes produced by a single-page scrape and by a whole-site
//! crawl. No persistence; results live only for the request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScrapeError;

/// Page metadata pulled from `<head>` and OpenGraph tags
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_name: Option<String>,
    #[serde(rename = "type")]
    pub page_type: Option<String>,
    pub lang: Option<String>,
    pub og_image: Option<String>,
}

/// Contact link categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Email,
    Calendar,
    Meeting,
    Form,
    Chat,
}

impl std::fmt::Display for ContactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ContactKind::Email => "email",
            ContactKind::Calendar => "calendar",
            ContactKind::Meeting => "meeting",
            ContactKind::Form => "form",
            ContactKind::Chat => "chat",
        };
        write!(f, "{}", name)
    }
}

/// A categorized contact entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactLink {
    pub url: String,
    pub kind: ContactKind,
}

/// The categorized URL sets extracted from a page.
///
/// Every bucket deduplicates by URL while preserving first-seen order,
/// which downstream subpage selection relies on for stable tie-breaks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkBundle {
    pub page_urls: Vec<String>,
    pub social_urls: Vec<String>,
    pub contact_urls: Vec<ContactLink>,
    pub image_urls: Vec<String>,
    pub external_urls: Vec<String>,
}

fn push_unique(list: &mut Vec<String>, url: String) {
    if !list.iter().any(|u| u == &url) {
        list.push(url);
    }
}

impl LinkBundle {
    pub fn add_page_url(&mut self, url: String) {
        push_unique(&mut self.page_urls, url);
    }

    pub fn add_social_url(&mut self, url: String) {
        push_unique(&mut self.social_urls, url);
    }

    pub fn add_image_url(&mut self, url: String) {
        push_unique(&mut self.image_urls, url);
    }

    pub fn add_external_url(&mut self, url: String) {
        push_unique(&mut self.external_urls, url);
    }

    pub fn add_contact(&mut self, url: String, kind: ContactKind) {
        if !self.contact_urls.iter().any(|c| c.url == url) {
            self.contact_urls.push(ContactLink { url, kind });
        }
    }

    /// A URL classified as social never counts as a generic external link.
    /// Applied after a page's sets are built and again after every merge.
    pub fn remove_social_from_external(&mut self) {
        let social = &self.social_urls;
        self.external_urls.retain(|u| !social.contains(u));
    }

    /// Set union with another bundle, dedup by URL.
    pub fn merge(&mut self, other: &LinkBundle) {
        for url in &other.page_urls {
            self.add_page_url(url.clone());
        }
        for url in &other.social_urls {
            self.add_social_url(url.clone());
        }
        for url in &other.image_urls {
            self.add_image_url(url.clone());
        }
        for url in &other.external_urls {
            self.add_external_url(url.clone());
        }
        for contact in &other.contact_urls {
            self.add_contact(contact.url.clone(), contact.kind);
        }
    }

    pub fn total(&self) -> usize {
        self.page_urls.len()
            + self.social_urls.len()
            + self.contact_urls.len()
            + self.image_urls.len()
            + self.external_urls.len()
    }
}

/// Serializable error payload carried inside results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
}

impl From<&ScrapeError> for ErrorInfo {
    fn from(err: &ScrapeError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Result of scraping one page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub url: String,
    pub metadata: PageMetadata,
    pub main_content: String,
    pub markdown: String,
    pub links: LinkBundle,
    pub footer: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub scraped_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ScrapeResult {
    pub fn failure(url: String, err: &ScrapeError) -> Self {
        Self {
            url,
            metadata: PageMetadata::default(),
            main_content: String::new(),
            markdown: String::new(),
            links: LinkBundle::default(),
            footer: String::new(),
            success: false,
            error: Some(ErrorInfo::from(err)),
            scraped_at: Utc::now(),
            duration_ms: 0,
        }
    }

    pub fn title(&self) -> &str {
        self.metadata.title.as_deref().unwrap_or("Untitled")
    }
}

/// One subpage outcome inside an aggregated crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubpageSummary {
    pub url: String,
    pub title: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Crawl bookkeeping
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlStats {
    /// Subpages the caller asked for (K)
    pub requested: usize,
    /// Subpages selected after scoring
    pub selected: usize,
    /// Subpages scraped successfully
    pub processed: usize,
    /// Subpages that failed
    pub failed: usize,
    pub page_urls: usize,
    pub social_urls: usize,
    pub contact_urls: usize,
    pub image_urls: usize,
    pub external_urls: usize,
}

/// Result of a whole-site crawl: root page plus K best subpages, merged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub main_result: ScrapeResult,
    pub subpages: Vec<SubpageSummary>,
    pub links: LinkBundle,
    pub combined_markdown: String,
    pub stats: CrawlStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_dedup_preserves_order() {
        let mut bundle = LinkBundle::default();
        bundle.add_page_url("https://a.com/1".to_string());
        bundle.add_page_url("https://a.com/2".to_string());
        bundle.add_page_url("https://a.com/1".to_string());
        assert_eq!(bundle.page_urls, vec!["https://a.com/1", "https://a.com/2"]);
    }

    #[test]
    fn test_social_removed_from_external() {
        let mut bundle = LinkBundle::default();
        bundle.add_social_url("https://twitter.com/x".to_string());
        bundle.add_external_url("https://twitter.com/x".to_string());
        bundle.add_external_url("https://blog.example.com".to_string());
        bundle.remove_social_from_external();
        assert_eq!(bundle.external_urls, vec!["https://blog.example.com"]);
        assert_eq!(bundle.social_urls, vec!["https://twitter.com/x"]);
    }

    #[test]
    fn test_merge_unions_without_duplicates() {
        let mut a = LinkBundle::default();
        a.add_page_url("https://a.com/1".to_string());
        a.add_contact("mailto:x@a.com".to_string(), ContactKind::Email);

        let mut b = LinkBundle::default();
        b.add_page_url("https://a.com/1".to_string());
        b.add_page_url("https://a.com/2".to_string());
        b.add_contact("mailto:x@a.com".to_string(), ContactKind::Email);

        a.merge(&b);
        assert_eq!(a.page_urls.len(), 2);
        assert_eq!(a.contact_urls.len(), 1);
    }

    #[test]
    fn test_failure_result_shape() {
        let err = ScrapeError::InvalidUrl {
            url: "bad".to_string(),
            reason: "no scheme".to_string(),
        };
        let result = ScrapeResult::failure("bad".to_string(), &err);
        assert!(!result.success);
        let info = result.error.unwrap();
        assert_eq!(info.kind, "invalid_url");
    }
}
