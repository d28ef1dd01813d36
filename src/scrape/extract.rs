//! In-page extraction
//!
//! One JavaScript round trip collects everything the scraper needs from
//! the live DOM: metadata, navigation links, anchors, images, footer text
//! and a body-text prefix for email scanning. Classification happens on
//! the Rust side where it is testable.

use chromiumoxide::Page;
use serde::Deserialize;
use tracing::debug;

use crate::config::ContentLimits;
use crate::error::{Result, ScrapeError};

use super::types::PageMetadata;

/// Raw anchor as found in the DOM
#[derive(Debug, Clone, Deserialize)]
pub struct RawLink {
    pub href: String,
    #[serde(default)]
    pub text: String,
}

/// Everything one extraction round trip returns
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPageData {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub site_name: Option<String>,
    #[serde(default)]
    pub page_type: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub og_image: Option<String>,
    #[serde(default)]
    pub nav_links: Vec<RawLink>,
    #[serde(default)]
    pub links: Vec<RawLink>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub footer: String,
    #[serde(default)]
    pub body_text: String,
}

impl RawPageData {
    pub fn metadata(&self) -> PageMetadata {
        PageMetadata {
            title: self.title.clone().filter(|s| !s.is_empty()),
            description: self.description.clone().filter(|s| !s.is_empty()),
            site_name: self.site_name.clone().filter(|s| !s.is_empty()),
            page_type: self.page_type.clone().filter(|s| !s.is_empty()),
            lang: self.lang.clone().filter(|s| !s.is_empty()),
            og_image: self.og_image.clone().filter(|s| !s.is_empty()),
        }
    }
}

fn extraction_script(limits: &ContentLimits) -> String {
    format!(
        r#"
    (() => {{
        const meta = (sel) => {{
            const el = document.querySelector(sel);
            return el ? el.getAttribute('content') : null;
        }};

        const result = {{}};
        result.title = document.title || (meta('meta[property="og:title"]') || '');
        result.description = meta('meta[name="description"]') || meta('meta[property="og:description"]');
        result.siteName = meta('meta[property="og:site_name"]');
        result.pageType = meta('meta[property="og:type"]');
        result.lang = document.documentElement.lang || null;
        result.ogImage = meta('meta[property="og:image"]');

        const linkOf = (a) => ({{ href: a.getAttribute('href') || '', text: (a.textContent || '').trim().slice(0, 200) }});

        const navAnchors = Array.from(document.querySelectorAll('nav a[href], header a[href]'));
        result.navLinks = navAnchors.slice(0, {nav_cap}).map(linkOf);

        const anchors = Array.from(document.querySelectorAll('a[href]'));
        result.links = anchors.map(linkOf);

        const imgs = Array.from(document.querySelectorAll('img[src]'));
        result.images = imgs.slice(0, {image_cap}).map((img) => img.src);

        const footerEl = document.querySelector('footer');
        result.footer = footerEl ? (footerEl.textContent || '').trim().slice(0, {footer_cap}) : '';

        result.bodyText = (document.body ? document.body.innerText || '' : '').slice(0, {body_cap});

        return JSON.stringify(result);
    }})()
    "#,
        nav_cap = limits.nav_links_cap,
        image_cap = limits.image_links_cap,
        footer_cap = limits.footer_max_chars,
        body_cap = limits.email_scan_limit,
    )
}

/// Signals that suggest lazily loaded or infinite-scrolled content
const DYNAMIC_CONTENT_JS: &str = r#"
    (() => {
        if (document.querySelector('[data-lazy], [data-src], [loading="lazy"]')) return true;
        if (document.querySelector('.infinite-scroll, .load-more, #infinite, .pagination')) return true;
        const source = document.documentElement.outerHTML.toLowerCase();
        if (source.includes('scroll') && (source.includes('load-more') || source.includes('infinite'))) return true;
        return false;
    })()
"#;

/// Run the single-round-trip extraction against a loaded page.
pub async fn extract_page_data(page: &Page, limits: &ContentLimits) -> Result<RawPageData> {
    let script = extraction_script(limits);
    let value = page.evaluate(script).await?;

    let json_str = value
        .value()
        .and_then(|v| v.as_str())
        .ok_or_else(|| ScrapeError::Cdp("extraction script returned no payload".to_string()))?;

    let data: RawPageData = serde_json::from_str(json_str)?;
    debug!(
        "Extracted {} links, {} images, {} nav entries",
        data.links.len(),
        data.images.len(),
        data.nav_links.len()
    );
    Ok(data)
}

/// Check the page for dynamic-content signals that warrant scrolling.
pub async fn has_dynamic_content(page: &Page) -> bool {
    match page.evaluate(DYNAMIC_CONTENT_JS).await {
        Ok(value) => value.value().and_then(|v| v.as_bool()).unwrap_or(false),
        Err(e) => {
            debug!("Dynamic-content probe failed: {}", e);
            false
        }
    }
}

/// Fetch the page's current serialized HTML.
pub async fn page_html(page: &Page) -> Result<String> {
    let html = page.content().await?;
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_script_embeds_caps() {
        let limits = ContentLimits {
            email_scan_limit: 123,
            footer_max_chars: 456,
            nav_links_cap: 7,
            image_links_cap: 8,
        };
        let script = extraction_script(&limits);
        assert!(script.contains("slice(0, 123)"));
        assert!(script.contains("slice(0, 456)"));
        assert!(script.contains("slice(0, 7)"));
        assert!(script.contains("slice(0, 8)"));
    }

    #[test]
    fn test_raw_page_data_parses_extraction_payload() {
        let json = r#"{
            "title": "Example",
            "description": null,
            "siteName": "Example Inc",
            "navLinks": [{"href": "/about", "text": "About"}],
            "links": [{"href": "https://twitter.com/x", "text": "Twitter"}],
            "images": ["https://example.com/logo.png"],
            "footer": "© Example",
            "bodyText": "hello"
        }"#;
        let data: RawPageData = serde_json::from_str(json).unwrap();
        assert_eq!(data.title.as_deref(), Some("Example"));
        assert_eq!(data.nav_links.len(), 1);
        assert_eq!(data.links[0].href, "https://twitter.com/x");
        assert_eq!(data.footer, "© Example");
    }

    #[test]
    fn test_metadata_filters_empty_strings() {
        let data = RawPageData {
            title: Some(String::new()),
            site_name: Some("Site".to_string()),
            ..Default::default()
        };
        let meta = data.metadata();
        assert!(meta.title.is_none());
        assert_eq!(meta.site_name.as_deref(), Some("Site"));
    }
}
