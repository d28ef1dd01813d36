//! Per-page resource routing
//!
//! Installs a CDP Fetch-domain interceptor that aborts consent/tracking
//! requests and everything the scraper has no use for. Installed exactly
//! once per page, at page initialization; warm pages keep their filter
//! for life.

use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
    RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::Page;
use futures::StreamExt;
use tracing::{debug, trace};

use crate::error::Result;

/// URL families aborted outright: cookie-consent and privacy boilerplate
/// that slows navigation down without contributing content.
const BLOCKED_URL_PATTERNS: [&str; 6] = [
    "onetrust",
    "cookielaw",
    "cookie-consent",
    "cookie-policy",
    "privacy-policy",
    "gdpr",
];

/// Decide whether a paused request may proceed.
///
/// Documents, scripts, stylesheets and data fetches are allowed; images
/// only when the URL suggests a logo; everything else is dead weight.
pub fn should_allow(url: &str, resource_type: &ResourceType) -> bool {
    let lower = url.to_ascii_lowercase();
    if BLOCKED_URL_PATTERNS.iter().any(|p| lower.contains(p)) {
        return false;
    }

    match resource_type {
        ResourceType::Document
        | ResourceType::Script
        | ResourceType::Stylesheet
        | ResourceType::Fetch
        | ResourceType::Xhr => true,
        ResourceType::Image => lower.contains("logo"),
        _ => false,
    }
}

/// Enable Fetch-domain interception on a page and spawn its routing task.
///
/// The task lives until the page closes (its event stream ends with it).
pub async fn install_resource_filter(page: &Page) -> Result<()> {
    page.execute(
        EnableParams::builder()
            .pattern(
                RequestPattern::builder()
                    .url_pattern("*")
                    .request_stage(RequestStage::Request)
                    .build(),
            )
            .build(),
    )
    .await?;

    let mut events = page.event_listener::<EventRequestPaused>().await?;
    let responder = page.clone();

    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let request_id = event.request_id.clone();
            let allowed = should_allow(&event.request.url, &event.resource_type);

            let outcome = if allowed {
                responder
                    .execute(ContinueRequestParams::new(request_id))
                    .await
                    .map(|_| ())
            } else {
                trace!("Aborting request: {}", event.request.url);
                responder
                    .execute(FailRequestParams::new(request_id, ErrorReason::Aborted))
                    .await
                    .map(|_| ())
            };

            if let Err(e) = outcome {
                // The page is usually mid-close here; nothing to do.
                debug!("Resource routing response failed: {}", e);
            }
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_consent_urls() {
        assert!(!should_allow(
            "https://cdn.cookielaw.org/consent/bundle.js",
            &ResourceType::Script
        ));
        assert!(!should_allow(
            "https://example.com/onetrust/sdk.js",
            &ResourceType::Script
        ));
        assert!(!should_allow(
            "https://example.com/privacy-policy",
            &ResourceType::Document
        ));
    }

    #[test]
    fn test_allows_content_resources() {
        assert!(should_allow("https://example.com/", &ResourceType::Document));
        assert!(should_allow(
            "https://example.com/app.js",
            &ResourceType::Script
        ));
        assert!(should_allow(
            "https://example.com/style.css",
            &ResourceType::Stylesheet
        ));
        assert!(should_allow(
            "https://example.com/api/data",
            &ResourceType::Xhr
        ));
    }

    #[test]
    fn test_images_only_when_logo() {
        assert!(should_allow(
            "https://example.com/assets/logo.png",
            &ResourceType::Image
        ));
        assert!(!should_allow(
            "https://example.com/assets/hero.jpg",
            &ResourceType::Image
        ));
    }

    #[test]
    fn test_blocks_media_and_fonts() {
        assert!(!should_allow(
            "https://example.com/video.mp4",
            &ResourceType::Media
        ));
        assert!(!should_allow(
            "https://example.com/font.woff2",
            &ResourceType::Font
        ));
    }
}
