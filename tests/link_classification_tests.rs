//! Link Classification Integration Tests
//!
//! The fixed platform/service tables, email scanning, and the
//! social-versus-external rule applied across merges.

use sitegrab::scrape::links::{contact_kind, extract_emails, social_platform};
use sitegrab::scrape::{ContactKind, LinkBundle};

#[test]
fn test_documented_classification_scenario() {
    // Links: twitter profile, external blog, mailto, calendly.
    let page_links = [
        "https://twitter.com/x",
        "https://blog.example.com",
        "mailto:a@b.com",
        "https://calendly.com/x",
    ];

    let mut bundle = LinkBundle::default();
    for link in page_links {
        if let Some(kind) = contact_kind(link) {
            bundle.add_contact(link.to_string(), kind);
            if kind == ContactKind::Email {
                continue;
            }
        }
        if social_platform(link).is_some() {
            bundle.add_social_url(link.to_string());
        }
        if link.starts_with("http") {
            bundle.add_external_url(link.to_string());
        }
    }
    bundle.remove_social_from_external();

    // Social contains twitter only.
    assert_eq!(bundle.social_urls, vec!["https://twitter.com/x"]);

    // External contains the blog but not twitter.
    assert!(bundle
        .external_urls
        .contains(&"https://blog.example.com".to_string()));
    assert!(!bundle
        .external_urls
        .contains(&"https://twitter.com/x".to_string()));

    // Contact has exactly the email and calendar entries.
    let kinds: Vec<ContactKind> = bundle.contact_urls.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![ContactKind::Email, ContactKind::Calendar]);
}

#[test]
fn test_every_social_platform_table_entry() {
    let cases = [
        ("https://twitter.com/a", "twitter"),
        ("https://t.co/b", "twitter"),
        ("https://facebook.com/c", "facebook"),
        ("https://fb.com/d", "facebook"),
        ("https://instagram.com/e", "instagram"),
        ("https://linkedin.com/in/f", "linkedin"),
        ("https://youtube.com/@g", "youtube"),
        ("https://tiktok.com/@h", "tiktok"),
        ("https://reddit.com/r/i", "reddit"),
        ("https://github.com/j", "github"),
    ];
    for (url, platform) in cases {
        assert_eq!(social_platform(url), Some(platform), "url: {}", url);
    }
}

#[test]
fn test_contact_service_tables() {
    let cases = [
        ("https://calendly.com/me", ContactKind::Calendar),
        ("https://cal.com/me", ContactKind::Calendar),
        ("https://doodle.com/poll", ContactKind::Calendar),
        ("https://meet.google.com/xyz", ContactKind::Meeting),
        ("https://zoom.us/j/1", ContactKind::Meeting),
        ("https://teams.microsoft.com/l/m", ContactKind::Meeting),
        ("https://forms.gle/abc", ContactKind::Form),
        ("https://mycompany.typeform.com/to/x", ContactKind::Form),
        ("https://jotform.com/form", ContactKind::Form),
        ("https://tawk.to/chat", ContactKind::Chat),
        ("https://drift.com/x", ContactKind::Chat),
        ("mailto:team@example.com", ContactKind::Email),
    ];
    for (url, expected) in cases {
        assert_eq!(contact_kind(url), Some(expected), "url: {}", url);
    }

    // Plain pages are not contact links.
    assert_eq!(contact_kind("https://example.com/contact-us-page"), None);
}

#[test]
fn test_email_scan_limits() {
    // Five unique addresses maximum, duplicates collapse.
    let text = "reach us: a@x.com, b@x.com, a@x.com, c@x.com, d@x.com, e@x.com, f@x.com";
    let emails = extract_emails(text, 15_000, 5);
    assert_eq!(emails.len(), 5);
    assert!(!emails.contains(&"f@x.com".to_string()));

    // The scan window is a hard prefix.
    let padded = format!("{}late@x.com", "pad ".repeat(50));
    assert!(extract_emails(&padded, 10, 5).is_empty());
}

#[test]
fn test_social_external_rule_survives_merge() {
    // Root saw twitter as social; a subpage saw the same URL as external.
    let mut root = LinkBundle::default();
    root.add_social_url("https://twitter.com/brand".to_string());

    let mut subpage = LinkBundle::default();
    subpage.add_external_url("https://twitter.com/brand".to_string());
    subpage.add_external_url("https://partner.example.com".to_string());

    root.merge(&subpage);
    root.remove_social_from_external();

    assert_eq!(root.social_urls, vec!["https://twitter.com/brand"]);
    assert_eq!(root.external_urls, vec!["https://partner.example.com"]);
}

#[test]
fn test_bundles_never_hold_duplicates() {
    let mut bundle = LinkBundle::default();
    for _ in 0..3 {
        bundle.add_page_url("https://site.com/a".to_string());
        bundle.add_social_url("https://github.com/x".to_string());
        bundle.add_image_url("https://site.com/logo.png".to_string());
        bundle.add_contact("mailto:a@b.com".to_string(), ContactKind::Email);
    }
    assert_eq!(bundle.page_urls.len(), 1);
    assert_eq!(bundle.social_urls.len(), 1);
    assert_eq!(bundle.image_urls.len(), 1);
    assert_eq!(bundle.contact_urls.len(), 1);
}
