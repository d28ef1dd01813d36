//! Link classification
//!
//! Fixed platform and service tables plus the pure functions that sort a
//! page's anchors into social / contact / internal / external buckets.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use super::types::ContactKind;

/// Social platforms by host substring
pub const SOCIAL_PLATFORMS: [(&str, &[&str]); 8] = [
    ("twitter", &["twitter.com", "t.co"]),
    ("facebook", &["facebook.com", "fb.com"]),
    ("instagram", &["instagram.com"]),
    ("linkedin", &["linkedin.com"]),
    ("youtube", &["youtube.com"]),
    ("tiktok", &["tiktok.com"]),
    ("reddit", &["reddit.com"]),
    ("github", &["github.com"]),
];

/// Contact services by host substring
const CALENDAR_HOSTS: [&str; 6] = [
    "calendly.com",
    "cal.com",
    "youcanbook.me",
    "meetingbird.com",
    "doodle.com",
    "meetbot",
];
const MEETING_HOSTS: [&str; 5] = [
    "meet.google.com",
    "zoom.us",
    "teams.microsoft.com",
    "webex.com",
    "gotomeeting.com",
];
const FORM_HOSTS: [&str; 6] = [
    "forms.",
    "typeform",
    "surveymonkey",
    "formstack",
    "wufoo",
    "jotform",
];
const CHAT_HOSTS: [&str; 7] = [
    "intercom",
    "zendesk",
    "livechat",
    "tawk.to",
    "drift.com",
    "olark",
    "chatwoot",
];

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}")
        .expect("hardcoded email regex is valid")
});

/// Identify the social platform a URL belongs to, if any.
pub fn social_platform(url: &str) -> Option<&'static str> {
    let host = Url::parse(url).ok()?.host_str()?.to_ascii_lowercase();
    for (platform, patterns) in SOCIAL_PLATFORMS {
        if patterns.iter().any(|p| host.contains(p)) {
            return Some(platform);
        }
    }
    None
}

/// Classify a URL as a contact entry, if it is one.
///
/// `mailto:` always counts as email; otherwise the host is matched
/// against the fixed calendar/meeting/form/chat tables.
pub fn contact_kind(url: &str) -> Option<ContactKind> {
    if url.to_ascii_lowercase().starts_with("mailto:") {
        return Some(ContactKind::Email);
    }

    let host = Url::parse(url).ok()?.host_str()?.to_ascii_lowercase();
    if CALENDAR_HOSTS.iter().any(|p| host.contains(p)) {
        return Some(ContactKind::Calendar);
    }
    if MEETING_HOSTS.iter().any(|p| host.contains(p)) {
        return Some(ContactKind::Meeting);
    }
    if FORM_HOSTS.iter().any(|p| host.contains(p)) {
        return Some(ContactKind::Form);
    }
    if CHAT_HOSTS.iter().any(|p| host.contains(p)) {
        return Some(ContactKind::Chat);
    }
    None
}

/// Same-origin check: scheme-agnostic host equality.
pub fn is_same_origin(base: &Url, candidate: &Url) -> bool {
    match (base.host_str(), candidate.host_str()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// Resolve a possibly-relative href against the page URL, dropping
/// fragments and anything that is not http(s) or mailto.
pub fn resolve_href(base: &Url, href: &str) -> Option<String> {
    let trimmed = href.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.to_ascii_lowercase().starts_with("mailto:") {
        return Some(trimmed.to_string());
    }
    let mut resolved = base.join(trimmed).ok()?;
    match resolved.scheme() {
        "http" | "https" => {}
        _ => return None,
    }
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

/// Scan body text for email addresses: first `scan_limit` chars, at most
/// `max_emails` unique hits. A performance floor, not a completeness
/// guarantee.
pub fn extract_emails(text: &str, scan_limit: usize, max_emails: usize) -> Vec<String> {
    let window: String = text.chars().take(scan_limit).collect();
    let mut found = Vec::new();
    for m in EMAIL_RE.find_iter(&window) {
        let email = m.as_str().to_ascii_lowercase();
        if !found.contains(&email) {
            found.push(email);
            if found.len() >= max_emails {
                break;
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_social_platform_by_host() {
        assert_eq!(social_platform("https://twitter.com/someuser"), Some("twitter"));
        assert_eq!(social_platform("https://t.co/abc"), Some("twitter"));
        assert_eq!(social_platform("https://www.linkedin.com/in/x"), Some("linkedin"));
        assert_eq!(social_platform("https://github.com/rust-lang"), Some("github"));
        assert_eq!(social_platform("https://blog.example.com"), None);
    }

    #[test]
    fn test_social_requires_host_match() {
        // The pattern must appear in the host, not the path.
        assert_eq!(social_platform("https://example.com/twitter.com"), None);
    }

    #[test]
    fn test_contact_kind_tables() {
        assert_eq!(contact_kind("mailto:a@b.com"), Some(ContactKind::Email));
        assert_eq!(
            contact_kind("https://calendly.com/someone"),
            Some(ContactKind::Calendar)
        );
        assert_eq!(contact_kind("https://zoom.us/j/123"), Some(ContactKind::Meeting));
        assert_eq!(
            contact_kind("https://forms.gle/abc123"),
            Some(ContactKind::Form)
        );
        assert_eq!(
            contact_kind("https://tawk.to/chat/xyz"),
            Some(ContactKind::Chat)
        );
        assert_eq!(contact_kind("https://example.com/contact"), None);
    }

    #[test]
    fn test_same_origin() {
        let base = Url::parse("https://example.com/page").unwrap();
        let same = Url::parse("https://example.com/other").unwrap();
        let other = Url::parse("https://blog.example.com/post").unwrap();
        assert!(is_same_origin(&base, &same));
        assert!(!is_same_origin(&base, &other));
    }

    #[test]
    fn test_resolve_href() {
        let base = Url::parse("https://example.com/docs/").unwrap();
        assert_eq!(
            resolve_href(&base, "/about#team"),
            Some("https://example.com/about".to_string())
        );
        assert_eq!(
            resolve_href(&base, "guide"),
            Some("https://example.com/docs/guide".to_string())
        );
        assert_eq!(
            resolve_href(&base, "mailto:a@b.com"),
            Some("mailto:a@b.com".to_string())
        );
        assert_eq!(resolve_href(&base, "javascript:void(0)"), None);
        assert_eq!(resolve_href(&base, "  "), None);
    }

    #[test]
    fn test_extract_emails_caps() {
        let text = "a@x.com b@x.com c@x.com d@x.com e@x.com f@x.com a@x.com";
        let emails = extract_emails(text, 15_000, 5);
        assert_eq!(emails.len(), 5);
        assert_eq!(emails[0], "a@x.com");
    }

    #[test]
    fn test_extract_emails_respects_scan_window() {
        let text = format!("{}found@late.com", " ".repeat(100));
        assert!(extract_emails(&text, 50, 5).is_empty());
        assert_eq!(extract_emails(&text, 200, 5).len(), 1);
    }
}
