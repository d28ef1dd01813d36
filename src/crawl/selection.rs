//! Subpage selection
//!
//! Deterministic scoring over the root page's internal link graph to
//! pick the K most promising subpages: shallow, short, keyword-relevant
//! paths win; auth/commerce/legal paths are dropped outright.

use url::Url;

use crate::error::{Result, ScrapeError};

/// Path fragments that never make useful subpages
pub const DEFAULT_EXCLUDE_PATTERNS: [&str; 15] = [
    "/login",
    "/signin",
    "/signup",
    "/register",
    "/account",
    "/privacy",
    "/terms",
    "/cookies",
    "/gdpr",
    "/contact",
    "/cart",
    "/checkout",
    "/basket",
    "/purchase",
    "/buy",
];

/// Sections worth visiting on almost any site
const IMPORTANT_SECTIONS: [&str; 5] = ["/about", "/products", "/services", "/faq", "/features"];

const DEPTH_WEIGHT: i64 = 10;
const KEYWORD_WEIGHT: i64 = 20;
const SECTION_WEIGHT: i64 = 15;

/// Selection parameters
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    /// Maximum path depth (non-empty segments)
    pub max_depth: usize,
    /// Caller keywords that boost matching URLs
    pub keywords: Vec<String>,
    /// Path fragments that disqualify a URL
    pub exclude_patterns: Vec<String>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            keywords: Vec::new(),
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Normalize a crawl root: default scheme, lowercase, http upgraded.
pub fn normalize_root_url(input: &str) -> Result<Url> {
    let trimmed = input.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        return Err(ScrapeError::MissingParam("url".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed
    } else {
        format!("https://{}", trimmed)
    };

    let mut parsed = Url::parse(&with_scheme).map_err(|e| ScrapeError::InvalidUrl {
        url: input.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "https" => {}
        "http" => {
            let _ = parsed.set_scheme("https");
        }
        other => {
            return Err(ScrapeError::InvalidUrl {
                url: input.to_string(),
                reason: format!("unsupported scheme '{}'", other),
            })
        }
    }

    Ok(parsed)
}

fn host_without_www(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
}

/// Canonical comparison form: host plus path without trailing slash.
fn normalized_form(url: &Url) -> String {
    let host = host_without_www(url).unwrap_or_default();
    let path = url.path().trim_end_matches('/');
    format!("{}{}", host, path)
}

fn path_depth(url: &Url) -> usize {
    url.path().split('/').filter(|s| !s.is_empty()).count()
}

fn score_url(url: &Url, config: &SelectionConfig) -> i64 {
    let path = url.path().to_ascii_lowercase();
    let full = url.as_str().to_ascii_lowercase();
    let depth = path_depth(url) as i64;

    let depth_score = (config.max_depth as i64 - depth) * DEPTH_WEIGHT;
    let length_score = (100 - path.len() as i64).max(0);
    let keyword_hits = config
        .keywords
        .iter()
        .filter(|k| !k.is_empty() && full.contains(&k.to_ascii_lowercase()))
        .count() as i64;
    let section_hits = IMPORTANT_SECTIONS
        .iter()
        .filter(|s| path.contains(*s))
        .count() as i64;

    depth_score + length_score + KEYWORD_WEIGHT * keyword_hits + SECTION_WEIGHT * section_hits
}

/// Pick the K best subpages from a root page's link candidates.
///
/// Filters to same-origin (ignoring a leading `www.`), resolves
/// relatives, strips fragments, applies exclusion patterns and the depth
/// cap, scores the survivors, and returns the top K by score with ties
/// broken by first-seen order.
pub fn select_subpages(
    root: &Url,
    candidates: &[String],
    k: usize,
    config: &SelectionConfig,
) -> Vec<String> {
    if k == 0 {
        return Vec::new();
    }

    let root_host = host_without_www(root);
    let root_form = normalized_form(root);

    let mut seen = Vec::new();
    let mut scored: Vec<(i64, String)> = Vec::new();

    for candidate in candidates {
        let Ok(mut resolved) = root.join(candidate) else {
            continue;
        };
        resolved.set_fragment(None);

        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        if host_without_www(&resolved) != root_host {
            continue;
        }

        let form = normalized_form(&resolved);
        if seen.contains(&form) {
            continue;
        }
        seen.push(form);

        let path = resolved.path().to_ascii_lowercase();
        if config
            .exclude_patterns
            .iter()
            .any(|p| !p.is_empty() && path.contains(p.as_str()))
        {
            continue;
        }
        if path_depth(&resolved) > config.max_depth {
            continue;
        }

        scored.push((score_url(&resolved, config), resolved.to_string()));
    }

    // Stable sort keeps first-seen order for equal scores.
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let mut selected = Vec::with_capacity(k);
    let mut selected_forms = Vec::new();
    for (_, url) in scored.into_iter().take(2 * k) {
        let parsed = match Url::parse(&url) {
            Ok(u) => u,
            Err(_) => continue,
        };
        let form = normalized_form(&parsed);
        if form == root_form || selected_forms.contains(&form) {
            continue;
        }
        selected_forms.push(form);
        selected.push(url);
        if selected.len() == k {
            break;
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Url {
        Url::parse("https://site.com").unwrap()
    }

    #[test]
    fn test_normalize_root_url() {
        assert_eq!(
            normalize_root_url("Site.com/Path").unwrap().to_string(),
            "https://site.com/path"
        );
        assert_eq!(
            normalize_root_url("http://site.com").unwrap().to_string(),
            "https://site.com/"
        );
        assert!(normalize_root_url("ftp://site.com").is_err());
        assert!(normalize_root_url("").is_err());
    }

    #[test]
    fn test_selection_scenario() {
        // /privacy and /cart excluded by pattern, /products/x/y/z by depth.
        let candidates = vec![
            "/about".to_string(),
            "/privacy".to_string(),
            "/products/x".to_string(),
            "/products/x/y/z".to_string(),
            "/cart".to_string(),
            "/features".to_string(),
        ];
        let selected = select_subpages(&root(), &candidates, 3, &SelectionConfig::default());
        assert_eq!(selected.len(), 3);
        assert!(selected.contains(&"https://site.com/about".to_string()));
        assert!(selected.contains(&"https://site.com/products/x".to_string()));
        assert!(selected.contains(&"https://site.com/features".to_string()));
    }

    #[test]
    fn test_same_origin_filter_ignores_www() {
        let candidates = vec![
            "https://www.site.com/about".to_string(),
            "https://other.com/about".to_string(),
        ];
        let selected = select_subpages(&root(), &candidates, 5, &SelectionConfig::default());
        assert_eq!(selected, vec!["https://www.site.com/about"]);
    }

    #[test]
    fn test_root_and_duplicates_dropped() {
        let candidates = vec![
            "https://site.com/".to_string(),
            "/about".to_string(),
            "/about#team".to_string(),
            "/about/".to_string(),
        ];
        let selected = select_subpages(&root(), &candidates, 5, &SelectionConfig::default());
        assert_eq!(selected, vec!["https://site.com/about"]);
    }

    #[test]
    fn test_keywords_boost_score() {
        let candidates = vec![
            "/docs/general".to_string(),
            "/docs/pricing".to_string(),
        ];
        let config = SelectionConfig {
            keywords: vec!["pricing".to_string()],
            ..Default::default()
        };
        let selected = select_subpages(&root(), &candidates, 1, &config);
        assert_eq!(selected, vec!["https://site.com/docs/pricing"]);
    }

    #[test]
    fn test_shallower_paths_win_ties() {
        let candidates = vec![
            "/blog/some-long-post-name".to_string(),
            "/team".to_string(),
        ];
        let selected = select_subpages(&root(), &candidates, 1, &SelectionConfig::default());
        assert_eq!(selected, vec!["https://site.com/team"]);
    }

    #[test]
    fn test_k_zero_returns_empty() {
        let candidates = vec!["/about".to_string()];
        assert!(select_subpages(&root(), &candidates, 0, &SelectionConfig::default()).is_empty());
    }
}
