//! Subpage Selection Integration Tests
//!
//! The deterministic scoring pipeline: origin filtering, exclusion
//! patterns, depth caps and tie-breaking.

use url::Url;

use sitegrab::crawl::{normalize_root_url, select_subpages, SelectionConfig};

fn root() -> Url {
    normalize_root_url("https://site.com").unwrap()
}

#[test]
fn test_documented_selection_scenario() {
    // privacy/cart excluded by pattern; /products/x/y/z excluded by depth.
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
    assert!(!selected.iter().any(|u| u.contains("/privacy")));
    assert!(!selected.iter().any(|u| u.contains("/cart")));
    assert!(!selected.iter().any(|u| u.contains("/x/y/z")));
}

#[test]
fn test_result_never_exceeds_k() {
    let candidates: Vec<String> = (0..40).map(|i| format!("/page{}", i)).collect();
    let selected = select_subpages(&root(), &candidates, 5, &SelectionConfig::default());
    assert_eq!(selected.len(), 5);
}

#[test]
fn test_root_is_never_selected() {
    let candidates = vec![
        "https://site.com".to_string(),
        "https://site.com/".to_string(),
        "https://www.site.com/".to_string(),
        "/about".to_string(),
    ];
    let selected = select_subpages(&root(), &candidates, 5, &SelectionConfig::default());
    assert_eq!(selected, vec!["https://site.com/about"]);
}

#[test]
fn test_cross_origin_candidates_dropped() {
    let candidates = vec![
        "https://elsewhere.com/about".to_string(),
        "https://blog.site.com/post".to_string(),
        "/local".to_string(),
    ];
    let selected = select_subpages(&root(), &candidates, 5, &SelectionConfig::default());
    assert_eq!(selected, vec!["https://site.com/local"]);
}

#[test]
fn test_fragments_are_stripped_and_deduped() {
    let candidates = vec![
        "/docs#intro".to_string(),
        "/docs#advanced".to_string(),
        "/docs".to_string(),
    ];
    let selected = select_subpages(&root(), &candidates, 5, &SelectionConfig::default());
    assert_eq!(selected, vec!["https://site.com/docs"]);
}

#[test]
fn test_important_sections_outrank_plain_pages() {
    let candidates = vec!["/blog1".to_string(), "/about".to_string()];
    let selected = select_subpages(&root(), &candidates, 1, &SelectionConfig::default());
    assert_eq!(selected, vec!["https://site.com/about"]);
}

#[test]
fn test_keywords_influence_ranking() {
    let candidates = vec!["/a/general".to_string(), "/a/pricing".to_string()];
    let config = SelectionConfig {
        keywords: vec!["pricing".to_string()],
        ..Default::default()
    };
    let selected = select_subpages(&root(), &candidates, 1, &config);
    assert_eq!(selected, vec!["https://site.com/a/pricing"]);
}

#[test]
fn test_ties_keep_first_seen_order() {
    // Identical scores: same depth, same length, no keywords/sections.
    let candidates = vec!["/aaaa".to_string(), "/bbbb".to_string()];
    let selected = select_subpages(&root(), &candidates, 2, &SelectionConfig::default());
    assert_eq!(
        selected,
        vec!["https://site.com/aaaa", "https://site.com/bbbb"]
    );
}

#[test]
fn test_custom_max_depth() {
    let candidates = vec!["/a/b/c".to_string()];
    let default_config = SelectionConfig::default();
    assert!(select_subpages(&root(), &candidates, 5, &default_config).is_empty());

    let deep_config = SelectionConfig {
        max_depth: 3,
        ..Default::default()
    };
    assert_eq!(select_subpages(&root(), &candidates, 5, &deep_config).len(), 1);
}

#[test]
fn test_normalize_root_url_rules() {
    // Scheme defaulting, lowercasing, http upgrade.
    assert_eq!(
        normalize_root_url("Example.COM").unwrap().to_string(),
        "https://example.com/"
    );
    assert_eq!(
        normalize_root_url("http://example.com/Path").unwrap().to_string(),
        "https://example.com/path"
    );
    assert!(normalize_root_url("file:///etc/passwd").is_err());
    assert!(normalize_root_url("").is_err());
}
