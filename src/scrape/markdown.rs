//! Markdown document assembly
//!
//! Converts the readable article HTML via htmd (ATX headings, dash
//! bullets, fenced code, reference-style links) and assembles the final
//! per-page document: title, core content, then navigation, social,
//! contact and footer sections with their link references collected at
//! the end.

use std::sync::LazyLock;

use htmd::options::{
    BulletListMarker, CodeBlockStyle, HeadingStyle, LinkReferenceStyle, LinkStyle, Options,
};
use htmd::HtmlToMarkdown;
use regex::Regex;

use crate::error::{Result, ScrapeError};

use super::types::LinkBundle;

static BLANK_LINE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("hardcoded regex is valid"));

fn converter() -> HtmlToMarkdown {
    HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "noscript", "iframe"])
        .options(Options {
            heading_style: HeadingStyle::Atx,
            bullet_list_marker: BulletListMarker::Dash,
            code_block_style: CodeBlockStyle::Fenced,
            link_style: LinkStyle::Referenced,
            link_reference_style: LinkReferenceStyle::Full,
            ..Default::default()
        })
        .build()
}

/// Convert an HTML fragment to markdown with the document options.
pub fn html_fragment_to_markdown(html: &str) -> Result<String> {
    converter()
        .convert(html)
        .map_err(|e| ScrapeError::Internal(format!("markdown conversion failed: {}", e)))
}

/// A navigation entry carried into the document
#[derive(Debug, Clone)]
pub struct NavEntry {
    pub text: String,
    pub url: String,
}

/// Assemble the per-page markdown document.
pub fn build_page_markdown(
    title: &str,
    article_html: &str,
    nav: &[NavEntry],
    links: &LinkBundle,
    footer: &str,
) -> Result<String> {
    let core = html_fragment_to_markdown(article_html)?;

    let mut doc = String::new();
    let mut refs: Vec<String> = Vec::new();

    doc.push_str(&format!("# {}\n\n", title));
    doc.push_str("## Core Content\n\n");
    doc.push_str(core.trim());
    doc.push_str("\n\n");

    if !nav.is_empty() {
        doc.push_str("## Navigation\n\n");
        for entry in nav {
            let label = if entry.text.is_empty() {
                &entry.url
            } else {
                &entry.text
            };
            doc.push_str(&format!("- [{}][{}]\n", label, refs.len() + 1));
            refs.push(entry.url.clone());
        }
        doc.push('\n');
    }

    if !links.social_urls.is_empty() {
        doc.push_str("## Social Media\n\n");
        for url in &links.social_urls {
            let label = super::links::social_platform(url).unwrap_or("social");
            doc.push_str(&format!("- [{}][{}]\n", label, refs.len() + 1));
            refs.push(url.clone());
        }
        doc.push('\n');
    }

    if !links.contact_urls.is_empty() {
        doc.push_str("## Contact Information\n\n");
        for contact in &links.contact_urls {
            doc.push_str(&format!("- [{}][{}]\n", contact.kind, refs.len() + 1));
            refs.push(contact.url.clone());
        }
        doc.push('\n');
    }

    if !footer.trim().is_empty() {
        doc.push_str("## Footer\n\n");
        doc.push_str(footer.trim());
        doc.push_str("\n\n");
    }

    if !refs.is_empty() {
        for (i, url) in refs.iter().enumerate() {
            doc.push_str(&format!("[{}]: {}\n", i + 1, url));
        }
    }

    Ok(collapse_blank_lines(&doc))
}

/// Collapse runs of three or more blank lines down to two.
pub fn collapse_blank_lines(text: &str) -> String {
    BLANK_LINE_RUNS.replace_all(text, "\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::types::ContactKind;

    fn sample_bundle() -> LinkBundle {
        let mut bundle = LinkBundle::default();
        bundle.add_social_url("https://twitter.com/example".to_string());
        bundle.add_contact("mailto:hi@example.com".to_string(), ContactKind::Email);
        bundle.add_contact("https://calendly.com/example".to_string(), ContactKind::Calendar);
        bundle
    }

    #[test]
    fn test_document_sections_in_order() {
        let nav = vec![NavEntry {
            text: "About".to_string(),
            url: "https://example.com/about".to_string(),
        }];
        let doc = build_page_markdown(
            "Example",
            "<p>Body text</p>",
            &nav,
            &sample_bundle(),
            "© Example 2024",
        )
        .unwrap();

        let title_pos = doc.find("# Example").unwrap();
        let core_pos = doc.find("## Core Content").unwrap();
        let nav_pos = doc.find("## Navigation").unwrap();
        let social_pos = doc.find("## Social Media").unwrap();
        let contact_pos = doc.find("## Contact Information").unwrap();
        let footer_pos = doc.find("## Footer").unwrap();

        assert!(title_pos < core_pos);
        assert!(core_pos < nav_pos);
        assert!(nav_pos < social_pos);
        assert!(social_pos < contact_pos);
        assert!(contact_pos < footer_pos);
    }

    #[test]
    fn test_references_emitted_once_at_end() {
        let nav = vec![NavEntry {
            text: "About".to_string(),
            url: "https://example.com/about".to_string(),
        }];
        let doc = build_page_markdown("T", "<p>x</p>", &nav, &sample_bundle(), "").unwrap();

        assert!(doc.contains("- [About][1]"));
        assert!(doc.contains("[1]: https://example.com/about"));
        assert!(doc.contains("- [twitter][2]"));
        assert!(doc.contains("[2]: https://twitter.com/example"));
        assert!(doc.contains("- [email][3]"));
        assert!(doc.contains("- [calendar][4]"));

        // Definitions come after the last section body.
        let last_def = doc.rfind("[4]: ").unwrap();
        let contact_section = doc.find("## Contact Information").unwrap();
        assert!(last_def > contact_section);
    }

    #[test]
    fn test_empty_sections_omitted() {
        let doc =
            build_page_markdown("T", "<p>x</p>", &[], &LinkBundle::default(), "").unwrap();
        assert!(!doc.contains("## Navigation"));
        assert!(!doc.contains("## Social Media"));
        assert!(!doc.contains("## Contact Information"));
        assert!(!doc.contains("## Footer"));
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }
}
