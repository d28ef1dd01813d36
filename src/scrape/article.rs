//! Readable article extraction
//!
//! Reduces a raw HTML document to its readable core: title plus main
//! content. Candidate containers are tried by selector first; failing
//! that, block elements are scored by paragraph text mass with penalties
//! for boilerplate class names.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::{Result, ScrapeError};

/// Minimum text length for a selector-matched container to win outright
const CANDIDATE_MIN_CHARS: usize = 250;

/// Containers that usually hold the main content, in priority order
const CONTENT_SELECTORS: [&str; 8] = [
    "article",
    "main",
    "[role='main']",
    "#content",
    ".post-content",
    ".article-content",
    ".entry-content",
    ".content",
];

/// Class/id fragments that mark boilerplate blocks
const BOILERPLATE_HINTS: [&str; 8] = [
    "nav", "footer", "sidebar", "comment", "menu", "header", "banner", "cookie",
];

static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \u{a0}]{2,}").expect("hardcoded regex is valid"));
static BLANK_LINE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("hardcoded regex is valid"));

/// The readable subset of a page
#[derive(Debug, Clone, Default)]
pub struct Article {
    pub title: String,
    pub text_content: String,
    pub html_content: String,
    pub excerpt: String,
    pub site_name: Option<String>,
    pub lang: Option<String>,
}

/// Extract the readable article from raw HTML.
///
/// Fails with [`ScrapeError::Extraction`] when no meaningful text
/// survives, which the scrape driver treats as retryable.
pub fn extract_article(html: &str, url: &str) -> Result<Article> {
    let doc = Html::parse_document(html);

    let content = find_content_element(&doc);
    let (text, content_html) = match content {
        Some(el) => (element_text(&el), el.inner_html()),
        None => {
            // Last resort: the whole body.
            let body_sel = Selector::parse("body").expect("static selector");
            match doc.select(&body_sel).next() {
                Some(body) => (element_text(&body), body.inner_html()),
                None => (String::new(), String::new()),
            }
        }
    };

    let text = clean_text(&text);
    if text.trim().is_empty() {
        return Err(ScrapeError::Extraction {
            url: url.to_string(),
            reason: "no readable content found".to_string(),
        });
    }

    let excerpt: String = text.chars().take(300).collect();

    Ok(Article {
        title: extract_title(&doc),
        text_content: text,
        html_content: content_html,
        excerpt,
        site_name: meta_content(&doc, "meta[property='og:site_name']"),
        lang: document_lang(&doc),
    })
}

fn find_content_element<'a>(doc: &'a Html) -> Option<ElementRef<'a>> {
    for sel_str in CONTENT_SELECTORS {
        let sel = match Selector::parse(sel_str) {
            Ok(sel) => sel,
            Err(_) => continue,
        };
        if let Some(el) = doc.select(&sel).next() {
            if element_text(&el).trim().len() >= CANDIDATE_MIN_CHARS {
                return Some(el);
            }
        }
    }

    // Score block elements by paragraph text mass.
    let block_sel = Selector::parse("div, section").expect("static selector");
    let p_sel = Selector::parse("p").expect("static selector");

    let mut best: Option<(usize, ElementRef<'a>)> = None;
    for el in doc.select(&block_sel) {
        if is_boilerplate(&el) {
            continue;
        }
        let mut score: usize = 0;
        for p in el.select(&p_sel) {
            score += p.text().map(str::len).sum::<usize>();
        }
        if score == 0 {
            continue;
        }
        match best {
            Some((best_score, _)) if best_score >= score => {}
            _ => best = Some((score, el)),
        }
    }

    best.map(|(_, el)| el)
}

fn is_boilerplate(el: &ElementRef<'_>) -> bool {
    let value = el.value();
    let mut haystack = String::new();
    if let Some(id) = value.attr("id") {
        haystack.push_str(&id.to_ascii_lowercase());
    }
    for class in value.classes() {
        haystack.push(' ');
        haystack.push_str(&class.to_ascii_lowercase());
    }
    BOILERPLATE_HINTS.iter().any(|hint| haystack.contains(hint))
}

fn element_text(el: &ElementRef<'_>) -> String {
    let mut out = String::new();
    for chunk in el.text() {
        out.push_str(chunk);
        out.push('\n');
    }
    out
}

fn extract_title(doc: &Html) -> String {
    if let Some(title) = meta_content(doc, "meta[property='og:title']") {
        if !title.is_empty() {
            return title;
        }
    }

    let title_sel = Selector::parse("title").expect("static selector");
    if let Some(el) = doc.select(&title_sel).next() {
        let title: String = el.text().collect::<String>().trim().to_string();
        if !title.is_empty() {
            return title;
        }
    }

    let h1_sel = Selector::parse("h1").expect("static selector");
    if let Some(el) = doc.select(&h1_sel).next() {
        return el.text().collect::<String>().trim().to_string();
    }

    String::new()
}

fn meta_content(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
}

fn document_lang(doc: &Html) -> Option<String> {
    let sel = Selector::parse("html").ok()?;
    doc.select(&sel)
        .next()
        .and_then(|el| el.value().attr("lang"))
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Normalize extracted text: tabs become spaces, whitespace runs
/// collapse, every line is trimmed, and blank-line runs shrink to one.
pub fn clean_text(raw: &str) -> String {
    let no_tabs = raw.replace('\t', " ");
    let collapsed = WHITESPACE_RUNS.replace_all(&no_tabs, " ");

    let trimmed_lines: String = collapsed
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");

    BLANK_LINE_RUNS
        .replace_all(&trimmed_lines, "\n\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
    <html lang="en">
      <head>
        <title>Example Post</title>
        <meta property="og:site_name" content="Example Blog">
      </head>
      <body>
        <nav><a href="/">Home</a><a href="/about">About</a></nav>
        <article>
          <h1>Example Post</h1>
          <p>This is the first paragraph of the article body, long enough to
          carry the content detection threshold across the minimum, with some
          additional words to be safe. It keeps going for a while so the
          extractor has something of substance to find and return.</p>
          <p>A second paragraph adds more body text to the article content.</p>
        </article>
        <footer>© 2024 Example</footer>
      </body>
    </html>
    "#;

    #[test]
    fn test_extracts_article_container() {
        let article = extract_article(PAGE, "https://example.com/post").unwrap();
        assert_eq!(article.title, "Example Post");
        assert!(article.text_content.contains("first paragraph"));
        assert!(article.text_content.contains("second paragraph"));
        assert!(!article.text_content.contains("© 2024"));
        assert_eq!(article.site_name.as_deref(), Some("Example Blog"));
        assert_eq!(article.lang.as_deref(), Some("en"));
    }

    #[test]
    fn test_empty_page_is_extraction_error() {
        let result = extract_article("<html><body></body></html>", "https://example.com");
        assert!(matches!(result, Err(ScrapeError::Extraction { .. })));
    }

    #[test]
    fn test_scored_fallback_skips_boilerplate() {
        let html = r#"
        <html><body>
          <div class="sidebar"><p>Sidebar text that should not win even if long enough to matter here.</p></div>
          <div class="story"><p>Actual story content with a reasonable amount of text in the paragraph so it scores highest.</p></div>
        </body></html>
        "#;
        let article = extract_article(html, "https://example.com").unwrap();
        assert!(article.text_content.contains("Actual story content"));
        assert!(!article.text_content.contains("Sidebar text"));
    }

    #[test]
    fn test_clean_text_normalizes_whitespace() {
        let raw = "line one\t\tend\n\n\n\n   line   two   \n";
        let cleaned = clean_text(raw);
        assert_eq!(cleaned, "line one end\n\nline two");
    }

    #[test]
    fn test_excerpt_capped() {
        let long_para = format!("<article><p>{}</p></article>", "word ".repeat(500));
        let html = format!("<html><body>{}</body></html>", long_para);
        let article = extract_article(&html, "https://example.com").unwrap();
        assert!(article.excerpt.chars().count() <= 300);
    }
}
