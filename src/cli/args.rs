//! CLI argument parsing using clap
//!
//! Defines all command-line arguments and their validation.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// sitegrab - Headless-browser web scraping service
///
/// Extracts structured content (article, navigation, social/contact
/// links, images, footer) from a URL, optionally fanning out to the
/// site's best subpages.
#[derive(Parser, Debug)]
#[command(
    name = "sitegrab",
    version,
    author,
    about = "Headless-browser web scraping with pooled contexts",
    long_about = "sitegrab scrapes a page (or a whole site) with a pooled headless\n\
                  Chrome instance and returns structured content:\n\
                  - readable article text and markdown\n\
                  - navigation, social, contact, image and external links\n\
                  - page metadata and footer\n\n\
                  With --crawl the best subpages are selected from the root's\n\
                  link graph and merged into one aggregated result."
)]
pub struct Args {
    /// URL to scrape
    ///
    /// Example: https://example.com
    #[arg(value_name = "URL")]
    pub url: Option<String>,

    /// Crawl the site: scrape the root plus its best subpages
    #[arg(short = 'w', long)]
    pub crawl: bool,

    /// Number of subpages to crawl (with --crawl)
    #[arg(short = 'n', long, default_value = "5", value_name = "NUM")]
    pub subpages: usize,

    /// Keywords boosting subpage selection (comma-separated)
    ///
    /// Example: --keywords pricing,docs
    #[arg(short = 'k', long, value_name = "WORDS", value_delimiter = ',')]
    pub keywords: Vec<String>,

    /// Maximum subpage path depth
    #[arg(long, default_value = "2", value_name = "NUM")]
    pub max_depth: usize,

    /// Output format
    ///
    /// json: Machine-readable JSON
    /// markdown: The assembled markdown document
    /// table: Human-readable summary
    #[arg(short = 'f', long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Output file path (stdout if not specified)
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Custom Chrome/Chromium binary path
    ///
    /// Overrides auto-detection. Can also be set via CHROME_PATH env var.
    #[arg(long, value_name = "PATH", env = "CHROME_PATH")]
    pub chrome_path: Option<String>,

    /// Maximum concurrent scrapes admitted by the request queue
    #[arg(short = 'c', long, default_value = "50", value_name = "NUM")]
    pub concurrency: usize,

    /// Per-request timeout in seconds
    #[arg(short = 't', long, default_value = "60", value_name = "SECS")]
    pub timeout: u64,

    /// Disable sandbox mode (required for Docker/root)
    ///
    /// WARNING: Reduces security. Only use in containerized environments.
    #[arg(long)]
    pub no_sandbox: bool,

    /// Verbose output (show progress and debug info)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Quiet mode (only show errors)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Detect Chrome and print path (then exit)
    #[arg(long)]
    pub detect_chrome: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// JSON output (machine-readable)
    #[value(name = "json")]
    Json,
    /// Markdown document output
    #[value(name = "markdown", alias = "md")]
    Markdown,
    /// Human-readable summary
    #[value(name = "table")]
    Table,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Table => write!(f, "table"),
        }
    }
}

impl Args {
    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if !self.detect_chrome && self.url.is_none() {
            return Err("No URL specified.".to_string());
        }

        if self.subpages > 50 {
            return Err("Subpage count cannot exceed 50".to_string());
        }

        if self.concurrency == 0 {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use --verbose and --quiet together".to_string());
        }

        Ok(())
    }
}
