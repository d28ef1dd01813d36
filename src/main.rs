//! sitegrab CLI Entry Point
//!
//! Headless-browser web scraping with pooled contexts

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use sitegrab::browser::{find_chrome, BrowserOptions};
use sitegrab::cli::{Args, OutputFormat};
use sitegrab::config::ServiceConfig;
use sitegrab::crawl::CrawlOptions;
use sitegrab::error::{Result, ScrapeError};
use sitegrab::service::ScraperService;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let args = Args::parse();

    // Setup logging
    setup_logging(&args);

    // Run the main logic
    if let Err(e) = run(args).await {
        error!("{}", e);
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Setup tracing/logging based on CLI flags
fn setup_logging(args: &Args) {
    let level = if args.quiet {
        Level::ERROR
    } else if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Main application logic
async fn run(args: Args) -> Result<()> {
    // Handle --detect-chrome flag
    if args.detect_chrome {
        return detect_chrome_command(&args);
    }

    // Validate arguments
    if let Err(e) = args.validate() {
        return Err(ScrapeError::Config(e));
    }

    // Print banner
    if !args.quiet {
        print_banner();
    }

    // Service configuration: env first, CLI overrides
    let mut config = ServiceConfig::from_env();
    config.max_concurrent_requests = args.concurrency;
    config.request_timeout = std::time::Duration::from_secs(args.timeout);
    config.default_subpages_count = args.subpages;

    let browser_options = BrowserOptions {
        chrome_path: args.chrome_path.clone(),
        no_sandbox: args.no_sandbox,
        restart_threshold: config.restart_threshold,
        ..Default::default()
    };

    if !args.quiet {
        println!("{}", "Launching browser...".dimmed());
    }
    let service = ScraperService::start(config, browser_options).await?;

    let outcome = if args.crawl {
        run_crawl_mode(&service, &args).await
    } else {
        run_single_mode(&service, &args).await
    };

    service.shutdown().await?;
    info!("Service shut down");

    outcome
}

/// Scrape a single page
async fn run_single_mode(service: &ScraperService, args: &Args) -> Result<()> {
    let url = args.url.as_ref().expect("URL required after validation");

    if !args.quiet {
        println!("{} {}", "Scraping:".cyan().bold(), url);
    }

    let result = service.scrape_page(url).await?;

    if !args.quiet {
        println!(
            "{} {} ({} links, {}ms)",
            "Done:".green().bold(),
            result.title(),
            result.links.total(),
            result.duration_ms
        );
    }

    match args.format {
        OutputFormat::Json => {
            let output = serde_json::to_string_pretty(&result)?;
            write_or_print(&output, args)?;
        }
        OutputFormat::Markdown => {
            write_or_print(&result.markdown, args)?;
        }
        OutputFormat::Table => print_page_summary(&result),
    }

    Ok(())
}

/// Crawl the site: root plus best subpages
async fn run_crawl_mode(service: &ScraperService, args: &Args) -> Result<()> {
    let url = args.url.as_ref().expect("URL required after validation");

    if !args.quiet {
        println!(
            "{} {} (up to {} subpages)",
            "Crawling:".cyan().bold(),
            url,
            args.subpages
        );
    }

    let spinner = if !args.quiet {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid template"),
        );
        pb.set_message("Scraping root and subpages...");
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let options = CrawlOptions {
        subpages_count: args.subpages,
        keywords: args.keywords.clone(),
        max_depth: args.max_depth,
        ..Default::default()
    };

    let result = service.scrape_website(url, options).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let result = result?;

    if !args.quiet {
        println!(
            "{} {}/{} subpages, {} links total",
            "Done:".green().bold(),
            result.stats.processed,
            result.stats.selected,
            result.links.total()
        );
    }

    match args.format {
        OutputFormat::Json => {
            let output = serde_json::to_string_pretty(&result)?;
            write_or_print(&output, args)?;
        }
        OutputFormat::Markdown => {
            write_or_print(&result.combined_markdown, args)?;
        }
        OutputFormat::Table => print_crawl_summary(&result),
    }

    Ok(())
}

/// Print a single-page summary table
fn print_page_summary(result: &sitegrab::ScrapeResult) {
    println!();
    println!("{} Scrape Result", "═══".cyan());
    println!();
    println!("  {} {}", "URL:".bold(), result.url);
    println!("  {} {}", "Title:".bold(), result.title());
    if let Some(description) = &result.metadata.description {
        println!("  {} {}", "Description:".bold(), truncate(description, 70));
    }
    if let Some(lang) = &result.metadata.lang {
        println!("  {} {}", "Language:".bold(), lang);
    }
    println!(
        "  {} {} chars",
        "Content:".bold(),
        result.main_content.len()
    );
    println!();
    println!("{}", "─".repeat(60));
    println!(
        "  {:<12} {:>6}",
        "Bucket".bold(),
        "URLs".bold()
    );
    println!("{}", "─".repeat(60));
    println!("  {:<12} {:>6}", "pages", result.links.page_urls.len());
    println!("  {:<12} {:>6}", "social", result.links.social_urls.len());
    println!("  {:<12} {:>6}", "contact", result.links.contact_urls.len());
    println!("  {:<12} {:>6}", "images", result.links.image_urls.len());
    println!(
        "  {:<12} {:>6}",
        "external",
        result.links.external_urls.len()
    );
    println!("{}", "─".repeat(60));
}

/// Print a crawl summary table
fn print_crawl_summary(result: &sitegrab::AggregatedResult) {
    print_page_summary(&result.main_result);
    println!();
    println!("{} Subpages", "═══".cyan());
    println!();

    for subpage in &result.subpages {
        let status = if subpage.success {
            "OK".green()
        } else {
            "FAIL".red()
        };
        let detail = subpage
            .title
            .clone()
            .or_else(|| subpage.error.as_ref().map(|e| e.message.clone()))
            .unwrap_or_default();
        println!(
            "  {:>4}  {:<50} {}",
            status,
            truncate(&subpage.url, 48),
            truncate(&detail, 40)
        );
    }

    println!();
    println!(
        "  {} requested={} selected={} processed={} failed={}",
        "Stats:".bold(),
        result.stats.requested,
        result.stats.selected,
        result.stats.processed,
        result.stats.failed
    );
}

/// Handle --detect-chrome command
fn detect_chrome_command(args: &Args) -> Result<()> {
    println!("{}", "Detecting Chrome/Chromium...".cyan().bold());
    println!();

    match find_chrome(args.chrome_path.as_deref()) {
        Ok(info) => {
            println!("{} Chrome found!", "Success:".green().bold());
            println!();
            println!("  Path:    {}", info.path.display());
            println!(
                "  Version: {}",
                info.version.as_deref().unwrap_or("unknown")
            );
            println!("  Method:  {:?}", info.detection_method);
            Ok(())
        }
        Err(e) => {
            println!("{}", e);
            Err(e)
        }
    }
}

/// Write output to the file given by --output, or print it
fn write_or_print(content: &str, args: &Args) -> Result<()> {
    if let Some(path) = &args.output {
        write_output(content, path)?;
        if !args.quiet {
            println!(
                "{} Output saved to {}",
                "Success:".green().bold(),
                path.display()
            );
        }
    } else {
        println!("{}", content);
    }
    Ok(())
}

/// Write output to file
fn write_output(content: &str, path: &PathBuf) -> Result<()> {
    fs::write(path, content).map_err(ScrapeError::Io)
}

/// Truncate a string for display
fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let prefix: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", prefix)
    }
}

/// Print application banner
fn print_banner() {
    println!();
    println!(
        "{}",
        r#"
      _ _                        _
  ___(_) |_ ___  __ _ _ __ __ _| |__
 / __| | __/ _ \/ _` | '__/ _` | '_ \
 \__ \ | ||  __/ (_| | | | (_| | |_) |
 |___/_|\__\___|\__, |_|  \__,_|_.__/
                |___/
"#
        .cyan()
    );
    println!(
        "  {} v{} - Headless-browser web scraping",
        "sitegrab".bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();
}
