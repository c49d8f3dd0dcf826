//! # adcrawl
//!
//! A single-flight crawl queue for ad library searches issued from chat.
//!
//! ## Architecture
//!
//! Only one browser runs at a time. Requests from many conversations wait
//! in a FIFO and can be cancelled whether they are queued or running:
//!
//! ```text
//! chat command → CrawlService → CrawlQueue → JobRunner → ScrapeOperation → Notifier
//! ```
//!
//! - [`crawl`]: queue, registry, runner and cancellation tokens
//! - [`scraper`]: the browser-driven ad library scrape
//! - [`cli`]: console front end standing in for the chat layer
//!
//! ## Quick Start
//!
//! ```bash
//! # Search a couple of domains, one after another
//! adcrawl crawl shop.example.com https://store.example.org/landing
//!
//! # Chat-style session on stdin
//! adcrawl shell
//! ```
//!
//! ## Modules
//!
//! - [`app`]: Application context and error types
//! - [`cli`]: Command-line interface definitions
//! - [`config`]: Configuration file loading
//! - [`crawl`]: Queueing, cancellation and job lifecycle
//! - [`domain`]: Core domain models (Job, JobKey, ScrapeRequest)
//! - [`scraper`]: Ad library scraping

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires the scraper, the
/// notifier and the crawl service together.
pub mod app;

/// Command-line interface using clap.
///
/// - `crawl <term>...` - Search domains and wait for every report
/// - `shell` - Read `search`/`cancel`/`status`/`help` commands from stdin
pub mod cli;

/// Configuration management.
///
/// Loads from `~/.config/adcrawl/config.toml`, creating a commented default
/// on first run.
pub mod config;

/// Single-flight crawl queue with cooperative cancellation.
///
/// - [`CrawlService`](crawl::CrawlService): submit, cancel and poll jobs
/// - [`CancelToken`](crawl::CancelToken): per-job cancellation signal
/// - [`JobRegistry`](crawl::JobRegistry): running jobs by conversation key
/// - [`Notifier`](crawl::Notifier): sink for user-facing messages
pub mod crawl;

/// Core domain models.
///
/// - [`Job`](domain::Job): one queued or running scrape
/// - [`JobKey`](domain::JobKey): conversation identity
/// - [`ScrapeRequest`](domain::ScrapeRequest): validated search term
pub mod domain;

/// Ad library scraping.
///
/// Uses headless Chrome via chromiumoxide and polls the job's cancellation
/// token between steps.
///
/// - [`AdLibraryScraper`](scraper::AdLibraryScraper): Chrome-based scraper
/// - [`ScraperConfig`](scraper::ScraperConfig): Configuration options
/// - [`ScrapeOperation`](scraper::ScrapeOperation): Async trait for scrape implementations
pub mod scraper;
