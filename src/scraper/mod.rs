//! Ad library scraping behind a cancellation-aware contract.
//!
//! The crawl queue only knows about [`ScrapeOperation`]: run one request,
//! poll [`JobContext::should_cancel`] between units of work, and hand back a
//! [`ReportArtifact`] or an error.
//!
//! # Architecture
//!
//! ```text
//! JobRunner → ScrapeOperation::execute → BrowserSession → AdCards → ReportArtifact
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use adcrawl::scraper::{AdLibraryScraper, ScraperConfig};
//!
//! let scraper = AdLibraryScraper::new(ScraperConfig::default());
//! let artifact = scraper.execute(&request, &ctx).await?;
//! ```

mod chrome;
mod config;
mod extractor;

pub use chrome::{AdLibraryScraper, BrowserSession};
pub use config::ScraperConfig;
pub use extractor::CardExtractor;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::app::{CrawlError, Result};
use crate::crawl::{CancelToken, JobRef, Notifier};
use crate::domain::ScrapeRequest;

/// One ad card as read from the results page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdCard {
    /// Visible text of the card
    pub text: String,
    /// First image or video source found in the card
    pub media_url: Option<String>,
    /// First outbound link found in the card
    pub link: Option<String>,
}

/// Result of a finished scrape, ready to be delivered to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub filename: String,
    pub cards: Vec<AdCard>,
}

impl ReportArtifact {
    pub fn new(filename: impl Into<String>, cards: Vec<AdCard>) -> Self {
        Self {
            filename: filename.into(),
            cards,
        }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Serialize the cards for delivery
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.cards)
            .map_err(|e| CrawlError::Other(format!("Failed to serialize report: {}", e)))
    }
}

/// What a running operation gets to see of its job.
#[derive(Clone)]
pub struct JobContext {
    job: JobRef,
    token: CancelToken,
    notifier: Arc<dyn Notifier>,
}

impl JobContext {
    pub fn new(job: JobRef, token: CancelToken, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            job,
            token,
            notifier,
        }
    }

    pub fn job(&self) -> &JobRef {
        &self.job
    }

    /// The cancellation callback. Poll it between units of work.
    pub fn should_cancel(&self) -> bool {
        self.token.is_set()
    }

    /// Like [`should_cancel`](Self::should_cancel) but as an early return.
    pub fn checkpoint(&self) -> Result<()> {
        if self.should_cancel() {
            return Err(CrawlError::Cancelled);
        }
        Ok(())
    }

    /// The job's token, for `select!`-ing a blocking step against a cancel.
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Report progress to the user. Dropped once the job is cancelled.
    pub fn report_progress(&self, percent: u8) {
        if !self.should_cancel() {
            self.notifier.progress(&self.job, percent.min(100));
        }
    }
}

/// The scrape-and-export step run for each job.
///
/// Implementations must check [`JobContext::should_cancel`] at bounded
/// intervals and release any exclusive resource as soon as it returns true.
#[async_trait]
pub trait ScrapeOperation: Send + Sync {
    async fn execute(&self, request: &ScrapeRequest, ctx: &JobContext) -> Result<ReportArtifact>;
}
