use thiserror::Error;

use crate::domain::JobKey;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("A job is already queued or running for {0}")]
    AlreadyActive(JobKey),

    #[error("Job was cancelled")]
    Cancelled,

    #[error("Scraper error: {0}")]
    Scraper(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("{0}")]
    Other(String),
}

impl CrawlError {
    /// Whether this error only reflects a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CrawlError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, CrawlError>;
