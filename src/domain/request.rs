use serde::{Deserialize, Serialize};
use url::Url;

use crate::app::{CrawlError, Result};

/// Minimum accepted length for a domain search term
const MIN_DOMAIN_LEN: usize = 8;

/// A validated search term to look up in the ad library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub term: String,
}

impl ScrapeRequest {
    /// Build a request without validation.
    pub fn new(term: impl Into<String>) -> Self {
        Self { term: term.into() }
    }

    /// Clean up user input and require it to look like a domain.
    ///
    /// Accepts bare hosts (`shop.example.com`), full URLs
    /// (`https://shop.example.com/path`) and chat-style markdown links
    /// (`[shop.example.com](https://shop.example.com)`).
    pub fn parse_domain(input: &str) -> Result<Self> {
        let term = clean_search_term(input);
        validate_domain(&term)?;
        Ok(Self { term })
    }

    /// Ad library search URL for this term, built on `base`.
    pub fn search_url(&self, base: &str) -> Result<Url> {
        let mut url = Url::parse(base)?;
        url.query_pairs_mut()
            .clear()
            .append_pair("active_status", "active")
            .append_pair("ad_type", "all")
            .append_pair("country", "ALL")
            .append_pair("is_targeted_country", "false")
            .append_pair("media_type", "all")
            .append_pair("q", &self.term)
            .append_pair("search_type", "keyword_unordered");
        Ok(url)
    }

    /// File name for the exported report, e.g. `shop-example-com_2024-05-01_results.json`
    pub fn report_filename(&self, date: chrono::NaiveDate) -> String {
        format!(
            "{}_{}_results.json",
            self.term.replace('.', "-"),
            date.format("%Y-%m-%d")
        )
    }
}

/// Strip markdown link wrappers and URL schemes down to a bare host.
pub fn clean_search_term(input: &str) -> String {
    let mut term = input.trim();

    if let Some(start) = term.find('[') {
        if let Some(len) = term[start + 1..].find(']') {
            term = &term[start + 1..start + 1 + len];
        }
    }

    let term = term.trim().to_lowercase();
    match Url::parse(&term) {
        Ok(url) if url.has_host() => url.host_str().unwrap_or(&term).to_string(),
        _ => term,
    }
}

fn validate_domain(domain: &str) -> Result<()> {
    if domain.contains('@') {
        return Err(CrawlError::InvalidRequest(format!(
            "domain contains '@': {}",
            domain
        )));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    let valid_shape = labels.len() >= 2
        && labels.iter().enumerate().all(|(i, label)| {
            if i == labels.len() - 1 {
                label.len() >= 2 && label.chars().all(|c| c.is_ascii_alphabetic())
            } else {
                label.len() >= 2 && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            }
        });

    if !valid_shape {
        return Err(CrawlError::InvalidRequest(format!(
            "not a valid domain: {}",
            domain
        )));
    }

    if domain.len() < MIN_DOMAIN_LEN {
        return Err(CrawlError::InvalidRequest(format!(
            "domain is too short: {}",
            domain
        )));
    }

    Ok(())
}
