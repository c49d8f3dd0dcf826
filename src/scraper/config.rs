use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the ad library scraper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Ad library search page (default: Facebook ads library)
    pub library_url: String,

    /// Whether to run the browser in headless mode (default: true)
    pub headless: bool,

    /// Seconds to wait for the first cards to appear (default: 30)
    pub initial_load_timeout_secs: u64,

    /// Milliseconds to wait for new content after each scroll (default: 10000)
    pub scroll_wait_ms: u64,

    /// Interval between page height checks while waiting, in milliseconds (default: 500)
    pub poll_interval_ms: u64,

    /// Scrolls without new content before scrolling stops (default: 3)
    pub scroll_retries: u32,

    /// CSS selector for one ad card
    pub card_selector: String,

    /// Cards whose text lacks this marker are skipped
    pub card_marker: String,

    /// URL patterns to block while loading (stylesheets, fonts, trackers)
    pub blocked_urls: Vec<String>,

    /// Browser window size
    pub window_size: (u32, u32),

    /// User agent string to use
    pub user_agent: Option<String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            library_url: "https://www.facebook.com/ads/library/".to_string(),
            headless: true,
            initial_load_timeout_secs: 30,
            scroll_wait_ms: 10_000,
            poll_interval_ms: 500,
            scroll_retries: 3,
            card_selector: "div[role=\"article\"]".to_string(),
            card_marker: "Library ID".to_string(),
            blocked_urls: vec![
                "*.css".to_string(),
                "*.woff".to_string(),
                "*.woff2".to_string(),
                "*google-analytics.com*".to_string(),
                "*googletagmanager.com*".to_string(),
                "*doubleclick.net*".to_string(),
            ],
            window_size: (1920, 1080),
            user_agent: Some(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
            ),
        }
    }
}

impl ScraperConfig {
    pub fn initial_load_timeout(&self) -> Duration {
        Duration::from_secs(self.initial_load_timeout_secs)
    }

    pub fn scroll_wait(&self) -> Duration {
        Duration::from_millis(self.scroll_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}
