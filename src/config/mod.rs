//! Configuration management for adcrawl.
//!
//! Configuration is read from `~/.config/adcrawl/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use crate::scraper::ScraperConfig;
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub scraper: ScraperConfig,
}

/// Settings for the crawl queue and its registry.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Registry entries older than this are reaped (default: 3600)
    pub stale_after_secs: u64,

    /// How often the reaper runs (default: 300)
    pub reap_interval_secs: u64,

    /// Send queue position updates to waiting jobs (default: true)
    pub announce_positions: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 3600, // 1 hour
            reap_interval_secs: 300,
            announce_positions: true,
        }
    }
}

impl QueueConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

impl Config {
    /// Load configuration from `path`, or from the default path when `None`.
    ///
    /// If the default config file doesn't exist, creates one with comments.
    /// An explicit path that doesn't exist is an error.
    /// Missing fields in the config file will use default values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let p = Self::default_config_path()?;
                if !p.exists() {
                    Self::create_default_config(&p)?;
                    return Ok(Self::default());
                }
                p
            }
        };

        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
            path: config_path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path,
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/adcrawl/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("adcrawl").join("config.toml"))
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# adcrawl configuration

[queue]
# Registry entries older than this many seconds are treated as leaked
# and removed. Running jobs are never killed by this.
stale_after_secs = 3600

# How often the stale-entry sweep runs, in seconds
reap_interval_secs = 300

# Tell waiting jobs their queue position whenever it changes
announce_positions = true

[scraper]
# Ad library search page; the search term is added as the `q` parameter
library_url = "https://www.facebook.com/ads/library/"

# Run browser in headless mode (no visible window)
headless = true

# Seconds to wait for the first ad cards to appear
initial_load_timeout_secs = 30

# Milliseconds to wait for new content after each scroll
scroll_wait_ms = 10000

# Consecutive scrolls without new content before giving up
scroll_retries = 3

# CSS selector matching one ad card
card_selector = "div[role=\"article\"]"

# Only cards whose text contains this marker are kept
card_marker = "Library ID"

# URL patterns blocked while the page loads
blocked_urls = [
    "*.css",
    "*.woff",
    "*.woff2",
    "*google-analytics.com*",
    "*googletagmanager.com*",
    "*doubleclick.net*",
]
"##
        .to_string()
    }
}

/// Parse an interval string like "1h", "30m", "45s", "1d" or raw seconds.
pub fn parse_interval(s: &str) -> Result<Duration, String> {
    let s = s.trim().to_lowercase();

    let scaled = |value: &str, unit: u64, what: &str| {
        value
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(unit))
            .ok_or_else(|| format!("Invalid {}: {}", what, value))
    };

    let secs = if let Some(hours) = s.strip_suffix('h') {
        scaled(hours, 3600, "hours")
    } else if let Some(minutes) = s.strip_suffix('m') {
        scaled(minutes, 60, "minutes")
    } else if let Some(days) = s.strip_suffix('d') {
        scaled(days, 86400, "days")
    } else if let Some(secs) = s.strip_suffix('s') {
        scaled(secs, 1, "seconds")
    } else {
        s.parse::<u64>()
            .map_err(|_| format!("Invalid interval: {}. Use format like '1h', '30m', '1d'", s))
    }?;

    Ok(Duration::from_secs(secs))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
