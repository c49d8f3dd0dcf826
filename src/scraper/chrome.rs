use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::{CrawlError, Result};
use crate::domain::ScrapeRequest;
use crate::scraper::config::ScraperConfig;
use crate::scraper::extractor::CardExtractor;
use crate::scraper::{AdCard, JobContext, ReportArtifact, ScrapeOperation};

/// Upper bound for each browser shutdown step.
pub const SHUTDOWN_STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// A running browser owned by one job.
///
/// Dropping the session aborts the CDP handler and lets chromiumoxide kill
/// the child process, so every exit path releases the browser.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch a browser with the given configuration
    pub async fn launch(config: &ScraperConfig) -> Result<Self> {
        let (width, height) = config.window_size;
        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-infobars")
            .window_size(width, height);

        if !config.headless {
            builder = builder.with_head();
        }

        let browser_config = builder
            .build()
            .map_err(|e| CrawlError::Scraper(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            CrawlError::Scraper(format!(
                "Failed to launch browser: {}. Is Chrome or Chromium installed and in PATH?",
                e
            ))
        })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {}", e);
                }
            }
        });

        Ok(Self { browser, handler })
    }

    pub async fn new_page(&self, url: &str) -> Result<Page> {
        self.browser
            .new_page(url)
            .await
            .map_err(|e| CrawlError::Scraper(format!("Failed to create page: {}", e)))
    }

    /// Close the browser and wait for the process to exit.
    ///
    /// Each step is bounded by [`SHUTDOWN_STEP_TIMEOUT`]; a browser that does
    /// not go away in time is killed. Errors are logged.
    pub async fn close(mut self) {
        if !bounded("close browser", SHUTDOWN_STEP_TIMEOUT, self.browser.close()).await {
            self.kill().await;
        }
        if !bounded("wait for browser exit", SHUTDOWN_STEP_TIMEOUT, self.browser.wait()).await {
            self.kill().await;
        }
        self.handler.abort();
    }

    async fn kill(&mut self) {
        match self.browser.kill().await {
            Some(Err(e)) => warn!("Failed to kill browser: {}", e),
            Some(Ok(())) => debug!("Browser process killed"),
            None => {}
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Ad library scraper driving headless Chrome through chromiumoxide
pub struct AdLibraryScraper {
    config: ScraperConfig,
    extractor: CardExtractor,
}

impl AdLibraryScraper {
    pub fn new(config: ScraperConfig) -> Self {
        let extractor = CardExtractor::new(config.clone());
        Self { config, extractor }
    }

    /// Launch a browser unless the job is cancelled before or during launch.
    async fn acquire_session(&self, ctx: &JobContext) -> Result<BrowserSession> {
        ctx.checkpoint()?;

        let session = tokio::select! {
            biased;
            _ = ctx.token().cancelled() => return Err(CrawlError::Cancelled),
            session = BrowserSession::launch(&self.config) => session?,
        };

        if ctx.should_cancel() {
            session.close().await;
            return Err(CrawlError::Cancelled);
        }
        Ok(session)
    }

    /// Everything that needs the browser. Dropped mid-flight on cancel.
    async fn browse(
        &self,
        session: &BrowserSession,
        request: &ScrapeRequest,
        ctx: &JobContext,
    ) -> Result<Vec<AdCard>> {
        let url = request.search_url(&self.config.library_url)?;
        let page = session.new_page("about:blank").await?;

        if let Some(ref ua) = self.config.user_agent {
            page.set_user_agent(ua)
                .await
                .map_err(|e| CrawlError::Scraper(format!("Failed to set user agent: {}", e)))?;
        }

        if let Some(script) = blocking_script(&self.config.blocked_urls) {
            if let Err(e) = page
                .execute(AddScriptToEvaluateOnNewDocumentParams::new(script))
                .await
            {
                warn!("Could not enable request blocking: {}", e);
            }
        }

        ctx.checkpoint()?;
        page.goto(url.as_str())
            .await
            .map_err(|e| CrawlError::Scraper(format!("Navigation failed: {}", e)))?;

        if !self.wait_for_cards(&page, ctx).await? {
            warn!("Timed out waiting for initial ads for {}", request.term);
            return Ok(Vec::new());
        }

        ctx.report_progress(10);
        self.scroll_to_bottom(&page, ctx).await?;
        ctx.report_progress(40);

        ctx.checkpoint()?;
        let value: serde_json::Value = evaluate(&page, self.extractor.cards_script()).await?;

        let mut cards = Vec::new();
        for card in self.extractor.parse_cards(value) {
            ctx.checkpoint()?;
            cards.push(card);
        }
        info!("Found {} ads for {}", cards.len(), request.term);

        if let Err(e) = page.close().await {
            debug!("Failed to close page: {}", e);
        }

        ctx.report_progress(80);
        Ok(cards)
    }

    /// Poll until at least one card is on the page. False on timeout.
    async fn wait_for_cards(&self, page: &Page, ctx: &JobContext) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + self.config.initial_load_timeout();

        loop {
            let count: u64 = evaluate(page, self.extractor.count_script()).await?;
            if count > 0 {
                debug!("{} initial ads loaded", count);
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            if ctx
                .token()
                .wait_until_cancelled_or(self.config.poll_interval())
                .await
            {
                return Err(CrawlError::Cancelled);
            }
        }
    }

    /// Scroll until the page stops growing `scroll_retries` times in a row.
    async fn scroll_to_bottom(&self, page: &Page, ctx: &JobContext) -> Result<()> {
        let mut retries = self.config.scroll_retries;

        while retries > 0 {
            ctx.checkpoint()?;

            let last_height: u64 = evaluate(page, self.extractor.scroll_script()).await?;
            if self.wait_for_growth(page, last_height, ctx).await? {
                retries = self.config.scroll_retries;
            } else {
                retries -= 1;
                debug!("Page did not grow after scroll, {} retries left", retries);
            }
        }

        Ok(())
    }

    async fn wait_for_growth(&self, page: &Page, last_height: u64, ctx: &JobContext) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + self.config.scroll_wait();

        while tokio::time::Instant::now() < deadline {
            if ctx
                .token()
                .wait_until_cancelled_or(self.config.poll_interval())
                .await
            {
                return Err(CrawlError::Cancelled);
            }
            let height: u64 = evaluate(page, self.extractor.height_script()).await?;
            if height > last_height {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

#[async_trait]
impl ScrapeOperation for AdLibraryScraper {
    async fn execute(&self, request: &ScrapeRequest, ctx: &JobContext) -> Result<ReportArtifact> {
        let session = self.acquire_session(ctx).await?;

        // A cancel request stops the browsing future at its current await point
        let result = tokio::select! {
            biased;
            _ = ctx.token().cancelled() => Err(CrawlError::Cancelled),
            cards = self.browse(&session, request, ctx) => cards,
        };

        session.close().await;

        let cards = result?;
        let filename = request.report_filename(chrono::Local::now().date_naive());
        Ok(ReportArtifact::new(filename, cards))
    }
}

async fn evaluate<T: DeserializeOwned>(page: &Page, script: impl Into<String>) -> Result<T> {
    page.evaluate(script.into())
        .await
        .map_err(|e| CrawlError::Scraper(format!("Script execution failed: {}", e)))?
        .into_value()
        .map_err(|e| CrawlError::Scraper(format!("Failed to parse result: {:?}", e)))
}

/// Run one shutdown step for at most `limit`. True when it finished cleanly.
async fn bounded<T, E: Display>(
    step: &str,
    limit: Duration,
    fut: impl Future<Output = std::result::Result<T, E>>,
) -> bool {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            warn!("Failed to {}: {}", step, e);
            false
        }
        Err(_) => {
            warn!("Timed out trying to {} after {:?}", step, limit);
            false
        }
    }
}

/// Script installed before navigation that strips stylesheet, font and
/// tracker elements whose URL matches one of the glob `patterns`.
fn blocking_script(patterns: &[String]) -> Option<String> {
    if patterns.is_empty() {
        return None;
    }

    let regexes = patterns
        .iter()
        .map(|p| format!("new RegExp('^{}$')", glob_to_regex(p)))
        .collect::<Vec<_>>()
        .join(", ");

    Some(format!(
        r#"
        (() => {{
            const blocked = [{regexes}];
            const isBlocked = (url) => !!url && blocked.some(re => re.test(url));
            const strip = (node) => {{
                if (!node || !node.tagName) return;
                const url = node.href || node.src;
                if (isBlocked(url)) node.remove();
            }};
            new MutationObserver(mutations => {{
                for (const m of mutations) m.addedNodes.forEach(strip);
            }}).observe(document, {{ childList: true, subtree: true }});
        }})()
        "#
    ))
}

/// Convert a `*` glob into a regular expression body safe to embed in a
/// single-quoted JavaScript string.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '.' | '+' | '?' | '^' | '$' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '/' => {
                out.push_str("\\\\");
                out.push(c);
            }
            '\\' | '\'' => {}
            _ => out.push(c),
        }
    }
    out
}
