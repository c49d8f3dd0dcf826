//! Fakes shared by the crawl and scraper tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use crate::app::{CrawlError, Result};
use crate::crawl::{lock_unpoisoned, JobRef, Notifier};
use crate::domain::ScrapeRequest;
use crate::scraper::{AdCard, JobContext, ReportArtifact, ScrapeOperation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Position(usize),
    Progress(u8),
    Succeeded(usize),
    Failed(String),
    Cancelled,
}

impl Event {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::Succeeded(_) | Event::Failed(_) | Event::Cancelled
        )
    }
}

/// Notifier that keeps every event it receives.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(String, Event)>>,
}

impl RecordingNotifier {
    fn push(&self, job: &JobRef, event: Event) {
        lock_unpoisoned(&self.events).push((job.key.to_string(), event));
    }

    fn events_for(&self, key: &str) -> Vec<Event> {
        lock_unpoisoned(&self.events)
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn positions_for(&self, key: &str) -> Vec<usize> {
        self.events_for(key)
            .into_iter()
            .filter_map(|e| match e {
                Event::Position(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn last_position(&self, key: &str) -> Option<usize> {
        self.positions_for(key).last().copied()
    }

    pub fn progress_for(&self, key: &str) -> Vec<u8> {
        self.events_for(key)
            .into_iter()
            .filter_map(|e| match e {
                Event::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn terminal_events(&self, key: &str) -> Vec<Event> {
        self.events_for(key)
            .into_iter()
            .filter(Event::is_terminal)
            .collect()
    }

    pub fn total_terminal(&self) -> usize {
        lock_unpoisoned(&self.events)
            .iter()
            .filter(|(_, e)| e.is_terminal())
            .count()
    }

    pub async fn wait_for_terminal(&self, key: &str) {
        for _ in 0..400 {
            if !self.terminal_events(key).is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no terminal event for {}", key);
    }
}

impl Notifier for RecordingNotifier {
    fn position_changed(&self, job: &JobRef, position: usize) {
        self.push(job, Event::Position(position));
    }

    fn progress(&self, job: &JobRef, percent: u8) {
        self.push(job, Event::Progress(percent));
    }

    fn succeeded(&self, job: &JobRef, artifact: &ReportArtifact) {
        self.push(job, Event::Succeeded(artifact.len()));
    }

    fn failed(&self, job: &JobRef, reason: &str) {
        self.push(job, Event::Failed(reason.to_string()));
    }

    fn cancelled(&self, job: &JobRef) {
        self.push(job, Event::Cancelled);
    }
}

/// What a fake operation saw.
#[derive(Debug, Clone, Default)]
pub struct Calls {
    terms: Arc<Mutex<Vec<String>>>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
}

impl Calls {
    pub fn count(&self) -> usize {
        lock_unpoisoned(&self.terms).len()
    }

    pub fn terms(&self) -> Vec<String> {
        lock_unpoisoned(&self.terms).clone()
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

enum Behavior {
    Return(usize),
    Fail(fn() -> CrawlError),
    Panic,
    UntilCancelled,
    IgnoringCancel(usize),
    Gated,
}

/// Scripted [`ScrapeOperation`].
pub struct FakeOperation {
    behavior: Behavior,
    delay: Duration,
    calls: Calls,
    started: Arc<Notify>,
    release: Arc<Semaphore>,
}

impl FakeOperation {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            calls: Calls::default(),
            started: Arc::new(Notify::new()),
            release: Arc::new(Semaphore::new(0)),
        }
    }

    pub fn returning(results: usize) -> Self {
        Self::with_behavior(Behavior::Return(results))
    }

    pub fn failing(error: fn() -> CrawlError) -> Self {
        Self::with_behavior(Behavior::Fail(error))
    }

    pub fn panicking() -> Self {
        Self::with_behavior(Behavior::Panic)
    }

    /// Polls for cancellation until it is requested.
    pub fn until_cancelled() -> Self {
        Self::with_behavior(Behavior::UntilCancelled)
    }

    /// Waits for a cancel request, then returns results anyway.
    pub fn ignoring_cancel(results: usize) -> Self {
        Self::with_behavior(Behavior::IgnoringCancel(results))
    }

    /// Finishes with one result per permit added to [`release`](Self::release).
    pub fn gated() -> Self {
        Self::with_behavior(Behavior::Gated)
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.clone()
    }

    pub fn started(&self) -> Arc<Notify> {
        self.started.clone()
    }

    pub fn release(&self) -> Arc<Semaphore> {
        self.release.clone()
    }
}

fn artifact(request: &ScrapeRequest, results: usize) -> ReportArtifact {
    let cards = (0..results)
        .map(|i| AdCard {
            text: format!("Library ID: {}", i),
            ..Default::default()
        })
        .collect();
    ReportArtifact::new(format!("{}.json", request.term), cards)
}

#[async_trait]
impl ScrapeOperation for FakeOperation {
    async fn execute(&self, request: &ScrapeRequest, ctx: &JobContext) -> Result<ReportArtifact> {
        let running = self.calls.running.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = RunningGuard(self.calls.running.clone());
        self.calls.max_running.fetch_max(running, Ordering::SeqCst);
        lock_unpoisoned(&self.calls.terms).push(request.term.clone());
        self.started.notify_one();

        if !self.delay.is_zero() && ctx.token().wait_until_cancelled_or(self.delay).await {
            return Err(CrawlError::Cancelled);
        }

        match &self.behavior {
            Behavior::Return(results) => {
                ctx.report_progress(50);
                Ok(artifact(request, *results))
            }
            Behavior::Fail(error) => Err(error()),
            Behavior::Panic => panic!("scraper blew up"),
            Behavior::UntilCancelled => loop {
                ctx.checkpoint()?;
                ctx.token()
                    .wait_until_cancelled_or(Duration::from_millis(10))
                    .await;
            },
            Behavior::IgnoringCancel(results) => {
                ctx.token().cancelled().await;
                Ok(artifact(request, *results))
            }
            Behavior::Gated => {
                tokio::select! {
                    biased;
                    _ = ctx.token().cancelled() => Err(CrawlError::Cancelled),
                    permit = self.release.acquire() => {
                        if let Ok(permit) = permit {
                            permit.forget();
                        }
                        Ok(artifact(request, 1))
                    }
                }
            }
        }
    }
}
