//! Single-flight crawl queue with cooperative cancellation.
//!
//! One browser session runs at a time system-wide. Jobs wait in a FIFO,
//! are told their position whenever it changes, and can be cancelled while
//! queued or while running.
//!
//! ```text
//! submit → CrawlQueue → JobRegistry (on dequeue) → JobRunner → ScrapeOperation
//!                ↑                                      │
//!                └────────────── finish / advance ──────┘
//! ```

mod cancel;
mod notify;
mod queue;
mod registry;
mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use cancel::CancelToken;
pub use notify::{JobRef, LogNotifier, Notifier};
pub use queue::CrawlQueue;
pub use registry::{spawn_reaper, JobRegistry, RegistryEntry};
pub use runner::{JobOutcome, JobRunner};

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::info;

use crate::app::Result;
use crate::config::QueueConfig;
use crate::domain::{Job, JobId, JobKey, JobStatus, ScrapeRequest};
use crate::scraper::ScrapeOperation;

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub job_id: JobId,
    /// 1-based queue position at admission
    pub position: usize,
}

/// Entry point for the chat-command layer.
///
/// Build one per process and share it; it owns the queue, the registry and
/// the stale-entry reaper.
pub struct CrawlService {
    queue: Arc<CrawlQueue>,
    registry: Arc<JobRegistry>,
    notifier: Arc<dyn Notifier>,
    config: QueueConfig,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl CrawlService {
    pub fn new(
        operation: Arc<dyn ScrapeOperation>,
        notifier: Arc<dyn Notifier>,
        config: QueueConfig,
    ) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let runner = Arc::new(JobRunner::new(
            operation,
            registry.clone(),
            notifier.clone(),
        ));
        let queue = Arc::new(CrawlQueue::new(
            registry.clone(),
            runner,
            notifier.clone(),
            config.announce_positions,
        ));

        Self {
            queue,
            registry,
            notifier,
            config,
            reaper: Mutex::new(None),
        }
    }

    /// Queue a scrape for `key`.
    ///
    /// Fails with `AlreadyActive` when `key` already has a queued or running
    /// job; nothing is queued in that case.
    pub fn submit(&self, key: JobKey, request: ScrapeRequest) -> Result<Accepted> {
        let job = Job::new(key, request);
        let job_id = job.id;
        let position = self.queue.enqueue(job)?;
        Ok(Accepted { job_id, position })
    }

    /// Cancel the queued or running job for `key`.
    ///
    /// A queued job is dropped without ever running. A running job has its
    /// token set and reports `Cancelled` once it unwinds. Returns false when
    /// there was nothing to cancel.
    pub fn cancel(&self, key: &JobKey) -> bool {
        if let Some(job) = self.queue.remove(key) {
            self.drop_pending(job);
            return true;
        }
        self.registry.request_cancel(key)
    }

    /// Cancel everything: pending jobs are dropped, the running one is signalled.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for job in self.queue.drain() {
            self.drop_pending(job);
            cancelled += 1;
        }
        if let Some(key) = self.queue.current() {
            if self.registry.request_cancel(&key) {
                cancelled += 1;
            }
        }
        cancelled
    }

    fn drop_pending(&self, mut job: Job) {
        job.cancel.request();
        job.transition(JobStatus::Cancelled);
        info!("Removed queued job {} for {}", job.id, job.key);
        self.notifier.cancelled(&JobRef::from(&job));
    }

    /// 0 = running, N = waiting at spot N, `None` = unknown or finished.
    pub fn poll_position(&self, key: &JobKey) -> Option<usize> {
        self.queue.position_of(key)
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }

    /// Resolves once every submitted job has reached a terminal outcome.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Start the periodic stale-entry sweep. Calling it again is a no-op.
    pub fn start_reaper(&self) {
        let mut reaper = lock_unpoisoned(&self.reaper);
        if reaper.is_some() {
            return;
        }
        *reaper = Some(spawn_reaper(
            self.registry.clone(),
            self.config.reap_interval(),
            self.config.stale_after(),
        ));
    }

    /// Stop background tasks. Jobs still in flight are left alone.
    pub fn shutdown(&self) {
        if let Some(handle) = lock_unpoisoned(&self.reaper).take() {
            handle.abort();
        }
    }
}

impl Drop for CrawlService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
