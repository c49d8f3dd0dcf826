use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::app::{CrawlError, Result};
use crate::crawl::{lock_unpoisoned, JobRef, JobRegistry, JobRunner, Notifier};
use crate::domain::{Job, JobId, JobKey, JobStatus};

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Job>,
    current: Option<(JobKey, JobId)>,
}

impl QueueState {
    fn holds(&self, key: &JobKey) -> bool {
        self.current.as_ref().is_some_and(|(k, _)| k == key)
            || self.pending.iter().any(|job| &job.key == key)
    }

    /// Position of every pending job, 1-based, in queue order.
    fn snapshot(&self) -> Vec<(JobRef, usize)> {
        self.pending
            .iter()
            .enumerate()
            .map(|(i, job)| (JobRef::from(job), i + 1))
            .collect()
    }
}

/// FIFO of pending crawl jobs with a single "current" slot.
///
/// At most one job runs at a time. Every mutation happens under one lock;
/// position announcements are sent after the lock is released.
pub struct CrawlQueue {
    state: Mutex<QueueState>,
    registry: Arc<JobRegistry>,
    runner: Arc<JobRunner>,
    notifier: Arc<dyn Notifier>,
    announce_positions: bool,
    idle: Notify,
}

impl CrawlQueue {
    pub fn new(
        registry: Arc<JobRegistry>,
        runner: Arc<JobRunner>,
        notifier: Arc<dyn Notifier>,
        announce_positions: bool,
    ) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            registry,
            runner,
            notifier,
            announce_positions,
            idle: Notify::new(),
        }
    }

    /// Append `job` and return its 1-based position at admission.
    ///
    /// Rejected with [`CrawlError::AlreadyActive`] when the key already has a
    /// pending or running job. Starts the job right away when the queue is
    /// idle; that start is announced as position 0.
    pub fn enqueue(self: &Arc<Self>, job: Job) -> Result<usize> {
        let (position, snapshot, idle) = {
            let mut state = lock_unpoisoned(&self.state);
            if state.holds(&job.key) {
                return Err(CrawlError::AlreadyActive(job.key));
            }
            debug!("Enqueued job {} for {}", job.id, job.key);
            state.pending.push_back(job);
            (
                state.pending.len(),
                state.snapshot(),
                state.current.is_none(),
            )
        };

        // An entrant on an idle queue starts right away and only hears position 0
        if idle {
            self.advance();
        } else {
            self.announce(&snapshot);
        }

        Ok(position)
    }

    /// Start the next pending job if nothing is running.
    ///
    /// The dequeued job is registered before the lock is released, so a
    /// concurrent cancel either finds it pending or finds it registered.
    pub fn advance(self: &Arc<Self>) {
        let (job, snapshot) = {
            let mut state = lock_unpoisoned(&self.state);
            if state.current.is_some() {
                return;
            }

            let Some(mut job) = state.pending.pop_front() else {
                drop(state);
                debug!("Crawl queue is idle");
                self.idle.notify_waiters();
                return;
            };

            job.transition(JobStatus::Running);
            if !self
                .registry
                .register(&job.key, job.id, job.cancel.clone())
            {
                // Stale bookkeeping from a crashed run; the new job wins.
                self.registry.clear(&job.key);
                self.registry.register(&job.key, job.id, job.cancel.clone());
            }
            state.current = Some((job.key.clone(), job.id));
            (job, state.snapshot())
        };

        if self.announce_positions {
            self.notifier.position_changed(&JobRef::from(&job), 0);
        }
        self.announce(&snapshot);
        self.dispatch(job);
    }

    fn dispatch(self: &Arc<Self>, job: Job) {
        let queue = Arc::clone(self);
        let key = job.key.clone();
        let job_id = job.id;

        tokio::spawn(async move {
            let run = AssertUnwindSafe(queue.runner.run(job)).catch_unwind().await;
            match run {
                Ok(outcome) => {
                    info!(
                        "Job {} for {} finished: {}",
                        job_id,
                        key,
                        outcome.status().as_str()
                    );
                }
                Err(_) => {
                    error!("Runner for job {} ({}) panicked", job_id, key);
                    queue.registry.clear(&key);
                }
            }
            queue.finish(&key, job_id);
        });
    }

    /// Release the current slot held by `job_id` and start the next job.
    pub fn finish(self: &Arc<Self>, key: &JobKey, job_id: JobId) {
        {
            let mut state = lock_unpoisoned(&self.state);
            match &state.current {
                Some((k, id)) if k == key && *id == job_id => state.current = None,
                _ => {
                    debug!("Job {} for {} is not current; nothing to release", job_id, key);
                    return;
                }
            }
        }
        self.advance();
    }

    /// Take a pending job out of the queue without running it.
    ///
    /// Returns `None` when `key` is not pending, including when it is the
    /// running job; that one is stopped through its cancel token instead.
    pub fn remove(&self, key: &JobKey) -> Option<Job> {
        let (job, snapshot) = {
            let mut state = lock_unpoisoned(&self.state);
            let index = state.pending.iter().position(|job| &job.key == key)?;
            let job = state.pending.remove(index)?;
            (job, state.snapshot())
        };

        debug!("Removed pending job {} for {}", job.id, key);
        self.announce(&snapshot);
        Some(job)
    }

    /// Take every pending job out of the queue.
    pub fn drain(&self) -> Vec<Job> {
        let mut state = lock_unpoisoned(&self.state);
        state.pending.drain(..).collect()
    }

    /// 0 for the running job, 1..N for pending ones, `None` when unknown.
    pub fn position_of(&self, key: &JobKey) -> Option<usize> {
        let state = lock_unpoisoned(&self.state);
        if state.current.as_ref().is_some_and(|(k, _)| k == key) {
            return Some(0);
        }
        state
            .pending
            .iter()
            .position(|job| &job.key == key)
            .map(|i| i + 1)
    }

    pub fn current(&self) -> Option<JobKey> {
        lock_unpoisoned(&self.state)
            .current
            .as_ref()
            .map(|(key, _)| key.clone())
    }

    pub fn pending_len(&self) -> usize {
        lock_unpoisoned(&self.state).pending.len()
    }

    pub fn is_idle(&self) -> bool {
        let state = lock_unpoisoned(&self.state);
        state.current.is_none() && state.pending.is_empty()
    }

    /// Resolves once nothing is running and nothing is pending.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    fn announce(&self, snapshot: &[(JobRef, usize)]) {
        if !self.announce_positions {
            return;
        }
        for (job, position) in snapshot {
            self.notifier.position_changed(job, *position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::testing::{Event, FakeOperation, RecordingNotifier};
    use crate::domain::ScrapeRequest;

    struct Harness {
        queue: Arc<CrawlQueue>,
        registry: Arc<JobRegistry>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(operation: FakeOperation) -> Harness {
        let registry = Arc::new(JobRegistry::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let runner = Arc::new(JobRunner::new(
            Arc::new(operation),
            registry.clone(),
            notifier.clone(),
        ));
        let queue = Arc::new(CrawlQueue::new(
            registry.clone(),
            runner,
            notifier.clone(),
            true,
        ));
        Harness {
            queue,
            registry,
            notifier,
        }
    }

    fn job(key: &str) -> Job {
        Job::new(JobKey::new(key), ScrapeRequest::new(format!("{}.example.com", key)))
    }

    #[tokio::test]
    async fn test_first_job_starts_immediately() {
        let operation = FakeOperation::gated();
        let release = operation.release();
        let h = harness(operation);

        assert_eq!(h.queue.enqueue(job("c1")).unwrap(), 1);
        assert_eq!(h.queue.position_of(&JobKey::new("c1")), Some(0));
        assert_eq!(h.queue.pending_len(), 0);
        assert!(h.registry.contains(&JobKey::new("c1")));
        assert_eq!(h.notifier.positions_for("c1"), vec![0]);

        release.add_permits(1);
        h.queue.wait_idle().await;
    }

    #[tokio::test]
    async fn test_second_job_is_told_its_spot() {
        let operation = FakeOperation::gated();
        let release = operation.release();
        let h = harness(operation);

        h.queue.enqueue(job("c1")).unwrap();
        h.queue.enqueue(job("c2")).unwrap();
        assert_eq!(h.notifier.positions_for("c1"), vec![0]);
        assert_eq!(h.notifier.positions_for("c2"), vec![1]);

        release.add_permits(2);
        h.queue.wait_idle().await;
        assert_eq!(h.notifier.positions_for("c2"), vec![1, 0]);
    }

    #[tokio::test]
    async fn test_positions_have_no_gaps() {
        let operation = FakeOperation::gated();
        let release = operation.release();
        let h = harness(operation);

        h.queue.enqueue(job("c0")).unwrap();
        for i in 1..=5 {
            let position = h.queue.enqueue(job(&format!("c{}", i))).unwrap();
            assert_eq!(position, i);
            for j in 1..=i {
                assert_eq!(h.queue.position_of(&JobKey::new(format!("c{}", j))), Some(j));
            }
        }
        assert_eq!(h.notifier.last_position("c5"), Some(5));
        assert_eq!(h.notifier.last_position("c3"), Some(3));

        release.add_permits(6);
        h.queue.wait_idle().await;
    }

    #[tokio::test]
    async fn test_duplicate_key_is_rejected() {
        let operation = FakeOperation::gated();
        let release = operation.release();
        let h = harness(operation);

        h.queue.enqueue(job("c1")).unwrap();
        h.queue.enqueue(job("c2")).unwrap();

        assert!(matches!(
            h.queue.enqueue(job("c1")),
            Err(CrawlError::AlreadyActive(_))
        ));
        assert!(matches!(
            h.queue.enqueue(job("c2")),
            Err(CrawlError::AlreadyActive(_))
        ));
        assert_eq!(h.queue.pending_len(), 1);

        release.add_permits(2);
        h.queue.wait_idle().await;
    }

    #[tokio::test]
    async fn test_advance_shifts_positions() {
        let operation = FakeOperation::gated();
        let release = operation.release();
        let h = harness(operation);

        h.queue.enqueue(job("c1")).unwrap();
        h.queue.enqueue(job("c2")).unwrap();
        h.queue.enqueue(job("c3")).unwrap();

        release.add_permits(1);
        h.notifier.wait_for_terminal("c1").await;

        // c1 released; c2 should now be current and c3 first in line
        for _ in 0..200 {
            if h.queue.position_of(&JobKey::new("c2")) == Some(0) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(h.queue.position_of(&JobKey::new("c1")), None);
        assert_eq!(h.queue.position_of(&JobKey::new("c2")), Some(0));
        assert_eq!(h.queue.position_of(&JobKey::new("c3")), Some(1));
        assert_eq!(h.notifier.last_position("c3"), Some(1));

        release.add_permits(2);
        h.queue.wait_idle().await;
    }

    #[tokio::test]
    async fn test_remove_pending_job() {
        let operation = FakeOperation::gated();
        let release = operation.release();
        let calls = operation.calls();
        let h = harness(operation);

        h.queue.enqueue(job("c1")).unwrap();
        h.queue.enqueue(job("c2")).unwrap();
        h.queue.enqueue(job("c3")).unwrap();

        let removed = h.queue.remove(&JobKey::new("c2")).unwrap();
        assert_eq!(removed.key, JobKey::new("c2"));
        assert_eq!(h.queue.position_of(&JobKey::new("c2")), None);
        assert_eq!(h.queue.position_of(&JobKey::new("c3")), Some(1));
        assert_eq!(h.notifier.last_position("c3"), Some(1));

        release.add_permits(2);
        h.queue.wait_idle().await;
        assert_eq!(
            calls.terms(),
            vec!["c1.example.com".to_string(), "c3.example.com".to_string()]
        );
    }

    #[tokio::test]
    async fn test_remove_current_is_noop() {
        let operation = FakeOperation::gated();
        let release = operation.release();
        let h = harness(operation);

        h.queue.enqueue(job("c1")).unwrap();
        assert!(h.queue.remove(&JobKey::new("c1")).is_none());
        assert_eq!(h.queue.position_of(&JobKey::new("c1")), Some(0));

        release.add_permits(1);
        h.queue.wait_idle().await;
    }

    #[tokio::test]
    async fn test_jobs_run_in_fifo_order() {
        let operation = FakeOperation::returning(1);
        let calls = operation.calls();
        let h = harness(operation);

        for key in ["a1", "b2", "c3", "d4"] {
            h.queue.enqueue(job(key)).unwrap();
        }
        h.queue.wait_idle().await;

        assert_eq!(
            calls.terms(),
            vec![
                "a1.example.com".to_string(),
                "b2.example.com".to_string(),
                "c3.example.com".to_string(),
                "d4.example.com".to_string(),
            ]
        );
        assert_eq!(calls.max_running(), 1);
    }

    #[tokio::test]
    async fn test_finish_clears_bookkeeping() {
        let h = harness(FakeOperation::returning(2));

        h.queue.enqueue(job("c1")).unwrap();
        h.queue.wait_idle().await;

        assert_eq!(h.queue.position_of(&JobKey::new("c1")), None);
        assert!(h.registry.is_empty());
        assert_eq!(h.notifier.terminal_events("c1"), vec![Event::Succeeded(2)]);
    }

    #[tokio::test]
    async fn test_stale_finish_is_ignored() {
        let operation = FakeOperation::gated();
        let release = operation.release();
        let h = harness(operation);

        h.queue.enqueue(job("c1")).unwrap();
        h.queue.finish(&JobKey::new("c1"), u64::MAX);
        assert_eq!(h.queue.position_of(&JobKey::new("c1")), Some(0));

        release.add_permits(1);
        h.queue.wait_idle().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_flight_under_concurrent_submits() {
        let operation = FakeOperation::returning(1).with_delay_ms(2);
        let calls = operation.calls();
        let h = harness(operation);

        let mut handles = Vec::new();
        for i in 0..32 {
            let queue = h.queue.clone();
            handles.push(tokio::spawn(async move {
                queue.enqueue(job(&format!("k{}", i))).map(|_| ())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        h.queue.wait_idle().await;
        assert_eq!(calls.count(), 32);
        assert_eq!(calls.max_running(), 1);
        assert_eq!(h.notifier.total_terminal(), 32);
        assert!(h.registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_flight_with_concurrent_cancels() {
        let operation = FakeOperation::returning(1).with_delay_ms(1);
        let calls = operation.calls();
        let h = harness(operation);

        for round in 0..20 {
            let mut handles = Vec::new();
            for i in 0..40 {
                let queue = h.queue.clone();
                let registry = h.registry.clone();
                handles.push(tokio::spawn(async move {
                    let key = JobKey::new(format!("r{}-k{}", round, i));
                    queue
                        .enqueue(Job::new(key.clone(), ScrapeRequest::new("shop.example.com")))
                        .unwrap();
                    if i % 3 == 0 {
                        tokio::task::yield_now().await;
                        if queue.remove(&key).is_some() {
                            // Dropped while pending; never reaches the runner
                            return (key, false);
                        }
                        registry.request_cancel(&key);
                    }
                    (key, true)
                }));
            }

            let mut dispatched = Vec::new();
            for handle in handles {
                let (key, ran) = handle.await.unwrap();
                if ran {
                    dispatched.push(key);
                }
            }

            h.queue.wait_idle().await;
            for key in dispatched {
                assert_eq!(h.notifier.terminal_events(key.as_str()).len(), 1, "{}", key);
                assert_eq!(h.queue.position_of(&key), None);
            }
            assert!(h.registry.is_empty());
        }

        assert_eq!(calls.max_running(), 1);
    }
}
