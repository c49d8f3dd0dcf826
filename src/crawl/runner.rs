use std::sync::Arc;

use tracing::{error, info, warn};

use crate::crawl::{JobRef, JobRegistry, Notifier};
use crate::domain::{Job, JobStatus};
use crate::scraper::{JobContext, ScrapeOperation};

/// Terminal outcome of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The operation finished; `results` may be zero.
    Succeeded { results: usize },
    Failed(String),
    Cancelled,
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Succeeded { .. } => JobStatus::Succeeded,
            JobOutcome::Failed(_) => JobStatus::Failed,
            JobOutcome::Cancelled => JobStatus::Cancelled,
        }
    }
}

/// Executes one dequeued job under cancellation supervision.
pub struct JobRunner {
    operation: Arc<dyn ScrapeOperation>,
    registry: Arc<JobRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl JobRunner {
    pub fn new(
        operation: Arc<dyn ScrapeOperation>,
        registry: Arc<JobRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            operation,
            registry,
            notifier,
        }
    }

    /// Run `job` to a terminal outcome.
    ///
    /// Exactly one of succeeded/failed/cancelled is sent to the notifier, and
    /// the job's registry entry is gone when this returns.
    pub async fn run(&self, mut job: Job) -> JobOutcome {
        let job_ref = JobRef::from(&job);

        let outcome = if self.cancel_requested(&job) {
            info!("Job {} for {} cancelled before starting", job.id, job.key);
            JobOutcome::Cancelled
        } else {
            self.execute(&job, &job_ref).await
        };

        if !job.transition(outcome.status()) {
            warn!(
                "Job {} ended as {} from unexpected status {}",
                job.id,
                outcome.status().as_str(),
                job.status().as_str()
            );
        }

        match &outcome {
            JobOutcome::Succeeded { .. } => {}
            JobOutcome::Failed(reason) => self.notifier.failed(&job_ref, reason),
            JobOutcome::Cancelled => self.notifier.cancelled(&job_ref),
        }

        if !self.registry.clear(&job.key) {
            warn!("No registry entry to clear for {} (job {})", job.key, job.id);
        }

        outcome
    }

    fn cancel_requested(&self, job: &Job) -> bool {
        job.cancel.is_set() || self.registry.should_cancel(&job.key)
    }

    async fn execute(&self, job: &Job, job_ref: &JobRef) -> JobOutcome {
        let ctx = JobContext::new(job_ref.clone(), job.cancel.clone(), self.notifier.clone());
        let operation = self.operation.clone();
        let request = job.request.clone();

        info!("Starting job {} for {}: {}", job.id, job.key, request.term);

        // A separate task so a panicking operation still ends up as Failed.
        let handle = tokio::spawn(async move { operation.execute(&request, &ctx).await });

        match handle.await {
            Ok(Ok(artifact)) => {
                if self.cancel_requested(job) {
                    info!("Job {} finished after a cancel request; discarding results", job.id);
                    return JobOutcome::Cancelled;
                }
                let results = artifact.len();
                info!("Job {} succeeded with {} results", job.id, results);
                self.notifier.succeeded(job_ref, &artifact);
                drop(artifact);
                JobOutcome::Succeeded { results }
            }
            Ok(Err(e)) => {
                if e.is_cancelled() || self.cancel_requested(job) {
                    info!("Job {} stopped on cancel: {}", job.id, e);
                    JobOutcome::Cancelled
                } else {
                    error!("Job {} failed: {}", job.id, e);
                    JobOutcome::Failed(e.to_string())
                }
            }
            Err(e) => {
                if self.cancel_requested(job) {
                    JobOutcome::Cancelled
                } else {
                    error!("Job {} task failed: {}", job.id, e);
                    JobOutcome::Failed(format!("Scrape task failed: {}", e))
                }
            }
        }
    }
}
