use tracing::{error, info};

use crate::domain::{Job, JobId, JobKey};
use crate::scraper::ReportArtifact;

/// Lightweight description of a job handed to notification sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRef {
    pub id: JobId,
    pub key: JobKey,
    pub term: String,
}

impl From<&Job> for JobRef {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            key: job.key.clone(),
            term: job.request.term.clone(),
        }
    }
}

/// Sink for job progress and outcome messages (usually the chat layer).
///
/// Calls are fire-and-forget: implementations that talk to the network must
/// not block the caller and must swallow their own delivery failures.
pub trait Notifier: Send + Sync {
    /// `position` is 0 once the job starts running, 1..N while it waits.
    fn position_changed(&self, job: &JobRef, position: usize);

    fn progress(&self, job: &JobRef, percent: u8);

    fn succeeded(&self, job: &JobRef, artifact: &ReportArtifact);

    fn failed(&self, job: &JobRef, reason: &str);

    fn cancelled(&self, job: &JobRef);
}

/// Notifier that only writes to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn position_changed(&self, job: &JobRef, position: usize) {
        if position == 0 {
            info!("[{}] Searching ads for {}", job.key, job.term);
        } else {
            info!("[{}] Queued at spot #{} for {}", job.key, position, job.term);
        }
    }

    fn progress(&self, job: &JobRef, percent: u8) {
        info!("[{}] {}: {}%", job.key, job.term, percent);
    }

    fn succeeded(&self, job: &JobRef, artifact: &ReportArtifact) {
        if artifact.is_empty() {
            info!("[{}] No results found for {}", job.key, job.term);
        } else {
            info!(
                "[{}] Search completed: {} results ({})",
                job.key,
                artifact.len(),
                artifact.filename
            );
        }
    }

    fn failed(&self, job: &JobRef, reason: &str) {
        error!("[{}] Error processing {}: {}", job.key, job.term, reason);
    }

    fn cancelled(&self, job: &JobRef) {
        info!("[{}] Process cancelled for {}", job.key, job.term);
    }
}
