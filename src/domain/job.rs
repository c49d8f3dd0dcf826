use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crawl::CancelToken;
use crate::domain::ScrapeRequest;

pub type JobId = u64;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Identity scoping one logical conversation.
///
/// How a chat event maps to a key is up to the caller; the helpers below
/// cover the chat-only and chat+thread forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey(String);

impl JobKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn chat(chat_id: &str) -> Self {
        Self(chat_id.to_string())
    }

    pub fn chat_thread(chat_id: &str, thread_id: Option<&str>) -> Self {
        match thread_id {
            Some(thread) if !thread.is_empty() => Self(format!("{}:{}", chat_id, thread)),
            _ => Self::chat(chat_id),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Cancelled,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Cancelled | JobStatus::Succeeded | JobStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

/// One user-requested scrape-and-report task.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub key: JobKey,
    pub request: ScrapeRequest,
    pub created_at: DateTime<Utc>,
    pub cancel: CancelToken,
    status: JobStatus,
}

impl Job {
    pub fn new(key: JobKey, request: ScrapeRequest) -> Self {
        Self {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            key,
            request,
            created_at: Utc::now(),
            cancel: CancelToken::new(),
            status: JobStatus::Queued,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Move to `next`, returning false (and leaving the status alone) when
    /// the transition is not allowed. Terminal states are never left.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(JobKey::new("c1"), ScrapeRequest::new("example.com"))
    }

    #[test]
    fn test_chat_thread_key() {
        assert_eq!(JobKey::chat_thread("oc_1", Some("t_9")).as_str(), "oc_1:t_9");
        assert_eq!(JobKey::chat_thread("oc_1", None).as_str(), "oc_1");
        assert_eq!(JobKey::chat_thread("oc_1", Some("")).as_str(), "oc_1");
    }

    #[test]
    fn test_job_ids_are_unique() {
        let a = job();
        let b = job();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = job();
        assert_eq!(job.status(), JobStatus::Queued);
        assert!(!job.cancel.is_set());
    }

    #[test]
    fn test_valid_transitions() {
        let mut job = job();
        assert!(job.transition(JobStatus::Running));
        assert!(job.transition(JobStatus::Succeeded));
        assert_eq!(job.status(), JobStatus::Succeeded);
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut job = job();
        assert!(job.transition(JobStatus::Cancelled));
        assert!(!job.transition(JobStatus::Running));
        assert!(!job.transition(JobStatus::Succeeded));
        assert_eq!(job.status(), JobStatus::Cancelled);
    }

    #[test]
    fn test_queued_cannot_skip_to_success() {
        let mut job = job();
        assert!(!job.transition(JobStatus::Succeeded));
        assert!(!job.transition(JobStatus::Failed));
        assert_eq!(job.status(), JobStatus::Queued);
    }

    #[test]
    fn test_terminal_flags() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}
