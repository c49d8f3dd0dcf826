use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::crawl::{lock_unpoisoned, CancelToken};
use crate::domain::{JobId, JobKey};

/// Bookkeeping for a job that has started running.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub job_id: JobId,
    pub token: CancelToken,
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl RegistryEntry {
    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    active: HashMap<JobKey, RegistryEntry>,
    // Cancelled jobs stay observable through `should_cancel` until the
    // runner clears them.
    cancelled: HashMap<JobKey, (CancelToken, Instant)>,
}

/// Process-wide table from job key to the running job's cancel token.
#[derive(Debug, Default)]
pub struct JobRegistry {
    state: Mutex<RegistryState>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the job `job_id` started under `key`.
    ///
    /// Returns false when a live entry already exists for the key.
    pub fn register(&self, key: &JobKey, job_id: JobId, token: CancelToken) -> bool {
        let mut state = lock_unpoisoned(&self.state);
        if state.active.contains_key(key) || state.cancelled.contains_key(key) {
            warn!("Refusing to register job {} for {}: key already active", job_id, key);
            return false;
        }

        state.active.insert(
            key.clone(),
            RegistryEntry {
                job_id,
                token,
                started_at: Utc::now(),
                started: Instant::now(),
            },
        );
        debug!("Registered job {} for {}", job_id, key);
        true
    }

    /// Signal the job running under `key` to stop.
    ///
    /// Setting the token also releases whatever resource the running
    /// operation bound to it (the browser session). Returns false when there
    /// is nothing to cancel.
    pub fn request_cancel(&self, key: &JobKey) -> bool {
        let mut state = lock_unpoisoned(&self.state);
        match state.active.remove(key) {
            Some(entry) => {
                info!("Cancellation requested for {} (job {})", key, entry.job_id);
                entry.token.request();
                state
                    .cancelled
                    .insert(key.clone(), (entry.token, entry.started));
                true
            }
            None => {
                debug!("No active job to cancel for {}", key);
                false
            }
        }
    }

    pub fn should_cancel(&self, key: &JobKey) -> bool {
        let state = lock_unpoisoned(&self.state);
        if let Some(entry) = state.active.get(key) {
            return entry.token.is_set();
        }
        state
            .cancelled
            .get(key)
            .is_some_and(|(token, _)| token.is_set())
    }

    /// Remove all bookkeeping for `key`. Returns whether anything was removed.
    pub fn clear(&self, key: &JobKey) -> bool {
        let mut state = lock_unpoisoned(&self.state);
        let active = state.active.remove(key).is_some();
        let cancelled = state.cancelled.remove(key).is_some();
        active || cancelled
    }

    pub fn contains(&self, key: &JobKey) -> bool {
        let state = lock_unpoisoned(&self.state);
        state.active.contains_key(key) || state.cancelled.contains_key(key)
    }

    pub fn get(&self, key: &JobKey) -> Option<RegistryEntry> {
        lock_unpoisoned(&self.state).active.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        let state = lock_unpoisoned(&self.state);
        state.active.len() + state.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries older than `max_age`.
    ///
    /// Only bookkeeping is removed; a job that is somehow still running is
    /// not touched.
    pub fn reap_stale(&self, max_age: Duration) -> usize {
        let mut state = lock_unpoisoned(&self.state);
        let before = state.active.len() + state.cancelled.len();

        state.active.retain(|key, entry| {
            let keep = entry.age() < max_age;
            if !keep {
                warn!("Reaping stale registry entry for {} (job {})", key, entry.job_id);
            }
            keep
        });
        state
            .cancelled
            .retain(|_, (_, started)| started.elapsed() < max_age);

        before - (state.active.len() + state.cancelled.len())
    }
}

/// Run `reap_stale` every `every` on a background task.
pub fn spawn_reaper(registry: Arc<JobRegistry>, every: Duration, max_age: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(every);
        timer.tick().await; // Skip the first immediate tick

        loop {
            timer.tick().await;
            let reaped = registry.reap_stale(max_age);
            if reaped > 0 {
                info!("Reaped {} stale registry entries", reaped);
            }
        }
    })
}
