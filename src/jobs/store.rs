use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;

use super::{JobRecord, JobStatus};

/// In-memory registry of jobs
///
/// Created once at start-up and shared by `Arc`. The lock is only held for
/// map operations, never across an await.
#[derive(Debug)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, JobRecord>>,
    retention: Duration,
}

impl JobStore {
    /// Finished jobs become evictable `retention` after they finish
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn insert(&self, record: JobRecord) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.insert(record.id.clone(), record);
    }

    /// Snapshot of one job
    pub fn get(&self, id: &str) -> Option<JobRecord> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(id).cloned()
    }

    /// All jobs, newest first
    pub fn list(&self) -> Vec<JobRecord> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let mut records: Vec<JobRecord> = jobs.values().cloned().collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        records
    }

    /// Applies `f` to the job; returns false when it is unknown
    pub fn update<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        match jobs.get_mut(id) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    pub fn count(&self, status: JobStatus) -> usize {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.values().filter(|j| j.status == status).count()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes finished jobs older than the retention period
    pub fn evict_expired(&self) -> usize {
        self.evict_finished_before(Utc::now())
    }

    /// Removes jobs that finished more than the retention period before `now`
    pub fn evict_finished_before(&self, now: DateTime<Utc>) -> usize {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let before = jobs.len();
        jobs.retain(|_, job| match job.finished_at {
            Some(finished) if job.status.is_finished() => now
                .signed_duration_since(finished)
                .to_std()
                .map_or(true, |age| age < self.retention),
            _ => true,
        });
        let evicted = before - jobs.len();
        if evicted > 0 {
            debug!("Evicted {} expired jobs", evicted);
        }
        evicted
    }
}
