use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::jobs::{Job, JobId};

/// In-memory registry of every job started since the server came up.
///
/// One lock guards the map. Each job guards its own status, and the two
/// locks are never held at the same time.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Arc<Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the job, replacing any entry with the same ID.
    pub async fn store(&self, job: Arc<Job>) {
        self.jobs.write().await.insert(job.id(), job);
    }

    /// Get a job by ID
    pub async fn get(&self, id: &JobId) -> Option<Arc<Job>> {
        self.jobs.read().await.get(id).cloned()
    }

    /// All jobs, in no particular order
    pub async fn all_jobs(&self) -> Vec<Arc<Job>> {
        self.jobs.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
