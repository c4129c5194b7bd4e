//! Registry of running external processes, keyed by export job
//!
//! Every spawned process gets its own [`ProcessHandle`]. Handles of one job
//! share a parent token, so terminating a job also stops processes that the
//! job registers afterwards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::model::JobId;

/// Termination handle for one external process
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    id: u64,
    job_id: JobId,
    token: CancellationToken,
}

impl ProcessHandle {
    /// Handle that belongs to no registry, for one-off probes
    pub fn detached(job_id: JobId) -> Self {
        Self {
            id: 0,
            job_id,
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn is_terminated(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once termination is requested
    pub async fn terminated(&self) {
        self.token.cancelled().await
    }

    /// Request termination of this process only
    pub fn terminate(&self) {
        self.token.cancel();
    }
}

#[derive(Debug, Default)]
struct JobEntry {
    token: CancellationToken,
    processes: Vec<u64>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u64,
    jobs: HashMap<JobId, JobEntry>,
}

/// Shared registry handed to every worker
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hand out a dedicated handle for a process about to be spawned
    pub fn register(&self, job_id: JobId) -> ProcessHandle {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        let entry = inner.jobs.entry(job_id).or_default();
        entry.processes.push(id);
        let token = entry.token.child_token();
        debug!(job_id = %job_id, process_id = id, "Process registered");
        ProcessHandle { id, job_id, token }
    }

    /// Forget a process that has exited
    pub fn release(&self, handle: &ProcessHandle) {
        let mut inner = self.lock();
        if let Some(entry) = inner.jobs.get_mut(&handle.job_id) {
            entry.processes.retain(|id| *id != handle.id);
        }
    }

    /// Terminate every current and future process of a job; returns how many
    /// processes were running
    pub fn terminate_job(&self, job_id: JobId) -> usize {
        let mut inner = self.lock();
        let entry = inner.jobs.entry(job_id).or_default();
        entry.token.cancel();
        let running = entry.processes.len();
        debug!(job_id = %job_id, running, "Job processes terminated");
        running
    }

    /// True once `terminate_job` was called for this job
    pub fn is_terminated(&self, job_id: JobId) -> bool {
        self.lock()
            .jobs
            .get(&job_id)
            .map_or(false, |entry| entry.token.is_cancelled())
    }

    /// Drop all bookkeeping for a finished job
    pub fn forget_job(&self, job_id: JobId) {
        self.lock().jobs.remove(&job_id);
    }

    /// Number of processes currently registered
    pub fn active_count(&self) -> usize {
        self.lock().jobs.values().map(|e| e.processes.len()).sum()
    }

    /// Number of processes currently registered for one job
    pub fn job_process_count(&self, job_id: JobId) -> usize {
        self.lock()
            .jobs
            .get(&job_id)
            .map_or(0, |entry| entry.processes.len())
    }
}
