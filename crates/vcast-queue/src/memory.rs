//! In-process queue backend.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vcast_models::{JobId, JobState};

use crate::error::{QueueError, QueueResult};
use crate::job::{JobRecord, QueueCounts, RenderVideoJob, STALLED_REASON};
use crate::queue::JobQueue;
use crate::retry::RetryPolicy;

struct Entry {
    seq: u64,
    record: JobRecord,
    /// Earliest claim time; follows the Tokio clock so paused-time tests work
    ready_at: Instant,
    /// Last claim or heartbeat of the active attempt
    heartbeat: Instant,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    jobs: HashMap<JobId, Entry>,
}

/// Queue kept in memory. Jobs do not survive a restart.
pub struct MemoryJobQueue {
    retry: RetryPolicy,
    inner: Mutex<Inner>,
}

impl MemoryJobQueue {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, payload: RenderVideoJob) -> QueueResult<JobId> {
        let mut inner = self.inner.lock().await;
        inner.next_seq += 1;
        let seq = inner.next_seq;
        let id = JobId::from_sequence(seq);

        debug!(job_id = %id, key = %payload.idempotency_key(), "Enqueued job");
        let record = JobRecord::new(id.clone(), payload, self.retry.max_attempts);
        inner.jobs.insert(
            id.clone(),
            Entry {
                seq,
                record,
                ready_at: Instant::now(),
                heartbeat: Instant::now(),
            },
        );
        Ok(id)
    }

    async fn get_job(&self, id: &JobId) -> QueueResult<Option<JobRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.jobs.get(id).map(|e| e.record.clone()))
    }

    async fn next_job(&self) -> QueueResult<Option<JobRecord>> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        let Some(entry) = inner
            .jobs
            .values_mut()
            .filter(|e| e.record.state == JobState::Waiting && e.ready_at <= now)
            .min_by_key(|e| e.seq)
        else {
            return Ok(None);
        };

        entry.record.claim()?;
        entry.heartbeat = now;
        Ok(Some(entry.record.clone()))
    }

    async fn update_progress(&self, id: &JobId, percent: u8) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::JobNotFound(id.clone()))?;
        entry.record.set_progress(percent)?;
        Ok(())
    }

    async fn complete(&self, id: &JobId, result: String) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::JobNotFound(id.clone()))?;
        entry.record.complete(result)?;
        info!(job_id = %id, "Job completed");
        Ok(())
    }

    async fn fail(&self, id: &JobId, reason: String) -> QueueResult<JobState> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::JobNotFound(id.clone()))?;

        fail_entry(entry, reason, &self.retry)
    }

    async fn heartbeat(&self, id: &JobId) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::JobNotFound(id.clone()))?;
        entry.record.require_active()?;
        entry.heartbeat = Instant::now();
        Ok(())
    }

    async fn recover_stalled(&self, stalled_after: Duration) -> QueueResult<Vec<JobId>> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let mut recovered = Vec::new();

        for entry in inner.jobs.values_mut() {
            if entry.record.state != JobState::Active || now.duration_since(entry.heartbeat) < stalled_after {
                continue;
            }
            warn!(job_id = %entry.record.id, "Active job stopped sending heartbeats");
            fail_entry(entry, STALLED_REASON.to_string(), &self.retry)?;
            recovered.push(entry.record.id.clone());
        }
        Ok(recovered)
    }

    async fn counts(&self) -> QueueResult<QueueCounts> {
        let inner = self.inner.lock().await;
        let mut counts = QueueCounts::default();
        for entry in inner.jobs.values() {
            counts.add(entry.record.state);
        }
        Ok(counts)
    }
}

fn fail_entry(entry: &mut Entry, reason: String, retry: &RetryPolicy) -> QueueResult<JobState> {
    let id = entry.record.id.clone();
    match entry.record.fail(reason, retry)? {
        Some(delay) => {
            entry.ready_at = Instant::now() + delay;
            warn!(
                job_id = %id,
                attempt = entry.record.attempts_made,
                delay_ms = delay.as_millis() as u64,
                "Job attempt failed, retrying"
            );
        }
        None => {
            warn!(job_id = %id, attempts = entry.record.attempts_made, "Job failed");
        }
    }
    Ok(entry.record.state)
}
