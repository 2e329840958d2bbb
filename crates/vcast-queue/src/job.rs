//! Job payloads and the per-job state machine.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vcast_models::{BaseTextData, JobId, JobState, Segment};

use crate::error::{QueueError, QueueResult};
use crate::retry::RetryPolicy;

/// Job to render one video from an audio file and its segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderVideoJob {
    /// Source audio on the shared disk
    pub audio_path: PathBuf,
    /// Content fingerprint of the inputs
    pub fingerprint: String,
    /// Titles drawn on every frame
    pub base_text: BaseTextData,
    /// Segments in output order
    pub segments: Vec<Segment>,
}

impl RenderVideoJob {
    pub fn new(
        audio_path: impl Into<PathBuf>,
        fingerprint: impl Into<String>,
        base_text: BaseTextData,
        segments: Vec<Segment>,
    ) -> Self {
        Self {
            audio_path: audio_path.into(),
            fingerprint: fingerprint.into(),
            base_text,
            segments,
        }
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("render:{}", self.fingerprint)
    }

    /// Check the payload is complete enough to run.
    pub fn validate(&self) -> Result<(), String> {
        if self.audio_path.as_os_str().is_empty() {
            return Err("audio path is empty".to_string());
        }
        if self.fingerprint.is_empty() {
            return Err("fingerprint is empty".to_string());
        }
        if self.segments.is_empty() {
            return Err("no segments".to_string());
        }
        Ok(())
    }
}

/// Failure reason recorded for an attempt whose worker went silent.
pub const STALLED_REASON: &str = "Worker stopped responding; attempt abandoned";

/// A job as stored by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub payload: RenderVideoJob,
    pub state: JobState,
    /// Percent complete of the current attempt
    pub progress: u8,
    /// Video URL once completed
    pub result: Option<String>,
    /// Message of the most recent failure
    pub failure_reason: Option<String>,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When a backed-off job becomes claimable again
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(id: JobId, payload: RenderVideoJob, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id,
            payload,
            state: JobState::Waiting,
            progress: 0,
            result: None,
            failure_reason: None,
            attempts_made: 0,
            max_attempts,
            created_at: now,
            updated_at: now,
            next_attempt_at: None,
        }
    }

    fn require(&self, expected: JobState, action: &'static str) -> QueueResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(QueueError::invalid_transition(&self.id, self.state, action))
        }
    }

    /// `waiting -> active`, starting a new attempt.
    pub fn claim(&mut self) -> QueueResult<()> {
        self.require(JobState::Waiting, "claim")?;
        self.state = JobState::Active;
        self.attempts_made += 1;
        self.progress = 0;
        self.next_attempt_at = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Check the current attempt can still report liveness.
    pub fn require_active(&self) -> QueueResult<()> {
        self.require(JobState::Active, "heartbeat")
    }

    /// Raise progress. Lower values are ignored; returns whether it changed.
    pub fn set_progress(&mut self, percent: u8) -> QueueResult<bool> {
        self.require(JobState::Active, "update progress of")?;
        let percent = percent.min(100);
        if percent <= self.progress {
            return Ok(false);
        }
        self.progress = percent;
        self.updated_at = Utc::now();
        Ok(true)
    }

    /// `active -> completed`.
    pub fn complete(&mut self, result: String) -> QueueResult<()> {
        self.require(JobState::Active, "complete")?;
        self.state = JobState::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.failure_reason = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Returns the backoff delay when the job goes back to `waiting`, or
    /// `None` when the attempt budget is spent and the job is `failed`.
    pub fn fail(&mut self, reason: String, policy: &RetryPolicy) -> QueueResult<Option<Duration>> {
        self.require(JobState::Active, "fail")?;
        let now = Utc::now();
        self.failure_reason = Some(reason);
        self.updated_at = now;

        if self.attempts_made < self.max_attempts {
            let delay = policy.delay_after(self.attempts_made);
            self.state = JobState::Waiting;
            self.progress = 0;
            self.next_attempt_at = Some(now + chrono::Duration::milliseconds(delay.as_millis() as i64));
            Ok(Some(delay))
        } else {
            self.state = JobState::Failed;
            self.next_attempt_at = None;
            Ok(None)
        }
    }
}

/// Number of jobs per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueCounts {
    pub fn add(&mut self, state: JobState) {
        match state {
            JobState::Waiting => self.waiting += 1,
            JobState::Active => self.active += 1,
            JobState::Completed => self.completed += 1,
            JobState::Failed => self.failed += 1,
        }
    }
}
