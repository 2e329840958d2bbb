//! Job identifiers and queue states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the queue assigns to a job.
///
/// Ids come from a monotonically increasing counter, so they are
/// distinct for the lifetime of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Build an id from a queue sequence number.
    pub fn from_sequence(seq: u64) -> Self {
        Self(seq.to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job state in the queue.
///
/// `Waiting -> Active -> Completed`, or back to `Waiting` for a retry
/// until the attempt budget is spent and the job ends `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting in the queue (possibly backing off before a retry)
    #[default]
    Waiting,
    /// Job is being processed
    Active,
    /// Job completed successfully
    Completed,
    /// Job failed after its last attempt
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Waiting.is_terminal());
        assert!(!JobState::Active.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobState::Active).unwrap(), "\"active\"");
    }
}
