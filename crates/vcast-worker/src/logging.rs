//! Structured job logging.

use tracing::{error, info, warn, Span};
use vcast_models::JobId;

/// Logs job lifecycle lines with the job id and attempt attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    attempt: u32,
}

impl JobLogger {
    pub fn new(job_id: &JobId, attempt: u32) -> Self {
        Self {
            job_id: job_id.to_string(),
            attempt,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, attempt = self.attempt, "Job started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, attempt = self.attempt, "Job progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, attempt = self.attempt, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, attempt = self.attempt, "Job error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, attempt = self.attempt, "Job completed: {}", message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Span that every log line of the attempt runs inside.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, attempt = self.attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let logger = JobLogger::new(&JobId::from_sequence(7), 2);
        assert_eq!(logger.job_id(), "7");
        assert_eq!(logger.attempt(), 2);
    }
}
