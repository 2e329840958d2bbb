//! Progress reporting for the active attempt.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use vcast_models::JobId;
use vcast_queue::JobQueue;

/// Reported once every segment clip is built, before concatenation.
pub const CONCAT_PROGRESS: u8 = 95;
/// Reported after the video is cached.
pub const DONE_PROGRESS: u8 = 100;

/// Share of the bar covered by segment work.
const SEGMENT_SHARE: usize = 90;

/// Progress after finishing segment `index` (0-based) of `total`.
pub fn segment_progress(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((index + 1).min(total) * SEGMENT_SHARE / total) as u8
}

/// Receives progress percentages for one attempt.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, percent: u8);
}

/// Writes progress to the queue record.
pub struct QueueProgress {
    queue: Arc<dyn JobQueue>,
    job_id: JobId,
}

impl QueueProgress {
    pub fn new(queue: Arc<dyn JobQueue>, job_id: JobId) -> Self {
        Self { queue, job_id }
    }
}

#[async_trait]
impl ProgressSink for QueueProgress {
    async fn report(&self, percent: u8) {
        // A lost progress update does not fail the job.
        if let Err(e) = self.queue.update_progress(&self.job_id, percent).await {
            warn!(job_id = %self.job_id, "Failed to update progress to {}: {}", percent, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_progress_is_monotonic_and_capped() {
        let values: Vec<u8> = (0..7).map(|i| segment_progress(i, 7)).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*values.last().unwrap(), 90);
        assert_eq!(segment_progress(0, 3), 30);
        assert_eq!(segment_progress(0, 7), 12);
    }

    #[test]
    fn test_segment_progress_stays_below_concat() {
        for total in 1..20 {
            for index in 0..total {
                assert!(segment_progress(index, total) < CONCAT_PROGRESS);
            }
        }
    }
}
