//! Job executor.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Serialize;
use tokio::sync::{broadcast, watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn, Instrument};
use vcast_models::{JobId, JobState};
use vcast_queue::{JobQueue, JobRecord};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::pipeline::{InputDisposal, RenderPipeline};
use crate::progress::QueueProgress;

/// Terminal outcome of a job, published once per job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Completed { job_id: JobId, video_url: String },
    Failed { job_id: JobId, reason: String, attempts: u32 },
}

impl JobEvent {
    pub fn job_id(&self) -> &JobId {
        match self {
            JobEvent::Completed { job_id, .. } | JobEvent::Failed { job_id, .. } => job_id,
        }
    }
}

/// State shared with every spawned job task.
struct JobContext {
    queue: Arc<dyn JobQueue>,
    pipeline: Arc<RenderPipeline>,
    limiter: DefaultDirectRateLimiter,
    events: broadcast::Sender<JobEvent>,
    heartbeat_interval: Duration,
}

/// Pulls jobs from the queue and runs them on a bounded pool.
pub struct JobExecutor {
    config: WorkerConfig,
    ctx: Arc<JobContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn JobQueue>,
        pipeline: Arc<RenderPipeline>,
    ) -> WorkerResult<Self> {
        if config.max_concurrent_jobs == 0 {
            return Err(WorkerError::config_error("WORKER_MAX_JOBS must be at least 1"));
        }
        if config.heartbeat_interval.is_zero() || config.heartbeat_interval >= config.stalled_after {
            return Err(WorkerError::config_error(
                "WORKER_HEARTBEAT_SECS must be non-zero and below WORKER_STALLED_SECS",
            ));
        }
        if config.recovery_interval.is_zero() {
            return Err(WorkerError::config_error("WORKER_RECOVERY_SECS must be at least 1"));
        }
        let quota = job_start_quota(config.rate_limit_max, config.rate_limit_window)?;

        let (shutdown, _) = watch::channel(false);
        let (events, _) = broadcast::channel(256);

        Ok(Self {
            job_semaphore: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            ctx: Arc::new(JobContext {
                queue,
                pipeline,
                limiter: RateLimiter::direct(quota),
                events,
                heartbeat_interval: config.heartbeat_interval,
            }),
            config,
            shutdown,
        })
    }

    /// Receive terminal job events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.ctx.events.subscribe()
    }

    /// Signal shutdown. In-flight jobs are allowed to finish.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Poll the queue until shutdown, then drain in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor with {} max concurrent jobs, {} starts per {:?}",
            self.config.max_concurrent_jobs, self.config.rate_limit_max, self.config.rate_limit_window
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        // Stalled jobs go back to the queue and are picked up by the loop below.
        let recovery = tokio::spawn(recover_stalled_jobs(
            Arc::clone(&self.ctx.queue),
            self.config.recovery_interval,
            self.config.stalled_after,
            self.shutdown.subscribe(),
        ));

        loop {
            // Wait for a free slot before claiming, so a claimed job never waits on the pool.
            let permit = tokio::select! {
                _ = stop_requested(&mut shutdown_rx) => break,
                permit = self.job_semaphore.clone().acquire_owned() => permit
                    .map_err(|_| WorkerError::config_error("Job semaphore closed"))?,
            };

            let idle = match self.ctx.queue.next_job().await {
                Ok(Some(record)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(Self::execute_job(ctx, record, permit));
                    false
                }
                Ok(None) => true,
                Err(e) => {
                    error!("Error claiming job: {}", e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = stop_requested(&mut shutdown_rx) => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        let _ = recovery.await;

        info!("Shutdown signal received, waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            error!("Timed out waiting for in-flight jobs");
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Run one claimed attempt and report the outcome to the queue.
    async fn execute_job(ctx: Arc<JobContext>, record: JobRecord, permit: OwnedSemaphorePermit) {
        let _permit = permit;
        ctx.limiter.until_ready().await;

        let logger = JobLogger::new(&record.id, record.attempts_made);
        let span = logger.create_span();

        async move {
            logger.log_start(&format!(
                "{} segments, attempt {}/{}",
                record.payload.segments.len(),
                record.attempts_made,
                record.max_attempts
            ));

            let disposal = if record.attempts_made >= record.max_attempts {
                InputDisposal::Always
            } else {
                InputDisposal::OnSuccess
            };
            let progress = QueueProgress::new(Arc::clone(&ctx.queue), record.id.clone());

            let attempt = ctx.pipeline.execute(&record.payload, &progress, disposal);
            let outcome = with_heartbeat(attempt, ctx.queue.as_ref(), &record.id, ctx.heartbeat_interval).await;

            match outcome {
                Ok(video_url) => match ctx.queue.complete(&record.id, video_url.clone()).await {
                    Ok(()) => {
                        logger.log_completion(&video_url);
                        let _ = ctx.events.send(JobEvent::Completed {
                            job_id: record.id.clone(),
                            video_url,
                        });
                    }
                    Err(e) => logger.log_error(&format!("Failed to mark job completed: {}", e)),
                },
                Err(e) => {
                    let reason = e.to_string();
                    logger.log_warning(&reason);
                    match ctx.queue.fail(&record.id, reason.clone()).await {
                        Ok(JobState::Failed) => {
                            logger.log_error(&format!("Giving up after {} attempts: {}", record.attempts_made, reason));
                            let _ = ctx.events.send(JobEvent::Failed {
                                job_id: record.id.clone(),
                                reason,
                                attempts: record.attempts_made,
                            });
                        }
                        Ok(state) => debug!(job_id = %record.id, "Job moved to {}", state),
                        Err(e) => logger.log_error(&format!("Failed to record failure: {}", e)),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        let all = self.config.max_concurrent_jobs as u32;
        let _ = self.job_semaphore.acquire_many(all).await;
    }
}

/// Drive `work` to completion while telling the queue the attempt is alive.
async fn with_heartbeat<F: Future>(work: F, queue: &dyn JobQueue, id: &JobId, every: Duration) -> F::Output {
    tokio::pin!(work);
    let mut beat = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    beat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            output = &mut work => return output,
            _ = beat.tick() => {
                if let Err(e) = queue.heartbeat(id).await {
                    warn!(job_id = %id, "Heartbeat failed: {}", e);
                }
            }
        }
    }
}

/// Periodically hand stalled attempts back to the queue until shutdown.
async fn recover_stalled_jobs(
    queue: Arc<dyn JobQueue>,
    every: Duration,
    stalled_after: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop_requested(&mut shutdown_rx) => break,
            _ = interval.tick() => match queue.recover_stalled(stalled_after).await {
                Ok(ids) if !ids.is_empty() => info!("Recovered {} stalled jobs", ids.len()),
                Ok(_) => {}
                Err(e) => warn!("Failed to recover stalled jobs: {}", e),
            },
        }
    }
}

/// Resolves once shutdown has been signalled.
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

fn job_start_quota(max: u32, window: Duration) -> WorkerResult<Quota> {
    let burst = NonZeroU32::new(max)
        .ok_or_else(|| WorkerError::config_error("WORKER_RATE_LIMIT_MAX must be at least 1"))?;
    let period = window / burst.get();
    Quota::with_period(period)
        .map(|q| q.allow_burst(burst))
        .ok_or_else(|| WorkerError::config_error("Rate limit window must be non-zero"))
}
