//! Redis queue backend.
//!
//! Keys, all under the configured prefix:
//! - `{prefix}:id` counter for job ids
//! - `{prefix}:job:{id}` job record as JSON
//! - `{prefix}:wait` list of ids ready to claim, oldest first
//! - `{prefix}:delayed` sorted set of backed-off ids scored by ready time (ms)
//! - `{prefix}:claimed` sorted set of ids taken off the wait list whose
//!   attempt has not been recorded yet, scored by pop time (ms)
//! - `{prefix}:heartbeats` sorted set of active ids scored by last heartbeat (ms)
//! - `{prefix}:state:{state}` set of ids per state, for counts
//!
//! Every transition that touches more than one key runs as a MULTI
//! pipeline or a Lua script, so a crashed process never leaves an id
//! outside all of the structures above.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Pipeline, Script};
use tracing::{debug, info, warn};
use vcast_models::{JobId, JobState};

use crate::error::{QueueError, QueueResult};
use crate::job::{JobRecord, QueueCounts, RenderVideoJob, STALLED_REASON};
use crate::queue::{JobQueue, QueueConfig};
use crate::retry::RetryPolicy;

/// Pop the oldest waiting id and mark it as claimed.
const CLAIM_SCRIPT: &str = r#"
local id = redis.call('LPOP', KEYS[1])
if id then
    redis.call('ZADD', KEYS[2], ARGV[1], id)
end
return id
"#;

/// Move every id scored at or below ARGV[1] from the sorted set in KEYS[1]
/// onto the wait list. ARGV[2] picks the end of the list.
const MOVE_DUE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
for _, id in ipairs(due) do
    redis.call('ZREM', KEYS[1], id)
    if ARGV[2] == 'front' then
        redis.call('LPUSH', KEYS[2], id)
    else
        redis.call('RPUSH', KEYS[2], id)
    end
end
return due
"#;

/// Fail a silent attempt unless its worker heartbeated or finished meanwhile.
const FAIL_SILENT_SCRIPT: &str = r#"
local score = redis.call('ZSCORE', KEYS[1], ARGV[1])
if not score or tonumber(score) > tonumber(ARGV[2]) then
    return 0
end
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('SET', KEYS[2], ARGV[3])
redis.call('SREM', KEYS[3], ARGV[1])
redis.call('SADD', KEYS[4], ARGV[1])
if ARGV[4] ~= '' then
    redis.call('ZADD', KEYS[5], ARGV[4], ARGV[1])
end
return 1
"#;

/// Queue stored in Redis, shared by every process pointing at the same prefix.
pub struct RedisJobQueue {
    conn: MultiplexedConnection,
    prefix: String,
    retry: RetryPolicy,
}

impl RedisJobQueue {
    /// Connect to Redis.
    pub async fn connect(config: &QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(format!("{}: {}", config.redis_url, e)))?;
        Ok(Self {
            conn,
            prefix: config.prefix.clone(),
            retry: config.retry,
        })
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }

    fn job_key(&self, id: &JobId) -> String {
        format!("{}:job:{}", self.prefix, id)
    }

    fn state_key(&self, state: JobState) -> String {
        format!("{}:state:{}", self.prefix, state)
    }

    async fn load(&self, id: &JobId) -> QueueResult<Option<JobRecord>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.job_key(id)).await?;
        raw.map(|r| serde_json::from_str(&r).map_err(QueueError::from))
            .transpose()
    }

    async fn load_existing(&self, id: &JobId) -> QueueResult<JobRecord> {
        self.load(id)
            .await?
            .ok_or_else(|| QueueError::JobNotFound(id.clone()))
    }

    /// Transaction writing the record and moving it between state sets.
    /// Callers append the list and set updates that go with the transition.
    fn save_pipe(&self, record: &JobRecord, previous: Option<JobState>) -> QueueResult<Pipeline> {
        let payload = serde_json::to_string(record)?;
        let mut pipe = redis::pipe();
        pipe.atomic().set(self.job_key(&record.id), payload).ignore();
        if previous != Some(record.state) {
            if let Some(previous) = previous {
                pipe.srem(self.state_key(previous), record.id.as_str()).ignore();
            }
            pipe.sadd(self.state_key(record.state), record.id.as_str()).ignore();
        }
        Ok(pipe)
    }

    /// Move backed-off jobs whose delay has elapsed onto the wait list.
    async fn promote_delayed(&self) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let promoted: Vec<String> = Script::new(MOVE_DUE_SCRIPT)
            .key(self.key("delayed"))
            .key(self.key("wait"))
            .arg(Utc::now().timestamp_millis())
            .arg("back")
            .invoke_async(&mut conn)
            .await?;
        for id in promoted {
            debug!(job_id = %id, "Promoted delayed job");
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, payload: RenderVideoJob) -> QueueResult<JobId> {
        let mut conn = self.conn.clone();
        let seq: u64 = conn.incr(self.key("id"), 1).await?;
        let id = JobId::from_sequence(seq);

        let key = payload.idempotency_key();
        let record = JobRecord::new(id.clone(), payload, self.retry.max_attempts);
        let mut pipe = self.save_pipe(&record, None)?;
        pipe.rpush(self.key("wait"), id.as_str()).ignore();
        pipe.query_async::<()>(&mut conn).await?;

        info!(job_id = %id, key = %key, "Enqueued job");
        Ok(id)
    }

    async fn get_job(&self, id: &JobId) -> QueueResult<Option<JobRecord>> {
        self.load(id).await
    }

    async fn next_job(&self) -> QueueResult<Option<JobRecord>> {
        self.promote_delayed().await?;

        let mut conn = self.conn.clone();
        let claimed = self.key("claimed");
        loop {
            let now = Utc::now().timestamp_millis();
            let popped: Option<String> = Script::new(CLAIM_SCRIPT)
                .key(self.key("wait"))
                .key(&claimed)
                .arg(now)
                .invoke_async(&mut conn)
                .await?;
            let Some(raw_id) = popped else {
                return Ok(None);
            };
            let id = JobId::from(raw_id);

            let mut record = match self.load(&id).await? {
                Some(record) if record.state == JobState::Waiting => record,
                Some(record) => {
                    warn!(job_id = %id, state = %record.state, "Dropping wait list entry for non-waiting job");
                    conn.zrem::<_, _, ()>(&claimed, id.as_str()).await?;
                    continue;
                }
                None => {
                    warn!(job_id = %id, "Dropping wait list entry without a job record");
                    conn.zrem::<_, _, ()>(&claimed, id.as_str()).await?;
                    continue;
                }
            };

            record.claim()?;
            let mut pipe = self.save_pipe(&record, Some(JobState::Waiting))?;
            pipe.zrem(&claimed, id.as_str())
                .ignore()
                .zadd(self.key("heartbeats"), id.as_str(), now)
                .ignore();
            pipe.query_async::<()>(&mut conn).await?;
            return Ok(Some(record));
        }
    }

    async fn update_progress(&self, id: &JobId, percent: u8) -> QueueResult<()> {
        let mut record = self.load_existing(id).await?;
        if record.set_progress(percent)? {
            let mut conn = self.conn.clone();
            self.save_pipe(&record, Some(JobState::Active))?
                .query_async::<()>(&mut conn)
                .await?;
        }
        Ok(())
    }

    async fn complete(&self, id: &JobId, result: String) -> QueueResult<()> {
        let mut record = self.load_existing(id).await?;
        record.complete(result)?;

        let mut conn = self.conn.clone();
        let mut pipe = self.save_pipe(&record, Some(JobState::Active))?;
        pipe.zrem(self.key("heartbeats"), id.as_str()).ignore();
        pipe.query_async::<()>(&mut conn).await?;

        info!(job_id = %id, "Job completed");
        Ok(())
    }

    async fn fail(&self, id: &JobId, reason: String) -> QueueResult<JobState> {
        let mut record = self.load_existing(id).await?;
        let retry = record.fail(reason, &self.retry)?;

        let mut conn = self.conn.clone();
        let mut pipe = self.save_pipe(&record, Some(JobState::Active))?;
        pipe.zrem(self.key("heartbeats"), id.as_str()).ignore();
        if let Some(delay) = retry {
            let ready_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;
            pipe.zadd(self.key("delayed"), id.as_str(), ready_at).ignore();
        }
        pipe.query_async::<()>(&mut conn).await?;

        match retry {
            Some(delay) => warn!(
                job_id = %id,
                attempt = record.attempts_made,
                delay_ms = delay.as_millis() as u64,
                "Job attempt failed, retrying"
            ),
            None => warn!(job_id = %id, attempts = record.attempts_made, "Job failed"),
        }
        Ok(record.state)
    }

    async fn heartbeat(&self, id: &JobId) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let changed: i64 = redis::cmd("ZADD")
            .arg(self.key("heartbeats"))
            .arg("XX")
            .arg("CH")
            .arg(Utc::now().timestamp_millis())
            .arg(id.as_str())
            .query_async(&mut conn)
            .await?;
        if changed == 0 {
            // Same millisecond as the last beat, or the attempt is over
            self.load_existing(id).await?.require_active()?;
        }
        Ok(())
    }

    async fn recover_stalled(&self, stalled_after: Duration) -> QueueResult<Vec<JobId>> {
        let mut conn = self.conn.clone();
        let cutoff = Utc::now().timestamp_millis() - stalled_after.as_millis() as i64;
        let mut recovered = Vec::new();

        let returned: Vec<String> = Script::new(MOVE_DUE_SCRIPT)
            .key(self.key("claimed"))
            .key(self.key("wait"))
            .arg(cutoff)
            .arg("front")
            .invoke_async(&mut conn)
            .await?;
        for raw_id in returned {
            warn!(job_id = %raw_id, "Returning job that was taken but never started");
            recovered.push(JobId::from(raw_id));
        }

        let heartbeats = self.key("heartbeats");
        let silent: Vec<String> = conn.zrangebyscore(&heartbeats, "-inf", cutoff).await?;
        for raw_id in silent {
            let id = JobId::from(raw_id);
            let Some(mut record) = self.load(&id).await? else {
                conn.zrem::<_, _, ()>(&heartbeats, id.as_str()).await?;
                continue;
            };
            if record.state != JobState::Active {
                continue;
            }

            let retry = record.fail(STALLED_REASON.to_string(), &self.retry)?;
            let ready_at = retry
                .map(|delay| (Utc::now().timestamp_millis() + delay.as_millis() as i64).to_string())
                .unwrap_or_default();
            let failed: i64 = Script::new(FAIL_SILENT_SCRIPT)
                .key(&heartbeats)
                .key(self.job_key(&id))
                .key(self.state_key(JobState::Active))
                .key(self.state_key(record.state))
                .key(self.key("delayed"))
                .arg(id.as_str())
                .arg(cutoff)
                .arg(serde_json::to_string(&record)?)
                .arg(ready_at)
                .invoke_async(&mut conn)
                .await?;

            if failed == 1 {
                warn!(
                    job_id = %id,
                    attempt = record.attempts_made,
                    state = %record.state,
                    "Active job stopped sending heartbeats"
                );
                recovered.push(id);
            }
        }
        Ok(recovered)
    }

    async fn counts(&self) -> QueueResult<QueueCounts> {
        let mut conn = self.conn.clone();
        Ok(QueueCounts {
            waiting: conn.scard(self.state_key(JobState::Waiting)).await?,
            active: conn.scard(self.state_key(JobState::Active)).await?,
            completed: conn.scard(self.state_key(JobState::Completed)).await?,
            failed: conn.scard(self.state_key(JobState::Failed)).await?,
        })
    }
}
