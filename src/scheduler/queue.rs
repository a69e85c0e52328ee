//! Job queue (spec §4.H): deterministic job ids, `{waiting, delayed,
//! active}` states, and the debounce rule for `immediate-*` jobs. A trait
//! plus two implementations -- `RedisQueue` for the running service,
//! `InMemoryQueue` as the test double the Scheduler's own unit tests and
//! `runner`/`sentinel` tests drive instead of a live Redis. New territory
//! relative to the teacher (no job queue exists in `checker.rs`'s
//! `tokio::time::interval` loop), grounded in the `redis` crate's sorted
//! set + hash idiom for a delayed-job queue.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    Scheduled,
    Immediate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub monitor_id: String,
    pub kind: JobKind,
    /// Epoch milliseconds at which the job becomes eligible to run.
    pub ready_at_ms: i64,
}

pub fn scheduled_job_id(monitor_id: &str) -> String {
    format!("scheduled-{monitor_id}")
}

pub fn immediate_job_id(monitor_id: &str) -> String {
    format!("immediate-{monitor_id}")
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn job(monitor_id: &str, kind: JobKind, delay_ms: i64) -> Job {
    let id = match kind {
        JobKind::Scheduled => scheduled_job_id(monitor_id),
        JobKind::Immediate => immediate_job_id(monitor_id),
    };
    Job { id, monitor_id: monitor_id.to_string(), kind, ready_at_ms: now_ms() + delay_ms }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> CoreResult<()>;
    /// Pop the oldest ready job (`ready_at_ms <= now`), marking it active.
    async fn dequeue_ready(&self) -> CoreResult<Option<Job>>;
    /// True if a job with this id is `waiting`, `delayed`, or `active`.
    async fn is_pending_or_active(&self, job_id: &str) -> CoreResult<bool>;
    /// Caller is done with the job (succeeded or failed); drop the active marker.
    async fn complete(&self, job_id: &str) -> CoreResult<()>;
    /// Remove every non-active job for a monitor (used by `removeMonitor`
    /// and by a cancelled/deleted monitor).
    async fn remove_for_monitor(&self, monitor_id: &str) -> CoreResult<()>;
    /// Purge every non-active job, regardless of monitor (startup sync).
    async fn purge_all_non_active(&self) -> CoreResult<()>;
}

const READY_SET: &str = "pulseguard:scheduler:ready";
const JOBS_HASH: &str = "pulseguard:scheduler:jobs";
const ACTIVE_SET: &str = "pulseguard:scheduler:active";

pub struct RedisQueue {
    client: redis::Client,
}

impl RedisQueue {
    pub fn new(redis_url: &str) -> CoreResult<Self> {
        Ok(RedisQueue { client: redis::Client::open(redis_url).map_err(|e| CoreError::Queue(e.to_string()))? })
    }

    async fn conn(&self) -> CoreResult<redis::aio::MultiplexedConnection> {
        self.client.get_multiplexed_async_connection().await.map_err(|e| CoreError::Queue(e.to_string()))
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job: Job) -> CoreResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&job).map_err(|e| CoreError::Queue(e.to_string()))?;
        let _: () = conn.hset(JOBS_HASH, &job.id, payload).await.map_err(|e| CoreError::Queue(e.to_string()))?;
        let _: () = conn.zadd(READY_SET, &job.id, job.ready_at_ms).await.map_err(|e| CoreError::Queue(e.to_string()))?;
        let _: () = conn.srem(ACTIVE_SET, &job.id).await.map_err(|e| CoreError::Queue(e.to_string()))?;
        Ok(())
    }

    async fn dequeue_ready(&self) -> CoreResult<Option<Job>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> =
            conn.zrangebyscore_limit(READY_SET, i64::MIN, now_ms(), 0, 1).await.map_err(|e| CoreError::Queue(e.to_string()))?;
        let Some(id) = ids.into_iter().next() else { return Ok(None) };
        let _: () = conn.zrem(READY_SET, &id).await.map_err(|e| CoreError::Queue(e.to_string()))?;
        let payload: Option<String> = conn.hget(JOBS_HASH, &id).await.map_err(|e| CoreError::Queue(e.to_string()))?;
        let Some(payload) = payload else { return Ok(None) };
        let _: () = conn.sadd(ACTIVE_SET, &id).await.map_err(|e| CoreError::Queue(e.to_string()))?;
        serde_json::from_str(&payload).map(Some).map_err(|e| CoreError::Queue(e.to_string()))
    }

    async fn is_pending_or_active(&self, job_id: &str) -> CoreResult<bool> {
        let mut conn = self.conn().await?;
        let in_active: bool = conn.sismember(ACTIVE_SET, job_id).await.map_err(|e| CoreError::Queue(e.to_string()))?;
        if in_active {
            return Ok(true);
        }
        let score: Option<f64> = conn.zscore(READY_SET, job_id).await.map_err(|e| CoreError::Queue(e.to_string()))?;
        Ok(score.is_some())
    }

    async fn complete(&self, job_id: &str) -> CoreResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.srem(ACTIVE_SET, job_id).await.map_err(|e| CoreError::Queue(e.to_string()))?;
        let _: () = conn.hdel(JOBS_HASH, job_id).await.map_err(|e| CoreError::Queue(e.to_string()))?;
        Ok(())
    }

    async fn remove_for_monitor(&self, monitor_id: &str) -> CoreResult<()> {
        let mut conn = self.conn().await?;
        for id in [scheduled_job_id(monitor_id), immediate_job_id(monitor_id)] {
            let in_active: bool = conn.sismember(ACTIVE_SET, &id).await.map_err(|e| CoreError::Queue(e.to_string()))?;
            if in_active {
                continue; // active jobs drain naturally, per spec
            }
            let _: () = conn.zrem(READY_SET, &id).await.map_err(|e| CoreError::Queue(e.to_string()))?;
            let _: () = conn.hdel(JOBS_HASH, &id).await.map_err(|e| CoreError::Queue(e.to_string()))?;
        }
        Ok(())
    }

    async fn purge_all_non_active(&self) -> CoreResult<()> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.zrange(READY_SET, 0, -1).await.map_err(|e| CoreError::Queue(e.to_string()))?;
        for id in ids {
            let in_active: bool = conn.sismember(ACTIVE_SET, &id).await.map_err(|e| CoreError::Queue(e.to_string()))?;
            if in_active {
                continue;
            }
            let _: () = conn.zrem(READY_SET, &id).await.map_err(|e| CoreError::Queue(e.to_string()))?;
            let _: () = conn.hdel(JOBS_HASH, &id).await.map_err(|e| CoreError::Queue(e.to_string()))?;
        }
        Ok(())
    }
}

/// In-process test double: identical state semantics, no network.
#[derive(Default)]
pub struct InMemoryQueue {
    state: Mutex<HashMap<String, (Job, bool)>>, // bool = active
}

impl InMemoryQueue {
    pub fn new() -> Self {
        InMemoryQueue::default()
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn enqueue(&self, job: Job) -> CoreResult<()> {
        self.state.lock().unwrap().insert(job.id.clone(), (job, false));
        Ok(())
    }

    async fn dequeue_ready(&self) -> CoreResult<Option<Job>> {
        let mut state = self.state.lock().unwrap();
        let now = now_ms();
        let ready_id = state
            .iter()
            .filter(|(_, (j, active))| !active && j.ready_at_ms <= now)
            .min_by_key(|(_, (j, _))| j.ready_at_ms)
            .map(|(id, _)| id.clone());
        let Some(id) = ready_id else { return Ok(None) };
        let entry = state.get_mut(&id).unwrap();
        entry.1 = true;
        Ok(Some(entry.0.clone()))
    }

    async fn is_pending_or_active(&self, job_id: &str) -> CoreResult<bool> {
        Ok(self.state.lock().unwrap().contains_key(job_id))
    }

    async fn complete(&self, job_id: &str) -> CoreResult<()> {
        self.state.lock().unwrap().remove(job_id);
        Ok(())
    }

    async fn remove_for_monitor(&self, monitor_id: &str) -> CoreResult<()> {
        let mut state = self.state.lock().unwrap();
        for id in [scheduled_job_id(monitor_id), immediate_job_id(monitor_id)] {
            if let Some((_, active)) = state.get(&id) {
                if !*active {
                    state.remove(&id);
                }
            }
        }
        Ok(())
    }

    async fn purge_all_non_active(&self) -> CoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.retain(|_, (_, active)| *active);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_deterministic() {
        assert_eq!(scheduled_job_id("m1"), "scheduled-m1");
        assert_eq!(immediate_job_id("m1"), "immediate-m1");
    }

    #[tokio::test]
    async fn dequeue_only_returns_ready_jobs() {
        let q = InMemoryQueue::new();
        q.enqueue(job("m1", JobKind::Scheduled, 60_000)).await.unwrap();
        assert!(q.dequeue_ready().await.unwrap().is_none());

        q.enqueue(job("m2", JobKind::Immediate, 0)).await.unwrap();
        let popped = q.dequeue_ready().await.unwrap().unwrap();
        assert_eq!(popped.id, "immediate-m2");
    }

    #[tokio::test]
    async fn dequeued_job_is_marked_active_and_still_pending() {
        let q = InMemoryQueue::new();
        q.enqueue(job("m1", JobKind::Immediate, 0)).await.unwrap();
        q.dequeue_ready().await.unwrap();
        assert!(q.is_pending_or_active("immediate-m1").await.unwrap());
        // Won't be popped again while active.
        assert!(q.dequeue_ready().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn complete_clears_the_job_entirely() {
        let q = InMemoryQueue::new();
        q.enqueue(job("m1", JobKind::Immediate, 0)).await.unwrap();
        q.dequeue_ready().await.unwrap();
        q.complete("immediate-m1").await.unwrap();
        assert!(!q.is_pending_or_active("immediate-m1").await.unwrap());
    }

    #[tokio::test]
    async fn remove_for_monitor_leaves_active_jobs_to_drain() {
        let q = InMemoryQueue::new();
        q.enqueue(job("m1", JobKind::Scheduled, 0)).await.unwrap();
        q.dequeue_ready().await.unwrap(); // now active
        q.enqueue(job("m1", JobKind::Immediate, 60_000)).await.unwrap(); // still waiting
        q.remove_for_monitor("m1").await.unwrap();
        assert!(q.is_pending_or_active("scheduled-m1").await.unwrap()); // active, untouched
        assert!(!q.is_pending_or_active("immediate-m1").await.unwrap()); // removed
    }
}
