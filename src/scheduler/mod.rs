//! Component H: Scheduler (spec §4.H), the hardest subsystem. A single
//! elected master enqueues work; every process (including the master)
//! is also a worker draining the queue. New territory relative to the
//! teacher, which runs one `tokio::time::interval` per process with no
//! election or queue at all (`checker.rs::start_background_checker`) --
//! grounded in that same "one tick, one pass over monitors" shape for
//! `startup_sync`, generalized into a queue-backed, multi-process design
//! per spec.

pub mod lock;
pub mod queue;
pub mod sentinel;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::db::Db;
use crate::emitter::Emitter;
use crate::runner;

use lock::DistributedLock;
use queue::{Job, JobKind, JobQueue};

const MASTER_LOCK_TTL_MS: usize = 30_000;
const MASTER_REFRESH_INTERVAL: Duration = Duration::from_millis(MASTER_LOCK_TTL_MS as u64 / 2);
const SENTINEL_INTERVAL: Duration = Duration::from_secs(5 * 60);
const RESCHEDULE_ATTEMPTS: u32 = 3;

pub struct Scheduler {
    db: Arc<Db>,
    emitter: Arc<Emitter>,
    queue: Arc<dyn JobQueue>,
    lock: DistributedLock,
    worker_concurrency: usize,
    heartbeat_retention_days: u32,
    last_sweep: AsyncMutex<Option<Instant>>,
    is_master: AsyncMutex<bool>,
}

impl Scheduler {
    pub fn new(
        db: Arc<Db>,
        emitter: Arc<Emitter>,
        queue: Arc<dyn JobQueue>,
        redis_url: &str,
        heartbeat_retention_days: u32,
    ) -> crate::error::CoreResult<Self> {
        let lock = DistributedLock::new(redis_url, "pulseguard:scheduler:master", MASTER_LOCK_TTL_MS)?;
        let cpu = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
        let worker_concurrency = (cpu * 2).clamp(2, 20);
        Ok(Scheduler {
            db,
            emitter,
            queue,
            lock,
            worker_concurrency,
            heartbeat_retention_days,
            last_sweep: AsyncMutex::new(None),
            is_master: AsyncMutex::new(false),
        })
    }

    pub fn worker_concurrency(&self) -> usize {
        self.worker_concurrency
    }

    /// Request an out-of-band check (user-triggered, or a freshly created
    /// monitor). Debounced: a prior `immediate-*` for the same monitor
    /// already waiting/active is left alone.
    pub async fn enqueue_immediate(&self, monitor_id: &str) -> crate::error::CoreResult<()> {
        let id = queue::immediate_job_id(monitor_id);
        if self.queue.is_pending_or_active(&id).await? {
            return Ok(());
        }
        self.queue.enqueue(queue::job(monitor_id, JobKind::Immediate, 0)).await
    }

    /// Deleting or deactivating a monitor drops its queue entries; an
    /// already in-flight probe is left to drain and discards its own
    /// result on completion (see `process_job`).
    pub async fn cancel(&self, monitor_id: &str) -> crate::error::CoreResult<()> {
        self.queue.remove_for_monitor(monitor_id).await
    }

    /// Master-election loop: attempt to acquire/refresh the lock every
    /// `TTL/2`. Runs `startup_sync` exactly once per tenure, on the tick
    /// a node first becomes master.
    pub async fn run_master_loop(self: Arc<Self>) {
        loop {
            match self.lock.try_acquire_or_refresh().await {
                Ok(true) => {
                    let mut was_master = self.is_master.lock().await;
                    if !*was_master {
                        info!("acquired master lock, running startup sync");
                        self.startup_sync().await;
                        *was_master = true;
                    }
                    drop(was_master);
                    self.maybe_sweep().await;
                }
                Ok(false) => {
                    *self.is_master.lock().await = false;
                }
                Err(e) => warn!(error = %e, "master election tick failed"),
            }
            tokio::time::sleep(MASTER_REFRESH_INTERVAL).await;
        }
    }

    async fn maybe_sweep(&self) {
        let mut last = self.last_sweep.lock().await;
        let due = match *last {
            None => true,
            Some(t) => t.elapsed() >= SENTINEL_INTERVAL,
        };
        if !due {
            return;
        }
        *last = Some(Instant::now());
        drop(last);
        sentinel::sweep(&self.db, self.queue.as_ref()).await;
        self.prune_old_checks();
    }

    /// Retention sweep: same cadence as the sentinel, one `DELETE` per
    /// active monitor. Grounded in the teacher's `checker.rs::prune_heartbeats`,
    /// which runs on its own independent timer alongside the check loop.
    fn prune_old_checks(&self) {
        let monitors = match self.db.list_active_monitors() {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "retention sweep failed to list active monitors");
                return;
            }
        };
        for monitor in monitors {
            match self.db.prune_checks(&monitor.id, self.heartbeat_retention_days) {
                Ok(n) if n > 0 => info!(monitor_id = %monitor.id, pruned = n, "pruned expired checks"),
                Ok(_) => {}
                Err(e) => warn!(monitor_id = %monitor.id, error = %e, "failed to prune checks"),
            }
        }
    }

    /// Master-only, once per tenure: purge stale non-active jobs, then
    /// enqueue every active monitor either immediately (never checked or
    /// overdue) or delayed to resume its interval.
    async fn startup_sync(&self) {
        if let Err(e) = self.queue.purge_all_non_active().await {
            warn!(error = %e, "startup sync failed to purge stale jobs");
            return;
        }
        let monitors = match self.db.list_active_monitors() {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "startup sync failed to list active monitors");
                return;
            }
        };
        let now = chrono::Utc::now();
        for monitor in monitors {
            let delay_ms = match monitor.last_checked {
                None => 0,
                Some(last) => {
                    let elapsed = now - last;
                    let interval = monitor.interval();
                    if elapsed >= interval { 0 } else { (interval - elapsed).num_milliseconds() }
                }
            };
            let kind = if delay_ms == 0 { JobKind::Immediate } else { JobKind::Scheduled };
            if let Err(e) = self.queue.enqueue(queue::job(&monitor.id, kind, delay_ms)).await {
                warn!(monitor_id = %monitor.id, error = %e, "startup sync failed to enqueue monitor");
            }
        }
    }

    /// Spawn `worker_concurrency` draining tasks. Every process calls this
    /// regardless of master status -- master-ness only governs who
    /// enqueues `scheduled-*`/sentinel work, not who can run a probe.
    pub fn spawn_workers(self: &Arc<Self>) {
        for _ in 0..self.worker_concurrency {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.worker_loop().await });
        }
    }

    async fn worker_loop(&self) {
        loop {
            match self.queue.dequeue_ready().await {
                Ok(Some(job)) => self.process_job(job).await,
                Ok(None) => tokio::time::sleep(Duration::from_millis(250)).await,
                Err(e) => {
                    warn!(error = %e, "queue dequeue failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn process_job(&self, job: Job) {
        let monitor = match self.db.get_monitor(&job.monitor_id) {
            Ok(Some(m)) => m,
            Ok(None) => {
                // Deleted since enqueue: discard, no reschedule.
                let _ = self.queue.complete(&job.id).await;
                return;
            }
            Err(e) => {
                warn!(monitor_id = %job.monitor_id, error = %e, "failed to load monitor for queued job");
                let _ = self.queue.complete(&job.id).await;
                return;
            }
        };

        if !monitor.active {
            let _ = self.queue.complete(&job.id).await;
            return;
        }

        // Run the probe/classify chain on its own task so a panic anywhere
        // in that chain can't take `worker_loop` down with it -- `complete`
        // and the reschedule below must fire either way, the "finally"
        // spec requires.
        let db = Arc::clone(&self.db);
        let emitter = Arc::clone(&self.emitter);
        let monitor_id = job.monitor_id.clone();
        if let Err(e) = tokio::spawn(async move { runner::run(&db, &emitter, &monitor_id).await }).await {
            warn!(monitor_id = %job.monitor_id, error = %e, "check runner task panicked; rescheduling anyway");
        }
        let _ = self.queue.complete(&job.id).await;

        // Re-fetch: the check itself may have deactivated/deleted nothing,
        // but a concurrent deleteMonitor could have landed mid-probe.
        let still_active = matches!(self.db.get_monitor(&job.monitor_id), Ok(Some(m)) if m.active);
        if still_active {
            let delay_ms = (monitor.interval_minutes as i64) * 60_000;
            self.reschedule_with_retry(&job.monitor_id, delay_ms).await;
        }
    }

    /// The reschedule that must never silently vanish: 3 attempts, linear
    /// backoff. If all three fail the sentinel sweep is the remaining
    /// backstop (spec §4.H).
    async fn reschedule_with_retry(&self, monitor_id: &str, delay_ms: i64) {
        let job = queue::job(monitor_id, JobKind::Scheduled, delay_ms);
        for attempt in 1..=RESCHEDULE_ATTEMPTS {
            match self.queue.enqueue(job.clone()).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(monitor_id, error = %e, attempt, "reschedule attempt failed");
                    if attempt < RESCHEDULE_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                    }
                }
            }
        }
        warn!(monitor_id, "reschedule exhausted all retries; relying on sentinel sweep");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Monitor, Protocol, Status};
    use queue::InMemoryQueue;

    fn sample_monitor(id: &str, active: bool) -> Monitor {
        Monitor {
            id: id.into(),
            owner: "o1".into(),
            target: "example.com".into(),
            protocol: Protocol::Http,
            port: None,
            interval_minutes: 5,
            timeout_ms: 5000,
            degraded_threshold_ms: 2000,
            ssl_expiry_threshold_days: 14,
            allow_unauthorized: false,
            strict_mode: false,
            active,
            alert_threshold: 2,
            total_checks: 0,
            successful_checks: 0,
            consecutive_failures: 0,
            consecutive_degraded: 0,
            consecutive_slow_count: 0,
            last_checked: None,
            last_response_time: None,
            current_status: Status::Unknown,
            uptime_percentage: 100.0,
            last_24h_uptime: 100.0,
            pending_severity: None,
        }
    }

    #[tokio::test]
    async fn cancelled_monitor_job_is_discarded_without_crashing() {
        let queue = Arc::new(InMemoryQueue::new());
        let db = Arc::new(Db::open_in_memory().unwrap());
        let emitter = Arc::new(Emitter::new(4));
        // Skip the redis-backed lock entirely for this unit test by poking
        // process_job directly -- master election is exercised separately.
        let monitor = sample_monitor("gone", false);
        db.insert_monitor(&monitor).unwrap();
        db.delete_monitor("gone").unwrap();

        let job = queue::job("gone", JobKind::Immediate, 0);
        queue.enqueue(job.clone()).await.unwrap();
        queue.dequeue_ready().await.unwrap();

        // Build a Scheduler without touching redis by constructing it
        // through `new` with an address that is never dialed in this test
        // (`DistributedLock::new` only parses the URL, it doesn't connect).
        let scheduler = Scheduler::new(Arc::clone(&db), Arc::clone(&emitter), queue.clone(), "redis://127.0.0.1:1", 90).unwrap();
        scheduler.process_job(job).await;
        assert!(!queue.is_pending_or_active("immediate-gone").await.unwrap());
    }

    #[tokio::test]
    async fn startup_sync_enqueues_never_checked_monitor_as_immediate() {
        let queue = Arc::new(InMemoryQueue::new());
        let db = Arc::new(Db::open_in_memory().unwrap());
        let emitter = Arc::new(Emitter::new(4));
        db.insert_monitor(&sample_monitor("m1", true)).unwrap();

        let scheduler = Scheduler::new(db, emitter, queue.clone(), "redis://127.0.0.1:1", 90).unwrap();
        scheduler.startup_sync().await;

        assert!(queue.is_pending_or_active("immediate-m1").await.unwrap());
    }
}
