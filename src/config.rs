//! Process-wide runtime configuration, loaded once from the environment.
//!
//! Mirrors the teacher's `main.rs`/`checker.rs` pattern of reading env vars
//! with `.ok().and_then(|v| v.parse().ok()).unwrap_or(default)`, generalized
//! into a single struct so every subsystem reads from one place.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub database_path: String,
    pub redis_url: String,
    pub worker_concurrency: usize,
    /// Dev-only escape hatch to force this process to act as scheduler
    /// master without acquiring the lock. Only ever honored in debug
    /// builds — spec §9 Open Question: "production behaviour must disable
    /// it."
    pub force_master: bool,
    pub default_timeout_ms: u32,
    pub default_degraded_threshold_ms: u32,
    pub default_ssl_expiry_threshold_days: i64,
    pub heartbeat_retention_days: u32,
    pub sentinel_interval_secs: u64,
    pub lock_ttl_secs: u64,
    pub job_lock_duration_secs: u64,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let worker_concurrency = std::env::var("WORKER_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_worker_concurrency);

        let force_master_requested = std::env::var("FORCE_MASTER")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        RuntimeConfig {
            database_path: std::env::var("DATABASE_PATH").unwrap_or_else(|_| "pulseguard.db".into()),
            redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into()),
            worker_concurrency,
            // Only ever true in a debug build, regardless of the env var.
            force_master: force_master_requested && cfg!(debug_assertions),
            default_timeout_ms: env_u32("DEFAULT_TIMEOUT_MS", 30_000),
            default_degraded_threshold_ms: env_u32("DEFAULT_DEGRADED_THRESHOLD_MS", 2_000),
            default_ssl_expiry_threshold_days: env_u32("DEFAULT_SSL_EXPIRY_THRESHOLD_DAYS", 14) as i64,
            heartbeat_retention_days: env_u32("HEARTBEAT_RETENTION_DAYS", 90),
            sentinel_interval_secs: env_u32("SENTINEL_INTERVAL_SECS", 300) as u64,
            lock_ttl_secs: env_u32("LOCK_TTL_SECS", 30) as u64,
            job_lock_duration_secs: env_u32("JOB_LOCK_DURATION_SECS", 180) as u64,
        }
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn job_lock_duration(&self) -> Duration {
        Duration::from_secs(self.job_lock_duration_secs)
    }

    /// Initialize the ambient logging stack. Verbosity is controlled by
    /// `RUST_LOG` (spec §6); falls back to `info` for this crate, `warn`
    /// elsewhere, matching the corpus convention for services with noisy
    /// dependencies (hyper, reqwest, redis).
    pub fn init_tracing(&self) {
        use tracing_subscriber::{fmt, EnvFilter};
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,pulseguard_core=info"));
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

fn default_worker_concurrency() -> usize {
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
    (cpus * 2).clamp(2, 20)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_concurrency_clamped() {
        let n = default_worker_concurrency();
        assert!(n >= 2 && n <= 20);
    }
}
