//! Master-election lock (spec §4.H): a named distributed lock backed by
//! Redis, acquired with `SET NX PX` and refreshed in place via a
//! check-then-extend Lua script so only the current holder can renew it.
//! New territory relative to the teacher (`consensus.rs` elects a
//! multi-location quorum over SQLite, not a single master over Redis) --
//! grounded in the `redis` crate's own idiomatic `SET`/`GET`/eval pattern
//! for this exact problem.

use redis::AsyncCommands;

use crate::error::{CoreError, CoreResult};

/// Atomically extend the TTL only if the stored value still matches ours;
/// lets a node distinguish "I'm still master, refresh" from "someone else
/// took over while I was slow."
const REFRESH_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

pub struct DistributedLock {
    client: redis::Client,
    key: String,
    lock_id: String,
    ttl_ms: usize,
}

impl DistributedLock {
    pub fn new(redis_url: &str, key: impl Into<String>, ttl_ms: usize) -> CoreResult<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| CoreError::Lock(e.to_string()))?;
        Ok(DistributedLock { client, key: key.into(), lock_id: uuid::Uuid::new_v4().to_string(), ttl_ms })
    }

    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    /// Try to become (or stay) master. Returns `true` if this node holds
    /// the lock after the call.
    pub async fn try_acquire_or_refresh(&self) -> CoreResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(|e| CoreError::Lock(e.to_string()))?;

        let refreshed: i64 = redis::Script::new(REFRESH_SCRIPT)
            .key(&self.key)
            .arg(&self.lock_id)
            .arg(self.ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CoreError::Lock(e.to_string()))?;
        if refreshed == 1 {
            return Ok(true);
        }

        // Not holding it (or key absent) -- try a fresh NX acquire.
        let acquired: bool = conn
            .set_nx::<_, _, bool>(&self.key, &self.lock_id)
            .await
            .map_err(|e| CoreError::Lock(e.to_string()))?;
        if acquired {
            let _: () = conn.pexpire(&self.key, self.ttl_ms as i64).await.map_err(|e| CoreError::Lock(e.to_string()))?;
            return Ok(true);
        }
        Ok(false)
    }

    pub async fn release(&self) -> CoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(|e| CoreError::Lock(e.to_string()))?;
        let _: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.lock_id)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CoreError::Lock(e.to_string()))?;
        Ok(())
    }
}
