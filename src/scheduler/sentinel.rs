//! Scheduler sentinel (spec §4.H "Sentinel"): a safety net the master
//! runs every 5 minutes to catch monitors whose reschedule chain broke
//! somewhere -- a crashed worker, a missed retry, a redis blip. New
//! territory relative to the teacher (no scheduler exists in
//! `checker.rs`'s fixed-interval loop to fall out of sync in the first
//! place); grounded in the recursive-reschedule design this module's
//! sibling `mod.rs` implements.

use tracing::warn;

use crate::db::Db;
use crate::models::Monitor;

use super::queue::{self, JobKind, JobQueue};

/// `buffer = max(120s, interval)`; a monitor that has never been checked
/// uses a strict 120s buffer regardless of its configured interval.
fn buffer_ms(monitor: &Monitor) -> i64 {
    if monitor.last_checked.is_none() {
        return 120_000;
    }
    (monitor.interval_minutes as i64 * 60_000).max(120_000)
}

/// Pure predicate: has this monitor gone quiet long enough that the
/// sentinel should force a fresh check?
pub fn is_overdue(monitor: &Monitor, now: chrono::DateTime<chrono::Utc>) -> bool {
    let interval = monitor.interval();
    match monitor.last_checked {
        None => true,
        Some(last) => {
            let deadline = last + interval + chrono::Duration::milliseconds(buffer_ms(monitor));
            now >= deadline
        }
    }
}

/// One sweep: reissue an immediate check for every overdue active monitor.
/// `removeMonitor` (spec) is approximated here by clearing any stale
/// entries for the monitor before re-enqueuing, since a sentinel hit means
/// whatever was scheduled for it didn't run.
pub async fn sweep(db: &Db, queue: &dyn JobQueue) {
    let monitors = match db.list_active_monitors() {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "sentinel sweep failed to list active monitors");
            return;
        }
    };

    let now = chrono::Utc::now();
    for monitor in monitors {
        if !is_overdue(&monitor, now) {
            continue;
        }
        if let Err(e) = queue.remove_for_monitor(&monitor.id).await {
            warn!(monitor_id = %monitor.id, error = %e, "sentinel failed to clear stale jobs");
            continue;
        }
        let job = queue::job(&monitor.id, JobKind::Immediate, 0);
        if let Err(e) = queue.enqueue(job).await {
            warn!(monitor_id = %monitor.id, error = %e, "sentinel failed to re-enqueue overdue monitor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Protocol, Status};

    fn monitor_with(last_checked: Option<chrono::DateTime<chrono::Utc>>, interval_minutes: u32) -> Monitor {
        Monitor {
            id: "m1".into(),
            owner: "o1".into(),
            target: "example.com".into(),
            protocol: Protocol::Http,
            port: None,
            interval_minutes,
            timeout_ms: 5000,
            degraded_threshold_ms: 2000,
            ssl_expiry_threshold_days: 14,
            allow_unauthorized: false,
            strict_mode: false,
            active: true,
            alert_threshold: 2,
            total_checks: 0,
            successful_checks: 0,
            consecutive_failures: 0,
            consecutive_degraded: 0,
            consecutive_slow_count: 0,
            last_checked,
            last_response_time: None,
            current_status: Status::Up,
            uptime_percentage: 100.0,
            last_24h_uptime: 100.0,
            pending_severity: None,
        }
    }

    #[test]
    fn never_checked_monitor_is_always_overdue() {
        let monitor = monitor_with(None, 5);
        assert!(is_overdue(&monitor, chrono::Utc::now()));
    }

    #[test]
    fn fresh_check_within_interval_plus_buffer_is_not_overdue() {
        let now = chrono::Utc::now();
        let monitor = monitor_with(Some(now - chrono::Duration::minutes(1)), 5);
        assert!(!is_overdue(&monitor, now));
    }

    #[test]
    fn check_older_than_interval_plus_buffer_is_overdue() {
        let now = chrono::Utc::now();
        // interval 1m, buffer max(120s, 60s) = 120s -> deadline at 3 minutes
        let monitor = monitor_with(Some(now - chrono::Duration::minutes(4)), 1);
        assert!(is_overdue(&monitor, now));
    }
}
