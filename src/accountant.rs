//! Component J: Uptime Accountant (spec §4.J).
//!
//! Incrementally maintains lifetime and 24h uptime percentages. Lifetime
//! uptime is a pure function of the counters the Check Runner already
//! increments; the 24h figure needs a window query against the store, so
//! it's split into a pure `percentage` helper (unit-testable) and an
//! `update_24h` that the runner calls with counts already read from `db`.
//! Failure here is logged, not propagated -- an uptime percentage miss
//! never should take a monitor down.

use tracing::warn;

use crate::db::Db;
use crate::error::CoreResult;

pub fn lifetime_percentage(successful_checks: u64, total_checks: u64) -> f64 {
    if total_checks == 0 {
        return 100.0;
    }
    (successful_checks as f64 / total_checks as f64) * 100.0
}

pub fn window_percentage(up_or_degraded: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (up_or_degraded as f64 / total as f64) * 100.0
}

/// Recompute and persist `last24hUptime` for one monitor. Best-effort: any
/// failure is logged and swallowed rather than bubbled into the Check
/// Runner's critical path. Synchronous like the rest of `Db` -- rusqlite
/// has no async story and the teacher never reaches for `spawn_blocking`
/// around it, so neither do we.
pub fn update_24h_uptime(db: &Db, monitor_id: &str) {
    match recompute(db, monitor_id) {
        Ok(pct) => {
            if let Err(e) = db.set_monitor_24h_uptime(monitor_id, pct) {
                warn!(monitor_id, error = %e, "failed to persist 24h uptime");
            }
        }
        Err(e) => warn!(monitor_id, error = %e, "failed to compute 24h uptime"),
    }
}

fn recompute(db: &Db, monitor_id: &str) -> CoreResult<f64> {
    let (up_or_degraded, total) = db.count_recent_checks_24h(monitor_id)?;
    Ok(window_percentage(up_or_degraded, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifetime_percentage_handles_zero_total() {
        assert_eq!(lifetime_percentage(0, 0), 100.0);
    }

    #[test]
    fn lifetime_percentage_computes_ratio() {
        assert_eq!(lifetime_percentage(9, 10), 90.0);
    }

    #[test]
    fn window_percentage_counts_degraded_as_up() {
        assert_eq!(window_percentage(8, 10), 80.0);
        assert_eq!(window_percentage(10, 10), 100.0);
    }
}
