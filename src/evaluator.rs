//! Component E: Health Evaluator (spec §4.E).
//!
//! Refines a raw `Classification` against the monitor's recent history to
//! damp flapping: an escalation from `degraded` to `down` only commits once
//! two consecutive raw classifications agree on `alertThreshold >= 2`
//! monitors. Grounded in the teacher's `resolve_transition`/confirmation
//! counter pattern in `checker.rs`, generalized into its own stage rather
//! than inlined in the persistence path.

use crate::models::{Classification, Confidence, Monitor, Status};

#[derive(Debug, Clone)]
pub struct EvaluatedResult {
    pub status: Status,
    pub confidence: Confidence,
    pub prevented_flapping: bool,
    pub needs_immediate_verification: bool,
    /// What to write back to `monitor.pending_severity` for next cycle.
    pub next_pending_severity: Option<Status>,
}

/// `recent_checks` is the last N=10 committed check statuses, oldest
/// first; only the tail is consulted here but the Check Runner loads the
/// whole window so future refinements (e.g. oscillation detection) have
/// it available.
pub fn evaluate(classification: &Classification, monitor: &Monitor, recent_checks: &[Status]) -> EvaluatedResult {
    let previous = recent_checks.last().copied().unwrap_or(monitor.current_status);
    let raw_status = classification.status;

    // The only escalation gated by hysteresis: degraded -> down. Every
    // other transition (up -> anything, down -> anything, degraded -> up)
    // commits immediately; those already reflect a real observation and
    // delaying them would hide genuine recoveries or slow degradation.
    if previous == Status::Degraded && raw_status == Status::Down && monitor.alert_threshold >= 2 {
        let agrees_with_pending = monitor.pending_severity == Some(Status::Down);
        if agrees_with_pending {
            return EvaluatedResult {
                status: Status::Down,
                confidence: classification.confidence,
                prevented_flapping: false,
                needs_immediate_verification: true,
                next_pending_severity: None,
            };
        }
        return EvaluatedResult {
            status: Status::Degraded,
            confidence: Confidence::LOW,
            prevented_flapping: true,
            needs_immediate_verification: true,
            next_pending_severity: Some(Status::Down),
        };
    }

    EvaluatedResult {
        status: raw_status,
        confidence: classification.confidence,
        prevented_flapping: false,
        needs_immediate_verification: matches!(raw_status, Status::Down | Status::Degraded),
        next_pending_severity: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Protocol;

    fn monitor_with(current_status: Status, alert_threshold: u32, pending_severity: Option<Status>) -> Monitor {
        Monitor {
            id: "m1".into(),
            owner: "o1".into(),
            target: "example.com".into(),
            protocol: Protocol::Http,
            port: None,
            interval_minutes: 1,
            timeout_ms: 5000,
            degraded_threshold_ms: 2000,
            ssl_expiry_threshold_days: 14,
            allow_unauthorized: false,
            strict_mode: false,
            active: true,
            alert_threshold,
            total_checks: 10,
            successful_checks: 8,
            consecutive_failures: 0,
            consecutive_degraded: 1,
            consecutive_slow_count: 0,
            last_checked: None,
            last_response_time: None,
            current_status,
            uptime_percentage: 80.0,
            last_24h_uptime: 80.0,
            pending_severity,
        }
    }

    fn classification(status: Status) -> Classification {
        Classification { status, confidence: Confidence::HIGH, error_type: None, reason: "test".into(), severity: if status == Status::Down { 1.0 } else { 0.5 } }
    }

    #[test]
    fn first_down_after_degraded_is_held_as_pending() {
        let monitor = monitor_with(Status::Degraded, 2, None);
        let result = evaluate(&classification(Status::Down), &monitor, &[Status::Degraded]);
        assert_eq!(result.status, Status::Degraded);
        assert!(result.prevented_flapping);
        assert_eq!(result.next_pending_severity, Some(Status::Down));
    }

    #[test]
    fn second_consecutive_down_after_degraded_commits() {
        let monitor = monitor_with(Status::Degraded, 2, Some(Status::Down));
        let result = evaluate(&classification(Status::Down), &monitor, &[Status::Degraded]);
        assert_eq!(result.status, Status::Down);
        assert!(!result.prevented_flapping);
        assert_eq!(result.next_pending_severity, None);
    }

    #[test]
    fn alert_threshold_one_commits_immediately() {
        let monitor = monitor_with(Status::Degraded, 1, None);
        let result = evaluate(&classification(Status::Down), &monitor, &[Status::Degraded]);
        assert_eq!(result.status, Status::Down);
        assert!(!result.prevented_flapping);
    }

    #[test]
    fn recovery_to_up_is_never_delayed() {
        let monitor = monitor_with(Status::Down, 2, Some(Status::Down));
        let result = evaluate(&classification(Status::Up), &monitor, &[Status::Down]);
        assert_eq!(result.status, Status::Up);
        assert!(!result.needs_immediate_verification);
    }

    #[test]
    fn down_or_degraded_always_requests_immediate_verification() {
        let monitor = monitor_with(Status::Up, 2, None);
        let down = evaluate(&classification(Status::Down), &monitor, &[Status::Up]);
        assert!(down.needs_immediate_verification);
        let degraded = evaluate(&classification(Status::Degraded), &monitor, &[Status::Up]);
        assert!(degraded.needs_immediate_verification);
    }
}
