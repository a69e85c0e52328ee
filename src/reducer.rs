//! Component G: Incident/Alert Reducer (spec §4.G).
//!
//! A pure state-machine function: `(prev, curr) -> IncidentAction`. The
//! Check Runner applies the action against the store; the reducer itself
//! never touches persistence, so the same (prev, curr, counters) input
//! always produces the same action (idempotence per spec §4.G). Grounded
//! in the teacher's `resolve_transition` table in `checker.rs`, generalized
//! from webhook-payload construction to explicit incident actions.

use crate::error::ErrorType;
use crate::models::{Monitor, Severity, Status};

#[derive(Debug, Clone, PartialEq)]
pub enum IncidentAction {
    None,
    OpenDegraded { severity: Severity },
    OpenCritical { severity: Severity },
    CloseOngoing,
    CloseDegradedOpenCritical { severity: Severity },
    CloseCriticalOpenDegraded { severity: Severity },
    UpdateOngoing,
}

fn severity_for(status: Status, severity_score: f64) -> Severity {
    match status {
        Status::Down => Severity::Critical,
        Status::Degraded if severity_score >= 0.6 => Severity::Warning,
        Status::Degraded => Severity::Minor,
        _ => Severity::Minor,
    }
}

/// Decide the incident action for a `prev -> curr` transition. `reasons_changed`
/// applies only to the degraded -> degraded case (spec: "update incident if
/// reasons changed").
pub fn reduce(prev: Status, curr: Status, monitor: &Monitor, severity_score: f64, reasons_changed: bool) -> IncidentAction {
    match (prev, curr) {
        (Status::Up, Status::Up) => IncidentAction::None,
        (Status::Up, Status::Degraded) => {
            if monitor.consecutive_degraded >= monitor.alert_threshold {
                IncidentAction::OpenDegraded { severity: severity_for(curr, severity_score) }
            } else {
                IncidentAction::None
            }
        }
        (Status::Up, Status::Down) => {
            if monitor.consecutive_failures >= monitor.alert_threshold {
                IncidentAction::OpenCritical { severity: severity_for(curr, severity_score) }
            } else {
                IncidentAction::None
            }
        }
        (Status::Degraded, Status::Up) => IncidentAction::CloseOngoing,
        (Status::Degraded, Status::Degraded) => {
            if reasons_changed {
                IncidentAction::UpdateOngoing
            } else {
                IncidentAction::None
            }
        }
        (Status::Degraded, Status::Down) => IncidentAction::CloseDegradedOpenCritical { severity: severity_for(curr, severity_score) },
        (Status::Down, Status::Up) => IncidentAction::CloseOngoing,
        (Status::Down, Status::Degraded) => IncidentAction::CloseCriticalOpenDegraded { severity: severity_for(curr, severity_score) },
        (Status::Down, Status::Down) => IncidentAction::None,
        (Status::Unknown, curr) if curr != Status::Up => {
            // First-ever classification landing on something other than
            // up: treat like up -> curr so a brand-new monitor can still
            // open an incident once the threshold is met.
            reduce(Status::Up, curr, monitor, severity_score, reasons_changed)
        }
        _ => IncidentAction::None,
    }
}

/// Pick the `errorType` an opened/updated incident should carry, mirroring
/// whatever the triggering classification reported.
pub fn incident_error_type(classification_error: Option<ErrorType>) -> ErrorType {
    classification_error.unwrap_or(ErrorType::UnknownError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Protocol;

    fn monitor_with(alert_threshold: u32, consecutive_failures: u32, consecutive_degraded: u32) -> Monitor {
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
            consecutive_failures,
            consecutive_degraded,
            consecutive_slow_count: 0,
            last_checked: None,
            last_response_time: None,
            current_status: Status::Up,
            uptime_percentage: 80.0,
            last_24h_uptime: 80.0,
            pending_severity: None,
        }
    }

    #[test]
    fn up_to_down_opens_critical_only_at_threshold() {
        let under = monitor_with(3, 2, 0);
        assert_eq!(reduce(Status::Up, Status::Down, &under, 1.0, false), IncidentAction::None);

        let at = monitor_with(3, 3, 0);
        assert_eq!(reduce(Status::Up, Status::Down, &at, 1.0, false), IncidentAction::OpenCritical { severity: Severity::Critical });
    }

    #[test]
    fn degraded_to_up_closes_ongoing() {
        let monitor = monitor_with(2, 0, 0);
        assert_eq!(reduce(Status::Degraded, Status::Up, &monitor, 0.0, false), IncidentAction::CloseOngoing);
    }

    #[test]
    fn degraded_to_degraded_updates_only_on_reason_change() {
        let monitor = monitor_with(2, 0, 3);
        assert_eq!(reduce(Status::Degraded, Status::Degraded, &monitor, 0.5, false), IncidentAction::None);
        assert_eq!(reduce(Status::Degraded, Status::Degraded, &monitor, 0.5, true), IncidentAction::UpdateOngoing);
    }

    #[test]
    fn degraded_to_down_closes_and_reopens_as_critical() {
        let monitor = monitor_with(2, 2, 0);
        assert_eq!(
            reduce(Status::Degraded, Status::Down, &monitor, 1.0, false),
            IncidentAction::CloseDegradedOpenCritical { severity: Severity::Critical }
        );
    }

    #[test]
    fn down_to_degraded_closes_critical_opens_degraded() {
        let monitor = monitor_with(2, 0, 1);
        assert_eq!(
            reduce(Status::Down, Status::Degraded, &monitor, 0.7, false),
            IncidentAction::CloseCriticalOpenDegraded { severity: Severity::Warning }
        );
    }

    #[test]
    fn same_state_is_a_no_op() {
        let monitor = monitor_with(2, 1, 0);
        assert_eq!(reduce(Status::Up, Status::Up, &monitor, 0.0, false), IncidentAction::None);
        assert_eq!(reduce(Status::Down, Status::Down, &monitor, 1.0, false), IncidentAction::None);
    }
}
