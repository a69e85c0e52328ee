//! Component F: Check Runner (spec §4.F).
//!
//! The single place that strings every other component together for one
//! monitor cycle: dispatch the right protocol probe, classify, run the
//! Health Evaluator, atomically persist the Monitor + Check, fold the
//! result through the Uptime Accountant and Incident Reducer, and emit
//! events. Grounded in the teacher's `checker.rs::process_check_result`,
//! which is the same "single place heartbeats, incident lifecycle, status
//! transitions and notification dispatch happen regardless of check type"
//! shape, generalized from heartbeat/webhook terms to Check/Incident/Event
//! terms.
//!
//! Per spec §9, a Check is written for every cycle even when something
//! outside the probe's own error handling goes wrong -- `run` never
//! propagates a bare error out to the Scheduler; worst case it persists a
//! DOWN/UNKNOWN_ERROR Check and returns, so the caller's rescheduling
//! (the Scheduler's job, not this one's) always has something to act on.

use tracing::warn;

use crate::accountant;
use crate::classifier;
use crate::db::Db;
use crate::emitter::{self, Emitter};
use crate::error::ErrorType;
use crate::evaluator;
use crate::models::{Check, Incident, IncidentStatus, Monitor, Observation, Protocol, SslInfo, Status};
use crate::probes;
use crate::reducer::{self, IncidentAction};

const RECENT_WINDOW: u32 = 10;

/// Run one check cycle for `monitor_id`. Loads the monitor fresh from the
/// store so concurrent cycles (immediate + scheduled) always act on the
/// latest counters.
pub async fn run(db: &Db, emitter: &Emitter, monitor_id: &str) {
    let monitor = match db.get_monitor(monitor_id) {
        Ok(Some(m)) => m,
        Ok(None) => {
            warn!(monitor_id, "check runner invoked for a monitor that no longer exists");
            return;
        }
        Err(e) => {
            warn!(monitor_id, error = %e, "failed to load monitor for check");
            return;
        }
    };

    if !monitor.active {
        return;
    }

    let mut observation = dispatch_probe(&monitor).await;
    let mut classification = classifier::classify(monitor.protocol, &observation, monitor.degraded_threshold_ms, 10, 0);

    let recent = db.recent_check_statuses(&monitor.id, RECENT_WINDOW).unwrap_or_default();
    let mut evaluated = evaluator::evaluate(&classification, &monitor, &recent);

    if evaluated.needs_immediate_verification {
        // One-shot re-probe: a down/degraded tentative result gets a single
        // immediate second look before anything is written, and that
        // second look's result is what actually gets persisted.
        observation = dispatch_probe(&monitor).await;
        classification = classifier::classify(monitor.protocol, &observation, monitor.degraded_threshold_ms, 10, 0);
        evaluated = evaluator::evaluate(&classification, &monitor, &recent);
    }

    let previous_status = monitor.current_status;
    let mut updated = monitor.clone();
    apply_counters(&mut updated, evaluated.status);
    updated.last_checked = Some(chrono::Utc::now());
    updated.last_response_time = Some(observation.response_time_ms);
    updated.current_status = evaluated.status;
    updated.pending_severity = evaluated.next_pending_severity;
    updated.uptime_percentage = accountant::lifetime_percentage(updated.successful_checks, updated.total_checks);

    let check = Check {
        id: uuid::Uuid::new_v4().to_string(),
        monitor_id: monitor.id.clone(),
        timestamp: chrono::Utc::now(),
        status: evaluated.status,
        response_time_ms: observation.response_time_ms,
        status_code: observation.status_code,
        error_type: classification.error_type,
        error_message: observation.error_message.clone(),
        degradation_reasons: if classification.status == Status::Degraded { vec![classification.reason.clone()] } else { vec![] },
        ssl_info: ssl_info_from_meta(&observation),
    };

    if let Err(e) = db.update_monitor(&updated) {
        warn!(monitor_id, error = %e, "failed to persist monitor update");
    }
    if let Err(e) = db.insert_check(&check) {
        warn!(monitor_id, error = %e, "failed to persist check");
    }

    accountant::update_24h_uptime(db, &monitor.id);

    apply_incident_action(db, emitter, &updated, previous_status, evaluated.status, &classification, &check);

    emitter::emit_check_result(emitter, &monitor, evaluated.status, observation.response_time_ms);
}

/// The SSL probe (and the HTTPS cross-check that reuses it) stashes cert
/// details in `Observation::meta` since the probe contract has no dedicated
/// field for it; every other protocol leaves `meta` null.
fn ssl_info_from_meta(observation: &Observation) -> Option<SslInfo> {
    serde_json::from_value(observation.meta.clone()).ok()
}

async fn dispatch_probe(monitor: &Monitor) -> Observation {
    match monitor.protocol {
        Protocol::Http | Protocol::Https => probes::http::probe(monitor).await,
        Protocol::Tcp => probes::tcp::probe(monitor).await,
        Protocol::Udp => probes::udp::probe(monitor).await,
        Protocol::Dns => probes::dns::probe(monitor).await,
        Protocol::Smtp => probes::smtp::probe(monitor).await,
        Protocol::Ssl => probes::ssl::probe(monitor).await,
        Protocol::Ping => probes::ping::probe(monitor).await,
    }
}

/// Spec §3 invariants: `consecutiveFailures`/`consecutiveDegraded` never
/// both non-zero; both reset to 0 on `up`; `successfulChecks` only
/// increments on `up`/`degraded` (degraded still counts as reachable for
/// the lifetime ratio, mirroring the 24h window's treatment).
fn apply_counters(monitor: &mut Monitor, status: Status) {
    monitor.total_checks += 1;
    match status {
        Status::Up => {
            monitor.successful_checks += 1;
            monitor.consecutive_failures = 0;
            monitor.consecutive_degraded = 0;
        }
        Status::Degraded => {
            monitor.successful_checks += 1;
            monitor.consecutive_failures = 0;
            monitor.consecutive_degraded += 1;
        }
        Status::Down => {
            monitor.consecutive_failures += 1;
            monitor.consecutive_degraded = 0;
        }
        Status::Unknown => {}
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_incident_action(
    db: &Db,
    emitter: &Emitter,
    monitor: &Monitor,
    previous_status: Status,
    new_status: Status,
    classification: &crate::models::Classification,
    check: &Check,
) {
    // "reasons changed" compares against whatever is already on the ongoing
    // incident (if any), not against the status history -- two consecutive
    // DOWN checks with the same status but a different error_type/message
    // (DNS failure today, connection refused tomorrow) still count as a
    // change worth recording on the open incident.
    let reasons_changed = match db.ongoing_incident(&monitor.id) {
        Ok(Some(incident)) => {
            incident.error_type != reducer::incident_error_type(classification.error_type) || incident.error_message != check.error_message
        }
        _ => true,
    };
    let action = reducer::reduce(previous_status, new_status, monitor, classification.severity, reasons_changed);

    match action {
        IncidentAction::None => {}
        IncidentAction::OpenDegraded { severity } | IncidentAction::OpenCritical { severity } => {
            open_incident(db, emitter, monitor, classification, check, severity);
        }
        IncidentAction::CloseOngoing => close_ongoing(db, monitor),
        IncidentAction::CloseDegradedOpenCritical { severity } | IncidentAction::CloseCriticalOpenDegraded { severity } => {
            close_ongoing(db, monitor);
            open_incident(db, emitter, monitor, classification, check, severity);
        }
        IncidentAction::UpdateOngoing => {
            if let Ok(Some(mut incident)) = db.ongoing_incident(&monitor.id) {
                incident.error_type = reducer::incident_error_type(classification.error_type);
                incident.error_message = check.error_message.clone();
                incident.status_code = check.status_code;
                if let Err(e) = db.update_incident(&incident) {
                    warn!(monitor_id = %monitor.id, error = %e, "failed to update ongoing incident");
                }
            }
        }
    }
}

fn open_incident(db: &Db, emitter: &Emitter, monitor: &Monitor, classification: &crate::models::Classification, check: &Check, severity: crate::models::Severity) {
    let incident = Incident {
        id: uuid::Uuid::new_v4().to_string(),
        monitor_id: monitor.id.clone(),
        start_time: check.timestamp,
        end_time: None,
        status: IncidentStatus::Ongoing,
        severity,
        error_type: reducer::incident_error_type(classification.error_type),
        error_message: check.error_message.clone(),
        status_code: check.status_code,
        duration_ms: None,
    };
    if let Err(e) = db.open_incident(&incident) {
        warn!(monitor_id = %monitor.id, error = %e, "failed to open incident");
        return;
    }
    emitter.incident_created(&incident);
}

fn close_ongoing(db: &Db, monitor: &Monitor) {
    match db.ongoing_incident(&monitor.id) {
        Ok(Some(incident)) => {
            let end = chrono::Utc::now();
            let duration_ms = (end - incident.start_time).num_milliseconds();
            if let Err(e) = db.close_incident(&incident.id, end, duration_ms) {
                warn!(monitor_id = %monitor.id, error = %e, "failed to close incident");
            }
        }
        Ok(None) => {}
        Err(e) => warn!(monitor_id = %monitor.id, error = %e, "failed to look up ongoing incident"),
    }
}

/// Build the fallback DOWN/UNKNOWN_ERROR check the spec requires when a
/// cycle fails for a reason no probe could have classified (e.g. the
/// process itself is out of memory). Exposed separately so the Scheduler's
/// sentinel sweep can use the identical fallback when a job never reports
/// back at all.
pub fn fallback_check(monitor_id: &str) -> Check {
    Check {
        id: uuid::Uuid::new_v4().to_string(),
        monitor_id: monitor_id.to_string(),
        timestamp: chrono::Utc::now(),
        status: Status::Down,
        response_time_ms: 0,
        status_code: None,
        error_type: Some(ErrorType::UnknownError),
        error_message: Some("check did not complete".into()),
        degradation_reasons: vec![],
        ssl_info: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Protocol;

    fn base_monitor() -> Monitor {
        Monitor {
            id: "m1".into(),
            owner: "o1".into(),
            target: "example.com".into(),
            protocol: Protocol::Http,
            port: None,
            interval_minutes: 1,
            timeout_ms: 2000,
            degraded_threshold_ms: 2000,
            ssl_expiry_threshold_days: 14,
            allow_unauthorized: false,
            strict_mode: false,
            active: true,
            alert_threshold: 2,
            total_checks: 4,
            successful_checks: 4,
            consecutive_failures: 0,
            consecutive_degraded: 0,
            consecutive_slow_count: 0,
            last_checked: None,
            last_response_time: None,
            current_status: Status::Up,
            uptime_percentage: 100.0,
            last_24h_uptime: 100.0,
            pending_severity: None,
        }
    }

    #[test]
    fn apply_counters_resets_opposite_streak_on_recovery() {
        let mut m = base_monitor();
        m.consecutive_failures = 3;
        apply_counters(&mut m, Status::Up);
        assert_eq!(m.consecutive_failures, 0);
        assert_eq!(m.consecutive_degraded, 0);
        assert_eq!(m.total_checks, 5);
        assert_eq!(m.successful_checks, 5);
    }

    #[test]
    fn apply_counters_tracks_down_streak_without_touching_degraded() {
        let mut m = base_monitor();
        apply_counters(&mut m, Status::Down);
        assert_eq!(m.consecutive_failures, 1);
        assert_eq!(m.consecutive_degraded, 0);
        assert_eq!(m.successful_checks, 4);
    }

    #[test]
    fn fallback_check_is_down_unknown_error() {
        let check = fallback_check("m1");
        assert_eq!(check.status, Status::Down);
        assert_eq!(check.error_type, Some(ErrorType::UnknownError));
    }

    #[tokio::test]
    async fn run_persists_a_check_even_for_an_unreachable_target() {
        let db = Db::open_in_memory().unwrap();
        let emitter = Emitter::new(8);
        let mut monitor = base_monitor();
        monitor.target = "127.0.0.1".into(); // private -> SSRF-blocked, deterministic without network
        db.insert_monitor(&monitor).unwrap();

        run(&db, &emitter, &monitor.id).await;

        let recent = db.recent_check_statuses(&monitor.id, 10).unwrap();
        assert_eq!(recent, vec![Status::Down]);
        let fetched = db.get_monitor(&monitor.id).unwrap().unwrap();
        assert_eq!(fetched.consecutive_failures, 1);
    }
}
