//! Component I: Event Emitter (spec §4.I / §6).
//!
//! Broadcasts the fixed event taxonomy (`monitor_update`,
//! `monitor_status_change`, `monitor_down`, `monitor_degraded`,
//! `monitor_unknown`, `incident_created`) to any subscriber. Grounded in
//! the teacher's `sse.rs::EventBroadcaster`: same `broadcast::channel`
//! shape, generalized from a Rocket `EventStream` producer into a plain
//! pub/sub emitter the Check Runner calls directly, with SSE left as one
//! possible consumer of the channel rather than baked into the emitter
//! itself.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{Incident, Monitor, Status};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    MonitorUpdate { monitor_id: String, status: Status, response_time_ms: u32 },
    MonitorStatusChange { monitor_id: String, previous: Status, current: Status },
    MonitorDown { monitor_id: String, error_type: Option<String>, error_message: Option<String> },
    MonitorDegraded { monitor_id: String, error_type: Option<String>, error_message: Option<String> },
    MonitorUnknown { monitor_id: String },
    IncidentCreated { monitor_id: String, incident_id: String, severity: String },
}

pub struct Emitter {
    sender: broadcast::Sender<Event>,
}

impl Emitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Emitter { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    fn send(&self, event: Event) {
        // No subscribers is the common case between UI sessions; not an error.
        let _ = self.sender.send(event);
    }

    /// Always emitted after a committed Check, per spec §4.I.
    pub fn monitor_update(&self, monitor_id: &str, status: Status, response_time_ms: u32) {
        self.send(Event::MonitorUpdate { monitor_id: monitor_id.to_string(), status, response_time_ms });
    }

    /// Emitted only when `status` actually changed from the monitor's prior
    /// committed status.
    pub fn status_change(&self, monitor_id: &str, previous: Status, current: Status) {
        self.send(Event::MonitorStatusChange { monitor_id: monitor_id.to_string(), previous, current });

        match current {
            Status::Down => self.send(Event::MonitorDown {
                monitor_id: monitor_id.to_string(),
                error_type: None,
                error_message: None,
            }),
            Status::Degraded => self.send(Event::MonitorDegraded {
                monitor_id: monitor_id.to_string(),
                error_type: None,
                error_message: None,
            }),
            Status::Unknown => self.send(Event::MonitorUnknown { monitor_id: monitor_id.to_string() }),
            Status::Up => {}
        }
    }

    pub fn incident_created(&self, incident: &Incident) {
        self.send(Event::IncidentCreated {
            monitor_id: incident.monitor_id.clone(),
            incident_id: incident.id.clone(),
            severity: format!("{:?}", incident.severity).to_lowercase(),
        });
    }
}

/// Convenience used by the Check Runner: compares `monitor.current_status`
/// (pre-update) against the freshly evaluated status and emits both the
/// unconditional update and the conditional status-change event.
pub fn emit_check_result(emitter: &Emitter, monitor: &Monitor, new_status: Status, response_time_ms: u32) {
    emitter.monitor_update(&monitor.id, new_status, response_time_ms);
    if monitor.current_status != new_status {
        emitter.status_change(&monitor.id, monitor.current_status, new_status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Protocol;

    fn sample_monitor(status: Status) -> Monitor {
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
            alert_threshold: 2,
            total_checks: 0,
            successful_checks: 0,
            consecutive_failures: 0,
            consecutive_degraded: 0,
            consecutive_slow_count: 0,
            last_checked: None,
            last_response_time: None,
            current_status: status,
            uptime_percentage: 100.0,
            last_24h_uptime: 100.0,
            pending_severity: None,
        }
    }

    #[tokio::test]
    async fn status_change_emits_both_update_and_transition_events() {
        let emitter = Emitter::new(16);
        let mut rx = emitter.subscribe();
        let monitor = sample_monitor(Status::Up);
        emit_check_result(&emitter, &monitor, Status::Down, 500);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, Event::MonitorUpdate { .. }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, Event::MonitorStatusChange { .. }));
        let third = rx.recv().await.unwrap();
        assert!(matches!(third, Event::MonitorDown { .. }));
    }

    #[tokio::test]
    async fn unchanged_status_only_emits_update() {
        let emitter = Emitter::new(16);
        let mut rx = emitter.subscribe();
        let monitor = sample_monitor(Status::Up);
        emit_check_result(&emitter, &monitor, Status::Up, 120);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, Event::MonitorUpdate { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn no_subscribers_does_not_panic() {
        let emitter = Emitter::new(4);
        let monitor = sample_monitor(Status::Up);
        emit_check_result(&emitter, &monitor, Status::Down, 10);
    }
}
