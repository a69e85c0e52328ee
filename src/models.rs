//! Data model (spec §3): Monitor, Check, Incident, Config, plus the
//! cross-component value types (Observation, Classification) that flow
//! between the probes, classifier, evaluator, and runner.

use serde::{Deserialize, Serialize};

use crate::error::ErrorType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    Https,
    Tcp,
    Udp,
    Dns,
    Smtp,
    Ssl,
    #[serde(rename = "PING")]
    Ping,
}

impl Protocol {
    /// Protocol default port, used when the monitor doesn't specify one.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Protocol::Http => Some(80),
            Protocol::Https | Protocol::Ssl => Some(443),
            Protocol::Smtp => Some(25),
            Protocol::Dns => Some(53),
            Protocol::Tcp | Protocol::Udp | Protocol::Ping => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Up,
    Degraded,
    Down,
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Up => "up",
            Status::Degraded => "degraded",
            Status::Down => "down",
            Status::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Status::Up),
            "degraded" => Ok(Status::Degraded),
            "down" => Ok(Status::Down),
            "unknown" => Ok(Status::Unknown),
            _ => Err(()),
        }
    }
}

/// Monitor (entity). See spec §3 for invariants:
/// `successfulChecks <= totalChecks`; `consecutiveFailures` and
/// `consecutiveDegraded` never both non-zero; when `currentStatus=up` both
/// are 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: String,
    pub owner: String,
    pub target: String,
    pub protocol: Protocol,
    pub port: Option<u16>,
    pub interval_minutes: u32,
    pub timeout_ms: u32,
    pub degraded_threshold_ms: u32,
    pub ssl_expiry_threshold_days: i64,
    pub allow_unauthorized: bool,
    pub strict_mode: bool,
    pub active: bool,
    pub alert_threshold: u32,

    pub total_checks: u64,
    pub successful_checks: u64,
    pub consecutive_failures: u32,
    pub consecutive_degraded: u32,
    pub consecutive_slow_count: u32,

    pub last_checked: Option<chrono::DateTime<chrono::Utc>>,
    pub last_response_time: Option<u32>,
    pub current_status: Status,
    pub uptime_percentage: f64,
    pub last_24h_uptime: f64,

    /// Most recent raw classification not yet confirmed by hysteresis.
    /// Cleared once a transition commits; lets the evaluator require
    /// agreement across two cycles before escalating severity.
    pub pending_severity: Option<Status>,
}

impl Monitor {
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or_else(|| self.protocol.default_port())
    }

    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.interval_minutes as i64)
    }

    /// Checks the two invariants from spec §3 that the Check Runner must
    /// maintain on every atomic update.
    #[cfg(test)]
    pub fn check_invariants(&self) {
        assert!(self.successful_checks <= self.total_checks);
        assert!(!(self.consecutive_failures > 0 && self.consecutive_degraded > 0));
        if self.current_status == Status::Up {
            assert_eq!(self.consecutive_failures, 0);
            assert_eq!(self.consecutive_degraded, 0);
        }
    }
}

/// Check (observation). Immutable after write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Check {
    pub id: String,
    pub monitor_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub status: Status,
    pub response_time_ms: u32,
    pub status_code: Option<u16>,
    pub error_type: Option<ErrorType>,
    pub error_message: Option<String>,
    pub degradation_reasons: Vec<String>,
    pub ssl_info: Option<SslInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SslInfo {
    pub valid_from: chrono::DateTime<chrono::Utc>,
    pub valid_to: chrono::DateTime<chrono::Utc>,
    pub days_remaining: i64,
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Ongoing,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Warning,
    Critical,
}

/// Incident (aggregation). At most one `ongoing` incident per monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub monitor_id: String,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub status: IncidentStatus,
    pub severity: Severity,
    pub error_type: ErrorType,
    pub error_message: Option<String>,
    pub status_code: Option<u16>,
    pub duration_ms: Option<i64>,
}

/// Config (singleton, process-wide settings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub maintenance_mode: bool,
    pub global_alert: Option<String>,
    pub allow_signups: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig { maintenance_mode: false, global_alert: None, allow_signups: true }
    }
}

/// Raw output of a single protocol probe (spec §4.C contract). Never
/// carries a raw I/O error — every expected failure mode is already folded
/// into `error_type`/`error_message` by the probe itself.
#[derive(Debug, Clone)]
pub struct Observation {
    pub is_up: bool,
    pub response_time_ms: u32,
    pub status_code: Option<u16>,
    pub error_type: Option<ErrorType>,
    pub error_message: Option<String>,
    /// Probe-suggested health state; the Classifier is the source of truth
    /// and may override this (spec §4.D: "probes never set `status`
    /// directly" refers to the final Check status — probes may still
    /// propose one via this field for probes without a bespoke classifier
    /// table, e.g. TCP/UDP/DNS/PING).
    pub health_state: Status,
    /// Packet loss percentage (0-100), PING-only. `None` for every other
    /// protocol.
    pub packet_loss_percent: Option<f64>,
    pub meta: serde_json::Value,
}

impl Observation {
    pub fn new(is_up: bool, response_time_ms: u32, health_state: Status) -> Self {
        Observation {
            is_up,
            response_time_ms,
            status_code: None,
            error_type: None,
            error_message: None,
            health_state,
            packet_loss_percent: None,
            meta: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confidence(pub u8); // stored as permille-ish tenths: 95, 80, 60, 40

impl Confidence {
    pub const HIGH: Confidence = Confidence(95);
    pub const MEDIUM: Confidence = Confidence(80);
    pub const LOW: Confidence = Confidence(60);
    pub const VERY_LOW: Confidence = Confidence(40);

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

/// Pure classifier output (spec §4.D).
#[derive(Debug, Clone)]
pub struct Classification {
    pub status: Status,
    pub confidence: Confidence,
    pub error_type: Option<ErrorType>,
    pub reason: String,
    pub severity: f64,
}
