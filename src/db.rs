//! SQLite store (spec §3 data model). Grounded in the teacher's `db.rs`:
//! same `Mutex<Connection>` + WAL pragma shape, same idempotent
//! `ALTER TABLE ... ADD COLUMN` migration style for evolving a table in
//! place rather than versioned migrations. The schema itself is specific
//! to Monitor/Check/Incident/Config -- the teacher's dashboard-oriented
//! tables (status pages, check locations, alert rules/log, auth) have no
//! counterpart here and are dropped.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{CoreError, CoreResult, ErrorType};
use crate::models::{Incident, IncidentStatus, Monitor, Protocol, Severity, ServiceConfig, Status};

pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open(path: &str) -> CoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")?;
        let db = Db { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory sqlite for unit and integration tests; not used by `main`.
    pub fn open_in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Db { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn migrate(&self) -> CoreResult<()> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS monitors (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                target TEXT NOT NULL,
                protocol TEXT NOT NULL,
                port INTEGER,
                interval_minutes INTEGER NOT NULL DEFAULT 5,
                timeout_ms INTEGER NOT NULL DEFAULT 10000,
                degraded_threshold_ms INTEGER NOT NULL DEFAULT 2000,
                ssl_expiry_threshold_days INTEGER NOT NULL DEFAULT 14,
                allow_unauthorized INTEGER NOT NULL DEFAULT 0,
                strict_mode INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                alert_threshold INTEGER NOT NULL DEFAULT 2,
                total_checks INTEGER NOT NULL DEFAULT 0,
                successful_checks INTEGER NOT NULL DEFAULT 0,
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                consecutive_degraded INTEGER NOT NULL DEFAULT 0,
                consecutive_slow_count INTEGER NOT NULL DEFAULT 0,
                last_checked TEXT,
                last_response_time INTEGER,
                current_status TEXT NOT NULL DEFAULT 'unknown',
                uptime_percentage REAL NOT NULL DEFAULT 100.0,
                last_24h_uptime REAL NOT NULL DEFAULT 100.0,
                pending_severity TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_monitors_owner ON monitors(owner);
            CREATE INDEX IF NOT EXISTS idx_monitors_active ON monitors(active);

            CREATE TABLE IF NOT EXISTS checks (
                id TEXT PRIMARY KEY,
                monitor_id TEXT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                timestamp TEXT NOT NULL,
                status TEXT NOT NULL,
                response_time_ms INTEGER NOT NULL,
                status_code INTEGER,
                error_type TEXT,
                error_message TEXT,
                degradation_reasons TEXT NOT NULL DEFAULT '[]',
                ssl_info TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_checks_monitor_ts ON checks(monitor_id, timestamp DESC);

            CREATE TABLE IF NOT EXISTS incidents (
                id TEXT PRIMARY KEY,
                monitor_id TEXT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                start_time TEXT NOT NULL,
                end_time TEXT,
                status TEXT NOT NULL,
                severity TEXT NOT NULL,
                error_type TEXT NOT NULL,
                error_message TEXT,
                status_code INTEGER,
                duration_ms INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_incidents_monitor_status ON incidents(monitor_id, status);

            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        // Evolved in place, teacher-style: cheap no-op once the column exists.
        conn.execute_batch("ALTER TABLE monitors ADD COLUMN pending_severity TEXT;").ok();

        Ok(())
    }

    // ---- monitors ----

    pub fn insert_monitor(&self, m: &Monitor) -> CoreResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO monitors (
                id, owner, target, protocol, port, interval_minutes, timeout_ms,
                degraded_threshold_ms, ssl_expiry_threshold_days, allow_unauthorized,
                strict_mode, active, alert_threshold, total_checks, successful_checks,
                consecutive_failures, consecutive_degraded, consecutive_slow_count,
                last_checked, last_response_time, current_status, uptime_percentage,
                last_24h_uptime, pending_severity
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24)",
            params![
                m.id, m.owner, m.target, protocol_str(m.protocol), m.port, m.interval_minutes, m.timeout_ms,
                m.degraded_threshold_ms, m.ssl_expiry_threshold_days, m.allow_unauthorized,
                m.strict_mode, m.active, m.alert_threshold, m.total_checks as i64, m.successful_checks as i64,
                m.consecutive_failures, m.consecutive_degraded, m.consecutive_slow_count,
                m.last_checked.map(|t| t.to_rfc3339()), m.last_response_time, m.current_status.as_str(),
                m.uptime_percentage, m.last_24h_uptime, m.pending_severity.map(|s| s.as_str()),
            ],
        )?;
        Ok(())
    }

    pub fn get_monitor(&self, id: &str) -> CoreResult<Option<Monitor>> {
        let conn = self.conn();
        conn.query_row("SELECT * FROM monitors WHERE id = ?1", params![id], |row| row_to_monitor(row))
            .optional()
            .map_err(CoreError::from)
    }

    pub fn list_active_monitors(&self) -> CoreResult<Vec<Monitor>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT * FROM monitors WHERE active = 1")?;
        let rows = stmt.query_map([], |row| row_to_monitor(row))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn list_monitors_for_owner(&self, owner: &str) -> CoreResult<Vec<Monitor>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT * FROM monitors WHERE owner = ?1 ORDER BY created_at ASC")?;
        let rows = stmt.query_map(params![owner], |row| row_to_monitor(row))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Atomic write-back of everything the Check Runner may have mutated in
    /// one cycle: counters, status, pending hysteresis state, uptime.
    pub fn update_monitor(&self, m: &Monitor) -> CoreResult<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE monitors SET
                target=?2, protocol=?3, port=?4, interval_minutes=?5, timeout_ms=?6,
                degraded_threshold_ms=?7, ssl_expiry_threshold_days=?8, allow_unauthorized=?9,
                strict_mode=?10, active=?11, alert_threshold=?12, total_checks=?13,
                successful_checks=?14, consecutive_failures=?15, consecutive_degraded=?16,
                consecutive_slow_count=?17, last_checked=?18, last_response_time=?19,
                current_status=?20, uptime_percentage=?21, last_24h_uptime=?22, pending_severity=?23
             WHERE id=?1",
            params![
                m.id, m.target, protocol_str(m.protocol), m.port, m.interval_minutes, m.timeout_ms,
                m.degraded_threshold_ms, m.ssl_expiry_threshold_days, m.allow_unauthorized,
                m.strict_mode, m.active, m.alert_threshold, m.total_checks as i64, m.successful_checks as i64,
                m.consecutive_failures, m.consecutive_degraded, m.consecutive_slow_count,
                m.last_checked.map(|t| t.to_rfc3339()), m.last_response_time, m.current_status.as_str(),
                m.uptime_percentage, m.last_24h_uptime, m.pending_severity.map(|s| s.as_str()),
            ],
        )?;
        Ok(())
    }

    pub fn set_monitor_24h_uptime(&self, monitor_id: &str, pct: f64) -> CoreResult<()> {
        let conn = self.conn();
        conn.execute("UPDATE monitors SET last_24h_uptime = ?2 WHERE id = ?1", params![monitor_id, pct])?;
        Ok(())
    }

    pub fn delete_monitor(&self, id: &str) -> CoreResult<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM monitors WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ---- checks ----

    pub fn insert_check(&self, check: &crate::models::Check) -> CoreResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO checks (id, monitor_id, timestamp, status, response_time_ms, status_code,
                error_type, error_message, degradation_reasons, ssl_info)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                check.id,
                check.monitor_id,
                check.timestamp.to_rfc3339(),
                check.status.as_str(),
                check.response_time_ms,
                check.status_code,
                check.error_type.map(|e| e.as_str()),
                check.error_message,
                serde_json::to_string(&check.degradation_reasons).unwrap_or_else(|_| "[]".into()),
                check.ssl_info.as_ref().and_then(|s| serde_json::to_string(s).ok()),
            ],
        )?;
        Ok(())
    }

    /// Last `limit` committed statuses for a monitor, oldest first.
    pub fn recent_check_statuses(&self, monitor_id: &str, limit: u32) -> CoreResult<Vec<Status>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT status FROM checks WHERE monitor_id = ?1 ORDER BY timestamp DESC LIMIT ?2")?;
        let rows = stmt.query_map(params![monitor_id, limit], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for r in rows {
            if let Ok(s) = r?.parse::<Status>() {
                out.push(s);
            }
        }
        out.reverse();
        Ok(out)
    }

    /// `(up_or_degraded, total)` over the trailing 24 hours, for the Uptime
    /// Accountant's window percentage.
    pub fn count_recent_checks_24h(&self, monitor_id: &str) -> CoreResult<(u64, u64)> {
        let conn = self.conn();
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM checks WHERE monitor_id = ?1 AND timestamp >= datetime('now', '-24 hours')",
            params![monitor_id],
            |r| r.get(0),
        )?;
        let up_or_degraded: i64 = conn.query_row(
            "SELECT COUNT(*) FROM checks WHERE monitor_id = ?1 AND timestamp >= datetime('now', '-24 hours')
                AND status IN ('up', 'degraded')",
            params![monitor_id],
            |r| r.get(0),
        )?;
        Ok((up_or_degraded as u64, total as u64))
    }

    pub fn prune_checks(&self, monitor_id: &str, retention_days: u32) -> CoreResult<usize> {
        let conn = self.conn();
        let n = conn.execute(
            "DELETE FROM checks WHERE monitor_id = ?1 AND timestamp < datetime('now', ?2)",
            params![monitor_id, format!("-{} days", retention_days)],
        )?;
        Ok(n)
    }

    // ---- incidents ----

    pub fn ongoing_incident(&self, monitor_id: &str) -> CoreResult<Option<Incident>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT * FROM incidents WHERE monitor_id = ?1 AND status = 'ongoing' LIMIT 1",
            params![monitor_id],
            row_to_incident,
        )
        .optional()
        .map_err(CoreError::from)
    }

    pub fn open_incident(&self, incident: &Incident) -> CoreResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO incidents (id, monitor_id, start_time, end_time, status, severity,
                error_type, error_message, status_code, duration_ms)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                incident.id,
                incident.monitor_id,
                incident.start_time.to_rfc3339(),
                incident.end_time.map(|t| t.to_rfc3339()),
                incident_status_str(incident.status),
                severity_str(incident.severity),
                incident.error_type.as_str(),
                incident.error_message,
                incident.status_code,
                incident.duration_ms,
            ],
        )?;
        Ok(())
    }

    pub fn update_incident(&self, incident: &Incident) -> CoreResult<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE incidents SET end_time=?2, status=?3, severity=?4, error_type=?5,
                error_message=?6, status_code=?7, duration_ms=?8 WHERE id=?1",
            params![
                incident.id,
                incident.end_time.map(|t| t.to_rfc3339()),
                incident_status_str(incident.status),
                severity_str(incident.severity),
                incident.error_type.as_str(),
                incident.error_message,
                incident.status_code,
                incident.duration_ms,
            ],
        )?;
        Ok(())
    }

    pub fn close_incident(&self, id: &str, end_time: DateTime<Utc>, duration_ms: i64) -> CoreResult<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE incidents SET status='resolved', end_time=?2, duration_ms=?3 WHERE id=?1",
            params![id, end_time.to_rfc3339(), duration_ms],
        )?;
        Ok(())
    }

    // ---- config ----

    pub fn get_config(&self) -> CoreResult<ServiceConfig> {
        let conn = self.conn();
        let mut cfg = ServiceConfig::default();
        let mut stmt = conn.prepare("SELECT key, value FROM config")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for r in rows {
            let (key, value) = r?;
            match key.as_str() {
                "maintenance_mode" => cfg.maintenance_mode = value == "1",
                "global_alert" => cfg.global_alert = if value.is_empty() { None } else { Some(value) },
                "allow_signups" => cfg.allow_signups = value == "1",
                _ => {}
            }
        }
        Ok(cfg)
    }

    pub fn set_config(&self, cfg: &ServiceConfig) -> CoreResult<()> {
        let conn = self.conn();
        let pairs = [
            ("maintenance_mode", if cfg.maintenance_mode { "1" } else { "0" }.to_string()),
            ("global_alert", cfg.global_alert.clone().unwrap_or_default()),
            ("allow_signups", if cfg.allow_signups { "1" } else { "0" }.to_string()),
        ];
        for (k, v) in pairs {
            conn.execute(
                "INSERT INTO config (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![k, v],
            )?;
        }
        Ok(())
    }
}

fn protocol_str(p: Protocol) -> &'static str {
    match p {
        Protocol::Http => "HTTP",
        Protocol::Https => "HTTPS",
        Protocol::Tcp => "TCP",
        Protocol::Udp => "UDP",
        Protocol::Dns => "DNS",
        Protocol::Smtp => "SMTP",
        Protocol::Ssl => "SSL",
        Protocol::Ping => "PING",
    }
}

fn parse_protocol(s: &str) -> Protocol {
    match s {
        "HTTP" => Protocol::Http,
        "HTTPS" => Protocol::Https,
        "TCP" => Protocol::Tcp,
        "UDP" => Protocol::Udp,
        "DNS" => Protocol::Dns,
        "SMTP" => Protocol::Smtp,
        "SSL" => Protocol::Ssl,
        _ => Protocol::Ping,
    }
}

fn incident_status_str(s: IncidentStatus) -> &'static str {
    match s {
        IncidentStatus::Ongoing => "ongoing",
        IncidentStatus::Resolved => "resolved",
    }
}

fn parse_incident_status(s: &str) -> IncidentStatus {
    match s {
        "ongoing" => IncidentStatus::Ongoing,
        _ => IncidentStatus::Resolved,
    }
}

fn severity_str(s: Severity) -> &'static str {
    match s {
        Severity::Minor => "minor",
        Severity::Warning => "warning",
        Severity::Critical => "critical",
    }
}

fn parse_severity(s: &str) -> Severity {
    match s {
        "critical" => Severity::Critical,
        "warning" => Severity::Warning,
        _ => Severity::Minor,
    }
}

fn parse_error_type(s: &str) -> ErrorType {
    // Round-trips through the same SCREAMING_SNAKE_CASE serde form used
    // for the wire representation -- deserialize via serde_json rather
    // than hand-rolling a second match arm list that could drift.
    serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(ErrorType::UnknownError)
}

fn row_to_monitor(row: &Row) -> rusqlite::Result<Monitor> {
    let protocol: String = row.get("protocol")?;
    let current_status: String = row.get("current_status")?;
    let last_checked: Option<String> = row.get("last_checked")?;
    let pending_severity: Option<String> = row.get("pending_severity")?;
    Ok(Monitor {
        id: row.get("id")?,
        owner: row.get("owner")?,
        target: row.get("target")?,
        protocol: parse_protocol(&protocol),
        port: row.get("port")?,
        interval_minutes: row.get("interval_minutes")?,
        timeout_ms: row.get("timeout_ms")?,
        degraded_threshold_ms: row.get("degraded_threshold_ms")?,
        ssl_expiry_threshold_days: row.get("ssl_expiry_threshold_days")?,
        allow_unauthorized: row.get("allow_unauthorized")?,
        strict_mode: row.get("strict_mode")?,
        active: row.get("active")?,
        alert_threshold: row.get("alert_threshold")?,
        total_checks: row.get::<_, i64>("total_checks")? as u64,
        successful_checks: row.get::<_, i64>("successful_checks")? as u64,
        consecutive_failures: row.get("consecutive_failures")?,
        consecutive_degraded: row.get("consecutive_degraded")?,
        consecutive_slow_count: row.get("consecutive_slow_count")?,
        last_checked: last_checked.and_then(|t| DateTime::parse_from_rfc3339(&t).ok()).map(|t| t.with_timezone(&Utc)),
        last_response_time: row.get("last_response_time")?,
        current_status: current_status.parse().unwrap_or(Status::Unknown),
        uptime_percentage: row.get("uptime_percentage")?,
        last_24h_uptime: row.get("last_24h_uptime")?,
        pending_severity: pending_severity.and_then(|s| s.parse().ok()),
    })
}

fn row_to_incident(row: &Row) -> rusqlite::Result<Incident> {
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let status: String = row.get("status")?;
    let severity: String = row.get("severity")?;
    let error_type: String = row.get("error_type")?;
    Ok(Incident {
        id: row.get("id")?,
        monitor_id: row.get("monitor_id")?,
        start_time: DateTime::parse_from_rfc3339(&start_time).map(|t| t.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now()),
        end_time: end_time.and_then(|t| DateTime::parse_from_rfc3339(&t).ok()).map(|t| t.with_timezone(&Utc)),
        status: parse_incident_status(&status),
        severity: parse_severity(&severity),
        error_type: parse_error_type(&error_type),
        error_message: row.get("error_message")?,
        status_code: row.get("status_code")?,
        duration_ms: row.get("duration_ms")?,
    })
}
