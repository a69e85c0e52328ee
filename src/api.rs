//! Consumed/Emitted API surface (spec §6): `createMonitor`, `updateMonitor`,
//! `deleteMonitor`, `triggerImmediate`, plus a health endpoint. Grounded in
//! the teacher's `routes.rs` -- same rocket handler shape, same
//! `RateLimiter`, same `ClientIp` request guard -- with `auth.rs`'s
//! manage-key gate dropped (authentication is explicitly out of scope)
//! and the monitor-creation body narrowed to the eight-protocol shape
//! this spec actually has, instead of the teacher's HTTP-only one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::json::Json;
use rocket::{delete, get, patch, post, State};
use serde::Deserialize;

use crate::config::RuntimeConfig;
use crate::db::Db;
use crate::models::{Monitor, Protocol, Status as MonitorStatus};
use crate::scheduler::Scheduler;
use crate::validator;

pub struct RateLimiter {
    windows: Mutex<HashMap<String, (Instant, u32)>>,
    limit: u32,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(limit: u32, window_secs: u64) -> Self {
        RateLimiter { windows: Mutex::new(HashMap::new()), limit, window_secs }
    }

    pub fn check(&self, key: &str) -> bool {
        let mut windows = self.windows.lock().unwrap();
        let now = Instant::now();
        let entry = windows.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0).as_secs() >= self.window_secs {
            *entry = (now, 1);
            true
        } else if entry.1 < self.limit {
            entry.1 += 1;
            true
        } else {
            false
        }
    }
}

pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        if let Some(xff) = request.headers().get_one("X-Forwarded-For") {
            if let Some(first) = xff.split(',').next() {
                return Outcome::Success(ClientIp(first.trim().to_string()));
            }
        }
        let ip = request.client_ip().map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".to_string());
        Outcome::Success(ClientIp(ip))
    }
}

fn error_response(status: Status, code: &str, message: impl Into<String>) -> (Status, Json<serde_json::Value>) {
    (status, Json(serde_json::json!({ "error": message.into(), "code": code })))
}

#[derive(Debug, Deserialize)]
pub struct CreateMonitorRequest {
    pub owner: String,
    pub target: String,
    pub protocol: Protocol,
    pub port: Option<u16>,
    pub interval_minutes: Option<u32>,
    pub timeout_ms: Option<u32>,
    pub degraded_threshold_ms: Option<u32>,
    pub ssl_expiry_threshold_days: Option<i64>,
    pub allow_unauthorized: Option<bool>,
    pub strict_mode: Option<bool>,
    pub alert_threshold: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateMonitorRequest {
    pub target: Option<String>,
    pub port: Option<u16>,
    pub interval_minutes: Option<u32>,
    pub timeout_ms: Option<u32>,
    pub degraded_threshold_ms: Option<u32>,
    pub ssl_expiry_threshold_days: Option<i64>,
    pub allow_unauthorized: Option<bool>,
    pub strict_mode: Option<bool>,
    pub alert_threshold: Option<u32>,
    pub active: Option<bool>,
}

#[get("/health")]
pub fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "service": "pulseguard", "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// Machine-readable description of this service for LLM agents poking at
/// the API, per the teacher's own `/llms.txt` convention.
#[get("/llms.txt")]
pub fn llms_txt() -> &'static str {
    "# pulseguard\n\n\
     Distributed uptime-monitoring engine. Protocols: HTTP, HTTPS, TCP, UDP, DNS, SMTP, SSL, PING.\n\n\
     POST /monitors            create a monitor\n\
     PATCH /monitors/<id>      update a monitor\n\
     DELETE /monitors/<id>     delete a monitor\n\
     POST /monitors/<id>/check trigger an immediate check\n\
     GET /monitors/<id>        fetch current monitor state\n"
}

#[post("/monitors", format = "json", data = "<input>")]
pub async fn create_monitor(
    input: Json<CreateMonitorRequest>,
    db: &State<Arc<Db>>,
    scheduler: &State<Arc<Scheduler>>,
    config: &State<RuntimeConfig>,
    rate_limiter: &State<RateLimiter>,
    client_ip: ClientIp,
) -> Result<Json<Monitor>, (Status, Json<serde_json::Value>)> {
    if !rate_limiter.check(&client_ip.0) {
        return Err(error_response(Status::TooManyRequests, "RATE_LIMIT_EXCEEDED", "rate limit exceeded"));
    }

    let body = input.into_inner();
    if body.owner.trim().is_empty() {
        return Err(error_response(Status::BadRequest, "VALIDATION_ERROR", "owner is required"));
    }
    if let Err(failure) = validator::validate(&body.target, body.protocol) {
        return Err(error_response(Status::BadRequest, failure.error_type.as_str(), failure.message));
    }

    let monitor = Monitor {
        id: uuid::Uuid::new_v4().to_string(),
        owner: body.owner,
        target: body.target,
        protocol: body.protocol,
        port: body.port,
        interval_minutes: body.interval_minutes.unwrap_or(5).clamp(1, 1440),
        timeout_ms: body.timeout_ms.unwrap_or(config.default_timeout_ms).clamp(1_000, 120_000),
        degraded_threshold_ms: body.degraded_threshold_ms.unwrap_or(config.default_degraded_threshold_ms),
        ssl_expiry_threshold_days: body.ssl_expiry_threshold_days.unwrap_or(config.default_ssl_expiry_threshold_days),
        allow_unauthorized: body.allow_unauthorized.unwrap_or(false),
        strict_mode: body.strict_mode.unwrap_or(false),
        active: true,
        alert_threshold: body.alert_threshold.unwrap_or(2).max(1),
        total_checks: 0,
        successful_checks: 0,
        consecutive_failures: 0,
        consecutive_degraded: 0,
        consecutive_slow_count: 0,
        last_checked: None,
        last_response_time: None,
        current_status: MonitorStatus::Unknown,
        uptime_percentage: 100.0,
        last_24h_uptime: 100.0,
        pending_severity: None,
    };

    db.insert_monitor(&monitor).map_err(|e| error_response(Status::InternalServerError, "STORE_ERROR", e.to_string()))?;
    if let Err(e) = scheduler.enqueue_immediate(&monitor.id).await {
        rocket::warn!("failed to enqueue immediate check for new monitor {}: {e}", monitor.id);
    }

    Ok(Json(monitor))
}

#[get("/monitors/<id>")]
pub fn get_monitor(id: &str, db: &State<Arc<Db>>) -> Result<Json<Monitor>, (Status, Json<serde_json::Value>)> {
    match db.get_monitor(id) {
        Ok(Some(m)) => Ok(Json(m)),
        Ok(None) => Err(error_response(Status::NotFound, "NOT_FOUND", "monitor not found")),
        Err(e) => Err(error_response(Status::InternalServerError, "STORE_ERROR", e.to_string())),
    }
}

#[patch("/monitors/<id>", format = "json", data = "<input>")]
pub async fn update_monitor(
    id: &str,
    input: Json<UpdateMonitorRequest>,
    db: &State<Arc<Db>>,
    scheduler: &State<Arc<Scheduler>>,
) -> Result<Json<Monitor>, (Status, Json<serde_json::Value>)> {
    let mut monitor = match db.get_monitor(id) {
        Ok(Some(m)) => m,
        Ok(None) => return Err(error_response(Status::NotFound, "NOT_FOUND", "monitor not found")),
        Err(e) => return Err(error_response(Status::InternalServerError, "STORE_ERROR", e.to_string())),
    };

    let patch = input.into_inner();
    let was_active = monitor.active;
    if let Some(target) = patch.target {
        monitor.target = target;
    }
    if let Some(port) = patch.port {
        monitor.port = Some(port);
    }
    if let Some(v) = patch.interval_minutes {
        monitor.interval_minutes = v.clamp(1, 1440);
    }
    if let Some(v) = patch.timeout_ms {
        monitor.timeout_ms = v.clamp(1_000, 120_000);
    }
    if let Some(v) = patch.degraded_threshold_ms {
        monitor.degraded_threshold_ms = v;
    }
    if let Some(v) = patch.ssl_expiry_threshold_days {
        monitor.ssl_expiry_threshold_days = v;
    }
    if let Some(v) = patch.allow_unauthorized {
        monitor.allow_unauthorized = v;
    }
    if let Some(v) = patch.strict_mode {
        monitor.strict_mode = v;
    }
    if let Some(v) = patch.alert_threshold {
        monitor.alert_threshold = v.max(1);
    }
    if let Some(v) = patch.active {
        monitor.active = v;
    }

    if let Err(failure) = validator::validate(&monitor.target, monitor.protocol) {
        return Err(error_response(Status::BadRequest, failure.error_type.as_str(), failure.message));
    }

    db.update_monitor(&monitor).map_err(|e| error_response(Status::InternalServerError, "STORE_ERROR", e.to_string()))?;

    if was_active && !monitor.active {
        let _ = scheduler.cancel(&monitor.id).await;
    } else if !was_active && monitor.active {
        let _ = scheduler.enqueue_immediate(&monitor.id).await;
    }

    Ok(Json(monitor))
}

#[delete("/monitors/<id>")]
pub async fn delete_monitor(id: &str, db: &State<Arc<Db>>, scheduler: &State<Arc<Scheduler>>) -> Result<Status, (Status, Json<serde_json::Value>)> {
    let _ = scheduler.cancel(id).await;
    db.delete_monitor(id).map_err(|e| error_response(Status::InternalServerError, "STORE_ERROR", e.to_string()))?;
    Ok(Status::NoContent)
}

#[post("/monitors/<id>/check")]
pub async fn trigger_immediate(id: &str, db: &State<Arc<Db>>, scheduler: &State<Arc<Scheduler>>) -> Result<Status, (Status, Json<serde_json::Value>)> {
    match db.get_monitor(id) {
        Ok(Some(_)) => {}
        Ok(None) => return Err(error_response(Status::NotFound, "NOT_FOUND", "monitor not found")),
        Err(e) => return Err(error_response(Status::InternalServerError, "STORE_ERROR", e.to_string())),
    }
    scheduler.enqueue_immediate(id).await.map_err(|e| error_response(Status::InternalServerError, "QUEUE_ERROR", e.to_string()))?;
    Ok(Status::Accepted)
}
