//! Integration tests for the thin Consumed API surface (spec §6), exercised
//! through rocket's local blocking client the way the teacher's own
//! `tests/api_tests.rs` drove `routes.rs` -- minus everything gated behind
//! a manage key, since authentication is out of scope here.

use std::sync::Arc;

use pulseguard_core::api;
use pulseguard_core::config::RuntimeConfig;
use pulseguard_core::db::Db;
use pulseguard_core::emitter::Emitter;
use pulseguard_core::scheduler::queue::InMemoryQueue;
use pulseguard_core::scheduler::Scheduler;

use rocket::http::{ContentType, Status};
use rocket::local::blocking::Client;

fn test_rocket() -> rocket::Rocket<rocket::Build> {
    let db = Arc::new(Db::open_in_memory().expect("in-memory db"));
    let emitter = Arc::new(Emitter::new(16));
    let queue = Arc::new(InMemoryQueue::new());
    let scheduler = Arc::new(
        Scheduler::new(db.clone(), emitter.clone(), queue, "redis://127.0.0.1:1", 90).expect("scheduler"),
    );
    let config = RuntimeConfig::from_env();
    let rate_limiter = api::RateLimiter::new(1000, 3600);

    rocket::build()
        .manage(db)
        .manage(emitter)
        .manage(scheduler)
        .manage(config)
        .manage(rate_limiter)
        .mount(
            "/api/v1",
            rocket::routes![
                api::health,
                api::llms_txt,
                api::create_monitor,
                api::get_monitor,
                api::update_monitor,
                api::delete_monitor,
                api::trigger_immediate,
            ],
        )
}

#[test]
fn health_endpoint_reports_ok() {
    let client = Client::tracked(test_rocket()).expect("valid rocket instance");
    let response = client.get("/api/v1/health").dispatch();
    assert_eq!(response.status(), Status::Ok);
    let body: serde_json::Value = response.into_json().unwrap();
    assert_eq!(body["status"], "ok");
}

#[test]
fn create_monitor_rejects_empty_owner() {
    let client = Client::tracked(test_rocket()).expect("valid rocket instance");
    let response = client
        .post("/api/v1/monitors")
        .header(ContentType::JSON)
        .body(r#"{"owner":"","target":"example.com","protocol":"HTTP"}"#)
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);
}

#[test]
fn create_monitor_rejects_invalid_target() {
    let client = Client::tracked(test_rocket()).expect("valid rocket instance");
    let response = client
        .post("/api/v1/monitors")
        .header(ContentType::JSON)
        .body(r#"{"owner":"alice","target":"","protocol":"HTTP"}"#)
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);
}

#[test]
fn create_then_fetch_then_delete_monitor_round_trips() {
    let client = Client::tracked(test_rocket()).expect("valid rocket instance");

    let create = client
        .post("/api/v1/monitors")
        .header(ContentType::JSON)
        .body(r#"{"owner":"alice","target":"example.com","protocol":"HTTP","interval_minutes":5}"#)
        .dispatch();
    assert_eq!(create.status(), Status::Ok);
    let created: serde_json::Value = create.into_json().unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["active"], true);

    let fetched = client.get(format!("/api/v1/monitors/{id}")).dispatch();
    assert_eq!(fetched.status(), Status::Ok);

    let deleted = client.delete(format!("/api/v1/monitors/{id}")).dispatch();
    assert_eq!(deleted.status(), Status::NoContent);

    let gone = client.get(format!("/api/v1/monitors/{id}")).dispatch();
    assert_eq!(gone.status(), Status::NotFound);
}

#[test]
fn update_monitor_deactivation_cancels_scheduling_without_error() {
    let client = Client::tracked(test_rocket()).expect("valid rocket instance");

    let create = client
        .post("/api/v1/monitors")
        .header(ContentType::JSON)
        .body(r#"{"owner":"alice","target":"example.com","protocol":"HTTP"}"#)
        .dispatch();
    let created: serde_json::Value = create.into_json().unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let updated = client
        .patch(format!("/api/v1/monitors/{id}"))
        .header(ContentType::JSON)
        .body(r#"{"active":false}"#)
        .dispatch();
    assert_eq!(updated.status(), Status::Ok);
    let body: serde_json::Value = updated.into_json().unwrap();
    assert_eq!(body["active"], false);
}

#[test]
fn trigger_immediate_on_missing_monitor_is_not_found() {
    let client = Client::tracked(test_rocket()).expect("valid rocket instance");
    let response = client.post("/api/v1/monitors/does-not-exist/check").dispatch();
    assert_eq!(response.status(), Status::NotFound);
}
