#[macro_use]
extern crate rocket;

use std::sync::Arc;

use pulseguard_core::api;
use pulseguard_core::config::RuntimeConfig;
use pulseguard_core::db::Db;
use pulseguard_core::emitter::Emitter;
use pulseguard_core::scheduler::queue::RedisQueue;
use pulseguard_core::scheduler::Scheduler;

#[launch]
fn rocket() -> _ {
    let config = RuntimeConfig::from_env();
    config.init_tracing();

    let database = Arc::new(Db::open(&config.database_path).expect("failed to initialize database"));
    let emitter = Arc::new(Emitter::new(1024));
    let queue = Arc::new(RedisQueue::new(&config.redis_url).expect("failed to build job queue"));

    let scheduler = Arc::new(
        Scheduler::new(database.clone(), emitter.clone(), queue, &config.redis_url, config.heartbeat_retention_days)
            .expect("failed to build scheduler"),
    );

    let rate_limit = std::env::var("MONITOR_RATE_LIMIT").ok().and_then(|v| v.parse().ok()).unwrap_or(10u32);
    let rate_limiter = api::RateLimiter::new(rate_limit, 3600);

    let scheduler_for_liftoff = scheduler.clone();

    rocket::build()
        .manage(database)
        .manage(emitter)
        .manage(scheduler)
        .manage(config)
        .manage(rate_limiter)
        .mount(
            "/api/v1",
            routes![
                api::health,
                api::llms_txt,
                api::create_monitor,
                api::get_monitor,
                api::update_monitor,
                api::delete_monitor,
                api::trigger_immediate,
            ],
        )
        .attach(rocket::fairing::AdHoc::on_liftoff("Scheduler", move |_rocket| {
            Box::pin(async move {
                scheduler_for_liftoff.spawn_workers();
                tokio::spawn(Arc::clone(&scheduler_for_liftoff).run_master_loop());
            })
        }))
}
