#[macro_use]
extern crate rocket;

#[macro_use]
mod store;

mod auth;
mod boot;
mod config;
mod db;
mod headers;
mod health;
mod import;
mod links;
mod models;
mod rate_limit;
mod routes;
mod tasks;
mod uploads;
mod validate;


use std::process;
use std::sync::Arc;

use rocket::data::{Limits, ToByteUnit};
use rocket::{Build, Rocket};

use config::Config;
use rate_limit::{RateLimitFairing, RateLimiter};
use store::Db;

/// Assemble the server around an already migrated store.
pub fn build_rocket(config: Config, db: Db) -> Rocket<Build> {
    let limits = Limits::default()
        .limit("json", 50.mebibytes())
        // One byte over the cap so a truncated oversized file still fails
        // the size check in `uploads::save_logo`.
        .limit("file", (uploads::MAX_UPLOAD_BYTES + 1).bytes())
        .limit("data-form", 6.mebibytes());

    let figment = rocket::Config::figment()
        .merge(("address", config.host.clone()))
        .merge(("port", config.port))
        .merge(("limits", limits));

    let limiter = Arc::new(RateLimiter::new());

    let rocket = rocket::custom(figment)
        .manage(db)
        .manage(Arc::clone(&limiter))
        .attach(RateLimitFairing {
            limiter,
            trust_proxy: config.trust_proxy,
        })
        .attach(headers::SecurityHeaders)
        .attach(headers::Cors {
            origin: config.cors_origin.clone(),
        })
        .attach(tasks::BackgroundTasks);

    routes::mount(rocket, &config).manage(config)
}

fn main() {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    health::init_uptime();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            log::error!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    // Boot check: create directories, validate paths and production settings
    boot::run(&config);

    // The sync database clients must be set up before the async runtime starts.
    let db = match store::connect(&config) {
        Ok(db) => db,
        Err(e) => {
            log::error!("Database connection failed: {}", e);
            process::exit(1);
        }
    };
    if let Err(e) = db::run_migrations(db.as_ref()) {
        log::error!("Database migration failed: {}", e);
        process::exit(1);
    }
    if let Err(e) = db::seed_defaults(db.as_ref(), &config) {
        log::error!("Seeding defaults failed: {}", e);
        process::exit(1);
    }

    log::info!(
        "Listening on http://{}:{} ({} backend)",
        config.host,
        config.port,
        config.backend_name()
    );

    if let Err(e) = rocket::execute(build_rocket(config, db).launch()) {
        log::error!("Server stopped: {}", e);
        process::exit(1);
    }
}
