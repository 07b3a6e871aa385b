use rocket::fairing::{Fairing, Info, Kind};
use rocket::tokio;
use rocket::{Orbit, Rocket};
use std::sync::Arc;
use std::time::Duration;

use crate::models::session::Session;
use crate::rate_limit::{RateLimiter, MAX_WINDOW};
use crate::store::{self, Db};

const SESSION_CLEANUP_EVERY: Duration = Duration::from_secs(30 * 60);
const LIMITER_CLEANUP_EVERY: Duration = Duration::from_secs(5 * 60);

pub struct BackgroundTasks;

#[rocket::async_trait]
impl Fairing for BackgroundTasks {
    fn info(&self) -> Info {
        Info {
            name: "Background Tasks",
            kind: Kind::Liftoff,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        // Session cleanup task
        if let Some(db) = rocket.state::<Db>() {
            let db = Arc::clone(db);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(SESSION_CLEANUP_EVERY).await;
                    match store::blocking(&db, Session::cleanup_expired).await {
                        Ok(count) => {
                            if count > 0 {
                                log::info!("[task] Cleaned up {} expired sessions", count);
                            }
                        }
                        Err(e) => log::error!("[task] Session cleanup failed: {}", e),
                    }
                }
            });
        }

        // Rate limiter pruning task
        if let Some(limiter) = rocket.state::<Arc<RateLimiter>>() {
            let limiter = Arc::clone(limiter);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(LIMITER_CLEANUP_EVERY).await;
                    let dropped = limiter.cleanup(MAX_WINDOW);
                    if dropped > 0 {
                        log::debug!("[task] Pruned {} idle rate-limit keys", dropped);
                    }
                }
            });
        }

        log::info!("[task] Background tasks started");
    }
}
