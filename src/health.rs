use std::sync::OnceLock;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::store::Store;

static BOOT_INSTANT: OnceLock<Instant> = OnceLock::new();

/// Set once at startup; later calls keep the first instant.
pub fn init_uptime() {
    BOOT_INSTANT.get_or_init(Instant::now);
}

pub fn uptime_secs() -> f64 {
    BOOT_INSTANT
        .get()
        .map(|b| b.elapsed().as_secs_f64())
        .unwrap_or(0.0)
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ── Data Structures ─────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Liveness {
    pub status: &'static str,
    pub uptime: f64,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct Readiness {
    pub status: &'static str,
    pub db: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.db == "up"
    }
}

// ── Probes ──────────────────────────────────────────────────

pub fn liveness() -> Liveness {
    Liveness {
        status: "ok",
        uptime: uptime_secs(),
        timestamp: timestamp(),
    }
}

pub fn readiness(store: &dyn Store) -> Readiness {
    match store.ping() {
        Ok(()) => Readiness {
            status: "ready",
            db: "up",
            timestamp: Some(timestamp()),
            error: None,
        },
        Err(e) => {
            log::warn!("Readiness probe failed: {}", e);
            Readiness {
                status: "degraded",
                db: "down",
                timestamp: None,
                error: Some(e.to_string()),
            }
        }
    }
}
