use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::State;

use crate::health::{self, Liveness, Readiness};
use crate::store::{self, Db, StoreError};

#[get("/healthz")]
pub fn healthz() -> Json<Liveness> {
    Json(health::liveness())
}

/// 503 while the database does not answer.
#[get("/readyz")]
pub async fn readyz(db: &State<Db>) -> status::Custom<Json<Readiness>> {
    let report = store::blocking(db.inner(), |s| Ok::<_, StoreError>(health::readiness(s)))
        .await
        .unwrap_or_else(|e| Readiness {
            status: "degraded",
            db: "down",
            timestamp: None,
            error: Some(e.to_string()),
        });
    let code = if report.is_ready() {
        Status::Ok
    } else {
        Status::ServiceUnavailable
    };
    status::Custom(code, Json(report))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![healthz, readyz]
}
