use std::path::PathBuf;

use rocket::fs::{FileServer, NamedFile, Options};
use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::serde::json::{json, Json, Value};
use rocket::{Build, Request, Rocket, State};

use crate::config::Config;
use crate::models::PageRequest;
use crate::store::StoreError;

pub mod ads;
pub mod auth;
pub mod backup;
pub mod cards;
pub mod friends;
pub mod import;
pub mod menus;
pub mod monitor;
pub mod stats;
pub mod upload;
pub mod users;

pub type ApiResult<T = Value> = Result<Json<T>, ApiError>;

// ── Errors ──────────────────────────────────────────────

/// Error answer of a JSON endpoint: `{"error": ...}` with a status code.
/// Internal errors also carry a `message` detail outside production.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{context}")]
    Internal { context: String, detail: String },
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    /// Unique-index violations become 409, references to a missing row 400,
    /// everything else a logged 500.
    pub fn store(what: &str, e: StoreError) -> Self {
        if e.is_unique_violation() {
            return ApiError::Conflict("A record with the same value already exists".to_string());
        }
        if e.is_foreign_key_violation() {
            return ApiError::BadRequest("Referenced record does not exist".to_string());
        }
        log::error!("{}: {}", what, e);
        ApiError::Internal {
            context: what.to_string(),
            detail: e.to_string(),
        }
    }

    pub fn status(&self) -> Status {
        match self {
            ApiError::BadRequest(_) => Status::BadRequest,
            ApiError::Unauthorized(_) => Status::Unauthorized,
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::Conflict(_) => Status::Conflict,
            ApiError::Internal { .. } => Status::InternalServerError,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::store("Internal server error", e)
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let production = req
            .rocket()
            .state::<Config>()
            .map(|c| c.production)
            .unwrap_or(true);
        let status = self.status();
        let body = match &self {
            ApiError::Internal { context, detail } if !production => {
                json!({ "error": context, "message": detail })
            }
            other => json!({ "error": other.to_string() }),
        };
        response::status::Custom(status, Json(body)).respond_to(req)
    }
}

/// Attach a user-facing message to a store failure.
pub trait Context<T> {
    fn context(self, what: &str) -> Result<T, ApiError>;
}

impl<T> Context<T> for Result<T, StoreError> {
    fn context(self, what: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::store(what, e))
    }
}

// ── Request helpers ─────────────────────────────────────

/// `?page=&pageSize=` on list endpoints. Kept as raw strings so junk
/// values fall back to defaults instead of failing the route.
#[derive(Debug, Default, FromForm)]
pub struct PageQuery {
    pub page: Option<String>,
    #[field(name = "pageSize")]
    pub page_size: Option<String>,
}

impl PageQuery {
    pub fn request(&self) -> Option<PageRequest> {
        PageRequest::from_query(self.page.as_deref(), self.page_size.as_deref())
    }
}

/// Path ids must be positive integers.
pub fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request("Invalid id"))
}

// ── Catchers ────────────────────────────────────────────

fn caught(status: Status, msg: &str) -> response::status::Custom<Json<Value>> {
    response::status::Custom(status, Json(json!({ "error": msg })))
}

#[catch(400)]
fn bad_request() -> response::status::Custom<Json<Value>> {
    caught(Status::BadRequest, "Bad request")
}

#[catch(401)]
fn unauthorized() -> response::status::Custom<Json<Value>> {
    caught(Status::Unauthorized, "Unauthorized")
}

#[catch(404)]
fn not_found() -> response::status::Custom<Json<Value>> {
    caught(Status::NotFound, "Not found")
}

#[catch(413)]
fn payload_too_large() -> response::status::Custom<Json<Value>> {
    caught(Status::PayloadTooLarge, "Request body too large")
}

#[catch(415)]
fn unsupported_media_type() -> response::status::Custom<Json<Value>> {
    caught(Status::UnsupportedMediaType, "Unsupported content type")
}

#[catch(422)]
fn unprocessable() -> response::status::Custom<Json<Value>> {
    caught(Status::UnprocessableEntity, "Malformed request body")
}

#[catch(429)]
fn too_many_requests() -> response::status::Custom<Json<Value>> {
    caught(Status::TooManyRequests, crate::rate_limit::GENERAL.message)
}

#[catch(500)]
fn server_error() -> response::status::Custom<Json<Value>> {
    caught(Status::InternalServerError, "Internal server error")
}

pub fn catchers() -> Vec<rocket::Catcher> {
    catchers![
        bad_request,
        unauthorized,
        not_found,
        payload_too_large,
        unsupported_media_type,
        unprocessable,
        too_many_requests,
        server_error
    ]
}

// ── SPA fallback ────────────────────────────────────────

/// Client-side routes of the web UI all load `index.html`. API and upload
/// paths never fall through to it.
#[get("/<path..>", rank = 20)]
pub async fn spa_fallback(path: PathBuf, config: &State<Config>) -> Option<NamedFile> {
    match path.components().next() {
        Some(first) if first.as_os_str() == "api" || first.as_os_str() == "uploads" => None,
        _ => NamedFile::open(config.web_dist.join("index.html")).await.ok(),
    }
}

// ── Route tables ────────────────────────────────────────

pub fn mount(rocket: Rocket<Build>, config: &Config) -> Rocket<Build> {
    let static_opts = Options::Index | Options::Missing;
    rocket
        .mount("/uploads", FileServer::new(&config.uploads_dir, static_opts))
        .mount("/", FileServer::new(&config.web_dist, static_opts).rank(11))
        .mount("/", monitor::routes())
        .mount("/", routes![crate::headers::preflight, crate::rate_limit::throttled, spa_fallback])
        .mount("/api", auth::routes())
        .mount("/api/menus", menus::routes())
        .mount("/api/cards", cards::routes())
        .mount("/api/ads", ads::routes())
        .mount("/api/banners", ads::routes())
        .mount("/api/friends", friends::routes())
        .mount("/api/users", users::routes())
        .mount("/api/upload", upload::routes())
        .mount("/api/import", import::routes())
        .mount("/api/backup", backup::routes())
        .mount("/api/stats", stats::routes())
        .register("/", catchers())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_must_be_positive_integers() {
        assert_eq!(parse_id("12").unwrap(), 12);
        assert!(parse_id("0").is_err());
        assert!(parse_id("-3").is_err());
        assert!(parse_id("abc").is_err());
    }

    #[test]
    fn store_errors_map_to_status() {
        let err: Result<(), StoreError> = Err(StoreError::Decode("bad".into()));
        let api = err.context("Failed to load menus").unwrap_err();
        assert_eq!(api.status(), Status::InternalServerError);
        assert_eq!(api.to_string(), "Failed to load menus");
        assert_eq!(ApiError::bad_request("x").status(), Status::BadRequest);
    }
}
