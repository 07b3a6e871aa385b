use rocket::http::Header;
use rocket::serde::json::{json, Json, Value};
use rocket::State;

use super::{ApiError, ApiResult, Context};
use crate::auth::AdminUser;
use crate::models::backup::{self, BackupError};
use crate::store::{self, Db};

#[derive(Responder)]
#[response(content_type = "json")]
pub struct BackupDownload {
    body: String,
    disposition: Header<'static>,
}

#[get("/export")]
pub async fn export(_admin: AdminUser, db: &State<Db>) -> Result<BackupDownload, ApiError> {
    let snapshot = store::blocking(db.inner(), |s| backup::export(s).context("Export failed")).await?;
    let body = serde_json::to_string(&snapshot).map_err(|e| ApiError::Internal {
        context: "Export failed".to_string(),
        detail: e.to_string(),
    })?;
    let filename = format!("nav8-backup-{}.json", chrono::Utc::now().timestamp_millis());
    Ok(BackupDownload {
        body,
        disposition: Header::new(
            "Content-Disposition",
            format!("attachment; filename={}", filename),
        ),
    })
}

fn truthy(v: Option<&Value>) -> bool {
    match v {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty() && s != "false" && s != "0",
        _ => false,
    }
}

/// Restore `{data, overwrite}`. All-or-nothing: a bad record rolls back
/// every insert and delete made so far.
#[post("/import", data = "<body>")]
pub async fn import(_admin: AdminUser, db: &State<Db>, body: Json<Value>) -> ApiResult {
    let Json(mut body) = body;
    let data = match body.get_mut("data").map(Value::take) {
        Some(data) if data.is_object() => data,
        _ => return Err(ApiError::bad_request("Invalid backup data")),
    };
    let overwrite = truthy(body.get("overwrite"));

    let imported = store::blocking(db.inner(), move |s| match backup::import(s, &data, overwrite) {
        Ok(counts) => Ok(counts),
        Err(BackupError::Invalid(msg)) => {
            log::warn!("Backup import rejected (rolled back): {}", msg);
            Err(ApiError::BadRequest(format!("Import failed: {}", msg)))
        }
        Err(BackupError::Store(e)) => Err(ApiError::store("Import failed (rolled back)", e)),
    })
    .await?;

    log::info!(
        "Backup imported: {} menus, {} sub-menus, {} cards, {} ads, {} friends",
        imported.menus,
        imported.sub_menus,
        imported.cards,
        imported.ads,
        imported.friends
    );
    Ok(Json(json!({ "success": true, "imported": imported })))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![export, import]
}

#[cfg(test)]
mod tests {
    use super::truthy;
    use serde_json::json;

    #[test]
    fn overwrite_flag() {
        assert!(truthy(Some(&json!(true))));
        assert!(truthy(Some(&json!(1))));
        assert!(truthy(Some(&json!("yes"))));
        assert!(!truthy(Some(&json!("false"))));
        assert!(!truthy(Some(&json!(0))));
        assert!(!truthy(None));
    }
}
