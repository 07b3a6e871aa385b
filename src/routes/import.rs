use rocket::form::{Errors, Form};
use rocket::fs::TempFile;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::json::Json;
use rocket::tokio::io::AsyncReadExt;
use rocket::State;

use super::upload::form_error;
use super::{ApiError, ApiResult, Context};
use crate::auth::AdminUser;
use crate::import::{self, ImportSummary, IMPORT_DEADLINE};
use crate::models::menu::Menu;
use crate::store::{self, Db};
use crate::uploads::raw_filename;

/// `X-Request-Id` from the client, or a fresh one.
pub struct RequestId(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestId {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let id = request
            .headers()
            .get_one("X-Request-Id")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.chars().take(64).collect())
            .unwrap_or_else(import::new_request_id);
        Outcome::Success(RequestId(id))
    }
}

#[derive(FromForm)]
pub struct BookmarkUpload<'r> {
    pub file: Option<TempFile<'r>>,
    pub menu_id: Option<String>,
    pub sub_menu_id: Option<String>,
}

fn parse_target(raw: Option<&str>) -> Result<Option<i64>, ()> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s.parse::<i64>().ok().filter(|n| *n > 0).map(Some).ok_or(()),
    }
}

async fn read_text(file: &TempFile<'_>) -> std::io::Result<String> {
    let mut bytes = Vec::new();
    let mut reader = Box::pin(file.open().await?);
    reader.read_to_end(&mut bytes).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[post("/", data = "<form>")]
pub async fn import_bookmarks(
    _admin: AdminUser,
    db: &State<Db>,
    request_id: RequestId,
    form: Result<Form<BookmarkUpload<'_>>, Errors<'_>>,
) -> ApiResult<ImportSummary> {
    let form = form.map_err(form_error)?;
    let file = form
        .file
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("Please choose a file to upload"))?;
    let menu_id = parse_target(form.menu_id.as_deref())
        .ok()
        .flatten()
        .ok_or_else(|| ApiError::bad_request("Select a valid target menu"))?;
    let sub_menu_id = parse_target(form.sub_menu_id.as_deref())
        .map_err(|_| ApiError::bad_request("Select a valid target sub-menu"))?;

    let content = read_text(file).await.map_err(|e| ApiError::Internal {
        context: "Could not read upload".to_string(),
        detail: e.to_string(),
    })?;
    let bookmarks =
        import::parse_file(&raw_filename(file), &content).map_err(ApiError::BadRequest)?;
    if bookmarks.is_empty() {
        return Err(ApiError::bad_request("No valid bookmarks found"));
    }

    let request_id = request_id.0;
    let summary = store::blocking(db.inner(), move |s| {
        if Menu::find_by_id(s, menu_id).context("Failed to load menu")?.is_none() {
            return Err(ApiError::not_found("Menu not found"));
        }
        Ok(import::import_cards(
            s,
            &bookmarks,
            menu_id,
            sub_menu_id,
            &request_id,
            IMPORT_DEADLINE,
        ))
    })
    .await?;
    Ok(Json(summary))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![import_bookmarks]
}

#[cfg(test)]
mod tests {
    use super::parse_target;

    #[test]
    fn target_ids() {
        assert_eq!(parse_target(None), Ok(None));
        assert_eq!(parse_target(Some(" ")), Ok(None));
        assert_eq!(parse_target(Some("7")), Ok(Some(7)));
        assert!(parse_target(Some("x")).is_err());
        assert!(parse_target(Some("0")).is_err());
    }
}
