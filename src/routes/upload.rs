use rocket::form::{Errors, Form};
use rocket::fs::TempFile;
use rocket::http::Status;
use rocket::serde::json::{json, Json};
use rocket::State;

use super::{ApiError, ApiResult};
use crate::auth::AdminUser;
use crate::config::Config;
use crate::uploads::{self, UploadError};

#[derive(FromForm)]
pub struct LogoUpload<'r> {
    pub logo: Option<TempFile<'r>>,
}

/// Multipart parse failures, including oversized files, are the
/// client's fault.
pub fn form_error(errors: Errors<'_>) -> ApiError {
    if errors.status() == Status::PayloadTooLarge {
        return ApiError::bad_request("File must be at most 5MB");
    }
    ApiError::bad_request(format!("Invalid upload: {}", errors))
}

#[post("/", data = "<form>")]
pub async fn upload_logo(
    _admin: AdminUser,
    config: &State<Config>,
    form: Result<Form<LogoUpload<'_>>, Errors<'_>>,
) -> ApiResult {
    let mut form = form.map_err(form_error)?;
    let file = form
        .logo
        .as_mut()
        .ok_or_else(|| ApiError::bad_request("Please choose a file to upload"))?;

    let filename = match uploads::save_logo(file, &config.uploads_dir).await {
        Ok(name) => name,
        Err(UploadError::Rejected(msg)) => return Err(ApiError::BadRequest(msg)),
        Err(e) => {
            log::error!("Upload failed: {}", e);
            return Err(ApiError::Internal {
                context: "Upload failed".to_string(),
                detail: e.to_string(),
            });
        }
    };

    Ok(Json(json!({
        "filename": filename,
        "url": format!("/uploads/{}", filename),
        "success": true,
    })))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![upload_logo]
}
