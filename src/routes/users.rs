use rocket::serde::json::{json, Json, Value};
use rocket::State;

use super::{ApiError, ApiResult, Context, PageQuery};
use crate::auth::{self, AdminUser};
use crate::config::Config;
use crate::models::session::Session;
use crate::models::user::User;
use crate::store::{self, Db};

pub const MIN_PASSWORD_LEN: usize = 6;

#[get("/profile")]
pub fn profile(admin: AdminUser) -> Json<Value> {
    Json(json!({ "id": admin.user.id, "username": admin.user.username }))
}

/// Login stamps recorded on the current account.
#[get("/me")]
pub fn me(admin: AdminUser) -> Json<Value> {
    Json(json!({
        "last_login_time": admin.user.last_login_time,
        "last_login_ip": admin.user.last_login_ip,
    }))
}

#[put("/password", data = "<body>")]
pub async fn change_password(
    admin: AdminUser,
    db: &State<Db>,
    config: &State<Config>,
    body: Json<Value>,
) -> ApiResult {
    let old = body.get("oldPassword").and_then(Value::as_str).unwrap_or("");
    let new = body.get("newPassword").and_then(Value::as_str).unwrap_or("");
    if old.is_empty() || new.is_empty() {
        return Err(ApiError::bad_request("Old and new passwords are required"));
    }
    if new.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "New password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let (old, new) = (old.to_string(), new.to_string());
    let cost = config.bcrypt_cost;
    let user_id = admin.user.id;
    let keep = admin.token_hash.clone();
    store::blocking(db.inner(), move |s| {
        let user = User::get_by_id(s, user_id)
            .context("Failed to load user")?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        if !auth::verify_password(&old, &user.password_hash) {
            return Err(ApiError::bad_request("Old password is incorrect"));
        }
        let hash = auth::hash_password(&new, cost).map_err(|e| ApiError::Internal {
            context: "Failed to update password".to_string(),
            detail: e,
        })?;
        User::update_password(s, user_id, &hash).context("Failed to update password")?;
        // Other devices have to sign in again with the new password.
        Session::delete_for_user_except(s, user_id, &keep).context("Failed to update password")?;
        Ok(())
    })
    .await?;

    log::info!("Password changed for '{}'", admin.user.username);
    Ok(Json(json!({ "message": "Password changed" })))
}

/// Without paging: `{data: [...]}`. With paging: the page object.
#[get("/?<paging..>")]
pub async fn list(_admin: AdminUser, db: &State<Db>, paging: PageQuery) -> ApiResult {
    let page = paging.request();
    store::blocking(db.inner(), move |s| {
        let body = match page {
            Some(p) => json!(User::list_paginated(s, p).context("Failed to load users")?),
            None => json!({ "data": User::list(s).context("Failed to load users")? }),
        };
        Ok(Json(body))
    })
    .await
}

pub fn routes() -> Vec<rocket::Route> {
    routes![profile, me, change_password, list]
}
