use rocket::serde::json::{json, Json, Value};
use rocket::State;

use super::{ApiError, ApiResult, Context};
use crate::auth::{self, AdminUser, ClientIp};
use crate::config::Config;
use crate::models::session::Session;
use crate::store::{self, Db};

fn non_blank(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[post("/login", data = "<body>")]
pub async fn login(
    db: &State<Db>,
    config: &State<Config>,
    client_ip: ClientIp,
    body: Json<Value>,
) -> ApiResult {
    let username = non_blank(&body, "username")
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());
    let (Some(username), Some(password)) = (username, non_blank(&body, "password")) else {
        return Err(ApiError::bad_request("Username and password are required"));
    };

    let hours = config.session_hours;
    let ip = client_ip.0;
    let outcome = store::blocking(db.inner(), move |s| {
        auth::login(s, &username, &password, &ip, hours).context("Login failed")
    })
    .await?;

    match outcome {
        Some(ok) => Ok(Json(json!({
            "token": ok.token,
            "lastLoginTime": ok.last_login_time,
            "lastLoginIp": ok.last_login_ip,
        }))),
        None => Err(ApiError::Unauthorized(
            "Invalid username or password".to_string(),
        )),
    }
}

#[post("/logout")]
pub async fn logout(admin: AdminUser, db: &State<Db>) -> ApiResult {
    let hash = admin.token_hash;
    store::blocking(db.inner(), move |s| Session::delete(s, &hash).context("Logout failed")).await?;
    Ok(Json(json!({ "success": true })))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![login, logout]
}
