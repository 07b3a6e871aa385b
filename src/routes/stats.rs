use chrono::{Duration, Utc};
use rocket::http::{Cookie, CookieJar, SameSite};
use rocket::serde::json::{json, Json};
use rocket::State;

use super::{parse_id, ApiError, ApiResult, Context};
use crate::auth::AdminUser;
use crate::config::Config;
use crate::models::stats::{self, RankedCard, Stats, Summary, DEFAULT_RANKING};
use crate::store::{self, Db};

pub const VISIT_COOKIE: &str = "nav8_visited";

#[post("/click/<card_id>")]
pub async fn click(db: &State<Db>, card_id: &str) -> ApiResult {
    let card_id = parse_id(card_id).map_err(|_| ApiError::bad_request("Invalid card id"))?;
    let found = store::blocking(db.inner(), move |s| {
        Stats::record_click(s, card_id).context("Failed to record click")
    })
    .await?;
    if !found {
        return Err(ApiError::not_found("Card not found"));
    }
    Ok(Json(json!({ "success": true })))
}

/// Seconds left in the current UTC day.
fn seconds_until_midnight() -> i64 {
    let now = Utc::now().naive_utc();
    let midnight = (now.date() + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap_or(now);
    (midnight - now).num_seconds().max(1)
}

/// A page view. The visitor cookie holds today's date, so each browser
/// counts as one unique visitor per day.
#[post("/visit")]
pub async fn visit(db: &State<Db>, config: &State<Config>, cookies: &CookieJar<'_>) -> ApiResult {
    let today = stats::day_key(stats::today());
    let new_visitor = cookies.get(VISIT_COOKIE).map(|c| c.value()) != Some(today.as_str());

    let day = today.clone();
    store::blocking(db.inner(), move |s| {
        Stats::record_visit(s, &day, new_visitor).context("Failed to record visit")
    })
    .await?;

    if new_visitor {
        let mut cookie = Cookie::new(VISIT_COOKIE, today);
        cookie.set_http_only(true);
        cookie.set_same_site(SameSite::Lax);
        cookie.set_secure(config.production);
        cookie.set_path("/");
        cookie.set_max_age(rocket::time::Duration::seconds(seconds_until_midnight()));
        cookies.add(cookie);
    }
    Ok(Json(json!({ "success": true })))
}

#[get("/clicks/ranking?<limit>")]
pub async fn ranking(_admin: AdminUser, db: &State<Db>, limit: Option<&str>) -> ApiResult<Vec<RankedCard>> {
    let limit = limit
        .and_then(|l| l.trim().parse::<i64>().ok())
        .filter(|l| *l != 0)
        .unwrap_or(DEFAULT_RANKING);
    let ranked = store::blocking(db.inner(), move |s| {
        Stats::ranking(s, limit).context("Failed to load click ranking")
    })
    .await?;
    Ok(Json(ranked))
}

#[get("/summary")]
pub async fn summary(_admin: AdminUser, db: &State<Db>) -> ApiResult<Summary> {
    let summary = store::blocking(db.inner(), |s| {
        Stats::summary(s, stats::today()).context("Failed to load statistics")
    })
    .await?;
    Ok(Json(summary))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![click, visit, ranking, summary]
}
