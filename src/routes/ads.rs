use rocket::serde::json::{json, Json, Value};
use rocket::State;

use super::{parse_id, ApiError, ApiResult, Context, PageQuery};
use crate::auth::AdminUser;
use crate::models::ad::Ad;
use crate::models::Listing;
use crate::store::{self, Db};
use crate::validate;

#[get("/?<paging..>")]
pub async fn list(db: &State<Db>, paging: PageQuery) -> ApiResult<Listing<Ad>> {
    let page = paging.request();
    let listing = store::blocking(db.inner(), move |s| match page {
        Some(p) => Ok::<_, ApiError>(Listing::Paged(Ad::list_paginated(s, p).context("Failed to load ads")?)),
        None => Ok(Listing::All(Ad::list(s).context("Failed to load ads")?)),
    })
    .await?;
    Ok(Json(listing))
}

#[post("/", data = "<body>")]
pub async fn create(_admin: AdminUser, db: &State<Db>, body: Json<Value>) -> ApiResult {
    let form = validate::ad(&body).map_err(ApiError::BadRequest)?;
    let id = store::blocking(db.inner(), move |s| Ad::create(s, &form).context("Failed to create ad"))
        .await?;
    Ok(Json(json!({ "id": id })))
}

#[put("/<id>", data = "<body>")]
pub async fn update(_admin: AdminUser, db: &State<Db>, id: &str, body: Json<Value>) -> ApiResult {
    let id = parse_id(id)?;
    let form = validate::ad(&body).map_err(ApiError::BadRequest)?;
    let changed = store::blocking(db.inner(), move |s| {
        Ad::update(s, id, &form).context("Failed to update ad")
    })
    .await?;
    if changed == 0 {
        return Err(ApiError::not_found("Ad not found"));
    }
    Ok(Json(json!({ "changed": changed })))
}

#[delete("/<id>")]
pub async fn delete(_admin: AdminUser, db: &State<Db>, id: &str) -> ApiResult {
    let id = parse_id(id)?;
    let deleted = store::blocking(db.inner(), move |s| Ad::delete(s, id).context("Failed to delete ad"))
        .await?;
    Ok(Json(json!({ "deleted": deleted })))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![list, create, update, delete]
}
