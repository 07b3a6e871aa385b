use rocket::serde::json::{json, Json, Value};
use rocket::State;

use super::{parse_id, ApiError, ApiResult, Context, PageQuery};
use crate::auth::AdminUser;
use crate::models::friend::Friend;
use crate::models::Listing;
use crate::store::{self, Db, StoreError};
use crate::validate;

#[get("/?<paging..>")]
pub async fn list(db: &State<Db>, paging: PageQuery) -> ApiResult<Listing<Friend>> {
    let page = paging.request();
    let listing = store::blocking(db.inner(), move |s| {
        let listing = match page {
            Some(p) => Listing::Paged(Friend::list_paginated(s, p)?),
            None => Listing::All(Friend::list(s)?),
        };
        Ok::<_, StoreError>(listing)
    })
    .await
    .context("Failed to load friend links")?;
    Ok(Json(listing))
}

#[post("/", data = "<body>")]
pub async fn create(_admin: AdminUser, db: &State<Db>, body: Json<Value>) -> ApiResult {
    let form = validate::friend(&body).map_err(ApiError::BadRequest)?;
    let id = store::blocking(db.inner(), move |s| Friend::create(s, &form).context("Failed to create friend link"))
        .await?;
    Ok(Json(json!({ "id": id })))
}

#[put("/<id>", data = "<body>")]
pub async fn update(_admin: AdminUser, db: &State<Db>, id: &str, body: Json<Value>) -> ApiResult {
    let id = parse_id(id)?;
    let form = validate::friend(&body).map_err(ApiError::BadRequest)?;
    let changed = store::blocking(db.inner(), move |s| {
        Friend::update(s, id, &form).context("Failed to update friend link")
    })
    .await?;
    Ok(Json(json!({ "changed": changed })))
}

#[delete("/<id>")]
pub async fn delete(_admin: AdminUser, db: &State<Db>, id: &str) -> ApiResult {
    let id = parse_id(id)?;
    let deleted = store::blocking(db.inner(), move |s| Friend::delete(s, id).context("Failed to delete friend link"))
        .await?;
    Ok(Json(json!({ "deleted": deleted })))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![list, create, update, delete]
}
