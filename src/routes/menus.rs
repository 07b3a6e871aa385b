use rocket::serde::json::{json, Json, Value};
use rocket::State;

use super::{parse_id, ApiError, ApiResult, Context, PageQuery};
use crate::auth::AdminUser;
use crate::models::menu::{Menu, SubMenu};
use crate::store::{self, Db};
use crate::validate;

// ── Menus ──────────────────────────────────────────────

/// Without paging parameters: every menu with its `subMenus`.
/// With them: one page of bare menus.
#[get("/?<paging..>")]
pub async fn list(db: &State<Db>, paging: PageQuery) -> ApiResult {
    let page = paging.request();
    store::blocking(db.inner(), move |s| {
        let body = match page {
            Some(p) => json!(Menu::list_paginated(s, p).context("Failed to load menus")?),
            None => json!(Menu::list_tree(s).context("Failed to load menus")?),
        };
        Ok(Json(body))
    })
    .await
}

#[post("/", data = "<body>")]
pub async fn create(_admin: AdminUser, db: &State<Db>, body: Json<Value>) -> ApiResult {
    let form = validate::menu_name(&body, "Menu").map_err(ApiError::BadRequest)?;
    let id = store::blocking(db.inner(), move |s| {
        Menu::create(s, &form).context("Failed to create menu")
    })
    .await?;
    Ok(Json(json!({ "id": id })))
}

#[put("/<id>", data = "<body>")]
pub async fn update(_admin: AdminUser, db: &State<Db>, id: &str, body: Json<Value>) -> ApiResult {
    let id = parse_id(id)?;
    let form = validate::menu_name(&body, "Menu").map_err(ApiError::BadRequest)?;
    let changed = store::blocking(db.inner(), move |s| {
        Menu::update(s, id, &form).context("Failed to update menu")
    })
    .await?;
    Ok(Json(json!({ "changed": changed })))
}

#[delete("/<id>")]
pub async fn delete(_admin: AdminUser, db: &State<Db>, id: &str) -> ApiResult {
    let id = parse_id(id)?;
    let deleted = store::blocking(db.inner(), move |s| {
        Menu::delete(s, id).context("Failed to delete menu")
    })
    .await?;
    Ok(Json(json!({ "deleted": deleted })))
}

#[post("/batch/reorder", data = "<body>")]
pub async fn reorder(_admin: AdminUser, db: &State<Db>, body: Json<Value>) -> ApiResult {
    let items = validate::order_items(&body).map_err(ApiError::BadRequest)?;
    let updated = store::blocking(db.inner(), move |s| {
        Menu::reorder(s, &items).context("Failed to reorder menus")
    })
    .await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

// ── Sub-menus ──────────────────────────────────────────

#[get("/<id>/submenus")]
pub async fn submenus(db: &State<Db>, id: &str) -> ApiResult<Vec<SubMenu>> {
    let id = parse_id(id)?;
    let subs = store::blocking(db.inner(), move |s| {
        SubMenu::list_for(s, id).context("Failed to load sub-menus")
    })
    .await?;
    Ok(Json(subs))
}

#[post("/<id>/submenus", data = "<body>")]
pub async fn create_submenu(
    _admin: AdminUser,
    db: &State<Db>,
    id: &str,
    body: Json<Value>,
) -> ApiResult {
    let parent_id = parse_id(id)?;
    let form = validate::menu_name(&body, "Sub-menu").map_err(ApiError::BadRequest)?;
    let id = store::blocking(db.inner(), move |s| {
        if Menu::find_by_id(s, parent_id).context("Failed to load menu")?.is_none() {
            return Err(ApiError::not_found("Menu not found"));
        }
        SubMenu::create(s, parent_id, &form).context("Failed to create sub-menu")
    })
    .await?;
    Ok(Json(json!({ "id": id })))
}

#[put("/submenus/<id>", data = "<body>")]
pub async fn update_submenu(
    _admin: AdminUser,
    db: &State<Db>,
    id: &str,
    body: Json<Value>,
) -> ApiResult {
    let id = parse_id(id)?;
    let form = validate::menu_name(&body, "Sub-menu").map_err(ApiError::BadRequest)?;
    let changed = store::blocking(db.inner(), move |s| {
        SubMenu::update(s, id, &form).context("Failed to update sub-menu")
    })
    .await?;
    Ok(Json(json!({ "changed": changed })))
}

#[delete("/submenus/<id>")]
pub async fn delete_submenu(_admin: AdminUser, db: &State<Db>, id: &str) -> ApiResult {
    let id = parse_id(id)?;
    let deleted = store::blocking(db.inner(), move |s| {
        SubMenu::delete(s, id).context("Failed to delete sub-menu")
    })
    .await?;
    Ok(Json(json!({ "deleted": deleted })))
}

#[post("/submenus/batch/reorder", data = "<body>")]
pub async fn reorder_submenus(_admin: AdminUser, db: &State<Db>, body: Json<Value>) -> ApiResult {
    let items = validate::order_items(&body).map_err(ApiError::BadRequest)?;
    let updated = store::blocking(db.inner(), move |s| {
        SubMenu::reorder(s, &items).context("Failed to reorder sub-menus")
    })
    .await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        list,
        create,
        update,
        delete,
        reorder,
        submenus,
        create_submenu,
        update_submenu,
        delete_submenu,
        reorder_submenus
    ]
}
