use rocket::serde::json::{json, Json, Value};
use rocket::State;

use super::{parse_id, ApiError, ApiResult, Context};
use crate::auth::AdminUser;
use crate::links::{self, LinkStatus};
use crate::models::card::Card;
use crate::store::{self, Db};
use crate::validate::{self, positive_int};

#[derive(Debug, Default, FromForm)]
pub struct CardFilter {
    #[field(name = "subMenuId")]
    pub sub_menu_id: Option<String>,
}

/// Cards directly under a menu, or under one of its sub-menus when
/// `subMenuId` is given.
#[get("/<menu_id>?<filter..>")]
pub async fn list(db: &State<Db>, menu_id: &str, filter: CardFilter) -> ApiResult<Vec<Card>> {
    let menu_id = parse_id(menu_id)?;
    let sub_menu_id = match filter.sub_menu_id.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(parse_id(raw)?),
        _ => None,
    };
    let cards = store::blocking(db.inner(), move |s| {
        Card::list_for(s, menu_id, sub_menu_id).context("Failed to load cards")
    })
    .await?;
    Ok(Json(cards))
}

#[get("/search/query?<q>")]
pub async fn search(db: &State<Db>, q: Option<&str>) -> ApiResult<Vec<Card>> {
    let q = q.map(str::trim).unwrap_or("").to_string();
    if q.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let cards = store::blocking(db.inner(), move |s| {
        Card::search(s, &q).context("Failed to search cards")
    })
    .await?;
    Ok(Json(cards))
}

#[post("/", data = "<body>")]
pub async fn create(_admin: AdminUser, db: &State<Db>, body: Json<Value>) -> ApiResult {
    let form = validate::card(&body).map_err(ApiError::BadRequest)?;
    let id = store::blocking(db.inner(), move |s| {
        Card::create(s, &form).context("Failed to create card")
    })
    .await?;
    Ok(Json(json!({ "id": id })))
}

#[put("/<id>", data = "<body>")]
pub async fn update(_admin: AdminUser, db: &State<Db>, id: &str, body: Json<Value>) -> ApiResult {
    let id = parse_id(id)?;
    let form = validate::card(&body).map_err(ApiError::BadRequest)?;
    let changed = store::blocking(db.inner(), move |s| {
        Card::update(s, id, &form).context("Failed to update card")
    })
    .await?;
    Ok(Json(json!({ "changed": changed })))
}

#[delete("/<id>")]
pub async fn delete(_admin: AdminUser, db: &State<Db>, id: &str) -> ApiResult {
    let id = parse_id(id)?;
    let deleted = store::blocking(db.inner(), move |s| {
        Card::delete(s, id).context("Failed to delete card")
    })
    .await?;
    Ok(Json(json!({ "deleted": deleted })))
}

// ── Batch operations ───────────────────────────────────

#[post("/batch/delete", data = "<body>")]
pub async fn batch_delete(_admin: AdminUser, db: &State<Db>, body: Json<Value>) -> ApiResult {
    let ids = validate::id_array(body.get("ids"), "card").map_err(ApiError::BadRequest)?;
    let deleted = store::blocking(db.inner(), move |s| {
        Card::delete_many(s, &ids).context("Failed to delete cards")
    })
    .await?;
    Ok(Json(json!({ "deleted": deleted })))
}

#[post("/batch/move", data = "<body>")]
pub async fn batch_move(_admin: AdminUser, db: &State<Db>, body: Json<Value>) -> ApiResult {
    let ids = validate::id_array(body.get("ids"), "card").map_err(ApiError::BadRequest)?;
    let menu_id = body
        .get("menu_id")
        .and_then(positive_int)
        .ok_or_else(|| ApiError::bad_request("Select a target menu"))?;
    let sub_menu_id = body.get("sub_menu_id").and_then(positive_int);
    let moved = store::blocking(db.inner(), move |s| {
        Card::move_many(s, &ids, menu_id, sub_menu_id).context("Failed to move cards")
    })
    .await?;
    Ok(Json(json!({ "moved": moved })))
}

#[post("/batch/reorder", data = "<body>")]
pub async fn batch_reorder(_admin: AdminUser, db: &State<Db>, body: Json<Value>) -> ApiResult {
    let items = validate::order_items(&body).map_err(ApiError::BadRequest)?;
    let updated = store::blocking(db.inner(), move |s| {
        Card::reorder(s, &items).context("Failed to reorder cards")
    })
    .await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

#[post("/batch/check-links", data = "<body>")]
pub async fn check_links(
    _admin: AdminUser,
    db: &State<Db>,
    body: Json<Value>,
) -> ApiResult<Vec<LinkStatus>> {
    let ids = validate::id_array(body.get("ids"), "card").map_err(ApiError::BadRequest)?;
    if ids.len() > links::MAX_LINKS {
        return Err(ApiError::bad_request(format!(
            "At most {} cards can be checked at once",
            links::MAX_LINKS
        )));
    }
    let cards = store::blocking(db.inner(), move |s| {
        Card::find_many(s, &ids).context("Failed to load cards")
    })
    .await?;

    let client = links::client(links::PROBE_TIMEOUT).map_err(|e| ApiError::Internal {
        context: "Failed to start link checker".to_string(),
        detail: e.to_string(),
    })?;
    let targets = cards.into_iter().map(|c| (c.id, c.url)).collect();
    Ok(Json(links::check_all(client, targets).await))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        list,
        search,
        create,
        update,
        delete,
        batch_delete,
        batch_move,
        batch_reorder,
        check_links
    ]
}
