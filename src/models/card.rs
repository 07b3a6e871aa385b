use serde::Serialize;

use super::menu::reorder_table;
use super::{id_values, inserted_id, non_empty, placeholders};
use crate::store::{Dialect, Row, Store, StoreError, Value};
use crate::validate::{CardForm, OrderItem};

pub const SEARCH_LIMIT: i64 = 100;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Card {
    pub id: i64,
    pub menu_id: Option<i64>,
    pub sub_menu_id: Option<i64>,
    pub title: String,
    pub url: String,
    pub logo_url: Option<String>,
    pub custom_logo_path: Option<String>,
    pub desc: Option<String>,
    pub order: i64,
    /// Logo the UI should show: uploaded file, explicit logo, or the
    /// site's favicon.
    pub display_logo: String,
}

pub fn display_logo(url: &str, logo_url: Option<&str>, custom_logo_path: Option<&str>) -> String {
    if let Some(path) = custom_logo_path.filter(|p| !p.is_empty()) {
        return format!("/uploads/{}", path);
    }
    if let Some(logo) = logo_url.filter(|l| !l.is_empty()) {
        return logo.to_string();
    }
    format!("{}/favicon.ico", url.trim_end_matches('/'))
}

/// Card insert that silently skips rows hitting the per-menu URL
/// uniqueness index. Binds the same eight columns as `Card::create`.
pub fn insert_ignore_sql(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite => {
            "INSERT OR IGNORE INTO cards (menu_id, sub_menu_id, title, url, logo_url, custom_logo_path, \"desc\", \"order\")
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        }
        Dialect::Postgres => {
            "INSERT INTO cards (menu_id, sub_menu_id, title, url, logo_url, custom_logo_path, \"desc\", \"order\")
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) ON CONFLICT DO NOTHING"
        }
    }
}

const COLUMNS: &str =
    "id, menu_id, sub_menu_id, title, url, logo_url, custom_logo_path, \"desc\", \"order\"";

impl Card {
    fn from_row(row: &Row) -> Result<Self, StoreError> {
        let url = row.string("url")?;
        let logo_url = non_empty(row.opt_string("logo_url")?);
        let custom_logo_path = non_empty(row.opt_string("custom_logo_path")?);
        let display_logo = display_logo(&url, logo_url.as_deref(), custom_logo_path.as_deref());
        Ok(Card {
            id: row.i64("id")?,
            menu_id: row.opt_i64("menu_id")?,
            sub_menu_id: row.opt_i64("sub_menu_id")?,
            title: row.string("title")?,
            url,
            logo_url,
            custom_logo_path,
            desc: row.opt_string("desc")?,
            order: row.opt_i64("order")?.unwrap_or(0),
            display_logo,
        })
    }

    fn collect(rows: Vec<Row>) -> Result<Vec<Self>, StoreError> {
        rows.iter().map(Self::from_row).collect()
    }

    /// Cards of a sub-menu when `sub_menu_id` is given, otherwise the cards
    /// sitting directly under the menu.
    pub fn list_for(
        store: &dyn Store,
        menu_id: i64,
        sub_menu_id: Option<i64>,
    ) -> Result<Vec<Self>, StoreError> {
        let rows = match sub_menu_id {
            Some(sub) => store.query(
                &format!("SELECT {} FROM cards WHERE sub_menu_id = ? ORDER BY \"order\", id", COLUMNS),
                args![sub],
            )?,
            None => store.query(
                &format!(
                    "SELECT {} FROM cards WHERE menu_id = ? AND sub_menu_id IS NULL ORDER BY \"order\", id",
                    COLUMNS
                ),
                args![menu_id],
            )?,
        };
        Self::collect(rows)
    }

    pub fn find_by_id(store: &dyn Store, id: i64) -> Result<Option<Self>, StoreError> {
        store
            .get(&format!("SELECT {} FROM cards WHERE id = ?", COLUMNS), args![id])?
            .map(|r| Self::from_row(&r))
            .transpose()
    }

    pub fn find_many(store: &dyn Store, ids: &[i64]) -> Result<Vec<Self>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM cards WHERE id IN ({}) ORDER BY id",
            COLUMNS,
            placeholders(ids.len())
        );
        Self::collect(store.query(&sql, &id_values(ids))?)
    }

    /// Case-insensitive match on title, url and description. Both sides
    /// go through the backend's `LOWER` so they fold the same way.
    pub fn search(store: &dyn Store, q: &str) -> Result<Vec<Self>, StoreError> {
        let escaped = q
            .trim()
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{}%", escaped);
        let sql = format!(
            "SELECT {} FROM cards
             WHERE LOWER(title) LIKE LOWER(?) ESCAPE '\\'
                OR LOWER(url) LIKE LOWER(?) ESCAPE '\\'
                OR LOWER(COALESCE(\"desc\", '')) LIKE LOWER(?) ESCAPE '\\'
             ORDER BY \"order\", id LIMIT ?",
            COLUMNS
        );
        Self::collect(store.query(&sql, args![&pattern, &pattern, &pattern, SEARCH_LIMIT])?)
    }

    pub fn count(store: &dyn Store) -> Result<i64, StoreError> {
        match store.get("SELECT COUNT(*) AS total FROM cards", &[])? {
            Some(row) => row.i64("total"),
            None => Ok(0),
        }
    }

    pub fn create(store: &dyn Store, form: &CardForm) -> Result<i64, StoreError> {
        inserted_id(store.run(
            "INSERT INTO cards (menu_id, sub_menu_id, title, url, logo_url, custom_logo_path, \"desc\", \"order\")
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            args![
                form.menu_id,
                form.sub_menu_id,
                &form.title,
                &form.url,
                &form.logo_url,
                &form.custom_logo_path,
                &form.desc,
                form.order
            ],
        )?)
    }

    pub fn update(store: &dyn Store, id: i64, form: &CardForm) -> Result<u64, StoreError> {
        Ok(store
            .run(
                "UPDATE cards SET menu_id = ?, sub_menu_id = ?, title = ?, url = ?, logo_url = ?,
                 custom_logo_path = ?, \"desc\" = ?, \"order\" = ? WHERE id = ?",
                args![
                    form.menu_id,
                    form.sub_menu_id,
                    &form.title,
                    &form.url,
                    &form.logo_url,
                    &form.custom_logo_path,
                    &form.desc,
                    form.order,
                    id
                ],
            )?
            .changes)
    }

    pub fn delete(store: &dyn Store, id: i64) -> Result<u64, StoreError> {
        Ok(store.run("DELETE FROM cards WHERE id = ?", args![id])?.changes)
    }

    pub fn delete_many(store: &dyn Store, ids: &[i64]) -> Result<u64, StoreError> {
        let sql = format!("DELETE FROM cards WHERE id IN ({})", placeholders(ids.len()));
        Ok(store.run(&sql, &id_values(ids))?.changes)
    }

    pub fn move_many(
        store: &dyn Store,
        ids: &[i64],
        menu_id: i64,
        sub_menu_id: Option<i64>,
    ) -> Result<u64, StoreError> {
        let sql = format!(
            "UPDATE cards SET menu_id = ?, sub_menu_id = ? WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut params = vec![Value::from(menu_id), Value::from(sub_menu_id)];
        params.extend(id_values(ids));
        Ok(store.run(&sql, &params)?.changes)
    }

    pub fn reorder(store: &dyn Store, items: &[OrderItem]) -> Result<u64, StoreError> {
        reorder_table(store, "cards", items)
    }
}

#[cfg(test)]
mod tests {
    use super::display_logo;

    #[test]
    fn display_logo_prefers_upload_then_logo_then_favicon() {
        assert_eq!(
            display_logo("https://a.com", Some("https://cdn/x.png"), Some("1.png")),
            "/uploads/1.png"
        );
        assert_eq!(
            display_logo("https://a.com", Some("https://cdn/x.png"), Some("")),
            "https://cdn/x.png"
        );
        assert_eq!(
            display_logo("https://a.com///", None, None),
            "https://a.com/favicon.ico"
        );
    }
}
