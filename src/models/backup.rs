//! Whole-site JSON snapshot of menus, sub-menus, cards, ads and friends.

use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value as Json};

use super::card::insert_ignore_sql;
use crate::store::{Executor, Store, StoreError};
use crate::validate::as_int;

pub const BACKUP_VERSION: &str = "1.0";

const TABLES: &[&str] = &["menus", "sub_menus", "cards", "ads", "friends"];

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ImportCounts {
    pub menus: u64,
    pub sub_menus: u64,
    pub cards: u64,
    pub ads: u64,
    pub friends: u64,
}

pub fn export(store: &dyn Store) -> Result<Json, StoreError> {
    let mut data = serde_json::Map::new();
    for table in TABLES {
        let rows = store.query(&format!("SELECT * FROM {} ORDER BY id", table), &[])?;
        data.insert(
            table.to_string(),
            Json::Array(rows.iter().map(|r| r.to_json()).collect()),
        );
    }
    Ok(json!({
        "version": BACKUP_VERSION,
        "exportTime": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "data": data,
    }))
}

// ── Import ──

fn records<'a>(data: &'a Json, key: &str) -> Result<&'a [Json], BackupError> {
    match data.get(key) {
        None | Some(Json::Null) => Ok(&[]),
        Some(Json::Array(items)) => Ok(items),
        Some(_) => Err(BackupError::Invalid(format!("{} must be an array", key))),
    }
}

/// Trimmed non-empty string field.
fn name_field<'a>(record: &'a Json, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Json::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn str_field<'a>(record: &'a Json, key: &str) -> &'a str {
    record.get(key).and_then(Json::as_str).unwrap_or("")
}

fn int_field(record: &Json, key: &str) -> Option<i64> {
    record.get(key).and_then(as_int)
}

/// New id for an exported id, or the exported id itself when the record
/// it pointed at was not part of the backup.
fn remap(map: &HashMap<i64, i64>, old: Option<i64>) -> Option<i64> {
    old.map(|id| map.get(&id).copied().unwrap_or(id))
}

/// Restore a backup's `data` object in one transaction. Any invalid record
/// or database error rolls the whole import back.
pub fn import(store: &dyn Store, data: &Json, overwrite: bool) -> Result<ImportCounts, BackupError> {
    if !data.is_object() {
        return Err(BackupError::Invalid("invalid backup data".to_string()));
    }

    store.transaction(|tx: &mut dyn Executor| {
        let mut counts = ImportCounts::default();

        if overwrite {
            for table in ["cards", "sub_menus", "menus", "ads", "friends"] {
                tx.run(&format!("DELETE FROM {}", table), &[])?;
            }
        }

        let mut menu_ids = HashMap::new();
        for menu in records(data, "menus")? {
            let name = name_field(menu, "name").ok_or_else(|| {
                BackupError::Invalid("invalid menu data: name must not be empty".to_string())
            })?;
            let r = tx.run(
                "INSERT INTO menus (name, \"order\") VALUES (?, ?)",
                args![name, int_field(menu, "order").unwrap_or(0)],
            )?;
            if let (Some(old), Some(new)) = (int_field(menu, "id"), r.last_id) {
                menu_ids.insert(old, new);
            }
            counts.menus += 1;
        }

        let mut sub_menu_ids = HashMap::new();
        for sub in records(data, "sub_menus")? {
            let name = name_field(sub, "name").ok_or_else(|| {
                BackupError::Invalid("invalid sub-menu data: name must not be empty".to_string())
            })?;
            let r = tx.run(
                "INSERT INTO sub_menus (parent_id, name, \"order\") VALUES (?, ?, ?)",
                args![
                    remap(&menu_ids, int_field(sub, "parent_id")),
                    name,
                    int_field(sub, "order").unwrap_or(0)
                ],
            )?;
            if let (Some(old), Some(new)) = (int_field(sub, "id"), r.last_id) {
                sub_menu_ids.insert(old, new);
            }
            counts.sub_menus += 1;
        }

        let card_sql = insert_ignore_sql(tx.dialect());
        for card in records(data, "cards")? {
            let title = name_field(card, "title").ok_or_else(|| {
                BackupError::Invalid("invalid card data: title must not be empty".to_string())
            })?;
            let sub_menu_id = int_field(card, "sub_menu_id").filter(|id| *id != 0);
            let r = tx.run(
                card_sql,
                args![
                    remap(&menu_ids, int_field(card, "menu_id")),
                    remap(&sub_menu_ids, sub_menu_id),
                    title,
                    str_field(card, "url"),
                    str_field(card, "logo_url"),
                    str_field(card, "custom_logo_path"),
                    str_field(card, "desc"),
                    int_field(card, "order").unwrap_or(0)
                ],
            )?;
            counts.cards += r.changes;
        }

        for ad in records(data, "ads")? {
            let (Some(position), Some(img)) = (
                ad.get("position").and_then(Json::as_str),
                ad.get("img").and_then(Json::as_str),
            ) else {
                return Err(BackupError::Invalid(
                    "invalid ad data: position and img are required".to_string(),
                ));
            };
            tx.run(
                "INSERT INTO ads (position, img, url) VALUES (?, ?, ?)",
                args![position, img, str_field(ad, "url")],
            )?;
            counts.ads += 1;
        }

        for friend in records(data, "friends")? {
            let (Some(title), Some(url)) = (
                friend.get("title").and_then(Json::as_str),
                friend.get("url").and_then(Json::as_str),
            ) else {
                return Err(BackupError::Invalid(
                    "invalid friend data: title and url are required".to_string(),
                ));
            };
            tx.run(
                "INSERT INTO friends (title, url, logo) VALUES (?, ?, ?)",
                args![title.trim(), url, str_field(friend, "logo")],
            )?;
            counts.friends += 1;
        }

        Ok(counts)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_falls_back_to_original_id() {
        let map = HashMap::from([(3, 10)]);
        assert_eq!(remap(&map, Some(3)), Some(10));
        assert_eq!(remap(&map, Some(4)), Some(4));
        assert_eq!(remap(&map, None), None);
    }

    #[test]
    fn records_must_be_arrays() {
        let data = json!({"menus": [{"name": "a"}], "ads": {}, "friends": null});
        assert_eq!(records(&data, "menus").unwrap().len(), 1);
        assert!(records(&data, "cards").unwrap().is_empty());
        assert!(records(&data, "friends").unwrap().is_empty());
        assert!(matches!(records(&data, "ads"), Err(BackupError::Invalid(_))));
    }
}
