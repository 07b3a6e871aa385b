use serde::Serialize;

use super::{inserted_id, Page, PageRequest};
use crate::store::{Row, Store, StoreError};
use crate::validate::AdForm;

/// Banner ad shown in the left or right rail.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Ad {
    pub id: i64,
    pub position: String,
    pub img: String,
    pub url: String,
}

impl Ad {
    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Ad {
            id: row.i64("id")?,
            position: row.string("position")?,
            img: row.string("img")?,
            url: row.string("url")?,
        })
    }

    pub fn list(store: &dyn Store) -> Result<Vec<Self>, StoreError> {
        store
            .query("SELECT id, position, img, url FROM ads ORDER BY id", &[])?
            .iter()
            .map(Self::from_row)
            .collect()
    }

    pub fn list_paginated(store: &dyn Store, page: PageRequest) -> Result<Page<Self>, StoreError> {
        let total = match store.get("SELECT COUNT(*) AS total FROM ads", &[])? {
            Some(row) => row.i64("total")?,
            None => 0,
        };
        let data = store
            .query(
                "SELECT id, position, img, url FROM ads ORDER BY id LIMIT ? OFFSET ?",
                args![page.size, page.offset()],
            )?
            .iter()
            .map(Self::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(page, total, data))
    }

    pub fn create(store: &dyn Store, form: &AdForm) -> Result<i64, StoreError> {
        inserted_id(store.run(
            "INSERT INTO ads (position, img, url) VALUES (?, ?, ?)",
            args![&form.position, &form.img, &form.url],
        )?)
    }

    pub fn update(store: &dyn Store, id: i64, form: &AdForm) -> Result<u64, StoreError> {
        Ok(store
            .run(
                "UPDATE ads SET position = ?, img = ?, url = ? WHERE id = ?",
                args![&form.position, &form.img, &form.url, id],
            )?
            .changes)
    }

    pub fn delete(store: &dyn Store, id: i64) -> Result<u64, StoreError> {
        Ok(store.run("DELETE FROM ads WHERE id = ?", args![id])?.changes)
    }
}
