use serde::Serialize;

use super::{inserted_id, Page, PageRequest};
use crate::store::{Row, Store, StoreError};
use crate::validate::FriendForm;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Friend {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub logo: Option<String>,
}

impl Friend {
    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Friend {
            id: row.i64("id")?,
            title: row.string("title")?,
            url: row.string("url")?,
            logo: row.opt_string("logo")?,
        })
    }

    pub fn list(store: &dyn Store) -> Result<Vec<Self>, StoreError> {
        store
            .query("SELECT id, title, url, logo FROM friends ORDER BY id", &[])?
            .iter()
            .map(Self::from_row)
            .collect()
    }

    pub fn list_paginated(store: &dyn Store, page: PageRequest) -> Result<Page<Self>, StoreError> {
        let total = match store.get("SELECT COUNT(*) AS total FROM friends", &[])? {
            Some(row) => row.i64("total")?,
            None => 0,
        };
        let data = store
            .query(
                "SELECT id, title, url, logo FROM friends ORDER BY id LIMIT ? OFFSET ?",
                args![page.size, page.offset()],
            )?
            .iter()
            .map(Self::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(page, total, data))
    }

    pub fn create(store: &dyn Store, form: &FriendForm) -> Result<i64, StoreError> {
        inserted_id(store.run(
            "INSERT INTO friends (title, url, logo) VALUES (?, ?, ?)",
            args![&form.title, &form.url, &form.logo],
        )?)
    }

    pub fn update(store: &dyn Store, id: i64, form: &FriendForm) -> Result<u64, StoreError> {
        Ok(store
            .run(
                "UPDATE friends SET title = ?, url = ?, logo = ? WHERE id = ?",
                args![&form.title, &form.url, &form.logo, id],
            )?
            .changes)
    }

    pub fn delete(store: &dyn Store, id: i64) -> Result<u64, StoreError> {
        Ok(store.run("DELETE FROM friends WHERE id = ?", args![id])?.changes)
    }
}
