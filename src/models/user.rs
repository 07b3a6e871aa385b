use serde::Serialize;

use super::{Page, PageRequest};
use crate::store::{Row, Store, StoreError};

#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub last_login_time: Option<String>,
    pub last_login_ip: Option<String>,
}

/// Public view used by the user list.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
}

impl User {
    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(User {
            id: row.i64("id")?,
            username: row.string("username")?,
            password_hash: row.string("password")?,
            last_login_time: row.opt_string("last_login_time")?,
            last_login_ip: row.opt_string("last_login_ip")?,
        })
    }

    const SELECT_COLS: &'static str = "id, username, password, last_login_time, last_login_ip";

    // ── Lookups ──

    pub fn get_by_id(store: &dyn Store, id: i64) -> Result<Option<User>, StoreError> {
        store
            .get(&format!("SELECT {} FROM users WHERE id = ?", Self::SELECT_COLS), args![id])?
            .map(|r| Self::from_row(&r))
            .transpose()
    }

    pub fn get_by_username(store: &dyn Store, username: &str) -> Result<Option<User>, StoreError> {
        store
            .get(
                &format!("SELECT {} FROM users WHERE username = ?", Self::SELECT_COLS),
                args![username],
            )?
            .map(|r| Self::from_row(&r))
            .transpose()
    }

    pub fn list(store: &dyn Store) -> Result<Vec<UserSummary>, StoreError> {
        store
            .query("SELECT id, username FROM users ORDER BY id", &[])?
            .iter()
            .map(UserSummary::from_row)
            .collect()
    }

    pub fn list_paginated(
        store: &dyn Store,
        page: PageRequest,
    ) -> Result<Page<UserSummary>, StoreError> {
        let total = match store.get("SELECT COUNT(*) AS total FROM users", &[])? {
            Some(row) => row.i64("total")?,
            None => 0,
        };
        let data = store
            .query(
                "SELECT id, username FROM users ORDER BY id LIMIT ? OFFSET ?",
                args![page.size, page.offset()],
            )?
            .iter()
            .map(UserSummary::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(page, total, data))
    }

    // ── Updates ──

    pub fn record_login(store: &dyn Store, id: i64, time: &str, ip: &str) -> Result<(), StoreError> {
        store.run(
            "UPDATE users SET last_login_time = ?, last_login_ip = ? WHERE id = ?",
            args![time, ip, id],
        )?;
        Ok(())
    }

    pub fn update_password(store: &dyn Store, id: i64, hash: &str) -> Result<u64, StoreError> {
        Ok(store
            .run("UPDATE users SET password = ? WHERE id = ?", args![hash, id])?
            .changes)
    }
}

impl UserSummary {
    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(UserSummary {
            id: row.i64("id")?,
            username: row.string("username")?,
        })
    }
}
