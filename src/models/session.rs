use chrono::{Duration, Utc};

use super::user::User;
use crate::store::{Store, StoreError};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn now_utc() -> String {
    Utc::now().naive_utc().format(TIME_FORMAT).to_string()
}

/// Server-side bearer sessions. The raw token only ever lives in the
/// client; rows are keyed by its SHA-256.
pub struct Session;

impl Session {
    pub fn create(
        store: &dyn Store,
        user_id: i64,
        token_hash: &str,
        ip: Option<&str>,
        hours: i64,
    ) -> Result<(), StoreError> {
        let now = Utc::now().naive_utc();
        let expires = now + Duration::hours(hours.max(1));
        store.run(
            "INSERT INTO sessions (user_id, token_hash, ip, created_at, expires_at) VALUES (?, ?, ?, ?, ?)",
            args![
                user_id,
                token_hash,
                ip,
                now.format(TIME_FORMAT).to_string(),
                expires.format(TIME_FORMAT).to_string()
            ],
        )?;
        Ok(())
    }

    /// User owning an unexpired session.
    pub fn user_for(store: &dyn Store, token_hash: &str) -> Result<Option<User>, StoreError> {
        let row = store.get(
            "SELECT user_id FROM sessions WHERE token_hash = ? AND expires_at > ?",
            args![token_hash, now_utc()],
        )?;
        match row {
            Some(row) => User::get_by_id(store, row.i64("user_id")?),
            None => Ok(None),
        }
    }

    pub fn delete(store: &dyn Store, token_hash: &str) -> Result<u64, StoreError> {
        Ok(store
            .run("DELETE FROM sessions WHERE token_hash = ?", args![token_hash])?
            .changes)
    }

    /// Sessions of one user, used to sign out everywhere after a password change.
    pub fn delete_for_user_except(
        store: &dyn Store,
        user_id: i64,
        keep_hash: &str,
    ) -> Result<u64, StoreError> {
        Ok(store
            .run(
                "DELETE FROM sessions WHERE user_id = ? AND token_hash <> ?",
                args![user_id, keep_hash],
            )?
            .changes)
    }

    pub fn cleanup_expired(store: &dyn Store) -> Result<u64, StoreError> {
        Ok(store
            .run("DELETE FROM sessions WHERE expires_at <= ?", args![now_utc()])?
            .changes)
    }
}
