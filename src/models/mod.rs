use serde::Serialize;

use crate::store::{RunResult, StoreError, Value};

pub mod ad;
pub mod backup;
pub mod card;
pub mod friend;
pub mod menu;
pub mod session;
pub mod stats;
pub mod user;

// ── Pagination ──────────────────────────────────────────

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
}

fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && *c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

impl PageRequest {
    /// `None` when neither `page` nor `pageSize` was supplied, meaning the
    /// caller wants the plain, unpaginated list.
    pub fn from_query(page: Option<&str>, size: Option<&str>) -> Option<Self> {
        let page = page.map(str::trim).filter(|s| !s.is_empty());
        let size = size.map(str::trim).filter(|s| !s.is_empty());
        if page.is_none() && size.is_none() {
            return None;
        }
        let page = page.and_then(leading_int).filter(|p| *p != 0).unwrap_or(1);
        let size = size
            .and_then(leading_int)
            .filter(|s| *s != 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        Some(PageRequest {
            page: page.max(1),
            size: size.clamp(1, MAX_PAGE_SIZE),
        })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.size
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub total: i64,
    pub page: i64,
    #[serde(rename = "pageSize")]
    pub page_size: i64,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(req: PageRequest, total: i64, data: Vec<T>) -> Self {
        Page {
            total,
            page: req.page,
            page_size: req.size,
            data,
        }
    }
}

/// Either the whole table or one page of it, serialized untagged.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Listing<T> {
    All(Vec<T>),
    Paged(Page<T>),
}

// ── Helpers shared by the models ────────────────────────

pub(crate) fn inserted_id(r: RunResult) -> Result<i64, StoreError> {
    r.last_id
        .ok_or_else(|| StoreError::Decode("insert did not return a row id".to_string()))
}

/// `?, ?, ?` for an IN list of `n` items.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

pub(crate) fn id_values(ids: &[i64]) -> Vec<Value> {
    ids.iter().map(|id| Value::Integer(*id)).collect()
}

/// Empty strings stored by older clients mean "not set".
pub(crate) fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_paging_params_means_full_list() {
        assert_eq!(PageRequest::from_query(None, None), None);
        assert_eq!(PageRequest::from_query(Some(""), Some(" ")), None);
    }

    #[test]
    fn paging_is_clamped() {
        let p = PageRequest::from_query(Some("0"), Some("1000")).unwrap();
        assert_eq!(p, PageRequest { page: 1, size: 100 });
        let p = PageRequest::from_query(Some("-4"), Some("abc")).unwrap();
        assert_eq!(p, PageRequest { page: 1, size: 10 });
        let p = PageRequest::from_query(Some("3"), None).unwrap();
        assert_eq!(p.offset(), 20);
        let p = PageRequest::from_query(None, Some("25px")).unwrap();
        assert_eq!(p, PageRequest { page: 1, size: 25 });
    }

    #[test]
    fn placeholder_list() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(1), "?");
    }
}
