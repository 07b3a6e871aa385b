pub mod bookmarks;

use std::time::{Duration, Instant};

use serde::Serialize;

use self::bookmarks::Bookmark;
use crate::models::card::insert_ignore_sql;
use crate::store::Store;

/// Imports stop and report what they managed after this long.
pub const IMPORT_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: u64,
    /// Bookmarks whose URL already exists in the target menu.
    pub skipped: u64,
    pub total: usize,
    pub errors: u64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub timeout: bool,
    #[serde(rename = "requestId")]
    pub request_id: String,
}

/// Parse an uploaded bookmark file: `.json` names as JSON, anything
/// else as HTML.
pub fn parse_file(filename: &str, content: &str) -> Result<Vec<Bookmark>, String> {
    if filename.to_ascii_lowercase().ends_with(".json") {
        let doc: serde_json::Value =
            serde_json::from_str(content).map_err(|e| format!("could not parse file: {}", e))?;
        Ok(bookmarks::parse_json(&doc))
    } else {
        Ok(bookmarks::parse_html(content))
    }
}

/// Insert bookmarks as cards in file order, each taking its position as
/// `order`. Failures on single rows are counted and logged, not fatal.
pub fn import_cards(
    store: &dyn Store,
    bookmarks: &[Bookmark],
    menu_id: i64,
    sub_menu_id: Option<i64>,
    request_id: &str,
    deadline: Duration,
) -> ImportSummary {
    let started = Instant::now();
    let sql = insert_ignore_sql(store.dialect());
    let mut summary = ImportSummary {
        imported: 0,
        skipped: 0,
        total: bookmarks.len(),
        errors: 0,
        timeout: false,
        request_id: request_id.to_string(),
    };

    log::info!(
        "Import [{}]: {} bookmarks into menu {}{}",
        request_id,
        bookmarks.len(),
        menu_id,
        sub_menu_id.map(|s| format!(", sub-menu {}", s)).unwrap_or_default()
    );

    for (i, b) in bookmarks.iter().enumerate() {
        if started.elapsed() >= deadline {
            summary.timeout = true;
            log::warn!("Import [{}] hit the deadline after {} of {}", request_id, i, bookmarks.len());
            break;
        }
        match store.run(sql, args![menu_id, sub_menu_id, &b.title, &b.url, "", "", "", i]) {
            Ok(r) if r.changes > 0 => summary.imported += 1,
            Ok(_) => summary.skipped += 1,
            Err(e) => {
                summary.errors += 1;
                log::error!("Import [{}] failed for '{}': {}", request_id, b.title, e);
            }
        }
    }

    log::info!(
        "Import [{}] done: {} imported, {} skipped, {} failed, {} total",
        request_id,
        summary.imported,
        summary.skipped,
        summary.errors,
        summary.total
    );
    summary
}

/// Fallback request id when the client did not send `X-Request-Id`.
pub fn new_request_id() -> String {
    format!(
        "{}-{}",
        chrono::Utc::now().timestamp_millis(),
        &uuid::Uuid::new_v4().simple().to_string()[..12]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_kind_by_extension() {
        let json = r#"[{"name": "A", "url": "https://a.com"}]"#;
        assert_eq!(parse_file("Bookmarks.JSON", json).unwrap().len(), 1);
        assert!(parse_file("b.json", "<html>").is_err());
        let html = r#"<a href="https://a.com">A</a>"#;
        assert_eq!(parse_file("bookmarks.html", html).unwrap().len(), 1);
        assert!(parse_file("notes.txt", "nothing here").unwrap().is_empty());
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(new_request_id(), new_request_id());
    }
}
