//! Input checks for JSON bodies. Bodies arrive loosely typed from the admin
//! UI (ids may be numbers or numeric strings), so validators read
//! `serde_json::Value` and return sanitized, typed forms.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)^https?://[^\s<>"]+$"#).expect("valid url regex"))
}

pub fn is_valid_url(url: &str) -> bool {
    url_re().is_match(url)
}

/// Trim and cut to at most `max` characters.
pub fn sanitize(s: &str, max: usize) -> String {
    s.trim().chars().take(max).collect()
}

/// Integer from a JSON number or a numeric string. Fractions are rejected.
pub fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        }
        _ => None,
    }
}

pub fn positive_int(v: &Value) -> Option<i64> {
    as_int(v).filter(|n| *n > 0)
}

pub fn non_negative_int(v: &Value) -> Option<i64> {
    as_int(v).filter(|n| *n >= 0)
}

/// Non-empty trimmed string field.
fn text<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Optional string field, empty when absent or not a string.
fn opt_text<'a>(body: &'a Value, key: &str) -> &'a str {
    body.get(key).and_then(Value::as_str).unwrap_or("")
}

fn field<'a>(body: &'a Value, key: &str) -> &'a Value {
    body.get(key).unwrap_or(&Value::Null)
}

/// `order` defaults to 0 unless it is a non-negative integer.
pub fn order_of(body: &Value) -> i64 {
    non_negative_int(field(body, "order")).unwrap_or(0)
}

// ── Menus ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct NameForm {
    pub name: String,
    pub order: i64,
}

/// Menu and sub-menu bodies: `{name, order}`.
pub fn menu_name(body: &Value, what: &str) -> Result<NameForm, String> {
    let name = text(body, "name").ok_or_else(|| format!("{} name is required", what))?;
    if name.chars().count() > 50 {
        return Err(format!("{} name must be at most 50 characters", what));
    }
    Ok(NameForm {
        name: name.to_string(),
        order: order_of(body),
    })
}

// ── Cards ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct CardForm {
    pub menu_id: i64,
    pub sub_menu_id: Option<i64>,
    pub title: String,
    pub url: String,
    pub logo_url: String,
    pub custom_logo_path: String,
    pub desc: String,
    pub order: i64,
}

pub fn card(body: &Value) -> Result<CardForm, String> {
    let mut errors = Vec::new();

    let menu_id = positive_int(field(body, "menu_id"));
    if menu_id.is_none() {
        errors.push("a valid menu is required".to_string());
    }

    match text(body, "title") {
        None => errors.push("title is required".to_string()),
        Some(t) if t.chars().count() > 100 => {
            errors.push("title must be at most 100 characters".to_string())
        }
        Some(_) => {}
    }

    match text(body, "url") {
        None => errors.push("url is required".to_string()),
        Some(u) if !is_valid_url(u) => {
            errors.push("url must start with http:// or https://".to_string())
        }
        Some(_) => {}
    }

    if opt_text(body, "desc").chars().count() > 500 {
        errors.push("description must be at most 500 characters".to_string());
    }

    let Some(menu_id) = menu_id.filter(|_| errors.is_empty()) else {
        return Err(errors.join("; "));
    };

    Ok(CardForm {
        menu_id,
        sub_menu_id: positive_int(field(body, "sub_menu_id")),
        title: sanitize(opt_text(body, "title"), 100),
        url: sanitize(opt_text(body, "url"), 2000),
        logo_url: sanitize(opt_text(body, "logo_url"), 2000),
        custom_logo_path: sanitize(opt_text(body, "custom_logo_path"), 500),
        desc: sanitize(opt_text(body, "desc"), 500),
        order: order_of(body),
    })
}

// ── Ads ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct AdForm {
    pub position: String,
    pub img: String,
    pub url: String,
}

pub fn ad(body: &Value) -> Result<AdForm, String> {
    let mut errors = Vec::new();

    let position = body.get("position").and_then(Value::as_str).unwrap_or("");
    if position != "left" && position != "right" {
        errors.push("position must be left or right".to_string());
    }
    if text(body, "img").is_none() {
        errors.push("image is required".to_string());
    }
    match text(body, "url") {
        None => errors.push("url is required".to_string()),
        Some(u) if !is_valid_url(u) => errors.push("url is not valid".to_string()),
        Some(_) => {}
    }

    if !errors.is_empty() {
        return Err(errors.join("; "));
    }
    Ok(AdForm {
        position: position.to_string(),
        img: sanitize(opt_text(body, "img"), 2000),
        url: sanitize(opt_text(body, "url"), 2000),
    })
}

// ── Friends ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct FriendForm {
    pub title: String,
    pub url: String,
    pub logo: String,
}

pub fn friend(body: &Value) -> Result<FriendForm, String> {
    let mut errors = Vec::new();

    match text(body, "title") {
        None => errors.push("site name is required".to_string()),
        Some(t) if t.chars().count() > 100 => {
            errors.push("site name must be at most 100 characters".to_string())
        }
        Some(_) => {}
    }
    match text(body, "url") {
        None => errors.push("url is required".to_string()),
        Some(u) if !is_valid_url(u) => errors.push("url is not valid".to_string()),
        Some(_) => {}
    }

    if !errors.is_empty() {
        return Err(errors.join("; "));
    }
    Ok(FriendForm {
        title: sanitize(opt_text(body, "title"), 100),
        url: sanitize(opt_text(body, "url"), 2000),
        logo: sanitize(opt_text(body, "logo"), 2000),
    })
}

// ── Id lists ────────────────────────────────────────────

/// Non-empty array of ids. Entries that are not positive integers are
/// dropped; the list fails when nothing is left.
pub fn id_array(v: Option<&Value>, what: &str) -> Result<Vec<i64>, String> {
    let items = match v.and_then(Value::as_array) {
        Some(items) if !items.is_empty() => items,
        _ => return Err(format!("select at least one {}", what)),
    };
    let ids: Vec<i64> = items.iter().filter_map(positive_int).collect();
    if ids.is_empty() {
        return Err(format!("invalid {} ids", what));
    }
    Ok(ids)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderItem {
    pub id: i64,
    pub order: i64,
}

/// Reorder bodies: `{orders: [{id, order}, ...]}` or a bare array.
pub fn order_items(body: &Value) -> Result<Vec<OrderItem>, String> {
    let items = body
        .get("orders")
        .or_else(|| body.get("items"))
        .unwrap_or(body)
        .as_array()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| "orders must be a non-empty array".to_string())?;

    items
        .iter()
        .map(|item| {
            let id = positive_int(field(item, "id"));
            let order = non_negative_int(field(item, "order"));
            match (id, order) {
                (Some(id), Some(order)) => Ok(OrderItem { id, order }),
                _ => Err("each entry needs a positive id and a non-negative order".to_string()),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_check() {
        assert!(is_valid_url("https://example.com/a?b=c"));
        assert!(is_valid_url("HTTP://例子.测试"));
        assert!(!is_valid_url("ftp://example.com"));
        assert!(!is_valid_url("https://exa mple.com"));
        assert!(!is_valid_url("javascript:alert(1)"));
    }

    #[test]
    fn ints_accept_numeric_strings() {
        assert_eq!(as_int(&json!("12")), Some(12));
        assert_eq!(as_int(&json!(3.0)), Some(3));
        assert_eq!(as_int(&json!(3.5)), None);
        assert_eq!(positive_int(&json!(0)), None);
        assert_eq!(non_negative_int(&json!("0")), Some(0));
        assert_eq!(as_int(&json!(null)), None);
        assert_eq!(as_int(&json!("")), None);
    }

    #[test]
    fn menu_name_rules() {
        let f = menu_name(&json!({"name": "  Tools ", "order": "3"}), "Menu").unwrap();
        assert_eq!(f, NameForm { name: "Tools".into(), order: 3 });
        assert!(menu_name(&json!({"name": "   "}), "Menu").is_err());
        assert!(menu_name(&json!({"name": 5}), "Menu").is_err());
        assert!(menu_name(&json!({"name": "x".repeat(51)}), "Menu").is_err());
        assert_eq!(menu_name(&json!({"name": "a", "order": -1}), "Menu").unwrap().order, 0);
    }

    #[test]
    fn card_collects_all_errors() {
        let err = card(&json!({"title": "", "url": "nope"})).unwrap_err();
        assert_eq!(
            err,
            "a valid menu is required; title is required; url must start with http:// or https://"
        );
    }

    #[test]
    fn card_sanitizes_fields() {
        let f = card(&json!({
            "menu_id": "2",
            "sub_menu_id": "",
            "title": "  Rust  ",
            "url": " https://www.rust-lang.org ",
            "desc": null,
            "order": 4
        }))
        .unwrap();
        assert_eq!(f.menu_id, 2);
        assert_eq!(f.sub_menu_id, None);
        assert_eq!(f.title, "Rust");
        assert_eq!(f.url, "https://www.rust-lang.org");
        assert_eq!(f.logo_url, "");
        assert_eq!(f.order, 4);
    }

    #[test]
    fn ad_position_is_checked() {
        assert!(ad(&json!({"position": "top", "img": "a.png", "url": "https://a.b"})).is_err());
        let f = ad(&json!({"position": "left", "img": " a.png ", "url": "https://a.b"})).unwrap();
        assert_eq!(f.img, "a.png");
    }

    #[test]
    fn friend_requires_title_and_url() {
        assert!(friend(&json!({"url": "https://a.b"})).is_err());
        let f = friend(&json!({"title": "Blog", "url": "https://a.b"})).unwrap();
        assert_eq!(f.logo, "");
    }

    #[test]
    fn id_array_filters_invalid_entries() {
        assert_eq!(id_array(Some(&json!([1, "2", -3, "x"])), "card").unwrap(), vec![1, 2]);
        assert!(id_array(Some(&json!([])), "card").is_err());
        assert!(id_array(Some(&json!(["x"])), "card").is_err());
        assert!(id_array(None, "card").is_err());
    }

    #[test]
    fn order_items_shapes() {
        let items = order_items(&json!({"orders": [{"id": 1, "order": 2}]})).unwrap();
        assert_eq!(items, vec![OrderItem { id: 1, order: 2 }]);
        assert!(order_items(&json!([{"id": 1, "order": 0}])).is_ok());
        assert!(order_items(&json!({"orders": [{"id": 0, "order": 1}]})).is_err());
        assert!(order_items(&json!({"orders": []})).is_err());
    }
}
