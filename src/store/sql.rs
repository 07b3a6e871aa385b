//! Statement text rewriting shared by the PostgreSQL backend.
//!
//! All SQL in the crate is written SQLite-style with `?` placeholders.
//! PostgreSQL wants `$1..$n`, or fully inlined literals when running
//! through the simple query protocol.

use std::sync::OnceLock;

use regex::Regex;

use super::{StoreError, Value};

/// Walk `sql` and replace every `?` that sits outside a quoted literal,
/// quoted identifier or comment with `replace(index)` (0-based).
fn rewrite_placeholders<F>(sql: &str, mut replace: F) -> Result<String, StoreError>
where
    F: FnMut(usize) -> Result<String, StoreError>,
{
    let mut out = String::with_capacity(sql.len() + 16);
    let mut chars = sql.chars().peekable();
    let mut index = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                // '' and "" inside a quoted run are escapes, which this
                // loop handles naturally by closing and reopening.
                out.push(c);
                for inner in chars.by_ref() {
                    out.push(inner);
                    if inner == c {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                out.push(c);
                for inner in chars.by_ref() {
                    out.push(inner);
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '?' => {
                out.push_str(&replace(index)?);
                index += 1;
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Number of `?` placeholders outside quotes.
pub fn count_placeholders(sql: &str) -> usize {
    let mut n = 0;
    let _ = rewrite_placeholders(sql, |_| {
        n += 1;
        Ok(String::new())
    });
    n
}

/// `?` → `$1`, `$2`, ... left to right.
pub fn number_placeholders(sql: &str) -> String {
    rewrite_placeholders(sql, |i| Ok(format!("${}", i + 1))).unwrap_or_else(|_| sql.to_string())
}

/// Substitute every placeholder with the SQL literal of its parameter.
pub fn inline_params(sql: &str, params: &[Value]) -> Result<String, StoreError> {
    let expected = count_placeholders(sql);
    if params.len() > expected {
        return Err(StoreError::ParamCount {
            expected,
            got: params.len(),
        });
    }
    rewrite_placeholders(sql, |i| match params.get(i) {
        Some(v) => pg_literal(v),
        None => Err(StoreError::MissingParam(i + 1)),
    })
}

/// Render a value as a PostgreSQL literal.
pub fn pg_literal(value: &Value) -> Result<String, StoreError> {
    Ok(match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Real(f) => {
            if !f.is_finite() {
                return Err(StoreError::InvalidParam(format!(
                    "non-finite number {} cannot be inlined",
                    f
                )));
            }
            f.to_string()
        }
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Text(s) => quote(s),
        Value::Blob(b) => format!("'\\x{}'", hex::encode(b)),
    })
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

fn returning_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\breturning\b").expect("valid returning regex"))
}

pub fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .map(|head| head.eq_ignore_ascii_case("insert"))
        .unwrap_or(false)
}

/// Append ` RETURNING id` to INSERT statements that lack a RETURNING clause
/// so the new row id comes back the way SQLite's last_insert_rowid does.
pub fn with_returning_id(sql: &str) -> String {
    if !is_insert(sql) || returning_re().is_match(sql) {
        return sql.to_string();
    }
    let trimmed = sql.trim_end().trim_end_matches(';').trim_end();
    format!("{} RETURNING id", trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_placeholders_in_order() {
        assert_eq!(
            number_placeholders("SELECT * FROM cards WHERE menu_id = ? AND sub_menu_id = ?"),
            "SELECT * FROM cards WHERE menu_id = $1 AND sub_menu_id = $2"
        );
    }

    #[test]
    fn question_marks_inside_quotes_are_kept() {
        let sql = "SELECT '?' AS q, \"we?ird\" FROM t WHERE a = ? -- why?\nAND b = ?";
        assert_eq!(
            number_placeholders(sql),
            "SELECT '?' AS q, \"we?ird\" FROM t WHERE a = $1 -- why?\nAND b = $2"
        );
        assert_eq!(count_placeholders(sql), 2);
    }

    #[test]
    fn doubled_quotes_do_not_end_the_literal() {
        let sql = "SELECT 'it''s ?' WHERE x = ?";
        assert_eq!(number_placeholders(sql), "SELECT 'it''s ?' WHERE x = $1");
    }

    #[test]
    fn inline_renders_each_kind() {
        let sql = "INSERT INTO t (a, b, c, d, e, f) VALUES (?, ?, ?, ?, ?, ?)";
        let out = inline_params(
            sql,
            &[
                Value::Null,
                Value::Integer(-3),
                Value::Real(1.5),
                Value::Bool(true),
                Value::Text("O'Reilly".into()),
                Value::Blob(vec![0xde, 0xad]),
            ],
        )
        .unwrap();
        assert_eq!(
            out,
            "INSERT INTO t (a, b, c, d, e, f) VALUES (NULL, -3, 1.5, TRUE, 'O''Reilly', '\\xdead')"
        );
    }

    #[test]
    fn inline_missing_param_is_an_error() {
        let err = inline_params("SELECT ? + ?", &[Value::Integer(1)]).unwrap_err();
        assert!(matches!(err, StoreError::MissingParam(2)));
    }

    #[test]
    fn inline_extra_params_are_an_error() {
        let err = inline_params("SELECT 1", &[Value::Integer(1)]).unwrap_err();
        assert!(matches!(err, StoreError::ParamCount { expected: 0, got: 1 }));
    }

    #[test]
    fn inline_rejects_non_finite() {
        assert!(pg_literal(&Value::Real(f64::NAN)).is_err());
        assert!(pg_literal(&Value::Real(f64::INFINITY)).is_err());
    }

    #[test]
    fn returning_is_appended_once() {
        assert_eq!(
            with_returning_id("INSERT INTO menus (name) VALUES (?);"),
            "INSERT INTO menus (name) VALUES (?) RETURNING id"
        );
        let already = "insert into menus (name) values (?) returning id";
        assert_eq!(with_returning_id(already), already);
        let update = "UPDATE menus SET name = ?";
        assert_eq!(with_returning_id(update), update);
    }

    #[test]
    fn insert_detection_ignores_leading_whitespace() {
        assert!(is_insert("\n  INSERT INTO x VALUES (1)"));
        assert!(!is_insert("SELECT 1"));
        assert!(!is_insert("ins"));
    }
}
