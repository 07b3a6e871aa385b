//! Browser bookmark exports: Netscape-style HTML and Chrome/Edge JSON.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

pub const MAX_TITLE: usize = 100;
pub const MAX_URL: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub title: String,
    pub url: String,
}

fn anchor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?is)<a\b[^>]*\bhref\s*=\s*(?:"([^"]+)"|'([^']+)'|([^\s>]+))[^>]*>(.*?)</a>"#,
        )
        .expect("valid anchor regex")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid tag regex"))
}

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid entity regex")
    })
}

/// Decode the handful of entities browsers write into bookmark titles.
/// Unknown named entities are left as they are.
pub fn decode_entities(s: &str) -> String {
    entity_re()
        .replace_all(s, |caps: &Captures| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Dedupe key for a URL. Fragments and trailing slashes on non-root paths
/// do not make a bookmark distinct.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let is_quote = |c: char| c == '"' || c == '\'';
    let unquoted = trimmed.strip_prefix(is_quote).unwrap_or(trimmed);
    let unquoted = unquoted.strip_suffix(is_quote).unwrap_or(unquoted);
    if unquoted.is_empty() {
        return String::new();
    }

    match url::Url::parse(unquoted) {
        Ok(mut u) => {
            u.set_fragment(None);
            let path = u.path().to_string();
            if path != "/" {
                let stripped = path.trim_end_matches('/');
                u.set_path(if stripped.is_empty() { "/" } else { stripped });
            }
            u.to_string().to_lowercase()
        }
        Err(_) => unquoted.trim_end_matches('/').to_lowercase(),
    }
}

fn is_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Collects bookmarks in order, dropping non-http links and duplicates.
#[derive(Default)]
struct Collector {
    seen: HashSet<String>,
    out: Vec<Bookmark>,
}

impl Collector {
    fn add(&mut self, title: &str, url: &str) {
        let title = title.trim();
        let url = url.trim();
        if title.is_empty() || url.is_empty() || !is_http(url) {
            return;
        }
        let key = normalize_url(url);
        if key.is_empty() || !self.seen.insert(key) {
            return;
        }
        self.out.push(Bookmark {
            title: truncate(title, MAX_TITLE),
            url: truncate(url, MAX_URL),
        });
    }
}

pub fn parse_html(html: &str) -> Vec<Bookmark> {
    let mut c = Collector::default();
    for caps in anchor_re().captures_iter(html) {
        let url = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or("");
        let inner = caps.get(4).map(|m| m.as_str()).unwrap_or("");
        let title = decode_entities(&tag_re().replace_all(inner, ""));
        c.add(&title, &decode_entities(url));
    }
    log::info!("Parsed bookmark HTML: {} usable bookmarks", c.out.len());
    c.out
}

fn walk(node: &Value, c: &mut Collector) {
    if let (Some(url), Some(name)) = (
        node.get("url").and_then(Value::as_str),
        node.get("name").and_then(Value::as_str),
    ) {
        c.add(name, url);
    }
    if let Some(children) = node.get("children").and_then(Value::as_array) {
        for child in children {
            walk(child, c);
        }
    }
}

/// Chrome/Edge exports (`{"roots": {...}}`), bare arrays of nodes, or a
/// single node tree.
pub fn parse_json(doc: &Value) -> Vec<Bookmark> {
    let mut c = Collector::default();
    match doc {
        Value::Array(nodes) => nodes.iter().for_each(|n| walk(n, &mut c)),
        Value::Object(map) => match map.get("roots").and_then(Value::as_object) {
            Some(roots) => roots.values().for_each(|n| walk(n, &mut c)),
            None => walk(doc, &mut c),
        },
        _ => {}
    }
    c.out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NETSCAPE: &str = r#"<!DOCTYPE NETSCAPE-Bookmark-file-1>
<DL><p>
    <DT><H3>Dev</H3>
    <DL><p>
        <DT><A HREF="https://www.rust-lang.org/" ADD_DATE="1">Rust &amp; Cargo</A>
        <DT><A href='https://docs.rs'>docs<b>.rs</b></A>
        <DT><A HREF=https://crates.io ICON="data:x">crates
io</A>
        <DT><A HREF="https://www.rust-lang.org#top">Rust again</A>
        <DT><A HREF="javascript:void(0)">bookmarklet</A>
        <DT><A HREF="https://empty.example"></A>
    </DL><p>
</DL>"#;

    #[test]
    fn html_quoting_styles_and_dedupe() {
        let b = parse_html(NETSCAPE);
        let titles: Vec<&str> = b.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["Rust & Cargo", "docs.rs", "crates\nio"]);
        assert_eq!(b[0].url, "https://www.rust-lang.org/");
        assert_eq!(b[2].url, "https://crates.io");
    }

    #[test]
    fn normalize_strips_fragment_and_trailing_slash() {
        assert_eq!(normalize_url("https://A.com/Docs/#x"), "https://a.com/docs");
        assert_eq!(normalize_url("https://a.com/"), "https://a.com/");
        assert_eq!(normalize_url("'https://a.com/x//'"), "https://a.com/x");
        assert_eq!(normalize_url("not a url/"), "not a url");
        assert_eq!(normalize_url("  "), "");
    }

    #[test]
    fn entities() {
        assert_eq!(decode_entities("a &lt;b&gt; &#39;c&#x27; &quot;"), "a <b> 'c' \"");
        assert_eq!(decode_entities("&unknown; &amp;amp;"), "&unknown; &amp;");
    }

    #[test]
    fn json_chrome_export() {
        let doc = json!({
            "roots": {
                "bookmark_bar": {
                    "type": "folder",
                    "name": "Bar",
                    "children": [
                        {"type": "url", "name": "GitHub", "url": "https://github.com"},
                        {"type": "folder", "name": "Nested", "children": [
                            {"type": "url", "name": "GitHub dup", "url": "https://github.com/"},
                            {"type": "url", "name": "FTP", "url": "ftp://x.org"}
                        ]}
                    ]
                },
                "other": {"type": "folder", "name": "Other", "children": [
                    {"type": "url", "name": "Docs", "url": "https://docs.rs"}
                ]}
            }
        });
        let b = parse_json(&doc);
        assert_eq!(b.len(), 2);
        assert_eq!(b[0].title, "GitHub");
    }

    #[test]
    fn json_array_and_single_node() {
        let arr = json!([{"name": "A", "url": "https://a.com"}, {"name": "", "url": "https://b.com"}]);
        assert_eq!(parse_json(&arr).len(), 1);
        let one = json!({"name": "A", "url": "https://a.com"});
        assert_eq!(parse_json(&one).len(), 1);
        assert!(parse_json(&json!("text")).is_empty());
    }

    #[test]
    fn long_titles_are_truncated() {
        let html = format!(r#"<a href="https://a.com">{}</a>"#, "x".repeat(150));
        assert_eq!(parse_html(&html)[0].title.chars().count(), MAX_TITLE);
    }
}
