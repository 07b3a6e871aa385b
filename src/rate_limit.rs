use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Header, Method, Status};
use rocket::request::{FromRequest, Outcome};
use rocket::response::status;
use rocket::serde::json::{json, Json, Value};
use rocket::{Data, Request, Response};

use crate::auth::strip_mapped;

/// In-memory sliding-window limiter keyed by `<bucket>:<ip>`.
/// Each bucket has its own max attempts and window.
pub struct RateLimiter {
    entries: Mutex<HashMap<String, Vec<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record an attempt and return true if it is under the limit.
    pub fn check_and_record(&self, key: &str, max_attempts: u64, window: Duration) -> bool {
        let mut map = self.entries.lock().unwrap();
        let now = Instant::now();

        let attempts = map.entry(key.to_string()).or_default();
        attempts.retain(|t| now.duration_since(*t) < window);

        if (attempts.len() as u64) < max_attempts {
            attempts.push(now);
            true
        } else {
            false
        }
    }

    /// Remaining attempts without recording a new one.
    pub fn remaining(&self, key: &str, max_attempts: u64, window: Duration) -> u64 {
        let map = self.entries.lock().unwrap();
        let now = Instant::now();
        let used = map
            .get(key)
            .map(|a| a.iter().filter(|t| now.duration_since(**t) < window).count())
            .unwrap_or(0);
        max_attempts.saturating_sub(used as u64)
    }

    /// Time until the oldest attempt in the window expires.
    pub fn reset_in(&self, key: &str, window: Duration) -> Duration {
        let map = self.entries.lock().unwrap();
        let now = Instant::now();
        map.get(key)
            .and_then(|a| a.iter().find(|t| now.duration_since(**t) < window))
            .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(window)
    }

    /// Drop attempts older than `max_age` and keys left empty.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let mut map = self.entries.lock().unwrap();
        let now = Instant::now();
        let before = map.len();
        map.retain(|_, attempts| {
            attempts.retain(|t| now.duration_since(*t) < max_age);
            !attempts.is_empty()
        });
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Buckets ──

pub struct Rule {
    pub bucket: &'static str,
    pub max: u64,
    pub window: Duration,
    pub message: &'static str,
}

pub static GENERAL: Rule = Rule {
    bucket: "api",
    max: 300,
    window: Duration::from_secs(15 * 60),
    message: "Too many requests, please try again later",
};

pub static LOGIN: Rule = Rule {
    bucket: "login",
    max: 10,
    window: Duration::from_secs(15 * 60),
    message: "Too many login attempts, please try again in 15 minutes",
};

pub static WRITE: Rule = Rule {
    bucket: "write",
    max: 60,
    window: Duration::from_secs(60),
    message: "Too many write operations, please slow down",
};

/// Longest window of any rule; entries older than this are dead.
pub const MAX_WINDOW: Duration = Duration::from_secs(15 * 60);

pub const THROTTLED_PATH: &str = "/api/__throttled";

/// Rules a request counts against, general bucket first.
fn rules_for(method: Method, path: &str) -> Vec<&'static Rule> {
    if !(path == "/api" || path.starts_with("/api/")) || path == THROTTLED_PATH {
        return Vec::new();
    }
    if method == Method::Options {
        return Vec::new();
    }
    let mut rules = vec![&GENERAL];
    if path == "/api/login" {
        rules.push(&LOGIN);
    }
    if matches!(method, Method::Post | Method::Put | Method::Delete) {
        rules.push(&WRITE);
    }
    rules
}

// ── Limiter key ──

/// Address a request is counted against. The socket peer, unless a single
/// trusted proxy sits in front, in which case the hop that proxy appended
/// (the last `X-Forwarded-For` entry). Anything earlier in the header is
/// client supplied.
fn limiter_address(forwarded_for: Option<&str>, remote: Option<IpAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        let last = forwarded_for
            .and_then(|h| h.rsplit(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = last {
            return strip_mapped(ip).to_string();
        }
    }
    remote
        .map(|ip| strip_mapped(&ip.to_string()).to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

// ── Fairing ──

#[derive(Clone, Copy)]
struct Quota {
    limit: u64,
    remaining: u64,
    reset_secs: u64,
}

/// Request-local record of what the limiter decided.
#[derive(Default)]
struct Verdict {
    general: Option<Quota>,
    rejected_by: Option<&'static str>,
}

pub struct RateLimitFairing {
    pub limiter: Arc<RateLimiter>,
    pub trust_proxy: bool,
}

#[rocket::async_trait]
impl Fairing for RateLimitFairing {
    fn info(&self) -> Info {
        Info {
            name: "API Rate Limits",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let rules = rules_for(req.method(), req.uri().path().as_str());
        if rules.is_empty() {
            return;
        }
        let ip = limiter_address(
            req.headers().get_one("X-Forwarded-For"),
            req.remote().map(|addr| addr.ip()),
            self.trust_proxy,
        );

        let mut verdict = Verdict::default();
        for rule in rules {
            let key = format!("{}:{}", rule.bucket, ip);
            let allowed = self.limiter.check_and_record(&key, rule.max, rule.window);
            if rule.bucket == GENERAL.bucket {
                verdict.general = Some(Quota {
                    limit: rule.max,
                    remaining: self.limiter.remaining(&key, rule.max, rule.window),
                    reset_secs: self.limiter.reset_in(&key, rule.window).as_secs().max(1),
                });
            }
            if !allowed {
                log::warn!("Rate limit '{}' hit by {}", rule.bucket, ip);
                verdict.rejected_by = Some(rule.message);
                break;
            }
        }

        let rejected = verdict.rejected_by.is_some();
        req.local_cache(move || verdict);
        if rejected {
            req.set_method(Method::Get);
            req.set_uri(rocket::uri!("/api/__throttled"));
        }
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let verdict = req.local_cache(Verdict::default);
        if let Some(q) = verdict.general {
            res.set_header(Header::new("RateLimit-Limit", q.limit.to_string()));
            res.set_header(Header::new("RateLimit-Remaining", q.remaining.to_string()));
            res.set_header(Header::new("RateLimit-Reset", q.reset_secs.to_string()));
        }
    }
}

// ── Rejection route ──

pub struct Throttled(&'static str);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Throttled {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let verdict = request.local_cache(Verdict::default);
        Outcome::Success(Throttled(verdict.rejected_by.unwrap_or(GENERAL.message)))
    }
}

#[get("/api/__throttled")]
pub fn throttled(t: Throttled) -> status::Custom<Json<Value>> {
    status::Custom(Status::TooManyRequests, Json(json!({ "error": t.0 })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_blocks_after_max() {
        let rl = RateLimiter::new();
        let w = Duration::from_secs(60);
        assert!(rl.check_and_record("login:1.2.3.4", 2, w));
        assert!(rl.check_and_record("login:1.2.3.4", 2, w));
        assert!(!rl.check_and_record("login:1.2.3.4", 2, w));
        assert_eq!(rl.remaining("login:1.2.3.4", 2, w), 0);
        // other keys are independent
        assert!(rl.check_and_record("login:5.6.7.8", 2, w));
        assert!(rl.reset_in("login:1.2.3.4", w) <= w);
    }

    #[test]
    fn cleanup_drops_stale_keys() {
        let rl = RateLimiter::new();
        assert!(rl.check_and_record("api:a", 5, Duration::from_secs(60)));
        assert_eq!(rl.len(), 1);
        assert_eq!(rl.cleanup(Duration::ZERO), 1);
        assert!(rl.is_empty());
    }

    #[test]
    fn forwarded_header_is_ignored_unless_proxy_is_trusted() {
        let peer: Option<IpAddr> = "192.0.2.7".parse().ok();
        assert_eq!(limiter_address(Some("10.0.0.1"), peer, false), "192.0.2.7");
        assert_eq!(limiter_address(None, None, false), "unknown");
        assert_eq!(
            limiter_address(Some("10.0.0.1, 203.0.113.9"), peer, true),
            "203.0.113.9"
        );
        assert_eq!(limiter_address(Some("::ffff:203.0.113.9"), peer, true), "203.0.113.9");
        assert_eq!(limiter_address(Some(" "), peer, true), "192.0.2.7");
    }

    #[test]
    fn rule_selection() {
        let names = |m: Method, p: &str| -> Vec<&'static str> { rules_for(m, p).iter().map(|r| r.bucket).collect() };
        assert_eq!(names(Method::Get, "/api/menus"), vec!["api"]);
        assert_eq!(names(Method::Post, "/api/login"), vec!["api", "login", "write"]);
        assert_eq!(names(Method::Delete, "/api/cards/3"), vec!["api", "write"]);
        assert!(names(Method::Get, "/uploads/a.png").is_empty());
        assert!(names(Method::Get, "/apis").is_empty());
        assert!(names(Method::Options, "/api/menus").is_empty());
        assert!(names(Method::Get, THROTTLED_PATH).is_empty());
    }
}
