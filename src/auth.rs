use chrono::Utc;
use chrono_tz::Asia::Shanghai;
use rand::RngCore;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::State;
use sha2::{Digest, Sha256};

use crate::models::session::Session;
use crate::models::user::User;
use crate::store::{self, Db, Store, StoreError};

// ── Client IP request guard ──

/// `::ffff:1.2.3.4` is how dual-stack sockets report IPv4 peers.
pub(crate) fn strip_mapped(ip: &str) -> &str {
    ip.strip_prefix("::ffff:").unwrap_or(ip)
}

/// Client IP as reported for login stamps. Checks, in order:
///   1. X-Forwarded-For (first entry = original client)
///   2. X-Real-IP
///   3. the socket peer address
pub fn client_ip(request: &Request<'_>) -> String {
    let headers = request.headers();

    if let Some(forwarded) = headers.get_one("X-Forwarded-For") {
        if let Some(ip) = forwarded.split(',').next() {
            let ip = ip.trim();
            if !ip.is_empty() {
                return strip_mapped(ip).to_string();
            }
        }
    }

    if let Some(ip) = headers.get_one("X-Real-IP") {
        let ip = ip.trim();
        if !ip.is_empty() {
            return strip_mapped(ip).to_string();
        }
    }

    request
        .client_ip()
        .map(|ip| strip_mapped(&ip.to_string()).to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(ClientIp(client_ip(request)))
    }
}

// ── Admin guard ──

/// Guard: `Authorization: Bearer <token>` naming a live session.
/// Failing requests get a 401 straight away instead of being forwarded,
/// so the SPA fallback never answers an API call.
pub struct AdminUser {
    pub user: User,
    pub token_hash: String,
}

fn bearer_token<'a>(request: &'a Request<'_>) -> Option<&'a str> {
    let header = request.headers().get_one("Authorization")?;
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(token) = bearer_token(request) else {
            return Outcome::Error((Status::Unauthorized, ()));
        };
        let db = match request.guard::<&State<Db>>().await {
            Outcome::Success(db) => db.inner().clone(),
            _ => return Outcome::Error((Status::InternalServerError, ())),
        };

        let token_hash = hash_token(token);
        let lookup = token_hash.clone();
        match store::blocking(&db, move |s| Session::user_for(s, &lookup)).await {
            Ok(Some(user)) => Outcome::Success(AdminUser { user, token_hash }),
            Ok(None) => Outcome::Error((Status::Unauthorized, ())),
            Err(e) => {
                log::error!("Session lookup failed: {}", e);
                Outcome::Error((Status::InternalServerError, ()))
            }
        }
    }
}

// ── Password utilities ──

pub fn hash_password(password: &str, cost: u32) -> Result<String, String> {
    bcrypt::hash(password, cost).map_err(|e| e.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

// ── Tokens ──

/// 256 random bits, hex encoded.
pub fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Login times are shown to operators in China Standard Time.
pub fn shanghai_now() -> String {
    Utc::now()
        .with_timezone(&Shanghai)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

// ── Login ──

#[derive(Debug)]
pub struct LoginSuccess {
    pub token: String,
    /// Values from the login before this one.
    pub last_login_time: Option<String>,
    pub last_login_ip: Option<String>,
}

/// Check credentials, stamp the login and open a session. `None` means the
/// username or password was wrong.
pub fn login(
    store: &dyn Store,
    username: &str,
    password: &str,
    ip: &str,
    session_hours: i64,
) -> Result<Option<LoginSuccess>, StoreError> {
    let Some(user) = User::get_by_username(store, username)? else {
        return Ok(None);
    };
    if !verify_password(password, &user.password_hash) {
        return Ok(None);
    }

    User::record_login(store, user.id, &shanghai_now(), ip)?;
    let token = new_token();
    Session::create(store, user.id, &hash_token(&token), Some(ip), session_hours)?;
    log::info!("User '{}' logged in from {}", user.username, ip);

    Ok(Some(LoginSuccess {
        token,
        last_login_time: user.last_login_time,
        last_login_ip: user.last_login_ip,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip_and_mismatch() {
        let hash = hash_password("secret1", 4).unwrap();
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
        assert!(!verify_password("secret1", "not-a-hash"));
    }

    #[test]
    fn tokens_are_random_and_hash_stably() {
        let a = new_token();
        let b = new_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(hash_token(&a), hash_token(&a));
        assert_ne!(hash_token(&a), a);
    }

    #[test]
    fn mapped_ipv4_is_unwrapped() {
        assert_eq!(strip_mapped("::ffff:10.0.0.1"), "10.0.0.1");
        assert_eq!(strip_mapped("2001:db8::1"), "2001:db8::1");
    }

    #[test]
    fn shanghai_time_format() {
        let now = shanghai_now();
        assert_eq!(now.len(), 19);
        assert_eq!(&now[4..5], "-");
        assert_eq!(&now[10..11], " ");
    }
}
