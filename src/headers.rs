use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Header, Method, Status};
use rocket::{Request, Response};

/// Security headers on every response, plus a one-day cache lifetime for
/// static assets.
pub struct SecurityHeaders;

#[rocket::async_trait]
impl Fairing for SecurityHeaders {
    fn info(&self) -> Info {
        Info {
            name: "Security Headers",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        res.set_header(Header::new("X-Frame-Options", "SAMEORIGIN"));
        res.set_header(Header::new("X-Content-Type-Options", "nosniff"));
        res.set_header(Header::new("X-XSS-Protection", "1; mode=block"));
        res.set_header(Header::new(
            "Referrer-Policy",
            "strict-origin-when-cross-origin",
        ));

        if req.method() == Method::Get
            && res.status() == Status::Ok
            && is_static_asset(req.uri().path().as_str())
        {
            res.set_header(Header::new("Cache-Control", "public, max-age=86400"));
        }
    }
}

/// Files served from `/uploads` or the web build. API routes and the SPA
/// entry point (extension-less paths) are excluded.
fn is_static_asset(path: &str) -> bool {
    if path == "/api" || path.starts_with("/api/") {
        return false;
    }
    path.rsplit('/')
        .next()
        .map(|last| last.contains('.') && !last.ends_with(".html"))
        .unwrap_or(false)
}

pub struct Cors {
    pub origin: String,
}

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _req: &'r Request<'_>, res: &mut Response<'r>) {
        res.set_header(Header::new("Access-Control-Allow-Origin", self.origin.clone()));
        res.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, DELETE",
        ));
        res.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization",
        ));
        if self.origin != "*" {
            res.set_header(Header::new("Vary", "Origin"));
        }
    }
}

/// Preflight requests are answered here; the CORS fairing adds the headers.
#[options("/<_..>")]
pub fn preflight() -> Status {
    Status::NoContent
}

#[cfg(test)]
mod tests {
    use super::is_static_asset;

    #[test]
    fn static_asset_detection() {
        assert!(is_static_asset("/uploads/1700000000000-ab12.png"));
        assert!(is_static_asset("/assets/index-3f2a.js"));
        assert!(!is_static_asset("/"));
        assert!(!is_static_asset("/admin"));
        assert!(!is_static_asset("/index.html"));
        assert!(!is_static_asset("/api/menus"));
        assert!(!is_static_asset("/api/backup/nav.json"));
    }
}
