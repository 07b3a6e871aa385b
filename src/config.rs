use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::store::QueryMode;

pub const CONFIG_FILE: &str = "navdeck.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid {path}: {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Runtime configuration. Built from defaults, then `navdeck.toml`
/// (optional), then environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// PostgreSQL connection string. SQLite is used when absent.
    pub database_url: Option<String>,
    pub sqlite_path: PathBuf,
    pub postgres_ssl: bool,
    pub pg_query_mode: QueryMode,
    pub admin_username: String,
    /// Explicit admin password. When absent a random one is generated for
    /// a fresh install and an existing admin keeps its password.
    pub admin_password: Option<String>,
    pub cors_origin: String,
    pub production: bool,
    pub uploads_dir: PathBuf,
    pub web_dist: PathBuf,
    pub session_hours: i64,
    pub bcrypt_cost: u32,
    /// Behind one reverse proxy: rate limits key on the last
    /// `X-Forwarded-For` hop instead of the socket peer.
    pub trust_proxy: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            sqlite_path: PathBuf::from("database/nav.db"),
            postgres_ssl: false,
            pg_query_mode: QueryMode::Simple,
            admin_username: "admin".to_string(),
            admin_password: None,
            cors_origin: "*".to_string(),
            production: false,
            uploads_dir: PathBuf::from("uploads"),
            web_dist: PathBuf::from("web/dist"),
            session_hours: 2,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            trust_proxy: false,
        }
    }
}

/// Shape of `navdeck.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    database_url: Option<String>,
    sqlite_path: Option<PathBuf>,
    postgres_ssl: Option<bool>,
    pg_query_mode: Option<String>,
    admin_username: Option<String>,
    admin_password: Option<String>,
    cors_origin: Option<String>,
    production: Option<bool>,
    uploads_dir: Option<PathBuf>,
    web_dist: Option<PathBuf>,
    session_hours: Option<i64>,
    bcrypt_cost: Option<u32>,
    trust_proxy: Option<bool>,
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

impl Config {
    /// Load `navdeck.toml` from the working directory (or the file named by
    /// `NAVDECK_CONFIG`) and apply the process environment on top.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("NAVDECK_CONFIG").unwrap_or_else(|_| CONFIG_FILE.to_string());
        let mut config = Config::default();
        if Path::new(&path).exists() {
            config.apply_file(Path::new(&path))?;
            log::info!("Loaded configuration from {}", path);
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        self.apply_toml(&text, &display)
    }

    fn apply_toml(&mut self, text: &str, path: &str) -> Result<(), ConfigError> {
        let file: FileConfig = toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: path.to_string(),
            source,
        })?;

        if let Some(v) = file.host {
            self.host = v;
        }
        if let Some(v) = file.port {
            self.port = v;
        }
        if let Some(v) = file.database_url.filter(|s| !s.trim().is_empty()) {
            self.database_url = Some(v);
        }
        if let Some(v) = file.sqlite_path {
            self.sqlite_path = v;
        }
        if let Some(v) = file.postgres_ssl {
            self.postgres_ssl = v;
        }
        if let Some(v) = file.pg_query_mode {
            self.pg_query_mode = QueryMode::parse(&v).ok_or(ConfigError::Invalid {
                key: "pg_query_mode",
                value: v.clone(),
            })?;
        }
        if let Some(v) = file.admin_username {
            self.admin_username = v;
        }
        if let Some(v) = file.admin_password.filter(|s| !s.is_empty()) {
            self.admin_password = Some(v);
        }
        if let Some(v) = file.cors_origin {
            self.cors_origin = v;
        }
        if let Some(v) = file.production {
            self.production = v;
        }
        if let Some(v) = file.uploads_dir {
            self.uploads_dir = v;
        }
        if let Some(v) = file.web_dist {
            self.web_dist = v;
        }
        if let Some(v) = file.session_hours {
            self.session_hours = v;
        }
        if let Some(v) = file.bcrypt_cost {
            self.bcrypt_cost = v;
        }
        if let Some(v) = file.trust_proxy {
            self.trust_proxy = v;
        }
        Ok(())
    }

    /// Environment overrides. `get` is the variable lookup, injectable for tests.
    pub fn apply_env<F>(&mut self, get: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("HOST") {
            self.host = v;
        }
        if let Some(v) = get("PORT") {
            self.port = v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value: v.clone(),
            })?;
        }
        if let Some(v) = get("DATABASE_URL").or_else(|| get("POSTGRES_URL")) {
            self.database_url = Some(v);
        }
        if let Some(v) = get("SQLITE_PATH") {
            self.sqlite_path = PathBuf::from(v);
        }
        if let Some(v) = get("POSTGRES_SSL") {
            self.postgres_ssl = parse_bool(&v);
        }
        if let Some(v) = get("PG_QUERY_MODE") {
            self.pg_query_mode = QueryMode::parse(&v).ok_or(ConfigError::Invalid {
                key: "PG_QUERY_MODE",
                value: v.clone(),
            })?;
        }
        if let Some(v) = get("ADMIN_USERNAME") {
            self.admin_username = v;
        }
        if let Some(v) = get("ADMIN_PASSWORD") {
            self.admin_password = Some(v);
        }
        if let Some(v) = get("CORS_ORIGIN") {
            self.cors_origin = v;
        }
        if let Some(v) = get("APP_ENV") {
            self.production = v.trim().eq_ignore_ascii_case("production");
        }
        if let Some(v) = get("UPLOADS_DIR") {
            self.uploads_dir = PathBuf::from(v);
        }
        if let Some(v) = get("WEB_DIST") {
            self.web_dist = PathBuf::from(v);
        }
        if let Some(v) = get("SESSION_HOURS") {
            self.session_hours = v
                .trim()
                .parse()
                .ok()
                .filter(|h: &i64| *h > 0)
                .ok_or(ConfigError::Invalid {
                    key: "SESSION_HOURS",
                    value: v.clone(),
                })?;
        }
        if let Some(v) = get("BCRYPT_COST") {
            self.bcrypt_cost = v
                .trim()
                .parse()
                .ok()
                .filter(|c: &u32| (4..=31).contains(c))
                .ok_or(ConfigError::Invalid {
                    key: "BCRYPT_COST",
                    value: v.clone(),
                })?;
        }
        if let Some(v) = get("TRUST_PROXY") {
            self.trust_proxy = parse_bool(&v);
        }
        Ok(())
    }

    pub fn backend_name(&self) -> &'static str {
        if self.database_url.is_some() {
            "postgres"
        } else {
            "sqlite"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_select_sqlite() {
        let c = Config::default();
        assert_eq!(c.port, 3000);
        assert_eq!(c.backend_name(), "sqlite");
        assert_eq!(c.sqlite_path, PathBuf::from("database/nav.db"));
        assert_eq!(c.cors_origin, "*");
        assert!(c.admin_password.is_none());
        assert!(!c.trust_proxy);
    }

    #[test]
    fn postgres_url_is_a_fallback_for_database_url() {
        let mut c = Config::default();
        c.apply_env(env(&[("POSTGRES_URL", "postgres://b")])).unwrap();
        assert_eq!(c.database_url.as_deref(), Some("postgres://b"));

        let mut c = Config::default();
        c.apply_env(env(&[("POSTGRES_URL", "postgres://b"), ("DATABASE_URL", "postgres://a")]))
            .unwrap();
        assert_eq!(c.database_url.as_deref(), Some("postgres://a"));
        assert_eq!(c.backend_name(), "postgres");
    }

    #[test]
    fn env_overrides() {
        let mut c = Config::default();
        c.apply_env(env(&[
            ("PORT", "8080"),
            ("POSTGRES_SSL", "true"),
            ("PG_QUERY_MODE", "extended"),
            ("APP_ENV", "production"),
            ("ADMIN_PASSWORD", "s3cret"),
            ("ADMIN_USERNAME", ""),
            ("TRUST_PROXY", "1"),
        ]))
        .unwrap();
        assert!(c.trust_proxy);
        assert_eq!(c.port, 8080);
        assert!(c.postgres_ssl);
        assert_eq!(c.pg_query_mode, QueryMode::Extended);
        assert!(c.production);
        assert_eq!(c.admin_password.as_deref(), Some("s3cret"));
        assert_eq!(c.admin_username, "admin");
    }

    #[test]
    fn invalid_env_values_are_rejected() {
        let mut c = Config::default();
        assert!(c.apply_env(env(&[("PORT", "eighty")])).is_err());
        assert!(c.apply_env(env(&[("PG_QUERY_MODE", "turbo")])).is_err());
        assert!(c.apply_env(env(&[("BCRYPT_COST", "99")])).is_err());
    }

    #[test]
    fn toml_file_layer() {
        let mut c = Config::default();
        c.apply_toml(
            r#"
            port = 4000
            cors_origin = "https://nav.example.com"
            pg_query_mode = "extended"
            "#,
            CONFIG_FILE,
        )
        .unwrap();
        assert_eq!(c.port, 4000);
        assert_eq!(c.cors_origin, "https://nav.example.com");
        assert_eq!(c.pg_query_mode, QueryMode::Extended);

        assert!(matches!(
            c.apply_toml("nonsense_key = 1", CONFIG_FILE),
            Err(ConfigError::Toml { .. })
        ));
        assert!(matches!(
            c.apply_toml("pg_query_mode = \"x\"", CONFIG_FILE),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
