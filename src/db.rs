use rand::RngCore;

use crate::config::Config;
use crate::store::{Dialect, Store, StoreError};

fn primary_key(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Postgres => "SERIAL PRIMARY KEY",
        Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
    }
}

fn table_statements(dialect: Dialect) -> Vec<String> {
    let pk = primary_key(dialect);
    vec![
        // Top-level categories
        format!(
            "CREATE TABLE IF NOT EXISTS menus (
                id {pk},
                name TEXT NOT NULL,
                \"order\" INTEGER DEFAULT 0
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS sub_menus (
                id {pk},
                parent_id INTEGER NOT NULL REFERENCES menus(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                \"order\" INTEGER DEFAULT 0
            )"
        ),
        // Links. sub_menu_id NULL means the card sits at the menu's top level.
        format!(
            "CREATE TABLE IF NOT EXISTS cards (
                id {pk},
                menu_id INTEGER REFERENCES menus(id) ON DELETE CASCADE,
                sub_menu_id INTEGER REFERENCES sub_menus(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                logo_url TEXT,
                custom_logo_path TEXT,
                \"desc\" TEXT,
                \"order\" INTEGER DEFAULT 0
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS users (
                id {pk},
                username TEXT UNIQUE NOT NULL,
                password TEXT NOT NULL,
                last_login_time TEXT,
                last_login_ip TEXT
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS ads (
                id {pk},
                position TEXT NOT NULL,
                img TEXT NOT NULL,
                url TEXT NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS friends (
                id {pk},
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                logo TEXT
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS visits (
                id {pk},
                date TEXT NOT NULL,
                pv INTEGER DEFAULT 0,
                uv INTEGER DEFAULT 0,
                UNIQUE(date)
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS card_clicks (
                id {pk},
                card_id INTEGER NOT NULL UNIQUE REFERENCES cards(id) ON DELETE CASCADE,
                clicks INTEGER NOT NULL DEFAULT 0,
                last_clicked TEXT
            )"
        ),
        // Bearer sessions. Only the SHA-256 of the token is stored.
        format!(
            "CREATE TABLE IF NOT EXISTS sessions (
                id {pk},
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                token_hash TEXT NOT NULL UNIQUE,
                ip TEXT,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )"
        ),
    ]
}

const INDEXES: &[&str] = &[
    "DROP INDEX IF EXISTS uq_cards_menu_sub_url",
    // A URL may appear once per sub-menu, and once per menu top level.
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_cards_sub_url ON cards (COALESCE(sub_menu_id, -menu_id), url)",
    "CREATE INDEX IF NOT EXISTS idx_menus_order ON menus(\"order\")",
    "CREATE INDEX IF NOT EXISTS idx_sub_menus_parent_id ON sub_menus(parent_id)",
    "CREATE INDEX IF NOT EXISTS idx_cards_menu_id ON cards(menu_id)",
    "CREATE INDEX IF NOT EXISTS idx_cards_sub_menu_id ON cards(sub_menu_id)",
    "CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at)",
];

/// Columns added to `users` after the first release.
const USER_COLUMNS: &[&str] = &["last_login_time", "last_login_ip"];

fn user_columns(store: &dyn Store) -> Result<Vec<String>, StoreError> {
    let rows = match store.dialect() {
        Dialect::Sqlite => store.query("PRAGMA table_info(users)", &[])?,
        Dialect::Postgres => store.query(
            "SELECT column_name AS name FROM information_schema.columns
             WHERE table_schema = current_schema() AND table_name = 'users'",
            &[],
        )?,
    };
    rows.iter().map(|r| r.string("name")).collect()
}

pub fn run_migrations(store: &dyn Store) -> Result<(), Box<dyn std::error::Error>> {
    for sql in table_statements(store.dialect()) {
        store.run(&sql, &[])?;
    }
    for sql in INDEXES {
        store.run(sql, &[])?;
    }

    let existing = user_columns(store)?;
    for column in USER_COLUMNS {
        if !existing.iter().any(|c| c == column) {
            store.run(&format!("ALTER TABLE users ADD COLUMN {} TEXT", column), &[])?;
            log::info!("Added missing column users.{}", column);
        }
    }

    log::info!(
        "{} tables initialized",
        match store.dialect() {
            Dialect::Sqlite => "SQLite",
            Dialect::Postgres => "PostgreSQL",
        }
    );
    Ok(())
}

const DEFAULT_MENUS: &[(&str, i64)] = &[
    ("Home", 1),
    ("Ai Stuff", 2),
    ("Cloud", 3),
    ("Software", 4),
    ("Tools", 5),
    ("Other", 6),
];

/// (menu index in DEFAULT_MENUS, title, url, logo, description, order)
const DEFAULT_CARDS: &[(usize, &str, &str, &str, &str, i64)] = &[
    (0, "Google", "https://www.google.com", "https://www.google.com/favicon.ico", "Search engine", 1),
    (0, "GitHub", "https://github.com", "https://github.com/favicon.ico", "Code hosting platform", 2),
    (1, "ChatGPT", "https://chat.openai.com", "https://chat.openai.com/favicon.ico", "AI chat assistant", 1),
    (1, "Claude", "https://claude.ai", "https://claude.ai/favicon.ico", "Anthropic AI", 2),
];

fn generate_password() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Insert the starter menus on an empty database and make sure the admin
/// account exists.
pub fn seed_defaults(store: &dyn Store, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let count = store
        .get("SELECT COUNT(*) AS count FROM menus", &[])?
        .map(|r| r.i64("count"))
        .transpose()?
        .unwrap_or(0);

    if count == 0 {
        log::info!("Inserting default menus and cards");
        let mut menu_ids = Vec::with_capacity(DEFAULT_MENUS.len());
        for (name, order) in DEFAULT_MENUS {
            let r = store.run("INSERT INTO menus (name, \"order\") VALUES (?, ?)", args![*name, *order])?;
            menu_ids.push(r.last_id);
        }
        for (menu, title, url, logo, desc, order) in DEFAULT_CARDS {
            let Some(menu_id) = menu_ids.get(*menu).copied().flatten() else {
                continue;
            };
            store.run(
                "INSERT INTO cards (menu_id, title, url, logo_url, \"desc\", \"order\") VALUES (?, ?, ?, ?, ?, ?)",
                args![menu_id, *title, *url, *logo, *desc, *order],
            )?;
        }
    }

    // An existing admin keeps its password unless one is configured
    // explicitly, so changes made from the admin UI survive restarts.
    let admin = store.get(
        "SELECT id FROM users WHERE username = ?",
        args![&config.admin_username],
    )?;
    match (admin, &config.admin_password) {
        (None, configured) => {
            let password = match configured {
                Some(p) => p.clone(),
                None => {
                    let generated = generate_password();
                    log::warn!(
                        "ADMIN_PASSWORD not set. Generated password for '{}': {}",
                        config.admin_username,
                        generated
                    );
                    generated
                }
            };
            let hash = crate::auth::hash_password(&password, config.bcrypt_cost)?;
            store.run(
                "INSERT INTO users (username, password) VALUES (?, ?)",
                args![&config.admin_username, hash],
            )?;
            log::info!("Admin user created: {}", config.admin_username);
        }
        (Some(_), Some(password)) => {
            let hash = crate::auth::hash_password(password, config.bcrypt_cost)?;
            store.run(
                "UPDATE users SET password = ? WHERE username = ?",
                args![hash, &config.admin_username],
            )?;
            log::info!("Admin password updated from configuration");
        }
        (Some(_), None) => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_schema_uses_serial_keys() {
        let pg = table_statements(Dialect::Postgres).join("\n");
        assert!(pg.contains("SERIAL PRIMARY KEY"));
        assert!(!pg.contains("AUTOINCREMENT"));
        let lite = table_statements(Dialect::Sqlite).join("\n");
        assert!(lite.contains("INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert_eq!(
            table_statements(Dialect::Postgres).len(),
            table_statements(Dialect::Sqlite).len()
        );
    }
}
