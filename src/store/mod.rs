use std::fmt;
use std::sync::Arc;

use crate::config::Config;

/// Build a `&[Value]` parameter slice from heterogeneous expressions.
///
/// ```ignore
/// store.run("UPDATE menus SET name = ? WHERE id = ?", args![name, id])?;
/// ```
macro_rules! args {
    () => { &[] as &[$crate::store::Value] };
    ($($v:expr),+ $(,)?) => {
        &[$($crate::store::Value::from($v)),+] as &[$crate::store::Value]
    };
}

pub mod pg;
pub mod sql;
pub mod sqlite;

use self::pg::PgStore;
use self::sqlite::SqliteStore;

// ── Values ──────────────────────────────────────────────────────────

/// A bound parameter or a decoded cell. Both backends speak this type so
/// model code never sees rusqlite or postgres types.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    Blob(Vec<u8>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Bool(_) => "bool",
            Value::Blob(_) => "blob",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view. Text holding a number and whole reals are accepted
    /// because the PostgreSQL simple protocol returns every cell as text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Bool(b) => Some(*b as i64),
            Value::Real(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Value::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Real(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Integer(n) => Some(*n != 0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "t" | "true" | "1" | "yes" | "on" => Some(true),
                "f" | "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Text view. Numbers are rendered, blobs and nulls are not text.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Integer(n) => Some(n.to_string()),
            Value::Real(f) => Some(f.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Real(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Integer(v as i64)
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32, usize);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ── Rows ────────────────────────────────────────────────────────────

/// One result row: column names plus decoded values, in select order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Row { columns, values }
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }

    pub fn i64(&self, column: &str) -> Result<i64, StoreError> {
        self.opt_i64(column)?
            .ok_or_else(|| StoreError::Decode(format!("column '{}' is null", column)))
    }

    pub fn opt_i64(&self, column: &str) -> Result<Option<i64>, StoreError> {
        let v = self.require(column)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_i64().map(Some).ok_or_else(|| {
            StoreError::Decode(format!("column '{}' holds {} not an integer", column, v.kind()))
        })
    }

    pub fn string(&self, column: &str) -> Result<String, StoreError> {
        Ok(self.opt_string(column)?.unwrap_or_default())
    }

    pub fn opt_string(&self, column: &str) -> Result<Option<String>, StoreError> {
        let v = self.require(column)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_text().map(Some).ok_or_else(|| {
            StoreError::Decode(format!("column '{}' holds {} not text", column, v.kind()))
        })
    }

    /// Row as a JSON object, used by backup export.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, value) in self.columns.iter().zip(&self.values) {
            let json = match value {
                Value::Null => serde_json::Value::Null,
                Value::Integer(n) => serde_json::Value::from(*n),
                Value::Real(f) => serde_json::Value::from(*f),
                Value::Bool(b) => serde_json::Value::from(*b),
                Value::Text(s) => serde_json::Value::from(s.as_str()),
                Value::Blob(b) => serde_json::Value::from(hex::encode(b)),
            };
            map.insert(name.clone(), json);
        }
        serde_json::Value::Object(map)
    }

    fn require(&self, column: &str) -> Result<&Value, StoreError> {
        self.value(column)
            .ok_or_else(|| StoreError::MissingColumn(column.to_string()))
    }
}

/// Outcome of a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunResult {
    /// Id of the inserted row, when the statement inserted one.
    pub last_id: Option<i64>,
    pub changes: u64,
}

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("postgres error: {0}")]
    Postgres(#[from] ::postgres::Error),

    #[error("tls setup failed: {0}")]
    Tls(#[from] openssl::error::ErrorStack),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no parameter bound for placeholder #{0}")]
    MissingParam(usize),

    #[error("statement expects {expected} parameters, got {got}")]
    ParamCount { expected: usize, got: usize },

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("missing column '{0}' in result row")]
    MissingColumn(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("transaction rolled back")]
    RolledBack,
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            }
            StoreError::Postgres(e) => {
                e.code() == Some(&::postgres::error::SqlState::UNIQUE_VIOLATION)
            }
            _ => false,
        }
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
            }
            StoreError::Postgres(e) => {
                e.code() == Some(&::postgres::error::SqlState::FOREIGN_KEY_VIOLATION)
            }
            _ => false,
        }
    }
}

// ── Store trait ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

/// How parameters reach PostgreSQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// Literals are inlined and the text goes through the simple query
    /// protocol. Works behind transaction-mode poolers.
    #[default]
    Simple,
    /// Server-side prepared statements with typed parameters.
    Extended,
}

impl QueryMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Some(QueryMode::Simple),
            "extended" => Some(QueryMode::Extended),
            _ => None,
        }
    }
}

/// Statement execution bound to one open transaction.
pub trait Executor {
    fn dialect(&self) -> Dialect;
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError>;
    fn run(&mut self, sql: &str, params: &[Value]) -> Result<RunResult, StoreError>;

    fn get(&mut self, sql: &str, params: &[Value]) -> Result<Option<Row>, StoreError> {
        Ok(self.query(sql, params)?.into_iter().next())
    }
}

/// Unified data-access trait. Every SQL statement is written once with `?`
/// placeholders and goes through here.
/// Implementations: `SqliteStore` (rusqlite/r2d2) and `PgStore` (postgres/r2d2).
pub trait Store: Send + Sync {
    fn dialect(&self) -> Dialect;
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError>;
    fn run(&self, sql: &str, params: &[Value]) -> Result<RunResult, StoreError>;

    /// Run several `;`-separated statements without parameters (DDL).
    fn execute_batch(&self, sql: &str) -> Result<(), StoreError>;

    /// BEGIN, run `body`, then COMMIT when it succeeds or ROLLBACK when it fails.
    fn with_transaction(
        &self,
        body: &mut dyn FnMut(&mut dyn Executor) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;

    fn get(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, StoreError> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.query("SELECT 1", &[]).map(|_| ())
    }
}

impl<'s> dyn Store + 's {
    /// Typed wrapper over `with_transaction`: the body may fail with any
    /// error convertible from `StoreError`, and that error is returned
    /// unchanged after the rollback.
    pub fn transaction<T, E, F>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Executor) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut body = Some(body);
        let mut outcome: Option<Result<T, E>> = None;
        let result = self.with_transaction(&mut |tx| {
            let Some(body) = body.take() else {
                return Ok(());
            };
            match body(tx) {
                Ok(v) => {
                    outcome = Some(Ok(v));
                    Ok(())
                }
                Err(e) => {
                    outcome = Some(Err(e));
                    Err(StoreError::RolledBack)
                }
            }
        });
        match (result, outcome) {
            (_, Some(Err(e))) => Err(e),
            (Ok(()), Some(Ok(v))) => Ok(v),
            (Err(e), _) => Err(e.into()),
            (Ok(()), None) => Err(StoreError::RolledBack.into()),
        }
    }
}

pub type Db = Arc<dyn Store>;

/// Run blocking database work off the async executor.
pub async fn blocking<T, E, F>(db: &Db, f: F) -> Result<T, E>
where
    F: FnOnce(&dyn Store) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: From<StoreError> + Send + 'static,
{
    let db = Arc::clone(db);
    match rocket::tokio::task::spawn_blocking(move || f(db.as_ref())).await {
        Ok(result) => result,
        Err(e) => Err(StoreError::Task(e.to_string()).into()),
    }
}

/// Pick the backend from configuration: PostgreSQL when a connection URL
/// is set, otherwise the SQLite file.
pub fn connect(config: &Config) -> Result<Db, StoreError> {
    match &config.database_url {
        Some(url) => {
            log::info!(
                "Connecting to PostgreSQL (ssl: {}, query mode: {:?})",
                config.postgres_ssl,
                config.pg_query_mode
            );
            Ok(Arc::new(PgStore::connect(
                url,
                config.postgres_ssl,
                config.pg_query_mode,
            )?))
        }
        None => {
            log::info!("Opening SQLite database at {}", config.sqlite_path.display());
            Ok(Arc::new(SqliteStore::open(&config.sqlite_path)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        let cols: Arc<[String]> = vec!["id".to_string(), "name".to_string(), "n".to_string()].into();
        Row::new(
            cols,
            vec![Value::Text("42".into()), Value::Integer(7), Value::Null],
        )
    }

    #[test]
    fn row_getters_are_lenient_about_text_numbers() {
        let r = row();
        assert_eq!(r.i64("id").unwrap(), 42);
        assert_eq!(r.string("name").unwrap(), "7");
        assert_eq!(r.opt_i64("n").unwrap(), None);
        assert_eq!(r.opt_string("N").unwrap(), None);
    }

    #[test]
    fn row_missing_column_is_an_error() {
        let r = row();
        assert!(matches!(r.i64("nope"), Err(StoreError::MissingColumn(_))));
        assert!(matches!(r.i64("n"), Err(StoreError::Decode(_))));
    }

    #[test]
    fn value_conversions() {
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(3usize), Value::Integer(3));
        assert_eq!(Value::Text("t".into()).as_bool(), Some(true));
        assert_eq!(Value::Real(2.0).as_i64(), Some(2));
        assert_eq!(Value::Real(2.5).as_i64(), None);
    }

    #[test]
    fn args_macro_builds_value_slice() {
        let name = String::from("Home");
        let params = args![1, &name, None::<i64>];
        assert_eq!(params.len(), 3);
        assert_eq!(params[1], Value::Text("Home".into()));
        assert!(params[2].is_null());
        assert!(args![].is_empty());
    }

    #[test]
    fn query_mode_parse() {
        assert_eq!(QueryMode::parse("Extended"), Some(QueryMode::Extended));
        assert_eq!(QueryMode::parse(" simple "), Some(QueryMode::Simple));
        assert_eq!(QueryMode::parse("fast"), None);
    }
}
