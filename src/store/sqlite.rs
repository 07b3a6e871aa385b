use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, TransactionBehavior};

use super::{sql, Dialect, Executor, Row, RunResult, Store, StoreError, Value};

pub type DbPool = Pool<SqliteConnectionManager>;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(n) => ToSqlOutput::from(*n),
            Value::Real(f) => ToSqlOutput::from(*f),
            Value::Bool(b) => ToSqlOutput::from(*b),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Blob(b) => ToSqlOutput::from(b.as_slice()),
        })
    }
}

fn from_value_ref(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Integer(n),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

/// Applied to every pooled connection.
fn init_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))
}

fn log_failure(sql: &str, e: rusqlite::Error) -> StoreError {
    log::error!("SQLite statement failed: {} | SQL: {}", e, sql.trim());
    StoreError::Sqlite(e)
}

fn query_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
    let run = || -> rusqlite::Result<Vec<Row>> {
        let mut stmt = conn.prepare_cached(sql)?;
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
            .into();
        let width = columns.len();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_value_ref(row.get_ref(i)?));
            }
            out.push(Row::new(Arc::clone(&columns), values));
        }
        Ok(out)
    };
    run().map_err(|e| log_failure(sql, e))
}

fn run_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<RunResult, StoreError> {
    let changes = conn
        .prepare_cached(sql)
        .and_then(|mut stmt| stmt.execute(params_from_iter(params.iter())))
        .map_err(|e| log_failure(sql, e))?;
    let last_id = if changes > 0 && sql::is_insert(sql) {
        Some(conn.last_insert_rowid())
    } else {
        None
    };
    Ok(RunResult {
        last_id,
        changes: changes as u64,
    })
}

/// SQLite-backed implementation of the Store trait.
pub struct SqliteStore {
    pub pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database file and switch it to WAL.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let manager = SqliteConnectionManager::file(path).with_init(init_connection);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let conn = pool.get()?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        Ok(Self { pool })
    }

    /// Named in-memory database shared by every connection in the pool.
    /// Each distinct `name` is an isolated database.
    pub fn memory(name: &str) -> Result<Self, StoreError> {
        let uri = format!("file:{}?mode=memory&cache=shared", name);
        let manager = SqliteConnectionManager::file(uri).with_init(init_connection);
        let pool = Pool::builder().max_size(4).build(manager)?;
        Ok(Self { pool })
    }
}

struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl Executor for SqliteTx<'_> {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        query_on(self.conn, sql, params)
    }

    fn run(&mut self, sql: &str, params: &[Value]) -> Result<RunResult, StoreError> {
        run_on(self.conn, sql, params)
    }
}

impl Store for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        let conn = self.pool.get()?;
        query_on(&conn, sql, params)
    }

    fn run(&self, sql: &str, params: &[Value]) -> Result<RunResult, StoreError> {
        let conn = self.pool.get()?;
        run_on(&conn, sql, params)
    }

    fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute_batch(sql).map_err(|e| log_failure(sql, e))
    }

    fn with_transaction(
        &self,
        body: &mut dyn FnMut(&mut dyn Executor) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        // IMMEDIATE takes the write lock up front so two writers never
        // deadlock upgrading from a read lock.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = body(&mut SqliteTx { conn: &tx });
        match result {
            Ok(()) => {
                tx.commit()?;
                Ok(())
            }
            Err(e) => {
                if let Err(rb) = tx.rollback() {
                    log::error!("SQLite rollback failed: {}", rb);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn store() -> SqliteStore {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let s = SqliteStore::memory(&format!("sqlite_unit_{}", n)).unwrap();
        s.execute_batch(
            "CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT UNIQUE, score REAL, data BLOB);",
        )
        .unwrap();
        s
    }

    #[test]
    fn insert_reports_last_id_and_changes() {
        let s = store();
        let r = s
            .run("INSERT INTO items (name, score) VALUES (?, ?)", args!["a", 1.5])
            .unwrap();
        assert_eq!(r.last_id, Some(1));
        assert_eq!(r.changes, 1);

        let ignored = s
            .run("INSERT OR IGNORE INTO items (name) VALUES (?)", args!["a"])
            .unwrap();
        assert_eq!(ignored.changes, 0);
        assert_eq!(ignored.last_id, None);

        let upd = s.run("UPDATE items SET score = ?", args![2.0]).unwrap();
        assert_eq!(upd.last_id, None);
        assert_eq!(upd.changes, 1);
    }

    #[test]
    fn query_decodes_each_storage_class() {
        let s = store();
        s.run(
            "INSERT INTO items (name, score, data) VALUES (?, ?, ?)",
            args!["b", None::<f64>, vec![1u8, 2]],
        )
        .unwrap();
        let row = s.get("SELECT * FROM items", &[]).unwrap().unwrap();
        assert_eq!(row.i64("id").unwrap(), 1);
        assert_eq!(row.string("name").unwrap(), "b");
        assert_eq!(row.value("score"), Some(&Value::Null));
        assert_eq!(row.value("data"), Some(&Value::Blob(vec![1, 2])));
    }

    #[test]
    fn unique_violation_is_detected() {
        let s = store();
        s.run("INSERT INTO items (name) VALUES (?)", args!["dup"]).unwrap();
        let err = s
            .run("INSERT INTO items (name) VALUES (?)", args!["dup"])
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let s = store();
        let db: &dyn Store = &s;
        let res: Result<(), StoreError> = db.transaction(|tx| {
            tx.run("INSERT INTO items (name) VALUES (?)", args!["x"])?;
            tx.run("INSERT INTO items (name) VALUES (?)", args!["x"])?;
            Ok(())
        });
        assert!(res.is_err());
        let count = db.get("SELECT COUNT(*) AS n FROM items", &[]).unwrap().unwrap();
        assert_eq!(count.i64("n").unwrap(), 0);
    }

    #[test]
    fn committed_transaction_returns_value() {
        let s = store();
        let db: &dyn Store = &s;
        let id: i64 = db
            .transaction(|tx| {
                let r = tx.run("INSERT INTO items (name) VALUES (?)", args!["y"])?;
                r.last_id.ok_or(StoreError::RolledBack)
            })
            .unwrap();
        assert_eq!(id, 1);
        assert!(db.ping().is_ok());
    }
}
