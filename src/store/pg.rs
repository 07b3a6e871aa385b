use std::sync::Arc;

use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use postgres::types::{ToSql, Type};
use postgres::{Client, GenericClient, NoTls, SimpleQueryMessage, Statement};
use postgres_openssl::MakeTlsConnector;
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;

use super::{sql, Dialect, Executor, QueryMode, Row, RunResult, Store, StoreError, Value};

enum PgPool {
    Plain(Pool<PostgresConnectionManager<NoTls>>),
    Tls(Pool<PostgresConnectionManager<MakeTlsConnector>>),
}

/// PostgreSQL-backed implementation of the Store trait.
pub struct PgStore {
    pool: PgPool,
    mode: QueryMode,
}

impl PgStore {
    pub fn connect(url: &str, ssl: bool, mode: QueryMode) -> Result<Self, StoreError> {
        let config: postgres::Config = url.parse()?;
        let pool = if ssl {
            let mut builder = SslConnector::builder(SslMethod::tls())?;
            // Encrypt only. Hosted providers often present certificates
            // that do not chain to a local root.
            builder.set_verify(SslVerifyMode::NONE);
            let tls = MakeTlsConnector::new(builder.build());
            PgPool::Tls(
                Pool::builder()
                    .max_size(10)
                    .build(PostgresConnectionManager::new(config, tls))?,
            )
        } else {
            PgPool::Plain(
                Pool::builder()
                    .max_size(10)
                    .build(PostgresConnectionManager::new(config, NoTls))?,
            )
        };
        Ok(Self { pool, mode })
    }

    fn with_client<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Client) -> Result<T, StoreError>,
    {
        match &self.pool {
            PgPool::Plain(pool) => {
                let mut conn = pool.get()?;
                f(&mut *conn)
            }
            PgPool::Tls(pool) => {
                let mut conn = pool.get()?;
                f(&mut *conn)
            }
        }
    }
}

fn log_failure(sql: &str, e: postgres::Error) -> StoreError {
    log::error!("PostgreSQL statement failed: {} | SQL: {}", e, sql.trim());
    StoreError::Postgres(e)
}

// ── Simple protocol ─────────────────────────────────────────────────

/// Collect data rows and the affected-row count of the last command.
/// Every cell arrives as text; `Row` accessors parse numbers on demand.
fn simple_rows(messages: Vec<SimpleQueryMessage>) -> (Vec<Row>, u64) {
    let mut rows = Vec::new();
    let mut affected = 0;
    let mut columns: Option<Arc<[String]>> = None;

    for message in messages {
        match message {
            SimpleQueryMessage::Row(r) => {
                let cols = columns
                    .get_or_insert_with(|| {
                        r.columns()
                            .iter()
                            .map(|c| c.name().to_string())
                            .collect::<Vec<_>>()
                            .into()
                    })
                    .clone();
                let values = (0..r.len())
                    .map(|i| r.get(i).map(|s| Value::Text(s.to_string())).unwrap_or(Value::Null))
                    .collect();
                rows.push(Row::new(cols, values));
            }
            SimpleQueryMessage::CommandComplete(n) => {
                affected = n;
                columns = None;
            }
            _ => {}
        }
    }

    (rows, affected)
}

// ── Extended protocol ───────────────────────────────────────────────

/// Convert each parameter to the Rust type the server inferred for its
/// placeholder, so `'5'` can bind to an int8 and integers to a text column.
fn bind(stmt: &Statement, params: &[Value]) -> Result<Vec<Box<dyn ToSql + Sync>>, StoreError> {
    let types = stmt.params();
    if types.len() != params.len() {
        return Err(StoreError::ParamCount {
            expected: types.len(),
            got: params.len(),
        });
    }
    types
        .iter()
        .zip(params)
        .enumerate()
        .map(|(i, (ty, v))| typed_param(i + 1, ty, v))
        .collect()
}

fn typed_param(pos: usize, ty: &Type, v: &Value) -> Result<Box<dyn ToSql + Sync>, StoreError> {
    let mismatch = || StoreError::InvalidParam(format!("${}: cannot bind {} as {}", pos, v.kind(), ty));
    let int = || -> Result<Option<i64>, StoreError> {
        if v.is_null() {
            return Ok(None);
        }
        v.as_i64().map(Some).ok_or_else(mismatch)
    };
    let float = || -> Result<Option<f64>, StoreError> {
        if v.is_null() {
            return Ok(None);
        }
        v.as_f64().map(Some).ok_or_else(mismatch)
    };

    if *ty == Type::INT2 {
        let n = int()?.map(i16::try_from).transpose().map_err(|_| mismatch())?;
        Ok(Box::new(n))
    } else if *ty == Type::INT4 {
        let n = int()?.map(i32::try_from).transpose().map_err(|_| mismatch())?;
        Ok(Box::new(n))
    } else if *ty == Type::INT8 {
        Ok(Box::new(int()?))
    } else if *ty == Type::FLOAT4 {
        Ok(Box::new(float()?.map(|f| f as f32)))
    } else if *ty == Type::FLOAT8 {
        Ok(Box::new(float()?))
    } else if *ty == Type::BOOL {
        let b = if v.is_null() {
            None
        } else {
            Some(v.as_bool().ok_or_else(mismatch)?)
        };
        Ok(Box::new(b))
    } else if *ty == Type::BYTEA {
        let bytes = match v {
            Value::Null => None,
            Value::Blob(b) => Some(b.clone()),
            Value::Text(s) => Some(s.as_bytes().to_vec()),
            _ => return Err(mismatch()),
        };
        Ok(Box::new(bytes))
    } else {
        let text = match v {
            Value::Null => None,
            Value::Blob(_) => return Err(mismatch()),
            other => other.as_text(),
        };
        Ok(Box::new(text))
    }
}

fn decode_cell(row: &postgres::Row, idx: usize, ty: &Type) -> Result<Value, StoreError> {
    let value = if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)?.map(|n| Value::Integer(n.into()))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)?.map(|n| Value::Integer(n.into()))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)?.map(Value::Integer)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)?.map(|f| Value::Real(f.into()))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)?.map(Value::Real)
    } else if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool)
    } else if *ty == Type::BYTEA {
        row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Blob)
    } else {
        match row.try_get::<_, Option<String>>(idx) {
            Ok(s) => s.map(Value::Text),
            Err(e) => {
                log::debug!("column {} of type {} decoded as NULL: {}", idx, ty, e);
                None
            }
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

fn decode_rows(stmt: &Statement, rows: &[postgres::Row]) -> Result<Vec<Row>, StoreError> {
    let columns: Arc<[String]> = stmt
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect::<Vec<_>>()
        .into();
    rows.iter()
        .map(|row| {
            let values = row
                .columns()
                .iter()
                .enumerate()
                .map(|(i, col)| decode_cell(row, i, col.type_()))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Row::new(Arc::clone(&columns), values))
        })
        .collect()
}

// ── Shared execution ────────────────────────────────────────────────

fn first_id(rows: &[Row]) -> Option<i64> {
    rows.first().and_then(|r| r.opt_i64("id").ok().flatten())
}

fn query_with<C: GenericClient>(
    client: &mut C,
    mode: QueryMode,
    sql: &str,
    params: &[Value],
) -> Result<Vec<Row>, StoreError> {
    match mode {
        QueryMode::Simple => {
            let text = sql::inline_params(sql, params)?;
            let messages = client.simple_query(&text).map_err(|e| log_failure(sql, e))?;
            Ok(simple_rows(messages).0)
        }
        QueryMode::Extended => {
            let numbered = sql::number_placeholders(sql);
            let stmt = client.prepare(&numbered).map_err(|e| log_failure(sql, e))?;
            let bound = bind(&stmt, params)?;
            let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|b| b.as_ref()).collect();
            let rows = client.query(&stmt, &refs).map_err(|e| log_failure(sql, e))?;
            decode_rows(&stmt, &rows)
        }
    }
}

fn run_with<C: GenericClient>(
    client: &mut C,
    mode: QueryMode,
    sql: &str,
    params: &[Value],
) -> Result<RunResult, StoreError> {
    let insert = sql::is_insert(sql);
    let text = if insert {
        sql::with_returning_id(sql)
    } else {
        sql.to_string()
    };

    match mode {
        QueryMode::Simple => {
            let inlined = sql::inline_params(&text, params)?;
            let messages = client.simple_query(&inlined).map_err(|e| log_failure(sql, e))?;
            let (rows, affected) = simple_rows(messages);
            Ok(RunResult {
                last_id: first_id(&rows),
                changes: affected,
            })
        }
        QueryMode::Extended => {
            let numbered = sql::number_placeholders(&text);
            let stmt = client.prepare(&numbered).map_err(|e| log_failure(sql, e))?;
            let bound = bind(&stmt, params)?;
            let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|b| b.as_ref()).collect();
            if insert {
                let rows = client.query(&stmt, &refs).map_err(|e| log_failure(sql, e))?;
                let decoded = decode_rows(&stmt, &rows)?;
                Ok(RunResult {
                    last_id: first_id(&decoded),
                    changes: rows.len() as u64,
                })
            } else {
                let changes = client.execute(&stmt, &refs).map_err(|e| log_failure(sql, e))?;
                Ok(RunResult {
                    last_id: None,
                    changes,
                })
            }
        }
    }
}

struct PgTx<'a, 'b> {
    tx: &'a mut postgres::Transaction<'b>,
    mode: QueryMode,
}

impl Executor for PgTx<'_, '_> {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        query_with(&mut *self.tx, self.mode, sql, params)
    }

    fn run(&mut self, sql: &str, params: &[Value]) -> Result<RunResult, StoreError> {
        run_with(&mut *self.tx, self.mode, sql, params)
    }
}

impl Store for PgStore {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        self.with_client(|client| query_with(client, self.mode, sql, params))
    }

    fn run(&self, sql: &str, params: &[Value]) -> Result<RunResult, StoreError> {
        self.with_client(|client| run_with(client, self.mode, sql, params))
    }

    fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.with_client(|client| client.batch_execute(sql).map_err(|e| log_failure(sql, e)))
    }

    fn with_transaction(
        &self,
        body: &mut dyn FnMut(&mut dyn Executor) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mode = self.mode;
        self.with_client(|client| {
            let mut tx = client.transaction().map_err(|e| log_failure("BEGIN", e))?;
            let result = body(&mut PgTx { tx: &mut tx, mode });
            match result {
                Ok(()) => tx.commit().map_err(|e| log_failure("COMMIT", e)),
                Err(e) => {
                    if let Err(rb) = tx.rollback() {
                        log::error!("PostgreSQL rollback failed: {}", rb);
                    }
                    Err(e)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(mode: QueryMode) -> (PgStore, String) {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PgStore::connect(&url, false, mode).expect("connect");
        let table = format!("navdeck_t_{}", uuid::Uuid::new_v4().simple());
        store
            .execute_batch(&format!(
                "CREATE TABLE {} (id SERIAL PRIMARY KEY, name TEXT UNIQUE, n INTEGER, f DOUBLE PRECISION)",
                table
            ))
            .expect("create table");
        (store, table)
    }

    fn exercise(mode: QueryMode) {
        let (s, t) = store(mode);
        let r = s
            .run(&format!("INSERT INTO {} (name, n, f) VALUES (?, ?, ?)", t), args!["it's", 5, 1.5])
            .unwrap();
        assert_eq!(r.last_id, Some(1));
        assert_eq!(r.changes, 1);

        let dup = s
            .run(&format!("INSERT INTO {} (name) VALUES (?)", t), args!["it's"])
            .unwrap_err();
        assert!(dup.is_unique_violation());

        let ignored = s
            .run(
                &format!("INSERT INTO {} (name) VALUES (?) ON CONFLICT DO NOTHING", t),
                args!["it's"],
            )
            .unwrap();
        assert_eq!(ignored.changes, 0);
        assert_eq!(ignored.last_id, None);

        let row = s
            .get(&format!("SELECT id, name, n, f FROM {} WHERE n = ?", t), args!["5"])
            .unwrap()
            .unwrap();
        assert_eq!(row.string("name").unwrap(), "it's");
        assert_eq!(row.i64("n").unwrap(), 5);

        let db: &dyn Store = &s;
        let res: Result<(), StoreError> = db.transaction(|tx| {
            tx.run(&format!("UPDATE {} SET n = ?", t), args![9])?;
            Err(StoreError::RolledBack)
        });
        assert!(res.is_err());
        let row = s.get(&format!("SELECT n FROM {}", t), &[]).unwrap().unwrap();
        assert_eq!(row.i64("n").unwrap(), 5);

        s.execute_batch(&format!("DROP TABLE {}", t)).unwrap();
    }

    fn bound(ty: &Type, v: Value) -> Result<String, StoreError> {
        typed_param(1, ty, &v).map(|b| format!("{:?}", b))
    }

    #[test]
    fn parameters_follow_the_inferred_column_type() {
        assert_eq!(bound(&Type::INT8, Value::from("5")).unwrap(), "Some(5)");
        assert_eq!(bound(&Type::INT4, Value::Real(3.0)).unwrap(), "Some(3)");
        assert_eq!(bound(&Type::INT4, Value::Null).unwrap(), "None");
        assert_eq!(bound(&Type::TEXT, Value::Integer(42)).unwrap(), "Some(\"42\")");
        assert_eq!(bound(&Type::BOOL, Value::from("t")).unwrap(), "Some(true)");
        assert_eq!(bound(&Type::FLOAT8, Value::from("1.5")).unwrap(), "Some(1.5)");
    }

    #[test]
    fn unbindable_parameters_are_rejected() {
        let overflow = bound(&Type::INT2, Value::Integer(70_000)).unwrap_err();
        assert!(overflow.to_string().contains("$1"));
        assert!(bound(&Type::INT8, Value::from("five")).is_err());
        assert!(bound(&Type::BOOL, Value::from("maybe")).is_err());
        assert!(bound(&Type::TEXT, Value::Blob(vec![1, 2])).is_err());
    }

    #[test]
    fn returning_id_is_read_from_the_first_row() {
        let cols: Arc<[String]> = vec!["id".to_string()].into();
        let rows = vec![Row::new(Arc::clone(&cols), vec![Value::Text("17".to_string())])];
        assert_eq!(first_id(&rows), Some(17));
        assert_eq!(first_id(&[]), None);
        let null = vec![Row::new(cols, vec![Value::Null])];
        assert_eq!(first_id(&null), None);
    }

    #[test]
    #[ignore = "requires database"]
    fn simple_mode_against_server() {
        exercise(QueryMode::Simple);
    }

    #[test]
    #[ignore = "requires database"]
    fn extended_mode_against_server() {
        exercise(QueryMode::Extended);
    }
}
