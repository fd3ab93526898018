//! SQLite backend.
//!
//! Triggers play the part of stored procedures: they are the only named
//! program objects SQLite keeps in its schema.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::debug;

use super::{Database, Dialect, Procedure, Table};
use crate::error::{MigrateError, Result};
use crate::records::{parse_timestamp, LiteralStyle, Records, Row, Value};

/// A single-connection SQLite database.
///
/// The pool never lets its connection expire, so `sqlite::memory:` keeps its
/// contents for the lifetime of the value.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Opens `url`, creating the file if needed.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// Wraps an existing pool. The pool should hold a single connection.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn decode(row: &SqliteRow, index: usize) -> Result<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_uppercase();
    let declared = row.columns()[index].type_info().name().to_uppercase();

    let value = if storage.contains("INT") {
        Value::Integer(row.try_get_unchecked(index)?)
    } else if storage == "REAL" {
        Value::Float(row.try_get_unchecked(index)?)
    } else if storage == "BLOB" {
        Value::Bytes(row.try_get_unchecked(index)?)
    } else {
        let text: String = row.try_get_unchecked(index)?;
        if declared.contains("DATE") || declared.contains("TIME") {
            parse_timestamp(&text).map_or(Value::Text(text), Value::Timestamp)
        } else {
            Value::Text(text)
        }
    };
    Ok(value)
}

fn to_records(rows: &[SqliteRow]) -> Result<Records> {
    let columns = rows.first().map_or_else(Vec::new, |row| {
        row.columns().iter().map(|c| c.name().to_owned()).collect()
    });

    let mut records = Records {
        columns,
        rows: Vec::with_capacity(rows.len()),
    };
    for row in rows {
        let values = (0..row.len())
            .map(|i| decode(row, i))
            .collect::<Result<Vec<_>>>()?;
        records.rows.push(Row(values));
    }
    Ok(records)
}

#[async_trait]
impl Database for SqliteDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&self, statement: &str) -> Result<()> {
        sqlx::raw_sql(statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<Records> {
        let rows = sqlx::raw_sql(sql).fetch_all(&self.pool).await?;
        to_records(&rows)
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND substr(name, 1, 7) != 'sqlite_' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn table(&self, name: &str) -> Result<Table> {
        let create: Option<String> =
            sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        let create =
            create.ok_or_else(|| MigrateError::InvalidState(format!("table {name:?} not found")))?;

        let refs: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT \"table\" FROM pragma_foreign_key_list(?)")
                .bind(name)
                .fetch_all(&self.pool)
                .await?;

        Ok(Table {
            name: name.to_owned(),
            create,
            refs,
        })
    }

    async fn has_table(&self, name: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn procedures(&self) -> Result<Vec<Procedure>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT name, sql FROM sqlite_master WHERE type = 'trigger' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, create)| Procedure { name, create })
            .collect())
    }

    async fn drop_procedure(&self, name: &str) -> Result<()> {
        self.execute(&format!("DROP TRIGGER IF EXISTS {}", self.quote_identifier(name)))
            .await
    }

    async fn reset(&self) -> Result<()> {
        self.execute("PRAGMA foreign_keys = OFF").await?;
        for procedure in self.procedures().await? {
            self.drop_procedure(&procedure.name).await?;
        }
        for table in self.table_names().await? {
            debug!(%table, "dropping table");
            self.execute(&format!("DROP TABLE {}", self.quote_identifier(&table)))
                .await?;
        }
        self.execute("PRAGMA foreign_keys = ON").await
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn literal_style(&self) -> LiteralStyle {
        LiteralStyle::Doubled
    }

    fn procedure_label(&self) -> &'static str {
        "trigger"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_db() -> SqliteDatabase {
        SqliteDatabase::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_memory_database_survives_between_statements() {
        let db = create_test_db().await;
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)").await.unwrap();
        db.execute("INSERT INTO t VALUES (1)").await.unwrap();

        let records = db.records("t").await.unwrap();
        assert_eq!(records.columns, vec!["id"]);
        assert_eq!(records.rows, vec![Row(vec![Value::Integer(1)])]);
    }

    #[tokio::test]
    async fn test_decode_values() {
        let db = create_test_db().await;
        db.execute(
            "CREATE TABLE v (i INTEGER, r REAL, t TEXT, d DATETIME, b BLOB, n TEXT, s DATETIME)",
        )
        .await
        .unwrap();
        db.execute(
            "INSERT INTO v VALUES (7, 2.5, 'x', '2025-04-19 00:33:32', X'0102', NULL, 'soon')",
        )
        .await
        .unwrap();

        let records = db.records("v").await.unwrap();
        let ts = parse_timestamp("2025-04-19 00:33:32").unwrap();
        assert_eq!(
            records.rows[0].0,
            vec![
                Value::Integer(7),
                Value::Float(2.5),
                Value::Text("x".into()),
                Value::Timestamp(ts),
                Value::Bytes(vec![1, 2]),
                Value::Null,
                Value::Text("soon".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_introspection() {
        let db = create_test_db().await;
        db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY)").await.unwrap();
        db.execute("CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER REFERENCES users(id))")
            .await
            .unwrap();
        db.execute("CREATE TRIGGER no_delete BEFORE DELETE ON users BEGIN SELECT RAISE(ABORT, 'no'); END")
            .await
            .unwrap();

        assert_eq!(db.table_names().await.unwrap(), vec!["posts", "users"]);
        assert!(db.has_table("users").await.unwrap());
        assert!(!db.has_table("_migrations").await.unwrap());

        let posts = db.table("posts").await.unwrap();
        assert_eq!(posts.refs, vec!["users"]);
        assert!(posts.create.starts_with("CREATE TABLE posts"));

        let procedures = db.procedures().await.unwrap();
        assert_eq!(procedures.len(), 1);
        assert_eq!(procedures[0].name, "no_delete");
    }

    #[tokio::test]
    async fn test_reset_drops_everything() {
        let db = create_test_db().await;
        db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY)").await.unwrap();
        db.execute("CREATE TABLE posts (user_id INTEGER REFERENCES users(id))")
            .await
            .unwrap();
        db.execute("INSERT INTO users VALUES (1)").await.unwrap();
        db.execute("INSERT INTO posts VALUES (1)").await.unwrap();
        db.execute("CREATE TRIGGER tr AFTER INSERT ON users BEGIN SELECT 1; END")
            .await
            .unwrap();

        db.reset().await.unwrap();

        assert!(db.table_names().await.unwrap().is_empty());
        assert!(db.procedures().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_execute_error_propagates() {
        let db = create_test_db().await;
        let err = db.execute("INSERT INTO nowhere VALUES (1)").await.unwrap_err();
        assert!(matches!(err, MigrateError::Database(_)));
    }
}
