//! MySQL backend.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::debug;

use super::{text_cell, Database, Dialect, Procedure, Table, GUARD_PROCEDURE};
use crate::error::{MigrateError, Result};
use crate::records::{parse_timestamp, LiteralStyle, Records, Row, Value};

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"REFERENCES `([^`]*)`").expect("REFERENCE: invalid regex pattern")
});

static AUTO_INCREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r" AUTO_INCREMENT=[0-9]+").expect("AUTO_INCREMENT: invalid regex pattern")
});

/// Procedures whose definitions are captured and compared.
const TRACKED_PROCEDURES: &[&str] = &[GUARD_PROCEDURE];

/// A single-connection MySQL database.
#[derive(Debug, Clone)]
pub struct MySqlDatabase {
    pool: MySqlPool,
}

impl MySqlDatabase {
    /// Connects to `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Wraps an existing pool. The pool should hold a single connection so
    /// that session settings stick.
    #[must_use]
    pub const fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn decode(row: &MySqlRow, index: usize) -> Result<Value> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }
    let type_name = row.columns()[index].type_info().name().to_uppercase();
    let base = type_name.split_whitespace().next().unwrap_or_default();

    let value = match base {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" | "BOOLEAN"
            if type_name.ends_with("UNSIGNED") =>
        {
            let v: u64 = row.try_get_unchecked(index)?;
            i64::try_from(v).map_or_else(|_| Value::Text(v.to_string()), Value::Integer)
        }
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" | "BOOLEAN" => {
            Value::Integer(row.try_get_unchecked(index)?)
        }
        "FLOAT" | "DOUBLE" => Value::Float(row.try_get_unchecked(index)?),
        "DATETIME" | "TIMESTAMP" | "DATE" => {
            let text: String = row.try_get_unchecked(index)?;
            parse_timestamp(&text).map_or(Value::Text(text), Value::Timestamp)
        }
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => Value::Bytes(row.try_get_unchecked(index)?),
        _ => {
            let bytes: Vec<u8> = row.try_get_unchecked(index)?;
            Value::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
    };
    Ok(value)
}

fn to_records(rows: &[MySqlRow]) -> Result<Records> {
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

/// Table names referenced by `REFERENCES` clauses, in order of appearance.
fn references(create: &str) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    for caps in REFERENCE.captures_iter(create) {
        let name = &caps[1];
        if !refs.iter().any(|r| r == name) {
            refs.push(name.to_owned());
        }
    }
    refs
}

#[async_trait]
impl Database for MySqlDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
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
        let records = self.query("SHOW TABLES").await?;
        Ok((0..records.rows.len())
            .filter_map(|i| text_cell(&records, i, 0))
            .collect())
    }

    async fn table(&self, name: &str) -> Result<Table> {
        let records = self
            .query(&format!("SHOW CREATE TABLE {}", self.quote_identifier(name)))
            .await?;
        let create = text_cell(&records, 0, 1)
            .ok_or_else(|| MigrateError::InvalidState(format!("table {name:?} not found")))?;
        let create = AUTO_INCREMENT.replace(&create, "").into_owned();

        Ok(Table {
            name: name.to_owned(),
            refs: references(&create),
            create,
        })
    }

    async fn has_table(&self, name: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn procedures(&self) -> Result<Vec<Procedure>> {
        let mut procedures = Vec::new();
        for &name in TRACKED_PROCEDURES {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM information_schema.ROUTINES \
                 WHERE ROUTINE_SCHEMA = DATABASE() AND ROUTINE_TYPE = 'PROCEDURE' \
                 AND ROUTINE_NAME = ?",
            )
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
            if count == 0 {
                continue;
            }

            let records = self
                .query(&format!("SHOW CREATE PROCEDURE {}", self.quote_identifier(name)))
                .await?;
            let create = records
                .column_index("Create Procedure")
                .and_then(|i| text_cell(&records, 0, i))
                .ok_or_else(|| {
                    MigrateError::InvalidState(format!("cannot read procedure {name:?}"))
                })?;
            procedures.push(Procedure {
                name: name.to_owned(),
                create,
            });
        }
        Ok(procedures)
    }

    async fn drop_procedure(&self, name: &str) -> Result<()> {
        self.execute(&format!(
            "DROP PROCEDURE IF EXISTS {}",
            self.quote_identifier(name)
        ))
        .await
    }

    async fn reset(&self) -> Result<()> {
        self.execute("SET FOREIGN_KEY_CHECKS = 0").await?;
        for table in self.table_names().await? {
            debug!(%table, "dropping table");
            self.execute(&format!("DROP TABLE {}", self.quote_identifier(&table)))
                .await?;
        }
        self.execute("SET FOREIGN_KEY_CHECKS = 1").await?;
        for &name in TRACKED_PROCEDURES {
            self.drop_procedure(name).await?;
        }
        Ok(())
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn literal_style(&self) -> LiteralStyle {
        LiteralStyle::Backslash
    }
}
