//! Live database access.
//!
//! Everything that talks to a database goes through the [`Database`] trait.
//! Two backends exist: [`SqliteDatabase`] and [`MySqlDatabase`], picked by
//! [`connect`] from the URL scheme.

mod mysql;
mod sqlite;

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::records::{LiteralStyle, Records, Value};

pub use mysql::MySqlDatabase;
pub use sqlite::SqliteDatabase;

/// Name of the bookkeeping table.
pub const MIGRATION_TABLE: &str = "_migrations";

/// Name of the procedure that guards down migrations.
pub const GUARD_PROCEDURE: &str = "_migration_exists";

/// SQL flavor of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Dialect {
    /// MySQL and compatible servers.
    Mysql,
    /// SQLite.
    Sqlite,
}

impl Dialect {
    /// Picks the dialect from a `mysql:` or `sqlite:` URL.
    pub fn from_url(url: &str) -> Result<Self> {
        if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else if url.starts_with("mysql:") || url.starts_with("mariadb:") {
            Ok(Self::Mysql)
        } else {
            Err(MigrateError::UnsupportedDatabase(url.to_owned()))
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
        })
    }
}

/// A table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// The statement that creates the table, as the database reports it.
    pub create: String,
    /// Tables this one references through foreign keys.
    pub refs: Vec<String>,
}

/// A stored procedure (or trigger) definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Procedure {
    /// Procedure name.
    pub name: String,
    /// The statement that creates it.
    pub create: String,
}

/// A connection to a live database.
#[async_trait]
pub trait Database: Send + Sync {
    /// The SQL flavor spoken by this connection.
    fn dialect(&self) -> Dialect;

    /// Runs one statement, discarding any result rows.
    async fn execute(&self, statement: &str) -> Result<()>;

    /// Runs one statement and returns its rows.
    async fn query(&self, sql: &str) -> Result<Records>;

    /// All rows of `table`.
    async fn records(&self, table: &str) -> Result<Records> {
        self.query(&format!("SELECT * FROM {}", self.quote_identifier(table)))
            .await
    }

    /// Names of all user tables.
    async fn table_names(&self) -> Result<Vec<String>>;

    /// Definition of `name`.
    async fn table(&self, name: &str) -> Result<Table>;

    /// Whether a table called `name` exists.
    async fn has_table(&self, name: &str) -> Result<bool>;

    /// Definitions of the tracked procedures that exist.
    async fn procedures(&self) -> Result<Vec<Procedure>>;

    /// Drops a tracked procedure if it exists.
    async fn drop_procedure(&self, name: &str) -> Result<()>;

    /// Drops every table and tracked procedure.
    async fn reset(&self) -> Result<()>;

    /// Quotes an identifier.
    fn quote_identifier(&self, name: &str) -> String;

    /// How generated string literals are spelled.
    fn literal_style(&self) -> LiteralStyle;

    /// What the tracked procedures are called in reports.
    fn procedure_label(&self) -> &'static str {
        "stored procedure"
    }
}

/// Connects to the database at `url`.
pub async fn connect(url: &str) -> Result<Box<dyn Database>> {
    let dialect = Dialect::from_url(url)?;
    debug!(%dialect, "connecting");
    Ok(match dialect {
        Dialect::Sqlite => Box::new(SqliteDatabase::connect(url).await?),
        Dialect::Mysql => Box::new(MySqlDatabase::connect(url).await?),
    })
}

/// Every table of `db`, referenced tables before the tables referencing them.
pub async fn tables(db: &dyn Database) -> Result<Vec<Table>> {
    let mut tables = Vec::new();
    for name in db.table_names().await? {
        let table = db.table(&name).await.map_err(|e| e.in_table(&name))?;
        tables.push(table);
    }
    order_by_references(tables)
}

/// Orders tables so that every table comes after the tables it references.
///
/// Tables keep their relative order otherwise. Self references are allowed.
/// Tables whose references can never be satisfied (missing tables or cycles)
/// are a [`MigrateError::PendingTables`] error.
pub fn order_by_references(tables: Vec<Table>) -> Result<Vec<Table>> {
    let mut done: BTreeSet<String> = BTreeSet::new();
    let mut ordered = Vec::with_capacity(tables.len());
    let mut pending = tables;

    loop {
        let before = pending.len();
        let mut waiting = Vec::new();
        for table in pending {
            let ready = table
                .refs
                .iter()
                .all(|r| *r == table.name || done.contains(r));
            if ready {
                done.insert(table.name.clone());
                ordered.push(table);
            } else {
                waiting.push(table);
            }
        }
        pending = waiting;

        if pending.is_empty() {
            return Ok(ordered);
        }
        if pending.len() == before {
            return Err(MigrateError::PendingTables(
                pending.into_iter().map(|t| t.name).collect(),
            ));
        }
    }
}

/// Reads a single text cell, as returned by introspection queries.
pub(crate) fn text_cell(records: &Records, row: usize, column: usize) -> Option<String> {
    match records.rows.get(row)?.0.get(column)? {
        Value::Text(s) => Some(s.clone()),
        Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
