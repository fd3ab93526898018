//! Migration history recorded in the database, and its reconciliation with
//! the catalog.

use std::borrow::Cow;
use std::iter::Peekable;
use std::slice;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use crate::database::{Database, MIGRATION_TABLE};
use crate::error::{MigrateError, Result};
use crate::migration::{Migration, Migrations};
use crate::records::{parse_timestamp, Value};

/// One row of `_migrations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct History {
    /// Migration number.
    pub id: u64,
    /// When it was applied.
    pub applied: Option<NaiveDateTime>,
    /// Title as recorded in the database.
    pub title: String,
}

impl History {
    /// Creates a history entry.
    #[must_use]
    pub fn new(id: u64, applied: Option<NaiveDateTime>, title: impl Into<String>) -> Self {
        Self {
            id,
            applied,
            title: title.into(),
        }
    }
}

/// Reads `_migrations`, ordered by id.
///
/// Fails with [`MigrateError::NoMigrationTable`] when the table does not
/// exist, so callers can fall back to snapshot-based planning.
pub async fn load_histories(db: &dyn Database) -> Result<Vec<History>> {
    if !db.has_table(MIGRATION_TABLE).await? {
        return Err(MigrateError::NoMigrationTable);
    }

    let records = db
        .query(&format!(
            "SELECT id, applied, title FROM {} ORDER BY id",
            db.quote_identifier(MIGRATION_TABLE)
        ))
        .await
        .map_err(|e| e.in_table(MIGRATION_TABLE))?;

    let histories = records
        .rows
        .iter()
        .map(|row| match row.0.as_slice() {
            [id, applied, title] => Ok(History {
                id: history_id(id)?,
                applied: history_applied(applied),
                title: match title {
                    Value::Null => String::new(),
                    Value::Text(s) => s.clone(),
                    other => other.to_string(),
                },
            }),
            _ => Err(MigrateError::InvalidState(format!(
                "unexpected {MIGRATION_TABLE} row: {row}"
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(count = histories.len(), "loaded migration history");
    Ok(histories)
}

fn history_id(value: &Value) -> Result<u64> {
    match value {
        Value::Integer(n) => u64::try_from(*n).ok(),
        Value::Text(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| MigrateError::InvalidState(format!("invalid {MIGRATION_TABLE} id: {value}")))
}

fn history_applied(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Timestamp(ts) => Some(*ts),
        Value::Text(s) => parse_timestamp(s),
        _ => None,
    }
}

/// The number of the last applied migration, or `None` when nothing is
/// recorded.
#[must_use]
pub fn current_num(histories: &[History]) -> Option<u64> {
    histories.last().map(|h| h.id)
}

/// A catalog entry merged with its history row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status<'a> {
    /// The migration. Synthesized from the history row when no file exists.
    pub migration: Cow<'a, Migration>,
    /// The matching history row, if the migration was applied.
    pub history: Option<&'a History>,
}

impl<'a> Status<'a> {
    fn pending(migration: &'a Migration) -> Self {
        Self {
            migration: Cow::Borrowed(migration),
            history: None,
        }
    }

    fn applied(migration: &'a Migration, history: &'a History) -> Self {
        Self {
            migration: Cow::Borrowed(migration),
            history: Some(history),
        }
    }

    fn orphan(history: &'a History) -> Self {
        Self {
            migration: Cow::Owned(Migration::new(history.id, history.title.clone())),
            history: Some(history),
        }
    }

    /// Whether the database records this migration.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        self.history.is_some()
    }

    /// When the migration was applied.
    #[must_use]
    pub fn applied_at(&self) -> Option<NaiveDateTime> {
        self.history.and_then(|h| h.applied)
    }

    /// Whether the database records a migration the catalog does not have.
    #[must_use]
    pub const fn is_missing_file(&self) -> bool {
        matches!(self.migration, Cow::Owned(_))
    }

    /// The database title, when it differs from the file title.
    #[must_use]
    pub fn db_title(&self) -> Option<&'a str> {
        self.history
            .filter(|h| h.title != self.migration.title)
            .map(|h| h.title.as_str())
    }
}

/// Merge-join of the catalog and the history by migration number.
#[derive(Debug, Clone)]
pub struct BuildStatus<'a> {
    migrations: Peekable<slice::Iter<'a, Migration>>,
    histories: Peekable<slice::Iter<'a, History>>,
}

/// Merges `migrations` and `histories`, both sorted by number, into one
/// status per number in ascending order.
#[must_use]
pub fn build_status<'a>(migrations: &'a [Migration], histories: &'a [History]) -> BuildStatus<'a> {
    BuildStatus {
        migrations: migrations.iter().peekable(),
        histories: histories.iter().peekable(),
    }
}

impl<'a> Iterator for BuildStatus<'a> {
    type Item = Status<'a>;

    fn next(&mut self) -> Option<Status<'a>> {
        let m = self.migrations.peek().copied();
        let h = self.histories.peek().copied();

        match (m, h) {
            (Some(m), Some(h)) if m.number < h.id => {
                self.migrations.next();
                Some(Status::pending(m))
            }
            (Some(m), Some(h)) if m.number > h.id => {
                self.histories.next();
                Some(Status::orphan(h))
            }
            (Some(m), Some(h)) => {
                self.migrations.next();
                self.histories.next();
                Some(Status::applied(m, h))
            }
            (Some(m), None) => {
                self.migrations.next();
                Some(Status::pending(m))
            }
            (None, Some(h)) => {
                self.histories.next();
                Some(Status::orphan(h))
            }
            (None, None) => None,
        }
    }
}

/// The catalog as the database sees it: every migration of the catalog plus
/// placeholders for applied migrations whose files are gone.
#[must_use]
pub fn reconciled(migrations: &Migrations, histories: &[History]) -> Migrations {
    build_status(migrations, histories)
        .map(|s| s.migration.into_owned())
        .collect()
}
