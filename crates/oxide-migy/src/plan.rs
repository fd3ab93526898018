//! Which files to run against a live database.

use tracing::{debug, warn};

use crate::database::{Database, MIGRATION_TABLE};
use crate::error::{MigrateError, Result};
use crate::history::{current_num, load_histories, reconciled};
use crate::migration::Migrations;

/// Files that bring `db` to migration `target` (the last migration when
/// `None`).
///
/// Without a `_migrations` table the database is assumed empty and the plan
/// rebuilds it from the latest snapshot. Otherwise the plan moves from the
/// last recorded migration to `target`, forward or backward.
///
/// # Errors
///
/// [`MigrateError::InvalidState`] when `_migrations` exists but holds no row,
/// plus every error of [`Migrations::file_names_to_apply`].
pub async fn files_to_apply(
    db: &dyn Database,
    migrations: &Migrations,
    target: Option<u64>,
) -> Result<Vec<String>> {
    let target = match target {
        Some(n) => n,
        None => last_number(migrations)?,
    };

    let histories = match load_histories(db).await {
        Ok(histories) => histories,
        Err(MigrateError::NoMigrationTable) => {
            debug!(target, "no {MIGRATION_TABLE} table, planning from snapshot");
            return files_from_scratch(migrations, target);
        }
        Err(e) => return Err(e),
    };

    let Some(current) = current_num(&histories) else {
        return Err(MigrateError::InvalidState(format!(
            "'{MIGRATION_TABLE}' table found but not initialized"
        )));
    };
    debug!(current, target, "planning from history");
    reconciled(migrations, &histories).file_names_to_apply(current, target)
}

/// Files that build migration `target` on an empty database.
///
/// Falls back to replaying from the first migration when no snapshot exists
/// up to `target`.
pub fn files_from_scratch(migrations: &Migrations, target: u64) -> Result<Vec<String>> {
    let migrations = migrations.up_to(target)?;
    match migrations.file_names_from_snapshot() {
        Err(MigrateError::NoMigration(reason)) => {
            warn!("{reason}, replaying from the first migration");
            Ok(migrations.applicable_file_names())
        }
        other => other,
    }
}

fn last_number(migrations: &Migrations) -> Result<u64> {
    migrations
        .last()
        .map(|m| m.number)
        .ok_or_else(|| MigrateError::NoMigration("empty catalog".into()))
}
