//! Reversibility check.
//!
//! A migration passes when applying its up file and then its down file leaves
//! the database exactly as it was, and, when it declares a `.all.sql` file,
//! when replaying that file reproduces the state right after the up file.

use std::path::Path;

use tracing::{info, warn};

use crate::database::{Database, MIGRATION_TABLE};
use crate::error::{MigrateError, Result};
use crate::executor::{apply_file, apply_files};
use crate::migration::{Ignores, Migrations};
use crate::state::{diff_database, take_snapshot};

/// Checks migration `number` of the catalog in `dir` on the scratch database
/// `db`, which is reset first.
///
/// Returns the diff report, empty when the migration is reversible.
///
/// # Errors
///
/// [`MigrateError::NoMigration`] when `number` is unknown or is the first
/// migration, [`MigrateError::InvalidState`] when it has no up/down files,
/// and any failure to run the scripts or read the database.
pub async fn check_migration(
    db: &dyn Database,
    dir: &Path,
    migrations: &Migrations,
    number: u64,
) -> Result<String> {
    let migrations = migrations.up_to(number)?;
    let Some((migration, before)) = migrations.split_last() else {
        return Err(MigrateError::NoMigration("no migration to check".into()));
    };
    if before.is_empty() {
        return Err(MigrateError::NoMigration("no migration to check".into()));
    }
    if !migration.up_down {
        return Err(MigrateError::InvalidState(format!(
            "no up/down migration: number={:06}",
            migration.number
        )));
    }

    db.reset().await?;
    let before = Migrations::from(before.to_vec());
    let files = match before.file_names_from_snapshot() {
        Err(MigrateError::NoMigration(reason)) => {
            warn!("{reason}, replaying from the first migration");
            before.applicable_file_names()
        }
        other => other?,
    };
    apply_files(db, dir, &files).await?;
    let initial = take_snapshot(db).await?;

    info!(number = migration.number, "checking up/down");
    apply_file(db, dir.join(migration.up_name())).await?;
    let applied = if migration.snapshot {
        Some(take_snapshot(db).await?)
    } else {
        None
    };
    apply_file(db, dir.join(migration.down_name())).await?;

    let report = diff_database(db, &initial, &migration.ignores).await?;
    if !report.is_empty() {
        return Ok(trimmed(report));
    }
    info!("up/down ok");

    let Some(applied) = applied else {
        return Ok(String::new());
    };

    info!(number = migration.number, "checking snapshot");
    db.reset().await?;
    apply_file(db, dir.join(migration.snapshot_name())).await?;
    let ignores: Ignores = [(MIGRATION_TABLE, "applied")].into_iter().collect();
    let report = diff_database(db, &applied, &ignores).await?;
    if report.is_empty() {
        info!("snapshot ok");
    }
    Ok(trimmed(report))
}

fn trimmed(mut report: String) -> String {
    if report.ends_with('\n') {
        report.pop();
    }
    report
}

/// Numbers of the checkable migrations from `from` through `to` (the last
/// migration when `None`).
///
/// Snapshot-only migrations and the very first migration have nothing to
/// roll back and are left out.
///
/// # Errors
///
/// [`MigrateError::NoMigration`] when either number is unknown,
/// [`MigrateError::InvalidState`] when `from` comes after `to`.
pub fn numbers_to_check(migrations: &Migrations, from: u64, to: Option<u64>) -> Result<Vec<u64>> {
    let start = migrations.find_number(from)?;
    let end = match to {
        Some(to) => migrations.find_number(to)?,
        None => migrations.len().saturating_sub(1),
    };
    if start > end {
        return Err(MigrateError::InvalidState(format!(
            "--from ({from:06}) must be less than {:06}",
            migrations[end].number
        )));
    }

    Ok(migrations[start..=end]
        .iter()
        .enumerate()
        .filter(|(i, m)| start + i > 0 && m.up_down)
        .map(|(_, m)| m.number)
        .collect())
}
