//! Consolidated snapshot files (`NNNNNN_title.all.sql`).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::database::Database;
use crate::error::{MigrateError, Result};
use crate::executor::{apply_files, dump};
use crate::migration::Migrations;

/// Replays the catalog in `dir` up to migration `number` on the scratch
/// database `db` and dumps the result to the migration's `.all.sql` file.
///
/// Replaying starts at the latest earlier snapshot. An existing `.all.sql`
/// file for `number` is only replaced when `force` is set. Nothing is
/// written unless the whole dump succeeds.
///
/// # Errors
///
/// [`MigrateError::MigrationExists`] when the file exists and `force` is not
/// set, [`MigrateError::NoMigration`] when `number` is unknown, and any
/// failure to run the scripts or write the file.
pub async fn write_snapshot_file(
    db: &dyn Database,
    dir: &Path,
    migrations: &Migrations,
    number: u64,
    force: bool,
) -> Result<PathBuf> {
    let migrations = migrations.since_snapshot_to(number)?;
    let (Some(first), Some(last)) = (migrations.first(), migrations.last()) else {
        return Err(MigrateError::NoMigration(format!("number={number:06}")));
    };
    if !first.snapshot {
        warn!("no snapshot (*.all.sql)");
    }

    let path = dir.join(last.snapshot_name());
    if last.snapshot && !force {
        return Err(MigrateError::MigrationExists(path));
    }

    db.reset().await?;
    apply_files(db, dir, &migrations.applicable_file_names()).await?;

    let mut out = Vec::new();
    dump(&mut out, db)
        .await
        .map_err(|e| e.in_script(&path))?;

    info!(file = %path.display(), "writing snapshot");
    fs::write(&path, out).map_err(|e| MigrateError::from(e).in_script(&path))?;
    Ok(path)
}
