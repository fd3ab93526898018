//! New migration files.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::database::{Dialect, GUARD_PROCEDURE, MIGRATION_TABLE};
use crate::error::{MigrateError, Result};
use crate::migration::{Migration, Migrations};

const HEADER: &str = "-- migy migration file\n";

/// Number of the baseline written by [`init_file`].
pub const INIT_NUMBER: u64 = 0;

/// Title of the baseline written by [`init_file`].
pub const INIT_TITLE: &str = "init";

/// The next multiple of ten after `n`.
#[must_use]
pub const fn next_number(n: u64) -> u64 {
    n + 10 - n % 10
}

fn quoted(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn up_template(migration: &Migration) -> String {
    format!(
        "{HEADER}\
         INSERT INTO {MIGRATION_TABLE} (id, title, applied) VALUES ({}, {}, CURRENT_TIMESTAMP);\n\
         -- Write your forward migration SQL statements below.\n",
        migration.number,
        quoted(&migration.title)
    )
}

fn down_template(migration: &Migration, dialect: Dialect) -> String {
    let guard = match dialect {
        Dialect::Mysql => format!("CALL {GUARD_PROCEDURE}({});\n", migration.number),
        Dialect::Sqlite => String::new(),
    };
    format!(
        "{HEADER}\
         {guard}\
         DELETE FROM {MIGRATION_TABLE} WHERE id = {};\n\
         -- Write your rollback SQL statements below.\n",
        migration.number
    )
}

fn init_template(dialect: Dialect) -> String {
    let mut sql = String::from(HEADER);
    match dialect {
        Dialect::Mysql => {
            sql.push_str(&format!(
                "CREATE TABLE `{MIGRATION_TABLE}` (\n  \
                 `id` int NOT NULL,\n  \
                 `applied` datetime DEFAULT NULL,\n  \
                 `title` varchar(255) NOT NULL DEFAULT '',\n  \
                 PRIMARY KEY (`id`)\n\
                 );\n\n"
            ));
        }
        Dialect::Sqlite => {
            sql.push_str(&format!(
                "CREATE TABLE \"{MIGRATION_TABLE}\" (\n  \
                 \"id\" INTEGER NOT NULL PRIMARY KEY,\n  \
                 \"applied\" DATETIME,\n  \
                 \"title\" TEXT NOT NULL DEFAULT ''\n\
                 );\n\n"
            ));
        }
    }
    sql.push_str(&format!(
        "INSERT INTO {MIGRATION_TABLE} (id, title, applied) VALUES ({INIT_NUMBER}, {}, CURRENT_TIMESTAMP);\n",
        quoted(INIT_TITLE)
    ));
    if dialect == Dialect::Mysql {
        sql.push_str(&format!(
            "\nDELIMITER //\n\n\
             CREATE PROCEDURE `{GUARD_PROCEDURE}`(IN migration_id int)\n\
             BEGIN\n  \
             IF NOT EXISTS (SELECT 1 FROM `{MIGRATION_TABLE}` WHERE `id` = migration_id) THEN\n    \
             SIGNAL SQLSTATE '45000' SET MESSAGE_TEXT = 'migration not applied';\n  \
             END IF;\n\
             END//\n\n\
             DELIMITER ;\n"
        ));
    }
    sql
}

fn write_new(path: &Path, contents: &str, overwrite: bool) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    let mut file = options.open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::AlreadyExists {
            MigrateError::MigrationExists(path.to_path_buf())
        } else {
            MigrateError::from(e).in_script(path)
        }
    })?;
    file.write_all(contents.as_bytes())
        .map_err(|e| MigrateError::from(e).in_script(path))?;
    info!(file = %path.display(), "created");
    Ok(())
}

/// Writes an up/down pair for a new migration titled `title` into `dir`.
///
/// Without `number`, the migration gets the next multiple of ten after the
/// last one of `migrations`.
///
/// # Errors
///
/// [`MigrateError::DuplicateNumber`] when `number` is taken,
/// [`MigrateError::InvalidState`] for a title that cannot be part of a file
/// name, [`MigrateError::MigrationExists`] when a file is in the way.
pub fn create_migration_files(
    dir: &Path,
    migrations: &Migrations,
    title: &str,
    number: Option<u64>,
    dialect: Dialect,
) -> Result<(PathBuf, PathBuf)> {
    if title.is_empty() || title.contains(['/', '\\', '.']) || title.trim() != title {
        return Err(MigrateError::InvalidState(format!(
            "invalid migration title: {title:?}"
        )));
    }

    let number = match number {
        Some(n) => {
            if let Some(existing) = migrations.iter().find(|m| m.number == n) {
                return Err(MigrateError::DuplicateNumber {
                    first: format!("{n:06}_{}", existing.title),
                    second: format!("{n:06}_{title}"),
                });
            }
            n
        }
        None => migrations.last().map_or(INIT_NUMBER, |m| next_number(m.number)),
    };

    let migration = Migration::new(number, title).with_up_down();
    let up = dir.join(migration.up_name());
    let down = dir.join(migration.down_name());
    write_new(&up, &up_template(&migration), false)?;
    if let Err(e) = write_new(&down, &down_template(&migration, dialect), false) {
        if let Err(cleanup) = fs::remove_file(&up) {
            warn!(file = %up.display(), error = %cleanup, "cannot remove up file");
        }
        return Err(e);
    }
    Ok((up, down))
}

/// Writes the baseline `000000_init.all.sql` that creates the bookkeeping
/// table (and the guard procedure on MySQL) and records migration 0.
///
/// # Errors
///
/// [`MigrateError::MigrationExists`] when the file exists and `force` is not
/// set.
pub fn init_file(dir: &Path, force: bool, dialect: Dialect) -> Result<PathBuf> {
    let path = dir.join(Migration::new(INIT_NUMBER, INIT_TITLE).snapshot_name());
    write_new(&path, &init_template(dialect), force)?;
    Ok(path)
}
