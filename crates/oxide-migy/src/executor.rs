//! Script runner and database dump.
//!
//! Scripts are split into statements with `oxide-sqlscript` and sent to the
//! database one at a time. This is the only place migration files are
//! executed.

use std::io::Write;
use std::path::Path;

use oxide_sqlscript::split;
use tracing::{debug, info};

use crate::database::{self, Database};
use crate::error::{MigrateError, Result};
use crate::records::{LiteralStyle, Row};

/// Rows per generated `INSERT` statement.
const INSERT_BATCH: usize = 10;

/// Runs every statement of `script`, stopping at the first failure.
pub async fn apply_script(db: &dyn Database, script: &str) -> Result<usize> {
    let mut count = 0;
    for statement in split(script) {
        count += 1;
        debug!(statement = count, "executing");
        db.execute(&statement).await?;
    }
    Ok(count)
}

/// Runs the SQL file at `path`.
pub async fn apply_file(db: &dyn Database, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    info!(file = %path.display(), "applying");

    let script = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| MigrateError::from(e).in_script(path))?;
    let count = apply_script(db, &script)
        .await
        .map_err(|e| e.in_script(path))?;

    debug!(file = %path.display(), statements = count, "applied");
    Ok(())
}

/// Runs the files `names` of `dir` in order.
pub async fn apply_files<S: AsRef<str> + Sync>(
    db: &dyn Database,
    dir: &Path,
    names: &[S],
) -> Result<()> {
    for name in names {
        apply_file(db, dir.join(name.as_ref())).await?;
    }
    Ok(())
}

fn row_literal(row: &Row, style: LiteralStyle) -> String {
    let values: Vec<String> = row.0.iter().map(|v| v.to_sql(style)).collect();
    format!("({})", values.join(", "))
}

/// Writes a script that rebuilds `db`: table definitions with their rows,
/// then the tracked procedures inside a `DELIMITER //` block.
pub async fn dump<W: Write + Send + ?Sized>(out: &mut W, db: &dyn Database) -> Result<()> {
    let style = db.literal_style();

    for table in database::tables(db).await? {
        write!(out, "{};\n\n", table.create)?;

        let records = db
            .records(&table.name)
            .await
            .map_err(|e| e.in_table(&table.name))?;
        if records.rows.is_empty() {
            continue;
        }
        debug!(table = %table.name, rows = records.rows.len(), "dumping rows");

        let columns: Vec<String> = records
            .columns
            .iter()
            .map(|c| db.quote_identifier(c))
            .collect();
        let insert = format!(
            "INSERT INTO {} ({}) VALUES\n  ",
            db.quote_identifier(&table.name),
            columns.join(",")
        );

        for batch in records.rows.chunks(INSERT_BATCH) {
            let rows: Vec<String> = batch.iter().map(|r| row_literal(r, style)).collect();
            write!(out, "{insert}{};\n", rows.join(", "))?;
        }
        writeln!(out)?;
    }

    let procedures = db.procedures().await?;
    write!(out, "DELIMITER //\n\n")?;
    for procedure in &procedures {
        write!(out, "{}//\n\n", procedure.create)?;
    }
    writeln!(out, "DELIMITER ;")?;

    out.flush()?;
    Ok(())
}
