//! Database state snapshots and the diff between two states.
//!
//! A [`Snapshot`] records table definitions, every row of every table and the
//! tracked procedures. Comparing a snapshot with a later state yields a plain
//! text report; an empty report means the states match.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::database::{self, Database, Procedure, Table};
use crate::diff::{diff, distance, render};
use crate::error::Result;
use crate::migration::Ignores;
use crate::records::{Records, Row};

/// The state of a database at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Tables, referenced tables first.
    pub tables: Vec<Table>,
    /// Rows of every table, by table name.
    pub records: BTreeMap<String, Records>,
    /// Tracked procedures.
    pub procedures: Vec<Procedure>,
}

/// Captures the current state of `db`.
pub async fn take_snapshot(db: &dyn Database) -> Result<Snapshot> {
    let tables = database::tables(db).await?;

    let mut records = BTreeMap::new();
    for table in &tables {
        let rows = db
            .records(&table.name)
            .await
            .map_err(|e| e.in_table(&table.name))?;
        debug!(table = %table.name, rows = rows.rows.len(), "captured records");
        records.insert(table.name.clone(), rows);
    }

    let procedures = db.procedures().await?;

    info!(
        tables = tables.len(),
        procedures = procedures.len(),
        "took snapshot"
    );
    Ok(Snapshot {
        tables,
        records,
        procedures,
    })
}

/// Reports how `db` differs from `snapshot`, leaving out `ignores`.
pub async fn diff_database(
    db: &dyn Database,
    snapshot: &Snapshot,
    ignores: &Ignores,
) -> Result<String> {
    let current = take_snapshot(db).await?;
    Ok(snapshot.diff(&current, ignores, db.procedure_label()))
}

fn split_lines(s: &str) -> Vec<&str> {
    s.split('\n').collect()
}

impl Snapshot {
    fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.procedures.iter().find(|p| p.name == name)
    }

    /// Reports how `current` differs from this snapshot.
    ///
    /// `label` names procedures in the report.
    #[must_use]
    pub fn diff(&self, current: &Self, ignores: &Ignores, label: &str) -> String {
        let mut report = String::new();
        self.diff_tables(&mut report, current, ignores);
        self.diff_procedures(&mut report, current, label);
        report
    }

    fn diff_tables(&self, report: &mut String, current: &Self, ignores: &Ignores) {
        for table in &current.tables {
            let Some(base) = self.table(&table.name) else {
                report.push_str(&format!("unexpected {:?} table found\n", table.name));
                continue;
            };

            let before = split_lines(&base.create);
            let after = split_lines(&table.create);
            let ops = diff(&before, &after, |a, b| a == b);
            if distance(&ops) != 0 {
                report.push_str(&format!("create table {:?} differs:\n", table.name));
                render(report, &ops, &before, &after);
                continue;
            }

            if ignores.skips_records(&table.name) {
                debug!(table = %table.name, "records ignored");
                continue;
            }
            let empty = Records::default();
            diff_records(
                report,
                &table.name,
                self.records.get(&table.name).unwrap_or(&empty),
                current.records.get(&table.name).unwrap_or(&empty),
                ignores,
            );
        }

        for base in &self.tables {
            if current.table(&base.name).is_none() {
                report.push_str(&format!("missing {:?} table\n", base.name));
            }
        }
    }

    fn diff_procedures(&self, report: &mut String, current: &Self, label: &str) {
        for procedure in &current.procedures {
            let Some(base) = self.procedure(&procedure.name) else {
                report.push_str(&format!("unexpected {:?} {label} found\n", procedure.name));
                continue;
            };

            let before = split_lines(&base.create);
            let after = split_lines(&procedure.create);
            let ops = diff(&before, &after, |a, b| a == b);
            if distance(&ops) != 0 {
                report.push_str(&format!("{label} {:?} differs:\n", procedure.name));
                render(report, &ops, &before, &after);
            }
        }

        for base in &self.procedures {
            if current.procedure(&base.name).is_none() {
                report.push_str(&format!("missing {:?} {label}\n", base.name));
            }
        }
    }
}

fn diff_records(
    report: &mut String,
    table: &str,
    before: &Records,
    after: &Records,
    ignores: &Ignores,
) {
    let columns = if after.columns.is_empty() {
        &before.columns
    } else {
        &after.columns
    };
    let ignored: Vec<bool> = columns
        .iter()
        .map(|c| ignores.is_ignored(table, c))
        .collect();

    let same = |a: &Row, b: &Row| {
        a.0.len() == b.0.len()
            && a.0
                .iter()
                .zip(&b.0)
                .enumerate()
                .all(|(i, (x, y))| ignored.get(i).copied().unwrap_or(false) || x == y)
    };

    let ops = diff(&before.rows, &after.rows, same);
    if distance(&ops) != 0 {
        report.push_str(&format!("records in {table:?} differs:\n"));
        render(report, &ops, &before.rows, &after.rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SqliteDatabase;
    use crate::records::Value;

    async fn create_test_db() -> SqliteDatabase {
        SqliteDatabase::connect("sqlite::memory:").await.unwrap()
    }

    fn table(name: &str, create: &str) -> Table {
        Table {
            name: name.into(),
            create: create.into(),
            refs: Vec::new(),
        }
    }

    fn rows(columns: &[&str], rows: Vec<Vec<Value>>) -> Records {
        Records {
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
            rows: rows.into_iter().map(Row).collect(),
        }
    }

    fn snapshot(tables: Vec<Table>, records: Vec<(&str, Records)>) -> Snapshot {
        Snapshot {
            tables,
            records: records
                .into_iter()
                .map(|(n, r)| (n.to_owned(), r))
                .collect(),
            procedures: Vec::new(),
        }
    }

    fn row(id: i64, name: &str, n: i64) -> Vec<Value> {
        vec![
            Value::Integer(id),
            Value::Text(name.into()),
            Value::Integer(n),
        ]
    }

    #[test]
    fn test_same_state_is_empty() {
        let s = snapshot(
            vec![table("t", "CREATE TABLE t (id int)")],
            vec![("t", rows(&["id"], vec![vec![Value::Integer(1)]]))],
        );
        assert_eq!(s.diff(&s, &Ignores::new(), "trigger"), "");
    }

    #[test]
    fn test_unexpected_and_missing_tables() {
        let before = snapshot(vec![table("old", "CREATE TABLE old (id int)")], vec![]);
        let after = snapshot(vec![table("new", "CREATE TABLE new (id int)")], vec![]);
        assert_eq!(
            before.diff(&after, &Ignores::new(), "stored procedure"),
            "unexpected \"new\" table found\nmissing \"old\" table\n"
        );
    }

    #[test]
    fn test_changed_records() {
        let create = "CREATE TABLE t (id int, name text, n int)";
        let before = snapshot(
            vec![table("t", create)],
            vec![(
                "t",
                rows(
                    &["id", "name", "n"],
                    vec![row(1, "aaa", 10), row(2, "bbb", 200), row(3, "ccc", 30)],
                ),
            )],
        );
        let after = snapshot(
            vec![table("t", create)],
            vec![(
                "t",
                rows(
                    &["id", "name", "n"],
                    vec![row(1, "aaa", 10), row(2, "bbb", 20), row(3, "ccc", 30)],
                ),
            )],
        );

        assert_eq!(
            before.diff(&after, &Ignores::new(), "stored procedure"),
            "records in \"t\" differs:\n (1, 'aaa', 10)\n-(2, 'bbb', 200)\n+(2, 'bbb', 20)\n (3, 'ccc', 30)\n"
        );

        let ignored: Ignores = [("t", "n")].into_iter().collect();
        assert_eq!(before.diff(&after, &ignored, "stored procedure"), "");

        let wildcard: Ignores = [("t", "*")].into_iter().collect();
        assert_eq!(before.diff(&after, &wildcard, "stored procedure"), "");

        let other: Ignores = [("t", "name")].into_iter().collect();
        assert!(!before.diff(&after, &other, "stored procedure").is_empty());
    }

    #[test]
    fn test_context_rows_show_current_values() {
        let create = "CREATE TABLE t (id int, name text, n int)";
        let columns = ["id", "name", "n"];
        let before = snapshot(
            vec![table("t", create)],
            vec![("t", rows(&columns, vec![row(1, "aaa", 10), row(2, "bbb", 20)]))],
        );
        let after = snapshot(
            vec![table("t", create)],
            vec![("t", rows(&columns, vec![row(1, "aaa", 11), row(2, "xxx", 20)]))],
        );

        let ignored: Ignores = [("t", "n")].into_iter().collect();
        assert_eq!(
            before.diff(&after, &ignored, "stored procedure"),
            "records in \"t\" differs:\n (1, 'aaa', 11)\n-(2, 'bbb', 20)\n+(2, 'xxx', 20)\n"
        );
    }

    #[test]
    fn test_procedures() {
        let mut before = Snapshot::default();
        before.procedures.push(Procedure {
            name: "_migration_exists".into(),
            create: "CREATE PROCEDURE _migration_exists()\nBEGIN\nEND".into(),
        });
        let mut changed = Snapshot::default();
        changed.procedures.push(Procedure {
            name: "_migration_exists".into(),
            create: "CREATE PROCEDURE _migration_exists()\nBEGIN\n  SELECT 1;\nEND".into(),
        });

        assert_eq!(
            before.diff(&changed, &Ignores::new(), "stored procedure"),
            "stored procedure \"_migration_exists\" differs:\n...\n BEGIN\n+  SELECT 1;\n END\n"
        );
        assert_eq!(
            before.diff(&Snapshot::default(), &Ignores::new(), "stored procedure"),
            "missing \"_migration_exists\" stored procedure\n"
        );
        assert_eq!(
            Snapshot::default().diff(&before, &Ignores::new(), "stored procedure"),
            "unexpected \"_migration_exists\" stored procedure found\n"
        );
    }

    #[tokio::test]
    async fn test_snapshot_of_unchanged_database_has_no_diff() {
        let db = create_test_db().await;
        db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .unwrap();
        db.execute("INSERT INTO users VALUES (1, 'alice'), (2, 'bob')")
            .await
            .unwrap();

        let snapshot = take_snapshot(&db).await.unwrap();
        assert_eq!(snapshot.tables.len(), 1);
        assert_eq!(snapshot.records["users"].rows.len(), 2);

        let report = diff_database(&db, &snapshot, &Ignores::new()).await.unwrap();
        assert_eq!(report, "");
    }

    #[tokio::test]
    async fn test_ignored_column_change_is_suppressed() {
        let db = create_test_db().await;
        db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, updated TEXT)")
            .await
            .unwrap();
        db.execute("INSERT INTO users VALUES (1, 'alice', 'then')")
            .await
            .unwrap();
        let snapshot = take_snapshot(&db).await.unwrap();
        let ignores: Ignores = [("users", "updated")].into_iter().collect();

        db.execute("UPDATE users SET updated = 'now'").await.unwrap();
        assert_eq!(diff_database(&db, &snapshot, &ignores).await.unwrap(), "");

        db.execute("UPDATE users SET name = 'carol'").await.unwrap();
        let report = diff_database(&db, &snapshot, &ignores).await.unwrap();
        assert_eq!(
            report,
            "records in \"users\" differs:\n-(1, 'alice', 'then')\n+(1, 'carol', 'now')\n"
        );
    }

    #[tokio::test]
    async fn test_added_column_is_reported() {
        let db = create_test_db().await;
        db.execute("CREATE TABLE table1 (\n  id int NOT NULL,\n  val text NOT NULL DEFAULT '',\n  PRIMARY KEY (id)\n)")
            .await
            .unwrap();
        let snapshot = take_snapshot(&db).await.unwrap();

        db.execute("DROP TABLE table1").await.unwrap();
        db.execute("CREATE TABLE table1 (\n  id int NOT NULL,\n  val text NOT NULL DEFAULT '',\n  val2 int DEFAULT '0',\n  PRIMARY KEY (id)\n)")
            .await
            .unwrap();

        let report = diff_database(&db, &snapshot, &Ignores::new()).await.unwrap();
        assert_eq!(
            report,
            "create table \"table1\" differs:\n...\n   val text NOT NULL DEFAULT '',\n+  val2 int DEFAULT '0',\n   PRIMARY KEY (id)\n...\n"
        );
    }

    #[tokio::test]
    async fn test_triggers_are_compared() {
        let db = create_test_db().await;
        db.execute("CREATE TABLE t (id INTEGER)").await.unwrap();
        let snapshot = take_snapshot(&db).await.unwrap();

        db.execute("CREATE TRIGGER tr AFTER INSERT ON t BEGIN SELECT 1; END")
            .await
            .unwrap();

        let report = diff_database(&db, &snapshot, &Ignores::new()).await.unwrap();
        assert_eq!(report, "unexpected \"tr\" trigger found\n");
    }
}
