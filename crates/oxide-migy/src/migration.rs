//! The migration catalog model and the file-sequencing algorithms over it.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Deref;

use crate::error::{MigrateError, Result};

/// Column name that matches every column of a table in an ignore set.
pub const WILDCARD: &str = "*";

/// Columns to leave out of reversibility diffs, keyed by table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ignores(BTreeMap<String, BTreeSet<String>>);

impl Ignores {
    /// Creates an empty ignore set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `table.column` to the set.
    pub fn insert(&mut self, table: impl Into<String>, column: impl Into<String>) {
        self.0.entry(table.into()).or_default().insert(column.into());
    }

    /// Whether nothing is ignored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ignored columns of `table`.
    #[must_use]
    pub fn columns(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.0.get(table)
    }

    /// Whether row comparison is skipped for `table` altogether.
    #[must_use]
    pub fn skips_records(&self, table: &str) -> bool {
        self.columns(table).is_some_and(|c| c.contains(WILDCARD))
    }

    /// Whether `column` of `table` is left out of row comparison.
    #[must_use]
    pub fn is_ignored(&self, table: &str, column: &str) -> bool {
        self.columns(table)
            .is_some_and(|c| c.contains(column) || c.contains(WILDCARD))
    }
}

impl<T: Into<String>, C: Into<String>> FromIterator<(T, C)> for Ignores {
    fn from_iter<I: IntoIterator<Item = (T, C)>>(iter: I) -> Self {
        let mut ignores = Self::new();
        for (table, column) in iter {
            ignores.insert(table, column);
        }
        ignores
    }
}

/// One numbered migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Position in the sequence.
    pub number: u64,
    /// Title slug shared by all files of this migration.
    pub title: String,
    /// Whether the `.up.sql`/`.down.sql` pair exists.
    pub up_down: bool,
    /// Whether the consolidated `.all.sql` file exists.
    pub snapshot: bool,
    /// Columns excluded from reversibility diffs, read from the down file.
    pub ignores: Ignores,
}

impl Migration {
    /// Creates a migration with neither up/down files nor a snapshot.
    #[must_use]
    pub fn new(number: u64, title: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            up_down: false,
            snapshot: false,
            ignores: Ignores::new(),
        }
    }

    /// Marks the up/down pair as present.
    #[must_use]
    pub const fn with_up_down(mut self) -> Self {
        self.up_down = true;
        self
    }

    /// Marks the `.all.sql` file as present.
    #[must_use]
    pub const fn with_snapshot(mut self) -> Self {
        self.snapshot = true;
        self
    }

    fn file_name(&self, kind: &str) -> String {
        format!("{:06}_{}.{kind}.sql", self.number, self.title)
    }

    /// `NNNNNN_title.up.sql`
    #[must_use]
    pub fn up_name(&self) -> String {
        self.file_name("up")
    }

    /// `NNNNNN_title.down.sql`
    #[must_use]
    pub fn down_name(&self) -> String {
        self.file_name("down")
    }

    /// `NNNNNN_title.all.sql`
    #[must_use]
    pub fn snapshot_name(&self) -> String {
        self.file_name("all")
    }
}

/// Migrations in strictly increasing number order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Migrations(Vec<Migration>);

impl From<Vec<Migration>> for Migrations {
    /// Wraps `migrations`, sorting them by number.
    fn from(mut migrations: Vec<Migration>) -> Self {
        migrations.sort_by_key(|m| m.number);
        Self(migrations)
    }
}

impl FromIterator<Migration> for Migrations {
    fn from_iter<I: IntoIterator<Item = Migration>>(iter: I) -> Self {
        iter.into_iter().collect::<Vec<_>>().into()
    }
}

impl Deref for Migrations {
    type Target = [Migration];

    fn deref(&self) -> &[Migration] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a Migrations {
    type Item = &'a Migration;
    type IntoIter = std::slice::Iter<'a, Migration>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Migrations {
    fn slice(&self, range: impl std::slice::SliceIndex<[Migration], Output = [Migration]>) -> Self {
        Self(self.0[range].to_vec())
    }

    /// Index of the migration numbered `number`.
    ///
    /// # Errors
    ///
    /// [`MigrateError::NoMigration`] when no migration has that number.
    pub fn find_number(&self, number: u64) -> Result<usize> {
        self.0
            .iter()
            .rposition(|m| m.number == number)
            .ok_or_else(|| MigrateError::NoMigration(format!("number={number:06}")))
    }

    /// Index of the first migration numbered above `number`.
    #[must_use]
    pub fn find_next(&self, number: u64) -> Option<usize> {
        self.0.iter().position(|m| m.number > number)
    }

    /// Index of the last migration that has an `.all.sql` file.
    #[must_use]
    pub fn find_latest_snapshot(&self) -> Option<usize> {
        self.0.iter().rposition(|m| m.snapshot)
    }

    /// The migrations up to and including `number`.
    ///
    /// # Errors
    ///
    /// [`MigrateError::NoMigration`] when no migration has that number.
    pub fn up_to(&self, number: u64) -> Result<Self> {
        let last = self.find_number(number)?;
        Ok(self.slice(..=last))
    }

    /// The migrations from the latest snapshot to the end, or all of them
    /// when there is no snapshot.
    #[must_use]
    pub fn since_snapshot(&self) -> Self {
        self.slice(self.find_latest_snapshot().unwrap_or(0)..)
    }

    /// The migrations from the latest snapshot strictly before `number` up to
    /// and including `number`. Starts at the first migration when no earlier
    /// snapshot exists.
    ///
    /// # Errors
    ///
    /// [`MigrateError::NoMigration`] when no migration has that number.
    pub fn since_snapshot_to(&self, number: u64) -> Result<Self> {
        let last = self.find_number(number)?;
        let start = self.0[..last].iter().rposition(|m| m.snapshot).unwrap_or(0);
        Ok(self.slice(start..=last))
    }

    /// Files that move a database from migration `current` to `target`.
    ///
    /// Moving forward yields the up files after `current` through `target`;
    /// moving backward yields the down files from `current` through the one
    /// after `target`, newest first.
    ///
    /// # Errors
    ///
    /// [`MigrateError::NoMigration`] when either number is not in the
    /// catalog, [`MigrateError::SequenceGap`] when a migration in the run has
    /// no up/down files.
    pub fn file_names_to_apply(&self, current: u64, target: u64) -> Result<Vec<String>> {
        let from = self.find_number(current)?;
        let to = self.find_number(target)?;

        if from <= to {
            self.0[from + 1..=to]
                .iter()
                .map(|m| require_up_down(m).map(Migration::up_name))
                .collect()
        } else {
            self.0[to + 1..=from]
                .iter()
                .rev()
                .map(|m| require_up_down(m).map(Migration::down_name))
                .collect()
        }
    }

    /// Files that rebuild the state of the last migration from scratch: the
    /// latest snapshot followed by every later up file.
    ///
    /// # Errors
    ///
    /// [`MigrateError::NoMigration`] when there is no snapshot,
    /// [`MigrateError::SequenceGap`] when a later migration has no up/down
    /// files.
    pub fn file_names_from_snapshot(&self) -> Result<Vec<String>> {
        let start = self
            .find_latest_snapshot()
            .ok_or_else(|| MigrateError::NoMigration("no snapshot (*.all.sql) found".into()))?;

        let mut names = vec![self.0[start].snapshot_name()];
        for m in &self.0[start + 1..] {
            names.push(require_up_down(m)?.up_name());
        }
        Ok(names)
    }

    /// Files that rebuild a range that starts at a snapshot or baseline: the
    /// first migration's `.all.sql` (or its up file when it has none), then
    /// the up file of every later migration that has one.
    #[must_use]
    pub fn applicable_file_names(&self) -> Vec<String> {
        let Some((first, rest)) = self.0.split_first() else {
            return Vec::new();
        };

        let head = if first.snapshot {
            first.snapshot_name()
        } else {
            first.up_name()
        };
        std::iter::once(head)
            .chain(rest.iter().filter(|m| m.up_down).map(Migration::up_name))
            .collect()
    }
}

fn require_up_down(m: &Migration) -> Result<&Migration> {
    if m.up_down {
        Ok(m)
    } else {
        Err(MigrateError::SequenceGap { number: m.number })
    }
}
