//! Error types for the migration system.

use std::path::PathBuf;

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The catalog is empty, or a requested migration or snapshot is absent.
    #[error("no migration: {0}")]
    NoMigration(String),

    /// Two files claim the same number and kind.
    #[error("duplicate migration number: {first} and {second}")]
    DuplicateNumber {
        /// File seen first.
        first: String,
        /// File seen second.
        second: String,
    },

    /// Files sharing a number disagree on the title.
    #[error("title mismatch for migration {number}: {first:?} and {second:?}")]
    TitleMismatch {
        /// The migration number.
        number: u64,
        /// Title seen first.
        first: String,
        /// Conflicting title.
        second: String,
    },

    /// An up file without its down counterpart, or the reverse.
    #[error("missing file: {kind} file of migration {number}")]
    MissingFile {
        /// The migration number.
        number: u64,
        /// Which kind is absent (`up` or `down`).
        kind: &'static str,
    },

    /// A malformed `migy:ignore` token.
    #[error("invalid format: ignore token {token:?} in {path}")]
    InvalidFormat {
        /// File carrying the annotation.
        path: PathBuf,
        /// The offending token.
        token: String,
    },

    /// A run that must be reversible contains a snapshot-only migration.
    #[error("sequence gap: migration {number} has no up/down files")]
    SequenceGap {
        /// The snapshot-only migration inside the run.
        number: u64,
    },

    /// The `_migrations` table does not exist.
    #[error("no migration table")]
    NoMigrationTable,

    /// Tables whose foreign keys can never be satisfied.
    #[error("pending tables: {}", .0.join(", "))]
    PendingTables(Vec<String>),

    /// A scaffolded file would overwrite an existing one.
    #[error("migration file already exists: {}", .0.display())]
    MigrationExists(PathBuf),

    /// Database URL with a scheme that has no backend.
    #[error("unsupported database URL: {0}")]
    UnsupportedDatabase(String),

    /// The database or the catalog is in a state the operation cannot handle.
    #[error("invalid migration state: {0}")]
    InvalidState(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading/writing migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure while running a script.
    #[error("{}: {source}", .path.display())]
    Script {
        /// The script being applied.
        path: PathBuf,
        /// What went wrong.
        source: Box<MigrateError>,
    },

    /// Failure while introspecting a table.
    #[error("table {table:?}: {source}")]
    Table {
        /// The table being read.
        table: String,
        /// What went wrong.
        source: Box<MigrateError>,
    },
}

impl MigrateError {
    /// Attaches the script path to an error.
    #[must_use]
    pub fn in_script(self, path: impl Into<PathBuf>) -> Self {
        Self::Script {
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// Attaches the table name to an error.
    #[must_use]
    pub fn in_table(self, table: impl Into<String>) -> Self {
        Self::Table {
            table: table.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with script and table context removed.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Script { source, .. } | Self::Table { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
