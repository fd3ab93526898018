//! Numbered SQL migrations with up/down reversibility checks.
//!
//! `oxide-migy` manages a directory of plain SQL migration files:
//!
//! ```text
//! 000000_init.all.sql        baseline, replayed on an empty database
//! 000010_users.up.sql        forward migration
//! 000010_users.down.sql      rollback
//! 000020_posts.up.sql
//! 000020_posts.down.sql
//! 000020_posts.all.sql       optional snapshot of the state after 000020
//! ```
//!
//! Applied migrations are recorded in a `_migrations` table
//! (`id`, `applied`, `title`), which the up files insert into and the down
//! files delete from.
//!
//! # Architecture
//!
//! - **Catalog** ([`migration`], [`loader`]) - the migrations found in a
//!   directory, and which files move a database between two of them
//! - **History** ([`history`]) - `_migrations` merged with the catalog
//! - **Database** ([`database`]) - SQLite and MySQL connections with schema
//!   introspection
//! - **Executor** ([`executor`]) - runs SQL files through the
//!   `oxide-sqlscript` splitter, and dumps a database back to SQL
//! - **State** ([`state`], [`diff`]) - snapshots of tables, rows and
//!   procedures, and line diffs between them
//! - **Commands** ([`plan`], [`check`], [`snapshot`], [`scaffold`]) - the
//!   operations behind the `migy` binary
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_migy::prelude::*;
//!
//! let migrations = Migrations::load("migrations")?;
//! let db = connect("sqlite:app.db").await?;
//!
//! for file in files_to_apply(db.as_ref(), &migrations, None).await? {
//!     apply_file(db.as_ref(), Path::new("migrations").join(file)).await?;
//! }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Write the baseline and a first migration pair
//! migy init
//! migy create add_users
//!
//! # Check that 000010 rolls back cleanly
//! migy check -n 10
//!
//! # Show and apply what the database is missing
//! migy --database sqlite:app.db list
//! migy --database sqlite:app.db apply --yes
//! ```

pub mod check;
pub mod database;
pub mod diff;
pub mod error;
pub mod executor;
pub mod history;
pub mod loader;
pub mod migration;
pub mod plan;
pub mod records;
pub mod scaffold;
pub mod snapshot;
pub mod state;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::check::{check_migration, numbers_to_check};
    pub use crate::database::{connect, Database, Dialect, MySqlDatabase, SqliteDatabase};
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::{apply_file, apply_files, dump};
    pub use crate::history::{build_status, current_num, load_histories, History, Status};
    pub use crate::migration::{Ignores, Migration, Migrations};
    pub use crate::plan::files_to_apply;
    pub use crate::records::{Records, Row, Value};
    pub use crate::scaffold::{create_migration_files, init_file};
    pub use crate::snapshot::write_snapshot_file;
    pub use crate::state::{diff_database, take_snapshot, Snapshot};
}
