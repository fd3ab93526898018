//! Reads the migration catalog from a directory.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::migration::{Ignores, Migration, Migrations};

static FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+)_(.*)\.(up|down|all)\.sql$").expect("FILE_NAME: invalid regex pattern")
});

static IGNORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\smigy:ignore[ \t]+([^\n]*)").expect("IGNORE: invalid regex pattern")
});

/// File kinds of one migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Kind {
    Up,
    Down,
    All,
}

impl Kind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

/// Splits `NNNNNN_title.kind.sql` into its parts.
fn parse_file_name(name: &str) -> Option<(u64, &str, Kind)> {
    let caps = FILE_NAME.captures(name)?;
    let number = caps.get(1)?.as_str().parse().ok()?;
    let title = caps.get(2)?.as_str();
    let kind = Kind::parse(caps.get(3)?.as_str())?;
    Some((number, title, kind))
}

struct Group<'a> {
    title: &'a str,
    files: BTreeMap<Kind, &'a str>,
}

/// Loads every migration in `dir`, sorted by number.
///
/// Entries whose names are not `NNNNNN_title.(up|down|all).sql` are ignored.
///
/// # Errors
///
/// - [`MigrateError::NoMigration`] if no migration file is found.
/// - [`MigrateError::DuplicateNumber`] if two files share number and kind.
/// - [`MigrateError::TitleMismatch`] if files of one number disagree on the title.
/// - [`MigrateError::MissingFile`] if an up file has no down file or the reverse.
/// - [`MigrateError::InvalidFormat`] if a `migy:ignore` token is malformed.
/// - [`MigrateError::Io`] if the directory or a down file cannot be read.
pub fn load(dir: impl AsRef<Path>) -> Result<Migrations> {
    let dir = dir.as_ref();

    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();

    let mut groups: BTreeMap<u64, Group<'_>> = BTreeMap::new();
    for name in &names {
        let Some((number, title, kind)) = parse_file_name(name) else {
            continue;
        };

        match groups.entry(number) {
            Entry::Vacant(slot) => {
                slot.insert(Group {
                    title,
                    files: BTreeMap::from([(kind, name.as_str())]),
                });
            }
            Entry::Occupied(mut slot) => {
                let group = slot.get_mut();
                if let Some(first) = group.files.get(&kind) {
                    return Err(MigrateError::DuplicateNumber {
                        first: (*first).to_owned(),
                        second: name.clone(),
                    });
                }
                if group.title != title {
                    return Err(MigrateError::TitleMismatch {
                        number,
                        first: group.title.to_owned(),
                        second: title.to_owned(),
                    });
                }
                group.files.insert(kind, name);
            }
        }
    }

    if groups.is_empty() {
        return Err(MigrateError::NoMigration(format!(
            "no migration files in {}",
            dir.display()
        )));
    }

    let mut migrations = Vec::with_capacity(groups.len());
    for (number, group) in groups {
        let up = group.files.contains_key(&Kind::Up);
        let down = group.files.get(&Kind::Down);

        let mut migration = Migration::new(number, group.title);
        migration.snapshot = group.files.contains_key(&Kind::All);

        match (up, down) {
            (false, Some(_)) => return Err(MigrateError::MissingFile { number, kind: "up" }),
            (true, None) => return Err(MigrateError::MissingFile { number, kind: "down" }),
            (true, Some(down)) => {
                migration.up_down = true;
                migration.ignores = read_ignores(&dir.join(down))?;
            }
            (false, None) => {}
        }

        debug!(
            number,
            title = %migration.title,
            up_down = migration.up_down,
            snapshot = migration.snapshot,
            "found migration"
        );
        migrations.push(migration);
    }

    Ok(migrations.into())
}

impl Migrations {
    /// Loads the catalog in `dir`. See [`load`].
    ///
    /// # Errors
    ///
    /// Same as [`load`].
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        load(dir)
    }
}

fn read_ignores(path: &Path) -> Result<Ignores> {
    let text = fs::read_to_string(path).map_err(|e| MigrateError::from(e).in_script(path))?;
    parse_ignores(&text).map_err(|token| MigrateError::InvalidFormat {
        path: path.to_path_buf(),
        token,
    })
}

/// Collects `migy:ignore table.column ...` annotations. Returns the first
/// malformed token on failure.
fn parse_ignores(text: &str) -> std::result::Result<Ignores, String> {
    let mut ignores = Ignores::new();
    for caps in IGNORE.captures_iter(text) {
        let Some(list) = caps.get(1) else { continue };
        for token in list
            .as_str()
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
        {
            match token.split_once('.') {
                Some((table, column))
                    if !table.is_empty() && !column.is_empty() && !column.contains('.') =>
                {
                    ignores.insert(table, column);
                }
                _ => return Err(token.to_owned()),
            }
        }
    }
    Ok(ignores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dir_with(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, body) in files {
            fs::write(dir.path().join(name), body).unwrap();
        }
        dir
    }

    #[test]
    fn test_parse_file_name() {
        assert_eq!(
            parse_file_name("000010_add_users.up.sql"),
            Some((10, "add_users", Kind::Up))
        );
        assert_eq!(parse_file_name("7_x.all.sql"), Some((7, "x", Kind::All)));
        assert_eq!(
            parse_file_name("000020_a.b.down.sql"),
            Some((20, "a.b", Kind::Down))
        );
        assert_eq!(parse_file_name("000010_x.sql"), None);
        assert_eq!(parse_file_name("readme.md"), None);
        assert_eq!(parse_file_name("_x.up.sql"), None);
    }

    #[test]
    fn test_parse_ignores() {
        let ignores = parse_ignores(
            "DELETE FROM users;\n-- migy:ignore users.updated logs.*\n/* migy:ignore a.b, c.d,e.f\n */",
        )
        .unwrap();

        assert!(ignores.is_ignored("users", "updated"));
        assert!(ignores.skips_records("logs"));
        assert!(ignores.is_ignored("a", "b"));
        assert!(ignores.is_ignored("c", "d"));
        assert!(ignores.is_ignored("e", "f"));
        assert!(!ignores.is_ignored("users", "name"));
    }

    #[test]
    fn test_parse_ignores_rejects_bad_tokens() {
        assert_eq!(parse_ignores("-- migy:ignore users"), Err("users".to_owned()));
        assert_eq!(parse_ignores("-- migy:ignore a.b.c"), Err("a.b.c".to_owned()));
        assert_eq!(parse_ignores("-- migy:ignore .col"), Err(".col".to_owned()));
    }

    #[test]
    fn test_marker_needs_leading_whitespace() {
        assert!(parse_ignores("xmigy:ignore a.b").unwrap().is_empty());
    }

    #[test]
    fn test_load() {
        let dir = dir_with(&[
            ("000000_init.all.sql", ""),
            ("000010_first.up.sql", ""),
            ("000010_first.down.sql", "-- migy:ignore users.updated\n"),
            ("000020_second.up.sql", ""),
            ("000020_second.down.sql", ""),
            ("000020_second.all.sql", ""),
            ("notes.txt", ""),
        ]);
        fs::create_dir(dir.path().join("000030_dir.up.sql")).unwrap();

        let migs = load(dir.path()).unwrap();

        assert_eq!(migs.len(), 3);
        assert_eq!(migs[0], Migration::new(0, "init").with_snapshot());
        assert_eq!(migs[1].title, "first");
        assert!(migs[1].up_down && !migs[1].snapshot);
        assert!(migs[1].ignores.is_ignored("users", "updated"));
        assert!(migs[2].up_down && migs[2].snapshot);
    }

    #[test]
    fn test_load_empty() {
        let dir = dir_with(&[("readme.md", "")]);
        assert!(matches!(load(dir.path()), Err(MigrateError::NoMigration(_))));
    }

    #[test]
    fn test_load_missing_down() {
        let dir = dir_with(&[("000010_a.up.sql", "")]);
        assert!(matches!(
            load(dir.path()),
            Err(MigrateError::MissingFile { number: 10, kind: "down" })
        ));
    }

    #[test]
    fn test_load_missing_up() {
        let dir = dir_with(&[("000010_a.down.sql", ""), ("000010_a.all.sql", "")]);
        assert!(matches!(
            load(dir.path()),
            Err(MigrateError::MissingFile { number: 10, kind: "up" })
        ));
    }

    #[test]
    fn test_load_duplicate() {
        let dir = dir_with(&[("000010_a.up.sql", ""), ("10_a.up.sql", "")]);
        assert!(matches!(
            load(dir.path()),
            Err(MigrateError::DuplicateNumber { .. })
        ));
    }

    #[test]
    fn test_load_title_mismatch() {
        let dir = dir_with(&[("000010_a.up.sql", ""), ("000010_b.down.sql", "")]);
        assert!(matches!(
            load(dir.path()),
            Err(MigrateError::TitleMismatch { number: 10, .. })
        ));
    }

    #[test]
    fn test_load_invalid_ignore() {
        let dir = dir_with(&[
            ("000010_a.up.sql", ""),
            ("000010_a.down.sql", "-- migy:ignore broken\n"),
        ]);
        assert!(matches!(
            load(dir.path()),
            Err(MigrateError::InvalidFormat { token, .. }) if token == "broken"
        ));
    }
}
