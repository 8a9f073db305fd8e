//! Migration file model, version parsing, and file sources.
//!
//! A migration is a numbered pair of DDL files,
//! `<version>_<name>.up.sql` and `<version>_<name>.down.sql`, loaded
//! from a [`MigrationSource`]. File names that do not match the pattern
//! are ignored; duplicate versions fail loading.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex_lite::Regex;

use crate::error::{PtahError, Result};

static FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)_(.+)\.(up|down)\.sql$").unwrap());

/// Direction of a migration script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Forward migration.
    Up,
    /// Reverse migration.
    Down,
}

impl Direction {
    /// The marker text used in generated file headers.
    pub fn marker(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

/// A loaded up/down migration pair.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Monotonically increasing version number.
    pub version: i64,
    /// Name extracted from the file name.
    pub name: String,
    /// File name of the up script.
    pub up_script: String,
    /// SQL content of the up script.
    pub up_sql: String,
    /// SQL content of the down script, when one exists.
    pub down_sql: Option<String>,
}

/// An ordered byte-stream source of migration files.
///
/// Local directories, embedded archives, and in-memory maps are all
/// equivalent; only names matching the version pattern matter.
pub trait MigrationSource {
    /// Every `(file name, content)` entry the source holds.
    fn entries(&self) -> Result<Vec<(String, String)>>;
}

/// A flat directory of migration files on disk.
pub struct DirSource {
    dir: PathBuf,
}

impl DirSource {
    /// Wrap a directory path.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The wrapped directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl MigrationSource for DirSource {
    fn entries(&self) -> Result<Vec<(String, String)>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            entries.push((name.to_string(), std::fs::read_to_string(&path)?));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

/// An in-memory migration source, used by tests and embedded setups.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: BTreeMap<String, String>,
}

impl MemorySource {
    /// Build a source from `(file name, content)` pairs.
    pub fn new<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        Self {
            files: files
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Add a file.
    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.files.insert(name.into(), content.into());
    }
}

impl MigrationSource for MemorySource {
    fn entries(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .files
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Parse a migration file name into `(version, name, direction)`.
///
/// Returns `None` for names outside the pattern.
pub fn parse_file_name(file_name: &str) -> Option<(i64, String, Direction)> {
    let caps = FILE_RE.captures(file_name)?;
    let version: i64 = caps.get(1)?.as_str().parse().ok()?;
    let name = caps.get(2)?.as_str().to_string();
    let direction = match caps.get(3)?.as_str() {
        "up" => Direction::Up,
        _ => Direction::Down,
    };
    Some((version, name, direction))
}

/// Load and pair migration files from a source, sorted by ascending
/// version.
///
/// Files with names outside the version pattern are ignored with a debug
/// log. Two up scripts with the same version fail with DuplicateVersion.
/// A down script without a matching up script is ignored.
pub fn load_migrations(source: &dyn MigrationSource) -> Result<Vec<Migration>> {
    let mut ups: BTreeMap<i64, (String, String, String)> = BTreeMap::new();
    let mut downs: BTreeMap<i64, String> = BTreeMap::new();

    for (file_name, content) in source.entries()? {
        let Some((version, name, direction)) = parse_file_name(&file_name) else {
            log::debug!("Ignoring non-migration file; file={}", file_name);
            continue;
        };
        match direction {
            Direction::Up => {
                if ups.contains_key(&version) {
                    return Err(PtahError::DuplicateVersion {
                        version,
                        script: file_name,
                    });
                }
                ups.insert(version, (name, file_name, content));
            }
            Direction::Down => {
                if downs.contains_key(&version) {
                    return Err(PtahError::DuplicateVersion {
                        version,
                        script: file_name,
                    });
                }
                downs.insert(version, content);
            }
        }
    }

    Ok(ups
        .into_iter()
        .map(|(version, (name, up_script, up_sql))| Migration {
            version,
            name,
            up_script,
            up_sql,
            down_sql: downs.remove(&version),
        })
        .collect())
}

/// Split SQL into individual statements on `;`, without splitting inside
/// string literals, E-strings, dollar-quoted blocks, or comments.
///
/// Used for per-statement execution (cancellation checks between
/// statements) and dry-run logging.
pub fn split_statements(sql: &str) -> Vec<&str> {
    let bytes = sql.as_bytes();
    let mut pieces = Vec::new();
    let mut piece_start = 0;
    let mut cursor = 0;

    while cursor < bytes.len() {
        cursor = match bytes[cursor] {
            b';' => {
                push_piece(&mut pieces, &sql[piece_start..cursor]);
                piece_start = cursor + 1;
                cursor + 1
            }
            b'\'' => skip_quoted(sql, cursor),
            b'$' => skip_dollar_quoted(sql, cursor),
            b'-' if bytes.get(cursor + 1) == Some(&b'-') => skip_line_comment(bytes, cursor),
            b'/' if bytes.get(cursor + 1) == Some(&b'*') => skip_block_comment(bytes, cursor),
            _ => cursor + 1,
        };
    }
    push_piece(&mut pieces, &sql[piece_start..]);

    pieces
}

fn push_piece<'a>(pieces: &mut Vec<&'a str>, raw: &'a str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        pieces.push(trimmed);
    }
}

/// Advance past a `'...'` literal opened at `open`. Doubled quotes stay
/// inside the literal, and an `E'...'` prefix enables backslash escapes.
fn skip_quoted(sql: &str, open: usize) -> usize {
    let bytes = sql.as_bytes();
    let backslash_escapes = open > 0
        && matches!(bytes[open - 1], b'E' | b'e')
        && !(open > 1 && (bytes[open - 2].is_ascii_alphanumeric() || bytes[open - 2] == b'_'));

    let mut pos = open + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' if backslash_escapes => pos += 2,
            b'\'' if bytes.get(pos + 1) == Some(&b'\'') => pos += 2,
            b'\'' => return pos + 1,
            _ => pos += 1,
        }
    }
    pos
}

/// Advance past a `$$...$$` or `$tag$...$tag$` block opened at `open`.
/// A bare `$` that opens no tag (e.g. a positional parameter) advances
/// one byte.
fn skip_dollar_quoted(sql: &str, open: usize) -> usize {
    let bytes = sql.as_bytes();
    let mut tag_end = open + 1;
    while tag_end < bytes.len() && (bytes[tag_end].is_ascii_alphanumeric() || bytes[tag_end] == b'_')
    {
        tag_end += 1;
    }
    if bytes.get(tag_end) != Some(&b'$') {
        return open + 1;
    }

    let tag = &sql[open..=tag_end];
    match sql[tag_end + 1..].find(tag) {
        Some(offset) => tag_end + 1 + offset + tag.len(),
        None => sql.len(),
    }
}

fn skip_line_comment(bytes: &[u8], open: usize) -> usize {
    let mut pos = open + 2;
    while pos < bytes.len() && bytes[pos] != b'\n' {
        pos += 1;
    }
    pos
}

/// Advance past a `/* ... */` comment opened at `open`, honoring nesting.
fn skip_block_comment(bytes: &[u8], open: usize) -> usize {
    let mut depth = 1;
    let mut pos = open + 2;
    while pos + 1 < bytes.len() && depth > 0 {
        match (bytes[pos], bytes[pos + 1]) {
            (b'/', b'*') => {
                depth += 1;
                pos += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                pos += 2;
            }
            _ => pos += 1,
        }
    }
    if depth > 0 {
        bytes.len()
    } else {
        pos
    }
}

/// Whether a statement consists solely of comments and whitespace.
pub fn is_comment_only(statement: &str) -> bool {
    statement
        .lines()
        .all(|line| line.trim().is_empty() || line.trim().starts_with("--"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_name() {
        assert_eq!(
            parse_file_name("20260801120000_create_users.up.sql"),
            Some((
                20260801120000,
                "create_users".to_string(),
                Direction::Up
            ))
        );
        assert_eq!(
            parse_file_name("3_add_index.down.sql"),
            Some((3, "add_index".to_string(), Direction::Down))
        );
    }

    #[test]
    fn test_parse_file_name_rejects_other_names() {
        assert!(parse_file_name("README.md").is_none());
        assert!(parse_file_name("create_users.up.sql").is_none());
        assert!(parse_file_name("20260801_missing_direction.sql").is_none());
        assert!(parse_file_name("V1__flyway_style.sql").is_none());
    }

    #[test]
    fn test_load_pairs_sorted_ascending() {
        let source = MemorySource::new([
            ("2_second.up.sql", "CREATE TABLE b ()"),
            ("2_second.down.sql", "DROP TABLE b"),
            ("1_first.up.sql", "CREATE TABLE a ()"),
            ("1_first.down.sql", "DROP TABLE a"),
            ("10_tenth.up.sql", "CREATE TABLE c ()"),
        ]);
        let migrations = load_migrations(&source).unwrap();
        let versions: Vec<i64> = migrations.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2, 10]);
        assert!(migrations[0].down_sql.is_some());
        assert!(migrations[2].down_sql.is_none());
    }

    #[test]
    fn test_load_ignores_non_matching_files() {
        let source = MemorySource::new([
            ("1_first.up.sql", "CREATE TABLE a ()"),
            ("notes.txt", "not a migration"),
            (".gitkeep", ""),
        ]);
        let migrations = load_migrations(&source).unwrap();
        assert_eq!(migrations.len(), 1);
    }

    #[test]
    fn test_duplicate_version_fails() {
        let source = MemorySource::new([
            ("7_one.up.sql", "SELECT 1"),
            ("7_other.up.sql", "SELECT 2"),
        ]);
        match load_migrations(&source) {
            Err(PtahError::DuplicateVersion { version, .. }) => assert_eq!(version, 7),
            other => panic!("Expected DuplicateVersion, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_dir_source_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1_init.up.sql"), "CREATE TABLE t ()").unwrap();
        std::fs::write(dir.path().join("1_init.down.sql"), "DROP TABLE t").unwrap();
        std::fs::write(dir.path().join("ignore.me"), "x").unwrap();

        let source = DirSource::new(dir.path());
        let migrations = load_migrations(&source).unwrap();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].version, 1);
        assert_eq!(migrations[0].up_sql, "CREATE TABLE t ()");
        assert_eq!(migrations[0].down_sql.as_deref(), Some("DROP TABLE t"));
    }

    // ── split_statements ──

    #[test]
    fn test_split_simple_statements() {
        assert_eq!(
            split_statements("SELECT 1; SELECT 2;"),
            vec!["SELECT 1", "SELECT 2"]
        );
    }

    #[test]
    fn test_split_respects_string_literals() {
        assert_eq!(
            split_statements("SELECT 'a;b'; SELECT 2;"),
            vec!["SELECT 'a;b'", "SELECT 2"]
        );
    }

    #[test]
    fn test_split_respects_dollar_quoting() {
        let sql =
            "CREATE FUNCTION foo() RETURNS void AS $$ BEGIN; END; $$ LANGUAGE plpgsql; SELECT 1;";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("BEGIN; END;"));
    }

    #[test]
    fn test_split_respects_tagged_dollar_quoting() {
        let sql = "SELECT $body$ a; b $body$; SELECT 1;";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_split_respects_comments() {
        let stmts = split_statements("-- comment; with semicolon\nSELECT 1;");
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn test_split_e_strings() {
        let stmts = split_statements(r"SELECT E'it\'s; here'; SELECT 2;");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_split_nested_block_comments() {
        let stmts = split_statements("SELECT /* outer /* inner */ outer */ 1; SELECT 2;");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_split_no_trailing_semicolon() {
        assert_eq!(split_statements("SELECT 1"), vec!["SELECT 1"]);
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- No rollback operations needed"));
        assert!(is_comment_only("-- a\n\n-- b"));
        assert!(!is_comment_only("-- header\nDROP TABLE t"));
    }
}
