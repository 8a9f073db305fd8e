//! SQL dialect identification, DSN dispatch, and identifier quoting.

use serde::Serialize;

use crate::error::{PtahError, Result};

/// The SQL variant targeted by the renderer, introspector, and migrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Dialect {
    /// PostgreSQL.
    Postgres,
    /// MySQL.
    MySql,
    /// MariaDB (rendered and introspected like MySQL, dispatched separately).
    MariaDb,
}

impl Dialect {
    /// Determine the dialect from a connection string prefix.
    ///
    /// Recognized prefixes: `postgres://`, `postgresql://`, `mysql://`,
    /// `mariadb://`. Anything else is unsupported by the core.
    pub fn from_dsn(dsn: &str) -> Result<Dialect> {
        if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
            Ok(Dialect::Postgres)
        } else if dsn.starts_with("mysql://") {
            Ok(Dialect::MySql)
        } else if dsn.starts_with("mariadb://") {
            Ok(Dialect::MariaDb)
        } else {
            let scheme = dsn.split("://").next().unwrap_or(dsn);
            Err(PtahError::UnsupportedDialect(scheme.to_string()))
        }
    }

    /// Uppercase dialect name used in rendered header comments.
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "POSTGRES",
            Dialect::MySql => "MYSQL",
            Dialect::MariaDb => "MARIADB",
        }
    }

    /// Lowercase dialect key used for `platform.<dialect>.<attr>` overrides.
    pub fn key(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::MariaDb => "mariadb",
        }
    }

    /// Whether the dialect belongs to the MySQL family (MySQL or MariaDB).
    pub fn is_mysql_family(&self) -> bool {
        matches!(self, Dialect::MySql | Dialect::MariaDb)
    }

    /// Quote an identifier for this dialect, but only where necessary.
    ///
    /// Plain lowercase identifiers that are not reserved words stay bare
    /// for readability; everything else is wrapped in the dialect's quote
    /// character with embedded quotes doubled.
    pub fn quote(&self, name: &str) -> String {
        if !needs_quoting(name) {
            return name.to_string();
        }
        match self {
            Dialect::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
            Dialect::MySql | Dialect::MariaDb => format!("`{}`", name.replace('`', "``")),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Reserved words that force quoting even when lowercase.
///
/// Deliberately conservative: the union of common PostgreSQL and MySQL
/// reserved words that plausibly appear as table or column names.
const RESERVED: &[&str] = &[
    "all", "and", "any", "as", "asc", "between", "by", "case", "check", "column", "constraint",
    "create", "default", "delete", "desc", "distinct", "drop", "else", "end", "exists", "for",
    "foreign", "from", "group", "having", "in", "index", "insert", "into", "is", "join", "key",
    "like", "limit", "not", "null", "on", "or", "order", "primary", "references", "select", "set",
    "table", "then", "to", "union", "unique", "update", "user", "using", "values", "when", "where",
];

fn needs_quoting(name: &str) -> bool {
    if name.is_empty() {
        return true;
    }
    let plain = name
        .chars()
        .enumerate()
        .all(|(i, c)| c == '_' || c.is_ascii_lowercase() || (i > 0 && c.is_ascii_digit()));
    if !plain {
        return true;
    }
    RESERVED.binary_search(&name).is_ok()
}

/// Escape a string value as a SQL literal (single quotes doubled).
pub fn escape_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dsn() {
        assert_eq!(
            Dialect::from_dsn("postgres://u:p@localhost/db").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(
            Dialect::from_dsn("postgresql://u@localhost/db").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(
            Dialect::from_dsn("mysql://u@localhost/db").unwrap(),
            Dialect::MySql
        );
        assert_eq!(
            Dialect::from_dsn("mariadb://u@localhost/db").unwrap(),
            Dialect::MariaDb
        );
    }

    #[test]
    fn test_from_dsn_rejects_unknown_schemes() {
        assert!(Dialect::from_dsn("memory://").is_err());
        assert!(Dialect::from_dsn("sqlite://file.db").is_err());
        assert!(Dialect::from_dsn("host=localhost").is_err());
    }

    #[test]
    fn test_quote_plain_identifiers_stay_bare() {
        assert_eq!(Dialect::Postgres.quote("users"), "users");
        assert_eq!(Dialect::MySql.quote("created_at"), "created_at");
        assert_eq!(Dialect::Postgres.quote("t2"), "t2");
    }

    #[test]
    fn test_quote_reserved_words() {
        assert_eq!(Dialect::Postgres.quote("order"), "\"order\"");
        assert_eq!(Dialect::MySql.quote("order"), "`order`");
        assert_eq!(Dialect::Postgres.quote("user"), "\"user\"");
    }

    #[test]
    fn test_quote_mixed_case_and_specials() {
        assert_eq!(Dialect::Postgres.quote("MyTable"), "\"MyTable\"");
        assert_eq!(Dialect::MySql.quote("my-table"), "`my-table`");
        assert_eq!(Dialect::Postgres.quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::MySql.quote("a`b"), "`a``b`");
    }

    #[test]
    fn test_quote_leading_digit() {
        assert_eq!(Dialect::Postgres.quote("2fa"), "\"2fa\"");
    }

    #[test]
    fn test_reserved_list_is_sorted() {
        let mut sorted = RESERVED.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, RESERVED);
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("active"), "'active'");
        assert_eq!(escape_literal("it's"), "'it''s'");
    }
}
