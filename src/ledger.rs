//! Migration ledger operations (create, query, insert, delete).
//!
//! The ledger is a single table, `schema_migrations` by default, with one
//! row per applied version. The primary key on `version` is what arbitrates
//! concurrent migrator instances.

use chrono::{DateTime, NaiveDateTime, Utc};
use mysql_async::prelude::Queryable;

use crate::conn::DbConn;
use crate::dialect::{escape_literal, Dialect};
use crate::error::{PtahError, Result};

/// Default name of the ledger table.
pub const DEFAULT_LEDGER_TABLE: &str = "schema_migrations";

/// A row from the ledger.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    /// Migration version.
    pub version: i64,
    /// Migration name.
    pub name: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

/// The CREATE TABLE statement for the ledger in the given dialect.
///
/// Versions are timestamp-derived and exceed 32 bits, hence BIGINT.
pub(crate) fn create_ledger_sql(dialect: Dialect, table: &str) -> String {
    let quoted = dialect.quote(table);
    match dialect {
        Dialect::Postgres => format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    version BIGINT PRIMARY KEY,\n    name TEXT NOT NULL,\n    applied_at TIMESTAMPTZ NOT NULL DEFAULT now()\n)",
            quoted
        ),
        Dialect::MySql | Dialect::MariaDb => format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    version BIGINT PRIMARY KEY,\n    name TEXT NOT NULL,\n    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP\n)",
            quoted
        ),
    }
}

/// The INSERT statement recording one applied version.
pub(crate) fn insert_sql(dialect: Dialect, table: &str, version: i64, name: &str) -> String {
    format!(
        "INSERT INTO {} (version, name) VALUES ({}, {})",
        dialect.quote(table),
        version,
        escape_literal(name)
    )
}

/// The DELETE statement removing one ledger row.
pub(crate) fn delete_sql(dialect: Dialect, table: &str, version: i64) -> String {
    format!(
        "DELETE FROM {} WHERE version = {}",
        dialect.quote(table),
        version
    )
}

/// Create the ledger table if it does not exist. Safe to call repeatedly.
pub async fn create_ledger(conn: &mut DbConn, table: &str) -> Result<()> {
    let sql = create_ledger_sql(conn.dialect(), table);
    conn.batch_execute(&sql).await
}

/// MAX(version) from the ledger, 0 when empty.
pub async fn current_version(conn: &mut DbConn, table: &str) -> Result<i64> {
    let sql = format!(
        "SELECT MAX(version) FROM {}",
        conn.dialect().quote(table)
    );
    Ok(conn.query_scalar_i64(&sql).await?.unwrap_or(0))
}

/// All ledger rows ordered by version.
pub async fn entries(conn: &mut DbConn, table: &str) -> Result<Vec<LedgerEntry>> {
    let quoted = conn.dialect().quote(table);
    match conn {
        DbConn::Postgres(client) => {
            let sql = format!(
                "SELECT version, name, applied_at FROM {} ORDER BY version",
                quoted
            );
            let rows = client.query(&sql, &[]).await?;
            Ok(rows
                .iter()
                .map(|row| LedgerEntry {
                    version: row.get(0),
                    name: row.get(1),
                    applied_at: row.get(2),
                })
                .collect())
        }
        DbConn::MySql(inner, _) => {
            // applied_at comes back as text; mysql timestamps have no zone
            let sql = format!(
                "SELECT version, name, CAST(applied_at AS CHAR) FROM {} ORDER BY version",
                quoted
            );
            let rows: Vec<(i64, String, String)> = inner.query(&sql).await?;
            rows.into_iter()
                .map(|(version, name, applied_at)| {
                    let parsed = NaiveDateTime::parse_from_str(&applied_at, "%Y-%m-%d %H:%M:%S")
                        .or_else(|_| {
                            NaiveDateTime::parse_from_str(&applied_at, "%Y-%m-%d %H:%M:%S%.f")
                        })
                        .map_err(|e| PtahError::CatalogQueryFailure {
                            operation: "ledger read".to_string(),
                            detail: format!("bad applied_at '{}': {}", applied_at, e),
                        })?;
                    Ok(LedgerEntry {
                        version,
                        name,
                        applied_at: parsed.and_utc(),
                    })
                })
                .collect()
        }
    }
}
