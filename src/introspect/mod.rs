//! Dialect-aware database introspection.
//!
//! Each reader produces an [`ObservedSchema`] normalized into the shape
//! the diff engine compares against the desired schema.

mod mysql;
mod postgres;

use crate::conn::DbConn;
use crate::error::Result;
use crate::observed::ObservedSchema;

/// Read the observed schema from a live connection.
///
/// `schema` names the PostgreSQL schema to read; MySQL and MariaDB scope
/// to the connected database and ignore it. The migration ledger table
/// is excluded on every dialect.
pub async fn introspect(
    conn: &mut DbConn,
    schema: &str,
    ledger_table: &str,
) -> Result<ObservedSchema> {
    match conn {
        DbConn::Postgres(client) => postgres::introspect(client, schema, ledger_table).await,
        DbConn::MySql(inner, _) => mysql::introspect(inner, ledger_table).await,
    }
}
