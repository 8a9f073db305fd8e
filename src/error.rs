//! Error types for Ptah operations.

use thiserror::Error;

/// Extract the full error message from a tokio_postgres::Error,
/// including the underlying DbError details that Display hides.
pub fn format_pg_error(e: &tokio_postgres::Error) -> String {
    // The source chain contains the actual DbError with message/detail/hint
    if let Some(db_err) = e.as_db_error() {
        let mut msg = db_err.message().to_string();
        if let Some(detail) = db_err.detail() {
            msg.push_str(&format!("\n  Detail: {}", detail));
        }
        if let Some(hint) = db_err.hint() {
            msg.push_str(&format!("\n  Hint: {}", hint));
        }
        if let Some(position) = db_err.position() {
            msg.push_str(&format!("\n  Position: {:?}", position));
        }
        return msg;
    }
    // Fallback: walk the source chain
    let mut msg = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(s) = source {
        msg.push_str(&format!(": {}", s));
        source = s.source();
    }
    if e.is_closed() {
        msg.push_str("\n  Note: The database connection was closed unexpectedly.");
    }
    msg
}

/// All error types that Ptah operations can produce.
#[derive(Error, Debug)]
pub enum PtahError {
    /// Invalid or missing configuration (TOML parse errors, missing required fields, etc.).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A PostgreSQL query or connection operation failed.
    #[error("Database error: {}", format_pg_error(.0))]
    PostgresError(#[from] tokio_postgres::Error),

    /// A MySQL/MariaDB query or connection operation failed.
    #[error("Database error: {0}")]
    MySqlError(#[from] mysql_async::Error),

    /// The connection string uses a scheme the core does not support.
    #[error("Unsupported dialect in connection string: {0}. Use postgres://, mysql://, or mariadb://.")]
    UnsupportedDialect(String),

    /// Could not establish a database connection.
    #[error("Connection failed: {detail}")]
    ConnectionFailure { detail: String },

    /// A system-catalog query used for introspection failed.
    #[error("Catalog query failed during {operation}: {detail}")]
    CatalogQueryFailure { operation: String, detail: String },

    /// SHOW CREATE TABLE output could not be parsed during introspection.
    #[error("Failed to parse DDL for table {table}: {detail}")]
    DdlParseFailure { table: String, detail: String },

    /// A schema directive comment is malformed.
    #[error("Invalid directive at {file}:{line}: {detail}")]
    DirectiveSyntax {
        file: String,
        line: usize,
        detail: String,
    },

    /// A directive uses a kind outside the recognized set.
    #[error("Unknown directive kind '{kind}' at {file}:{line}")]
    UnknownKind {
        file: String,
        line: usize,
        kind: String,
    },

    /// Two table directives resolve to the same table name.
    #[error("Duplicate table definition: {name}")]
    DuplicateTable { name: String },

    /// Two field directives resolve to the same column in one table.
    #[error("Duplicate field {column} in table {table}")]
    DuplicateField { table: String, column: String },

    /// One enum name was declared with two different value sets.
    #[error("Conflicting value sets for enum {name}")]
    EnumValueConflict { name: String },

    /// Inline embedded fields form a cycle.
    #[error("Embedded field cycle detected: {path}")]
    EmbeddedCycle { path: String },

    /// A DDL node cannot be expressed in the requested dialect.
    #[error("Cannot render {node} for dialect {dialect}")]
    DialectUnsupported { dialect: String, node: String },

    /// The desired schema matches the observed schema; nothing to generate.
    #[error("No schema changes detected")]
    NoChanges,

    /// Planning a migration from a diff failed.
    #[error("Planning failed: {detail}")]
    PlanFailed { detail: String },

    /// Another migrator instance won the race to record this version.
    #[error("Ledger contention on version {version}: another migrator applied it concurrently")]
    LedgerContention { version: i64 },

    /// Two migration files declare the same version.
    #[error("Duplicate migration version {version} ({script})")]
    DuplicateVersion { version: i64, script: String },

    /// A write was attempted outside an active transaction.
    #[error("No active transaction")]
    NoActiveTransaction,

    /// A transaction was begun while another is still active.
    #[error("A transaction is already active; nested transactions are forbidden")]
    NestedTransaction,

    /// A migration script failed to execute against the database.
    #[error("Migration failed for version {version} ({script}): {reason}")]
    MigrationFailed {
        version: i64,
        script: String,
        reason: String,
    },

    /// No down file exists for the migration at the ledger tip.
    #[error("No down migration found for version {version}. Expected {version}_*.down.sql.")]
    DownMissing { version: i64 },

    /// The drop-all operation was invoked without the explicit opt-in flag.
    #[error("Drop-all is disabled. Pass allow_drop_all = true to enable it.")]
    DropAllDisabled,

    /// The operation was cancelled at a suspension point.
    #[error("Operation cancelled during {operation}")]
    Cancelled { operation: String },

    /// A filesystem I/O operation failed (reading source files, writing migrations, etc.).
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, PtahError>`.
pub type Result<T> = std::result::Result<T, PtahError>;

/// Check whether an error is the database's unique-key violation.
///
/// This is how a lost ledger INSERT race surfaces: SQLSTATE 23505 on
/// PostgreSQL, error 1062 on MySQL/MariaDB.
pub fn is_unique_violation(e: &PtahError) -> bool {
    match e {
        PtahError::PostgresError(pg_err) => pg_err
            .as_db_error()
            .map(|db| db.code().code() == "23505")
            .unwrap_or(false),
        PtahError::MySqlError(mysql_async::Error::Server(server_err)) => server_err.code == 1062,
        _ => false,
    }
}
