//! Schema reconciliation and versioned migrations for PostgreSQL, MySQL,
//! and MariaDB.
//!
//! Ptah reads a desired relational schema from `migrator:*` comment
//! annotations on record types, compares it against the live database,
//! and produces forward/backward migrations that are planned, written as
//! timestamped file pairs, and applied transactionally with a ledger.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ptah::config::PtahConfig;
//! use ptah::Ptah;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PtahConfig::load(None, None)?;
//! let mut ptah = Ptah::new(config).await?;
//! let generated = ptah.generate("add users table").await?;
//! println!("Wrote {}", generated.up_path.display());
//! let report = ptah.migrate_up(false).await?;
//! println!("Applied {} migrations", report.migrations_applied);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`config`] — Configuration loading (TOML, env vars, overrides)
//! - [`annotations`] — `migrator:*` comment directive parsing
//! - [`desired`] — Desired schema model + embedded-field expansion
//! - [`observed`] — Observed schema model + normalization rules
//! - [`introspect`] — Per-dialect catalog readers
//! - [`diff`] — Desired-vs-observed schema comparison
//! - [`ddl`] — Dialect-neutral DDL AST
//! - [`render`] — Per-dialect SQL renderers
//! - [`planner`] — Diff-to-DDL ordering and reversal
//! - [`generator`] — Migration file generation
//! - [`migrations`] — Migration file model and sources
//! - [`ledger`] — Schema-migrations ledger operations
//! - [`migrator`] — Transactional apply/rollback/status/drift
//! - [`conn`] — Database connections, TLS, transactional writer
//! - [`dialect`] — Dialect dispatch and identifier quoting
//! - [`error`] — Error types

pub mod annotations;
pub mod config;
pub mod conn;
pub mod ddl;
pub mod desired;
pub mod dialect;
pub mod diff;
pub mod error;
pub mod generator;
pub mod introspect;
pub mod ledger;
pub mod migrations;
pub mod migrator;
pub mod observed;
pub mod planner;
pub mod render;

use tokio_util::sync::CancellationToken;

use config::PtahConfig;
use conn::DbConn;
use error::Result;
use migrations::DirSource;

pub use desired::DesiredSchema;
pub use dialect::Dialect;
pub use diff::SchemaDiff;
pub use error::PtahError;
pub use generator::GeneratedMigration;
pub use migrator::{ApplyReport, DriftReport, MigrationStatus, RollbackReport};
pub use observed::ObservedSchema;

/// Main entry point for the Ptah library.
///
/// Owns a configuration and a database connection and exposes the
/// migration commands programmatically. The lower-level module functions
/// accept caller-owned connections and cancellation tokens for finer
/// control.
pub struct Ptah {
    /// The resolved configuration.
    pub config: PtahConfig,
    conn: DbConn,
}

impl Ptah {
    /// Create a new instance, connecting to the configured database.
    pub async fn new(config: PtahConfig) -> Result<Self> {
        let dsn = config.connection_string()?;
        let conn = conn::connect(&dsn, &config.database).await?;
        Ok(Self { config, conn })
    }

    /// Create an instance over an existing connection.
    pub fn with_connection(config: PtahConfig, conn: DbConn) -> Self {
        Self { config, conn }
    }

    /// Get a mutable reference to the underlying connection.
    pub fn connection(&mut self) -> &mut DbConn {
        &mut self.conn
    }

    /// Generate a migration file pair from the annotated sources.
    ///
    /// Opens its own fresh connection so the observed schema is read at
    /// call time.
    pub async fn generate(&self, name: &str) -> Result<GeneratedMigration> {
        generator::generate_migration(&self.config, name, &CancellationToken::new()).await
    }

    /// Apply all pending migrations from the configured directory.
    pub async fn migrate_up(&mut self, dry_run: bool) -> Result<ApplyReport> {
        let source = DirSource::new(self.config.migrations.dir.clone());
        migrator::migrate_up(
            &mut self.conn,
            &self.config.migrations.ledger_table,
            &source,
            dry_run,
            &CancellationToken::new(),
        )
        .await
    }

    /// Roll back the most recently applied migration.
    pub async fn migrate_down(&mut self) -> Result<RollbackReport> {
        let source = DirSource::new(self.config.migrations.dir.clone());
        migrator::migrate_down(
            &mut self.conn,
            &self.config.migrations.ledger_table,
            &source,
            &CancellationToken::new(),
        )
        .await
    }

    /// Compute the migration status.
    pub async fn status(&mut self) -> Result<MigrationStatus> {
        let source = DirSource::new(self.config.migrations.dir.clone());
        migrator::status(&mut self.conn, &self.config.migrations.ledger_table, &source).await
    }

    /// Compare the annotated sources against the live database.
    pub async fn detect_drift(&mut self) -> Result<DriftReport> {
        let desired = annotations::parse_directory(&self.config.migrations.source_dir)?;
        migrator::detect_drift(
            &mut self.conn,
            &desired,
            &self.config.migrations.schema,
            &self.config.migrations.ledger_table,
        )
        .await
    }

    /// Drop every object in the managed schema. Destructive; guarded by
    /// the `allow_drop_all` configuration flag.
    pub async fn drop_all_tables(&mut self) -> Result<Vec<String>> {
        migrator::drop_all_tables(
            &mut self.conn,
            &self.config.migrations.schema,
            self.config.migrations.allow_drop_all,
            &CancellationToken::new(),
        )
        .await
    }
}
