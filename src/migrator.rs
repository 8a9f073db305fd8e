//! Apply and roll back migrations against a live database.
//!
//! Each migration executes in its own transaction: BEGIN, statements,
//! ledger INSERT, COMMIT. A failure rolls the transaction back, aborts
//! the batch, and surfaces the failing version. The ledger's primary key
//! on `version` arbitrates concurrent migrators: the loser of the INSERT
//! race rolls back and retries the remaining pending set once.

use std::collections::BTreeSet;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::conn::{DbConn, TxWriter};
use crate::desired::DesiredSchema;
use crate::dialect::Dialect;
use crate::diff;
use crate::error::{is_unique_violation, PtahError, Result};
use crate::introspect;
use crate::ledger;
use crate::migrations::{
    is_comment_only, load_migrations, split_statements, Migration, MigrationSource,
};

/// Migration status report.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    /// MAX(version) from the ledger, 0 when empty.
    pub current_version: i64,
    /// Number of migration files found.
    pub total_migrations: usize,
    /// Versions on disk but not in the ledger, ascending.
    pub pending_migrations: Vec<i64>,
    /// Versions recorded in the ledger, ascending.
    pub applied_migrations: Vec<i64>,
    /// Whether anything is pending.
    pub has_pending_changes: bool,
}

/// Report returned after a migrate-up run.
#[derive(Debug, Serialize)]
pub struct ApplyReport {
    /// Number of migrations applied (0 in dry-run mode).
    pub migrations_applied: usize,
    /// Total execution time in milliseconds.
    pub total_time_ms: i32,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Per-migration details.
    pub details: Vec<ApplyDetail>,
}

/// Details of a single applied migration.
#[derive(Debug, Serialize)]
pub struct ApplyDetail {
    /// Migration version.
    pub version: i64,
    /// Migration name.
    pub name: String,
    /// Execution time in milliseconds.
    pub execution_time_ms: i32,
}

/// Report returned after a migrate-down run.
#[derive(Debug, Serialize)]
pub struct RollbackReport {
    /// The version that was rolled back, if any.
    pub rolled_back: Option<i64>,
    /// The ledger tip after the rollback.
    pub current_version: i64,
}

/// Drift detection report.
#[derive(Debug, Serialize)]
pub struct DriftReport {
    /// Whether the live schema differs from the desired schema.
    pub has_drift: bool,
    /// One line per difference.
    pub differences: Vec<String>,
}

/// Ensure the ledger table exists. Safe to call repeatedly.
pub async fn initialize(conn: &mut DbConn, ledger_table: &str) -> Result<()> {
    ledger::create_ledger(conn, ledger_table).await
}

/// MAX(version) from the ledger, 0 when empty.
pub async fn current_version(conn: &mut DbConn, ledger_table: &str) -> Result<i64> {
    ledger::current_version(conn, ledger_table).await
}

/// Compute the migration status against a file source.
pub async fn status(
    conn: &mut DbConn,
    ledger_table: &str,
    source: &dyn MigrationSource,
) -> Result<MigrationStatus> {
    initialize(conn, ledger_table).await?;
    let applied: Vec<i64> = ledger::entries(conn, ledger_table)
        .await?
        .iter()
        .map(|e| e.version)
        .collect();
    let applied_set: BTreeSet<i64> = applied.iter().copied().collect();
    let migrations = load_migrations(source)?;
    let pending: Vec<i64> = migrations
        .iter()
        .map(|m| m.version)
        .filter(|v| !applied_set.contains(v))
        .collect();

    Ok(MigrationStatus {
        current_version: applied.iter().copied().max().unwrap_or(0),
        total_migrations: migrations.len(),
        has_pending_changes: !pending.is_empty(),
        pending_migrations: pending,
        applied_migrations: applied,
    })
}

/// Apply every pending migration in ascending version order.
///
/// Dry-run mode logs every statement prefixed `[DRY RUN]` and opens no
/// transaction. An up-to-date database is a no-op returning success.
pub async fn migrate_up(
    conn: &mut DbConn,
    ledger_table: &str,
    source: &dyn MigrationSource,
    dry_run: bool,
    cancel: &CancellationToken,
) -> Result<ApplyReport> {
    initialize(conn, ledger_table).await?;

    let mut report = ApplyReport {
        migrations_applied: 0,
        total_time_ms: 0,
        dry_run,
        details: Vec::new(),
    };
    let migrations = load_migrations(source)?;

    let mut retried = false;
    loop {
        check_cancelled(cancel, "migrate up")?;
        let applied: BTreeSet<i64> = ledger::entries(conn, ledger_table)
            .await?
            .iter()
            .map(|e| e.version)
            .collect();
        let pending: Vec<&Migration> = migrations
            .iter()
            .filter(|m| !applied.contains(&m.version))
            .collect();

        if dry_run {
            for migration in &pending {
                log::info!(
                    "[DRY RUN] Applying migration {} {}",
                    migration.version,
                    migration.name
                );
                for statement in split_statements(&migration.up_sql) {
                    log::info!("[DRY RUN] {}", statement);
                }
                report.details.push(ApplyDetail {
                    version: migration.version,
                    name: migration.name.clone(),
                    execution_time_ms: 0,
                });
            }
            log::info!(
                "Dry run complete; pending_migrations={}",
                report.details.len()
            );
            return Ok(report);
        }

        let mut contended = false;
        for migration in &pending {
            check_cancelled(cancel, "migrate up")?;
            match apply_one(conn, ledger_table, migration, cancel).await {
                Ok(execution_time_ms) => {
                    report.migrations_applied += 1;
                    report.total_time_ms += execution_time_ms;
                    report.details.push(ApplyDetail {
                        version: migration.version,
                        name: migration.name.clone(),
                        execution_time_ms,
                    });
                }
                Err(PtahError::LedgerContention { version }) if !retried => {
                    log::warn!(
                        "Lost ledger race on version {}; re-reading applied set and retrying",
                        version
                    );
                    retried = true;
                    contended = true;
                    break;
                }
                Err(PtahError::MigrationFailed {
                    version,
                    script,
                    reason,
                }) if !retried => {
                    // A concurrent migrator may have applied this version
                    // while our statements were executing, which makes the
                    // DDL fail before the ledger INSERT gets to conflict.
                    // The ledger decides which case this is.
                    let now_applied = ledger::entries(conn, ledger_table)
                        .await?
                        .iter()
                        .any(|e| e.version == version);
                    if !now_applied {
                        return Err(PtahError::MigrationFailed {
                            version,
                            script,
                            reason,
                        });
                    }
                    log::warn!(
                        "Version {} was applied concurrently; retrying remaining set",
                        version
                    );
                    retried = true;
                    contended = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        if !contended {
            break;
        }
    }

    log::info!(
        "Migrate up complete; migrations_applied={}, total_time_ms={}",
        report.migrations_applied,
        report.total_time_ms
    );
    Ok(report)
}

async fn apply_one(
    conn: &mut DbConn,
    ledger_table: &str,
    migration: &Migration,
    cancel: &CancellationToken,
) -> Result<i32> {
    log::info!("Applying migration {} {}", migration.version, migration.name);
    let dialect = conn.dialect();
    let start = std::time::Instant::now();

    let mut tx = TxWriter::new(conn);
    tx.begin().await?;

    for statement in split_statements(&migration.up_sql) {
        if is_comment_only(statement) {
            continue;
        }
        if cancel.is_cancelled() {
            tx.rollback_if_active().await;
            return Err(PtahError::Cancelled {
                operation: format!("migration {}", migration.version),
            });
        }
        if let Err(e) = tx.exec(statement).await {
            tx.rollback_if_active().await;
            return Err(PtahError::MigrationFailed {
                version: migration.version,
                script: migration.up_script.clone(),
                reason: e.to_string(),
            });
        }
    }

    let insert = ledger::insert_sql(dialect, ledger_table, migration.version, &migration.name);
    if let Err(e) = tx.exec(&insert).await {
        tx.rollback_if_active().await;
        if is_unique_violation(&e) {
            return Err(PtahError::LedgerContention {
                version: migration.version,
            });
        }
        return Err(e);
    }

    tx.commit().await?;
    Ok(start.elapsed().as_millis() as i32)
}

/// Roll back exactly one migration: the one at the ledger tip.
///
/// Executes the corresponding down script in a single transaction and
/// deletes the ledger row on success. A database at version 0 is a no-op.
pub async fn migrate_down(
    conn: &mut DbConn,
    ledger_table: &str,
    source: &dyn MigrationSource,
    cancel: &CancellationToken,
) -> Result<RollbackReport> {
    initialize(conn, ledger_table).await?;

    let tip = ledger::current_version(conn, ledger_table).await?;
    if tip == 0 {
        log::info!("No applied migrations; nothing to roll back");
        return Ok(RollbackReport {
            rolled_back: None,
            current_version: 0,
        });
    }

    let migrations = load_migrations(source)?;
    let migration = migrations
        .iter()
        .find(|m| m.version == tip)
        .ok_or(PtahError::DownMissing { version: tip })?;
    let down_sql = migration
        .down_sql
        .as_deref()
        .ok_or(PtahError::DownMissing { version: tip })?;

    log::info!("Rolling back migration {} {}", migration.version, migration.name);
    let dialect = conn.dialect();
    let down_script = format!("{}_{}.down.sql", migration.version, migration.name);

    let mut tx = TxWriter::new(conn);
    tx.begin().await?;
    for statement in split_statements(down_sql) {
        if is_comment_only(statement) {
            continue;
        }
        if cancel.is_cancelled() {
            tx.rollback_if_active().await;
            return Err(PtahError::Cancelled {
                operation: format!("rollback of {}", migration.version),
            });
        }
        if let Err(e) = tx.exec(statement).await {
            tx.rollback_if_active().await;
            return Err(PtahError::MigrationFailed {
                version: migration.version,
                script: down_script,
                reason: e.to_string(),
            });
        }
    }
    tx.exec(&ledger::delete_sql(dialect, ledger_table, tip)).await?;
    tx.commit().await?;

    let current = ledger::current_version(conn, ledger_table).await?;
    log::info!(
        "Rollback complete; rolled_back={}, current_version={}",
        tip,
        current
    );
    Ok(RollbackReport {
        rolled_back: Some(tip),
        current_version: current,
    })
}

/// Initialize the ledger and apply all pending migrations.
///
/// The primary entry point for embedding applications.
pub async fn run_migrations(
    conn: &mut DbConn,
    ledger_table: &str,
    source: &dyn MigrationSource,
    cancel: &CancellationToken,
) -> Result<ApplyReport> {
    initialize(conn, ledger_table).await?;
    migrate_up(conn, ledger_table, source, false, cancel).await
}

/// Compare the desired schema against the live database.
///
/// Used by tests and CI to catch annotation/ledger desynchronization.
pub async fn detect_drift(
    conn: &mut DbConn,
    desired: &DesiredSchema,
    schema: &str,
    ledger_table: &str,
) -> Result<DriftReport> {
    let observed = introspect::introspect(conn, schema, ledger_table).await?;
    let diff = diff::compare(desired, &observed)?;
    let differences = diff.summary();
    let has_drift = diff.has_changes();
    if has_drift {
        log::warn!("Schema drift detected; differences={}", differences.len());
    } else {
        log::debug!("No schema drift detected");
    }
    Ok(DriftReport {
        has_drift,
        differences,
    })
}

/// Drop every table, enum type, and sequence in the managed schema.
///
/// Destructive; used by test harnesses. Requires explicit opt-in via
/// `allow`. Commits on success (rollback only on the error path).
pub async fn drop_all_tables(
    conn: &mut DbConn,
    schema: &str,
    allow: bool,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    if !allow {
        return Err(PtahError::DropAllDisabled);
    }

    match conn.dialect() {
        Dialect::Postgres => drop_all_postgres(conn, schema, cancel).await,
        Dialect::MySql | Dialect::MariaDb => drop_all_mysql(conn, cancel).await,
    }
}

async fn drop_all_postgres(
    conn: &mut DbConn,
    schema: &str,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    let dialect = conn.dialect();
    let DbConn::Postgres(client) = &mut *conn else {
        unreachable!("postgres drop-all dispatched for a non-postgres connection");
    };

    let catalog_err = |operation: &str, e: tokio_postgres::Error| PtahError::CatalogQueryFailure {
        operation: operation.to_string(),
        detail: crate::error::format_pg_error(&e),
    };

    let tables: Vec<String> = client
        .query(
            "SELECT table_name FROM information_schema.tables
             WHERE table_schema = $1 AND table_type = 'BASE TABLE'
             ORDER BY table_name",
            &[&schema],
        )
        .await
        .map_err(|e| catalog_err("drop-all table listing", e))?
        .iter()
        .map(|row| row.get(0))
        .collect();
    let enums: Vec<String> = client
        .query(
            "SELECT DISTINCT t.typname
             FROM pg_type t
             JOIN pg_enum e ON e.enumtypid = t.oid
             JOIN pg_namespace n ON n.oid = t.typnamespace
             WHERE n.nspname = $1
             ORDER BY t.typname",
            &[&schema],
        )
        .await
        .map_err(|e| catalog_err("drop-all enum listing", e))?
        .iter()
        .map(|row| row.get(0))
        .collect();
    let sequences: Vec<String> = client
        .query(
            "SELECT sequence_name FROM information_schema.sequences
             WHERE sequence_schema = $1
             ORDER BY sequence_name",
            &[&schema],
        )
        .await
        .map_err(|e| catalog_err("drop-all sequence listing", e))?
        .iter()
        .map(|row| row.get(0))
        .collect();

    let mut dropped = Vec::new();
    let mut tx = TxWriter::new(conn);
    tx.begin().await?;

    for table in &tables {
        if cancel.is_cancelled() {
            tx.rollback_if_active().await;
            return Err(PtahError::Cancelled {
                operation: "drop all tables".to_string(),
            });
        }
        log::info!("Dropping table {}", table);
        let sql = format!(
            "DROP TABLE IF EXISTS {}.{} CASCADE",
            dialect.quote(schema),
            dialect.quote(table)
        );
        if let Err(e) = tx.exec(&sql).await {
            tx.rollback_if_active().await;
            return Err(e);
        }
        dropped.push(format!("TABLE {}", table));
    }
    for name in &enums {
        log::info!("Dropping enum type {}", name);
        let sql = format!(
            "DROP TYPE IF EXISTS {}.{} CASCADE",
            dialect.quote(schema),
            dialect.quote(name)
        );
        if let Err(e) = tx.exec(&sql).await {
            tx.rollback_if_active().await;
            return Err(e);
        }
        dropped.push(format!("TYPE {}", name));
    }
    for name in &sequences {
        log::info!("Dropping sequence {}", name);
        let sql = format!(
            "DROP SEQUENCE IF EXISTS {}.{} CASCADE",
            dialect.quote(schema),
            dialect.quote(name)
        );
        if let Err(e) = tx.exec(&sql).await {
            tx.rollback_if_active().await;
            return Err(e);
        }
        dropped.push(format!("SEQUENCE {}", name));
    }

    tx.commit().await?;
    log::info!("Drop all complete; objects_dropped={}", dropped.len());
    Ok(dropped)
}

async fn drop_all_mysql(conn: &mut DbConn, cancel: &CancellationToken) -> Result<Vec<String>> {
    use mysql_async::prelude::Queryable;

    let dialect = conn.dialect();
    let DbConn::MySql(inner, _) = &mut *conn else {
        unreachable!("mysql drop-all dispatched for a non-mysql connection");
    };

    let tables: Vec<String> = inner
        .query(
            "SELECT table_name FROM information_schema.tables
             WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'
             ORDER BY table_name",
        )
        .await
        .map_err(|e| PtahError::CatalogQueryFailure {
            operation: "drop-all table listing".to_string(),
            detail: e.to_string(),
        })?;

    conn.batch_execute("SET FOREIGN_KEY_CHECKS = 0").await?;
    let mut dropped = Vec::new();
    for table in &tables {
        if cancel.is_cancelled() {
            conn.batch_execute("SET FOREIGN_KEY_CHECKS = 1").await?;
            return Err(PtahError::Cancelled {
                operation: "drop all tables".to_string(),
            });
        }
        log::info!("Dropping table {}", table);
        let sql = format!("DROP TABLE IF EXISTS {}", dialect.quote(table));
        if let Err(e) = conn.batch_execute(&sql).await {
            if let Err(restore) = conn.batch_execute("SET FOREIGN_KEY_CHECKS = 1").await {
                log::warn!("Failed to restore foreign key checks: {}", restore);
            }
            return Err(e);
        }
        dropped.push(format!("TABLE {}", table));
    }
    conn.batch_execute("SET FOREIGN_KEY_CHECKS = 1").await?;
    log::info!("Drop all complete; objects_dropped={}", dropped.len());
    Ok(dropped)
}

fn check_cancelled(cancel: &CancellationToken, operation: &str) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(PtahError::Cancelled {
            operation: operation.to_string(),
        });
    }
    Ok(())
}
