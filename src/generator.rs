//! One-shot migration generation.
//!
//! Reads source annotations, introspects the live database over a fresh
//! connection, diffs, plans, and writes a timestamped up/down file pair.

use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::annotations;
use crate::config::PtahConfig;
use crate::conn;
use crate::diff;
use crate::dialect::Dialect;
use crate::error::{PtahError, Result};
use crate::introspect;
use crate::migrations::{parse_file_name, Direction};
use crate::planner::{self, Plan, PlanContext};

/// Result of a successful generation.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedMigration {
    /// Path of the written up script.
    pub up_path: PathBuf,
    /// Path of the written down script.
    pub down_path: PathBuf,
    /// Version assigned to the pair.
    pub version: i64,
}

/// Generate a migration file pair from the difference between the
/// annotated sources and the live database.
///
/// Fails with NoChanges (writing nothing) when the schemas already
/// match. The version is the current UTC timestamp, bumped past any
/// version already present in the output directory.
pub async fn generate_migration(
    config: &PtahConfig,
    migration_name: &str,
    cancel: &CancellationToken,
) -> Result<GeneratedMigration> {
    let desired = annotations::parse_directory(&config.migrations.source_dir)?;

    let dsn = config.connection_string()?;
    let dialect = Dialect::from_dsn(&dsn)?;
    let mut conn = conn::connect(&dsn, &config.database).await?;
    check_cancelled(cancel)?;

    let observed = introspect::introspect(
        &mut conn,
        &config.migrations.schema,
        &config.migrations.ledger_table,
    )
    .await?;
    check_cancelled(cancel)?;

    let diff = diff::compare(&desired, &observed)?;
    if !diff.has_changes() {
        return Err(PtahError::NoChanges);
    }

    let target = PlanContext::from_desired(&desired)?;
    let current = PlanContext::from_observed(&observed);
    let up_plan = planner::plan(&diff, &target, &current)?;
    let down_plan = planner::plan(&diff.reversed(), &current, &target)?;

    let up_statements = up_plan.render(dialect)?;
    let down_statements = down_plan.render(dialect)?;

    let output_dir = &config.migrations.dir;
    std::fs::create_dir_all(output_dir)?;
    let version = next_version(output_dir)?;
    let name = sanitize_name(migration_name);
    let generated_at = Utc::now();

    let up_path = output_dir.join(format!("{}_{}.up.sql", version, name));
    let down_path = output_dir.join(format!("{}_{}.down.sql", version, name));

    std::fs::write(
        &up_path,
        render_file(Direction::Up, &up_statements, &up_plan, &generated_at),
    )?;
    std::fs::write(
        &down_path,
        render_file(Direction::Down, &down_statements, &down_plan, &generated_at),
    )?;

    log::info!(
        "Generated migration; version={}, up={}, down={}",
        version,
        up_path.display(),
        down_path.display()
    );
    Ok(GeneratedMigration {
        up_path,
        down_path,
        version,
    })
}

/// Timestamp-derived version, strictly greater than anything on disk.
fn next_version(output_dir: &std::path::Path) -> Result<i64> {
    let now: i64 = Utc::now()
        .format("%Y%m%d%H%M%S")
        .to_string()
        .parse()
        .expect("timestamp format is numeric");

    let mut max_existing = 0;
    if output_dir.is_dir() {
        for entry in std::fs::read_dir(output_dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some((version, _, _)) = parse_file_name(name) {
                    max_existing = max_existing.max(version);
                }
            }
        }
    }

    Ok(if now > max_existing {
        now
    } else {
        max_existing + 1
    })
}

/// Reduce a free-form migration name to a snake_case file-name token.
fn sanitize_name(name: &str) -> String {
    let sanitized = crate::desired::snake_case(name.trim());
    let sanitized: String = sanitized.chars().take(64).collect();
    if sanitized.is_empty() {
        "migration".to_string()
    } else {
        sanitized
    }
}

/// Assemble the content of one migration file.
fn render_file(
    direction: Direction,
    statements: &[String],
    plan: &Plan,
    generated_at: &chrono::DateTime<Utc>,
) -> String {
    let mut out = String::new();
    out.push_str("-- Migration generated from schema differences\n");
    out.push_str(&format!(
        "-- Generated at: {}\n",
        generated_at.format("%Y-%m-%dT%H:%M:%SZ")
    ));
    out.push_str(&format!("-- Direction: {}\n", direction.marker()));
    for warning in &plan.destructive {
        out.push_str(&format!("-- WARNING: destructive operation: {}\n", warning));
    }
    out.push('\n');

    if statements.is_empty() {
        out.push_str("-- No rollback operations needed\n");
        return out;
    }

    out.push_str(&statements.join(";\n"));
    out.push_str(";\n");
    out
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(PtahError::Cancelled {
            operation: "generate migration".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Plan;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Add users table"), "add_users_table");
        assert_eq!(sanitize_name("CreateUsers"), "create_users");
        assert_eq!(sanitize_name("  "), "migration");
        assert_eq!(sanitize_name("weird//name!!"), "weird_name");
    }

    #[test]
    fn test_next_version_uses_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let version = next_version(dir.path()).unwrap();
        // 14-digit YYYYMMDDHHMMSS
        assert!(version > 20260101000000);
    }

    #[test]
    fn test_next_version_bumps_past_existing() {
        let dir = tempfile::tempdir().unwrap();
        // A version far in the future already exists on disk
        std::fs::write(dir.path().join("99990101000000_future.up.sql"), "SELECT 1;").unwrap();
        let version = next_version(dir.path()).unwrap();
        assert_eq!(version, 99990101000001);
    }

    #[test]
    fn test_render_file_header_and_terminator() {
        let plan = Plan {
            nodes: vec![],
            destructive: vec![],
        };
        let statements = vec![
            "CREATE TABLE users (\n    id SERIAL PRIMARY KEY\n)".to_string(),
            "CREATE INDEX idx_users_id ON users (id)".to_string(),
        ];
        let now = Utc::now();
        let content = render_file(Direction::Up, &statements, &plan, &now);

        assert!(content.starts_with("-- Migration generated from schema differences\n"));
        assert!(content.contains("-- Direction: UP\n"));
        assert!(content.contains("-- Generated at: "));
        assert!(content.contains(");\nCREATE INDEX idx_users_id ON users (id);\n"));
        assert!(content.ends_with(";\n"));
    }

    #[test]
    fn test_render_file_empty_down() {
        let plan = Plan {
            nodes: vec![],
            destructive: vec![],
        };
        let content = render_file(Direction::Down, &[], &plan, &Utc::now());
        assert!(content.contains("-- Direction: DOWN\n"));
        assert!(content.contains("-- No rollback operations needed\n"));
    }

    #[test]
    fn test_render_file_destructive_warning() {
        let plan = Plan {
            nodes: vec![],
            destructive: vec!["table legacy is dropped".to_string()],
        };
        let content = render_file(
            Direction::Up,
            &["DROP TABLE legacy".to_string()],
            &plan,
            &Utc::now(),
        );
        assert!(content.contains("-- WARNING: destructive operation: table legacy is dropped\n"));
    }
}
