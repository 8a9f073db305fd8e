//! MySQL/MariaDB introspection.
//!
//! Table names come from information_schema; per-table column detail is
//! parsed out of `SHOW CREATE TABLE` DDL with the same regex approach
//! the rest of the crate uses for SQL extraction. Inline enum columns
//! are grouped by value list into synthetic enum types so the diff
//! engine can compare them against declared enums.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use mysql_async::prelude::Queryable;
use regex_lite::Regex;

use crate::desired::synthetic_enum_name;
use crate::error::{PtahError, Result};
use crate::observed::{
    parse_inline_enum_values, ObservedColumn, ObservedConstraint, ObservedEnum, ObservedIndex,
    ObservedSchema, ObservedTable,
};

static COLUMN_RE: LazyLock<Regex> = LazyLock::new(|| {
    // `name` type(args) unsigned ... — the type token runs to the first
    // space outside parentheses
    Regex::new(r"^`([^`]+)`\s+([A-Za-z0-9_]+(?:\([^)]*\))?(?:\s+unsigned)?)(.*)$").unwrap()
});

static PRIMARY_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^PRIMARY\s+KEY\s+\(([^)]+)\)").unwrap());

static UNIQUE_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^UNIQUE\s+KEY\s+`([^`]+)`\s+\(([^)]+)\)").unwrap());

static DEFAULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bDEFAULT\s+('(?:[^']|'')*'|[A-Za-z0-9_.()]+)").unwrap()
});

/// Read the observed schema from a MySQL or MariaDB database.
///
/// The migration ledger table is excluded from the result.
pub async fn introspect(conn: &mut mysql_async::Conn, ledger_table: &str) -> Result<ObservedSchema> {
    let catalog_err = |operation: &str, e: mysql_async::Error| PtahError::CatalogQueryFailure {
        operation: operation.to_string(),
        detail: e.to_string(),
    };

    let table_names: Vec<String> = conn
        .query(
            "SELECT table_name FROM information_schema.tables
             WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'
             ORDER BY table_name",
        )
        .await
        .map_err(|e| catalog_err("table listing", e))?;

    let mut tables = Vec::new();
    let mut enums: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut unique_constraints: Vec<ObservedConstraint> = Vec::new();
    let mut primary_constraints: Vec<ObservedConstraint> = Vec::new();

    for table_name in table_names.iter().filter(|t| *t != ledger_table) {
        let row: Option<(String, String)> = conn
            .query_first(format!("SHOW CREATE TABLE `{}`", table_name.replace('`', "``")))
            .await
            .map_err(|e| catalog_err("SHOW CREATE TABLE", e))?;
        let (_, ddl) = row.ok_or_else(|| PtahError::DdlParseFailure {
            table: table_name.clone(),
            detail: "SHOW CREATE TABLE returned no rows".to_string(),
        })?;

        let parsed = parse_show_create(table_name, &ddl)?;

        for column in &parsed.columns {
            if column.data_type == "enum" {
                if let Some(raw) = &column.column_type {
                    let values = parse_inline_enum_values(raw);
                    if !values.is_empty() {
                        enums.entry(synthetic_enum_name(&values)).or_insert(values);
                    }
                }
            }
        }

        if !parsed.primary_columns.is_empty() {
            primary_constraints.push(ObservedConstraint {
                name: format!("{}_PRIMARY", table_name),
                table: table_name.clone(),
                kind: "PRIMARY KEY".to_string(),
                columns: parsed.primary_columns.clone(),
                foreign_table: None,
                foreign_columns: Vec::new(),
                on_delete: None,
                on_update: None,
                check_clause: None,
            });
        }
        for (name, columns) in &parsed.unique_keys {
            unique_constraints.push(ObservedConstraint {
                name: name.clone(),
                table: table_name.clone(),
                kind: "UNIQUE".to_string(),
                columns: columns.clone(),
                foreign_table: None,
                foreign_columns: Vec::new(),
                on_delete: None,
                on_update: None,
                check_clause: None,
            });
        }

        tables.push(ObservedTable {
            name: table_name.clone(),
            columns: parsed.columns,
        });
    }

    let mut constraints = primary_constraints;
    constraints.extend(unique_constraints);
    constraints.extend(introspect_foreign_keys(conn, ledger_table).await?);

    let indexes = introspect_indexes(conn, ledger_table).await?;

    Ok(ObservedSchema {
        tables,
        enums: enums
            .into_iter()
            .map(|(name, values)| ObservedEnum { name, values })
            .collect(),
        indexes,
        constraints,
    })
}

#[derive(Debug)]
struct ParsedCreateTable {
    columns: Vec<ObservedColumn>,
    primary_columns: Vec<String>,
    unique_keys: Vec<(String, Vec<String>)>,
}

/// Parse the body of a SHOW CREATE TABLE statement.
fn parse_show_create(table_name: &str, ddl: &str) -> Result<ParsedCreateTable> {
    let mut columns = Vec::new();
    let mut primary_columns = Vec::new();
    let mut unique_keys = Vec::new();
    let mut ordinal = 0;

    for raw_line in ddl.lines() {
        let line = raw_line.trim().trim_end_matches(',');
        if line.is_empty()
            || line.to_uppercase().starts_with("CREATE TABLE")
            || line.starts_with(')')
        {
            continue;
        }

        if let Some(caps) = PRIMARY_KEY_RE.captures(line) {
            primary_columns = split_key_columns(caps.get(1).map(|m| m.as_str()).unwrap_or(""));
            continue;
        }
        if let Some(caps) = UNIQUE_KEY_RE.captures(line) {
            let name = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
            let columns = split_key_columns(caps.get(2).map(|m| m.as_str()).unwrap_or(""));
            unique_keys.push((name, columns));
            continue;
        }
        // Plain KEY entries and FK constraints are picked up from
        // information_schema instead
        if line.starts_with("KEY ") || line.starts_with("CONSTRAINT ") || line.starts_with("CHECK ")
        {
            continue;
        }

        if line.starts_with('`') {
            let caps = COLUMN_RE
                .captures(line)
                .ok_or_else(|| PtahError::DdlParseFailure {
                    table: table_name.to_string(),
                    detail: format!("unrecognized column line: {}", line),
                })?;
            let name = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
            let column_type = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
            let rest = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            let rest_upper = rest.to_uppercase();

            let data_type = column_type
                .split('(')
                .next()
                .unwrap_or("")
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_lowercase();
            let character_max_length = if data_type == "varchar" || data_type == "char" {
                column_type
                    .split('(')
                    .nth(1)
                    .and_then(|p| p.trim_end_matches(')').parse::<i64>().ok())
            } else {
                None
            };

            let column_default = DEFAULT_RE.captures(rest).map(|c| {
                c.get(1)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default()
            });

            ordinal += 1;
            columns.push(ObservedColumn {
                name,
                data_type,
                udt_name: None,
                column_type: Some(column_type),
                is_nullable: if rest_upper.contains("NOT NULL") {
                    "NO".to_string()
                } else {
                    "YES".to_string()
                },
                column_default,
                character_max_length,
                numeric_precision: None,
                numeric_scale: None,
                ordinal_position: ordinal,
                is_auto_increment: rest_upper.contains("AUTO_INCREMENT"),
                is_primary_key: false, // set below once the PK line is known
                is_unique: false,
            });
        }
    }

    for column in &mut columns {
        if primary_columns.contains(&column.name) {
            column.is_primary_key = true;
        }
        if unique_keys
            .iter()
            .any(|(_, cols)| cols.len() == 1 && cols[0] == column.name)
        {
            column.is_unique = true;
        }
    }

    if columns.is_empty() {
        return Err(PtahError::DdlParseFailure {
            table: table_name.to_string(),
            detail: "no column definitions found".to_string(),
        });
    }

    Ok(ParsedCreateTable {
        columns,
        primary_columns,
        unique_keys,
    })
}

fn split_key_columns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|c| c.trim().trim_matches('`').to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

async fn introspect_foreign_keys(
    conn: &mut mysql_async::Conn,
    ledger_table: &str,
) -> Result<Vec<ObservedConstraint>> {
    let rows: Vec<(String, String, String, String, String, String, String)> = conn
        .query(
            "SELECT kcu.constraint_name, kcu.table_name, kcu.column_name,
                    kcu.referenced_table_name, kcu.referenced_column_name,
                    rc.delete_rule, rc.update_rule
             FROM information_schema.key_column_usage kcu
             JOIN information_schema.referential_constraints rc
               ON rc.constraint_name = kcu.constraint_name
              AND rc.constraint_schema = kcu.constraint_schema
             WHERE kcu.table_schema = DATABASE()
               AND kcu.referenced_table_name IS NOT NULL
             ORDER BY kcu.table_name, kcu.constraint_name, kcu.ordinal_position",
        )
        .await
        .map_err(|e| PtahError::CatalogQueryFailure {
            operation: "foreign key listing".to_string(),
            detail: e.to_string(),
        })?;

    let mut by_name: BTreeMap<String, ObservedConstraint> = BTreeMap::new();
    for (name, table, column, ref_table, ref_column, delete_rule, update_rule) in rows {
        if table == ledger_table {
            continue;
        }
        let entry = by_name
            .entry(format!("{}.{}", table, name))
            .or_insert_with(|| ObservedConstraint {
                name,
                table,
                kind: "FOREIGN KEY".to_string(),
                columns: Vec::new(),
                foreign_table: Some(ref_table),
                foreign_columns: Vec::new(),
                on_delete: Some(delete_rule),
                on_update: Some(update_rule),
                check_clause: None,
            });
        entry.columns.push(column);
        entry.foreign_columns.push(ref_column);
    }
    Ok(by_name.into_values().collect())
}

async fn introspect_indexes(
    conn: &mut mysql_async::Conn,
    ledger_table: &str,
) -> Result<Vec<ObservedIndex>> {
    let rows: Vec<(String, String, String, i64)> = conn
        .query(
            "SELECT index_name, table_name, column_name, non_unique
             FROM information_schema.statistics
             WHERE table_schema = DATABASE()
             ORDER BY table_name, index_name, seq_in_index",
        )
        .await
        .map_err(|e| PtahError::CatalogQueryFailure {
            operation: "index listing".to_string(),
            detail: e.to_string(),
        })?;

    let mut by_key: BTreeMap<(String, String), ObservedIndex> = BTreeMap::new();
    for (index_name, table_name, column_name, non_unique) in rows {
        if table_name == ledger_table {
            continue;
        }
        let unique = non_unique == 0;
        let entry = by_key
            .entry((table_name.clone(), index_name.clone()))
            .or_insert_with(|| ObservedIndex {
                // MySQL unique indexes are the unique constraints, and
                // PRIMARY backs the primary key
                backs_constraint: unique || index_name == "PRIMARY",
                name: index_name,
                table: table_name,
                columns: Vec::new(),
                unique,
                definition: None,
            });
        entry.columns.push(column_name);
    }
    Ok(by_key.into_values().collect())
}
