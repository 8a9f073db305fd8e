//! Schema comparison: desired vs. observed.
//!
//! Produces a [`SchemaDiff`] with sorted buckets so identical inputs
//! always yield identical output.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::desired::{DesiredSchema, Field};
use crate::error::Result;
use crate::observed::{normalize_default, normalize_type_name, ObservedColumn, ObservedSchema};

/// Differences between the desired and observed schemas.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaDiff {
    /// Tables present only in the desired schema (sorted).
    pub tables_added: Vec<String>,
    /// Tables present only in the observed schema (sorted).
    pub tables_removed: Vec<String>,
    /// Per-table column differences (sorted by table name).
    pub tables_modified: Vec<TableDiff>,
    /// Enums present only in the desired schema (sorted).
    pub enums_added: Vec<String>,
    /// Enums present only in the observed schema (sorted).
    pub enums_removed: Vec<String>,
    /// Value-level differences for enums on both sides (sorted by name).
    pub enums_modified: Vec<EnumDiff>,
    /// Indexes present only in the desired schema (sorted).
    pub indexes_added: Vec<String>,
    /// Indexes present only in the observed schema (sorted); indexes
    /// backing a primary-key or unique constraint are never listed here.
    pub indexes_removed: Vec<String>,
}

/// Column-level differences for one table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableDiff {
    /// Table name.
    pub table_name: String,
    /// Columns present only in the desired schema (sorted).
    pub columns_added: Vec<String>,
    /// Columns present only in the observed schema (sorted).
    pub columns_removed: Vec<String>,
    /// Attribute changes for columns on both sides (sorted by column).
    pub columns_modified: Vec<ColumnDiff>,
}

/// Attribute changes for one column.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnDiff {
    /// Column name.
    pub column_name: String,
    /// Change key -> `"old -> new"` (observed -> desired).
    pub changes: BTreeMap<String, String>,
}

/// Value-level differences for one enum.
#[derive(Debug, Clone, Serialize)]
pub struct EnumDiff {
    /// Enum name.
    pub name: String,
    /// Values present only in the desired schema (sorted).
    pub values_added: Vec<String>,
    /// Values present only in the observed schema (sorted).
    pub values_removed: Vec<String>,
}

impl SchemaDiff {
    /// True iff any bucket is non-empty.
    pub fn has_changes(&self) -> bool {
        !self.tables_added.is_empty()
            || !self.tables_removed.is_empty()
            || !self.tables_modified.is_empty()
            || !self.enums_added.is_empty()
            || !self.enums_removed.is_empty()
            || !self.enums_modified.is_empty()
            || !self.indexes_added.is_empty()
            || !self.indexes_removed.is_empty()
    }

    /// Invert the diff: adds become removes, removes become adds, and
    /// per-column `"old -> new"` change strings flip to `"new -> old"`.
    ///
    /// Planning the reversed diff yields the down migration.
    pub fn reversed(&self) -> SchemaDiff {
        SchemaDiff {
            tables_added: self.tables_removed.clone(),
            tables_removed: self.tables_added.clone(),
            tables_modified: self
                .tables_modified
                .iter()
                .map(|t| TableDiff {
                    table_name: t.table_name.clone(),
                    columns_added: t.columns_removed.clone(),
                    columns_removed: t.columns_added.clone(),
                    columns_modified: t
                        .columns_modified
                        .iter()
                        .map(|c| ColumnDiff {
                            column_name: c.column_name.clone(),
                            changes: c
                                .changes
                                .iter()
                                .map(|(key, change)| (key.clone(), reverse_change(change)))
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
            enums_added: self.enums_removed.clone(),
            enums_removed: self.enums_added.clone(),
            enums_modified: self
                .enums_modified
                .iter()
                .map(|e| EnumDiff {
                    name: e.name.clone(),
                    values_added: e.values_removed.clone(),
                    values_removed: e.values_added.clone(),
                })
                .collect(),
            indexes_added: self.indexes_removed.clone(),
            indexes_removed: self.indexes_added.clone(),
        }
    }

    /// Human-readable one-line-per-change summary, used in drift logs.
    pub fn summary(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for t in &self.tables_added {
            lines.push(format!("+ TABLE {}", t));
        }
        for t in &self.tables_removed {
            lines.push(format!("- TABLE {}", t));
        }
        for t in &self.tables_modified {
            for c in &t.columns_added {
                lines.push(format!("+ COLUMN {}.{}", t.table_name, c));
            }
            for c in &t.columns_removed {
                lines.push(format!("- COLUMN {}.{}", t.table_name, c));
            }
            for c in &t.columns_modified {
                lines.push(format!("~ COLUMN {}.{}", t.table_name, c.column_name));
            }
        }
        for e in &self.enums_added {
            lines.push(format!("+ TYPE {} (enum)", e));
        }
        for e in &self.enums_removed {
            lines.push(format!("- TYPE {} (enum)", e));
        }
        for e in &self.enums_modified {
            lines.push(format!("~ TYPE {} (enum)", e.name));
        }
        for i in &self.indexes_added {
            lines.push(format!("+ INDEX {}", i));
        }
        for i in &self.indexes_removed {
            lines.push(format!("- INDEX {}", i));
        }
        lines
    }
}

fn reverse_change(change: &str) -> String {
    match change.split_once(" -> ") {
        Some((old, new)) => format!("{} -> {}", new, old),
        None => change.to_string(),
    }
}

/// Compute the diff between a desired and an observed schema.
pub fn compare(desired: &DesiredSchema, observed: &ObservedSchema) -> Result<SchemaDiff> {
    let expanded = desired.expand()?;
    let mut diff = SchemaDiff::default();

    let desired_tables: BTreeMap<&str, &crate::desired::ExpandedTable> = expanded
        .iter()
        .map(|t| (t.table.name.as_str(), t))
        .collect();
    let observed_tables: BTreeMap<&str, &crate::observed::ObservedTable> =
        observed.tables.iter().map(|t| (t.name.as_str(), t)).collect();

    diff.tables_added = desired_tables
        .keys()
        .filter(|name| !observed_tables.contains_key(*name))
        .map(|name| name.to_string())
        .collect();
    diff.tables_removed = observed_tables
        .keys()
        .filter(|name| !desired_tables.contains_key(*name))
        .map(|name| name.to_string())
        .collect();

    for (name, desired_table) in &desired_tables {
        let Some(observed_table) = observed_tables.get(name) else {
            continue;
        };
        let table_diff = diff_table(name, &desired_table.columns, observed_table, observed);
        if !table_diff.columns_added.is_empty()
            || !table_diff.columns_removed.is_empty()
            || !table_diff.columns_modified.is_empty()
        {
            diff.tables_modified.push(table_diff);
        }
    }

    diff_enums(desired, observed, &mut diff);
    diff_indexes(desired, observed, &mut diff);

    Ok(diff)
}

fn diff_table(
    table_name: &str,
    desired_columns: &[Field],
    observed_table: &crate::observed::ObservedTable,
    observed: &ObservedSchema,
) -> TableDiff {
    let desired_by_name: BTreeMap<&str, &Field> = desired_columns
        .iter()
        .map(|c| (c.column_name.as_str(), c))
        .collect();
    let observed_by_name: BTreeMap<&str, &ObservedColumn> = observed_table
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c))
        .collect();

    let mut table_diff = TableDiff {
        table_name: table_name.to_string(),
        ..Default::default()
    };

    table_diff.columns_added = desired_by_name
        .keys()
        .filter(|name| !observed_by_name.contains_key(*name))
        .map(|name| name.to_string())
        .collect();
    table_diff.columns_removed = observed_by_name
        .keys()
        .filter(|name| !desired_by_name.contains_key(*name))
        .map(|name| name.to_string())
        .collect();

    for (column_name, desired_col) in &desired_by_name {
        let Some(observed_col) = observed_by_name.get(column_name) else {
            continue;
        };
        let changes = diff_column(table_name, desired_col, observed_col, observed);
        if !changes.is_empty() {
            table_diff.columns_modified.push(ColumnDiff {
                column_name: column_name.to_string(),
                changes,
            });
        }
    }

    table_diff
}

fn diff_column(
    table_name: &str,
    desired: &Field,
    observed_col: &ObservedColumn,
    observed: &ObservedSchema,
) -> BTreeMap<String, String> {
    let mut changes = BTreeMap::new();

    // Type family (case-insensitive)
    let desired_type = desired_comparable_type(desired);
    let observed_type = observed_col.comparable_type();
    if !desired_type.eq_ignore_ascii_case(&observed_type) {
        changes.insert(
            "type".to_string(),
            format!("{} -> {}", observed_type, desired_type),
        );
    }

    // Nullability (primary keys are non-nullable on both sides)
    let desired_nullable = desired.nullable && !desired.primary;
    if desired_nullable != observed_col.nullable() {
        changes.insert(
            "nullable".to_string(),
            format!("{} -> {}", observed_col.nullable(), desired_nullable),
        );
    }

    if desired.primary != observed_col.is_primary_key {
        changes.insert(
            "primary_key".to_string(),
            format!("{} -> {}", observed_col.is_primary_key, desired.primary),
        );
    }

    if desired.unique != observed_col.is_unique {
        changes.insert(
            "unique".to_string(),
            format!("{} -> {}", observed_col.is_unique, desired.unique),
        );
    }

    // Defaults; sequence defaults on auto-increment columns are ignored
    let desired_default = desired_comparable_default(desired);
    let observed_default = if desired.auto_increment {
        None
    } else {
        observed_col.comparable_default()
    };
    if desired_default != observed_default {
        changes.insert(
            "default".to_string(),
            format!(
                "{} -> {}",
                observed_default.unwrap_or_default(),
                desired_default.unwrap_or_default()
            ),
        );
    }

    // Check constraints compare on presence; the catalogs rewrite the
    // expression text too aggressively for a textual comparison.
    let desired_check = desired.check_expression.is_some();
    let observed_check = observed
        .check_for(table_name, &observed_col.name)
        .is_some();
    if desired_check != observed_check {
        changes.insert(
            "check".to_string(),
            format!(
                "{} -> {}",
                if observed_check { "present" } else { "" },
                desired
                    .check_expression
                    .clone()
                    .unwrap_or_default()
            ),
        );
    }

    // Foreign key target
    let desired_fk = match (&desired.foreign_table, &desired.foreign_column) {
        (Some(t), Some(c)) => format!("{}({})", t, c),
        _ => String::new(),
    };
    let observed_fk = observed
        .foreign_key_for(table_name, &observed_col.name)
        .and_then(|c| {
            let t = c.foreign_table.as_deref()?;
            let col = c.foreign_columns.first()?;
            Some(format!("{}({})", t, col))
        })
        .unwrap_or_default();
    if desired_fk != observed_fk {
        changes.insert(
            "foreign_key".to_string(),
            format!("{} -> {}", observed_fk, desired_fk),
        );
    }

    changes
}

/// The comparable type string for a desired field.
pub(crate) fn desired_comparable_type(field: &Field) -> String {
    if let Some(enum_name) = &field.enum_ref {
        return enum_name.to_lowercase();
    }
    normalize_type_name(&field.sql_type)
}

/// The comparable default for a desired field.
pub(crate) fn desired_comparable_default(field: &Field) -> Option<String> {
    if field.auto_increment {
        return None;
    }
    if field.default_literal.is_some() {
        return normalize_default(field.default_literal.as_deref());
    }
    normalize_default(field.default_expression.as_deref())
}

fn diff_enums(desired: &DesiredSchema, observed: &ObservedSchema, diff: &mut SchemaDiff) {
    let desired_names: BTreeSet<&str> = desired.enums.iter().map(|e| e.name.as_str()).collect();
    let observed_names: BTreeSet<&str> = observed.enums.iter().map(|e| e.name.as_str()).collect();

    diff.enums_added = desired_names
        .difference(&observed_names)
        .map(|n| n.to_string())
        .collect();
    diff.enums_removed = observed_names
        .difference(&desired_names)
        .map(|n| n.to_string())
        .collect();

    for name in desired_names.intersection(&observed_names) {
        let desired_values: BTreeSet<&str> = desired
            .enum_by_name(name)
            .map(|e| e.values.iter().map(String::as_str).collect())
            .unwrap_or_default();
        let observed_values: BTreeSet<&str> = observed
            .enum_by_name(name)
            .map(|e| e.values.iter().map(String::as_str).collect())
            .unwrap_or_default();

        let values_added: Vec<String> = desired_values
            .difference(&observed_values)
            .map(|v| v.to_string())
            .collect();
        let values_removed: Vec<String> = observed_values
            .difference(&desired_values)
            .map(|v| v.to_string())
            .collect();
        if !values_added.is_empty() || !values_removed.is_empty() {
            diff.enums_modified.push(EnumDiff {
                name: name.to_string(),
                values_added,
                values_removed,
            });
        }
    }
}

fn diff_indexes(desired: &DesiredSchema, observed: &ObservedSchema, diff: &mut SchemaDiff) {
    let desired_names: BTreeSet<&str> = desired.indexes.iter().map(|i| i.name.as_str()).collect();
    let observed_names: BTreeSet<&str> = observed.indexes.iter().map(|i| i.name.as_str()).collect();

    diff.indexes_added = desired_names
        .difference(&observed_names)
        .map(|n| n.to_string())
        .collect();
    // Constraint-backing indexes are not first-class desired objects and
    // must never be reported as removed.
    diff.indexes_removed = observed
        .indexes
        .iter()
        .filter(|i| !i.backs_constraint && !desired_names.contains(i.name.as_str()))
        .map(|i| i.name.clone())
        .collect();
    diff.indexes_removed.sort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desired::{EnumType, Index, PlatformOverrides, Table};
    use crate::observed::{ObservedEnum, ObservedIndex, ObservedTable};

    fn desired_field(owner: &str, column: &str, sql_type: &str) -> Field {
        Field {
            owner_struct_name: owner.to_string(),
            field_name: column.to_string(),
            column_name: column.to_string(),
            sql_type: sql_type.to_string(),
            nullable: true,
            primary: false,
            auto_increment: false,
            unique: false,
            default_literal: None,
            default_expression: None,
            check_expression: None,
            foreign_table: None,
            foreign_column: None,
            foreign_key_name: None,
            on_delete: None,
            on_update: None,
            enum_ref: None,
            platform_overrides: PlatformOverrides::new(),
        }
    }

    fn desired_table(struct_name: &str, name: &str) -> Table {
        Table {
            struct_name: struct_name.to_string(),
            name: name.to_string(),
            comment: None,
            platform_overrides: PlatformOverrides::new(),
        }
    }

    fn observed_column(name: &str, data_type: &str) -> ObservedColumn {
        ObservedColumn {
            name: name.to_string(),
            data_type: data_type.to_string(),
            udt_name: None,
            column_type: None,
            is_nullable: "YES".to_string(),
            column_default: None,
            character_max_length: None,
            numeric_precision: None,
            numeric_scale: None,
            ordinal_position: 1,
            is_auto_increment: false,
            is_primary_key: false,
            is_unique: false,
        }
    }

    #[test]
    fn test_table_added_and_removed_sorted() {
        let desired = DesiredSchema {
            tables: vec![desired_table("B", "b_table"), desired_table("A", "a_table")],
            ..Default::default()
        };
        let observed = ObservedSchema {
            tables: vec![
                ObservedTable {
                    name: "z_old".to_string(),
                    columns: vec![],
                },
                ObservedTable {
                    name: "m_old".to_string(),
                    columns: vec![],
                },
            ],
            ..Default::default()
        };
        let diff = compare(&desired, &observed).unwrap();
        assert_eq!(diff.tables_added, vec!["a_table", "b_table"]);
        assert_eq!(diff.tables_removed, vec!["m_old", "z_old"]);
        assert!(diff.has_changes());
    }

    #[test]
    fn test_no_changes_when_schemas_match() {
        let mut id = desired_field("User", "id", "SERIAL");
        id.primary = true;
        id.nullable = false;
        id.auto_increment = true;
        let desired = DesiredSchema {
            tables: vec![desired_table("User", "users")],
            fields: vec![id],
            ..Default::default()
        };

        let mut observed_id = observed_column("id", "integer");
        observed_id.is_nullable = "NO".to_string();
        observed_id.is_primary_key = true;
        observed_id.column_default = Some("nextval('users_id_seq'::regclass)".to_string());
        let observed = ObservedSchema {
            tables: vec![ObservedTable {
                name: "users".to_string(),
                columns: vec![observed_id],
            }],
            ..Default::default()
        };

        let diff = compare(&desired, &observed).unwrap();
        assert!(!diff.has_changes(), "unexpected diff: {:?}", diff);
    }

    #[test]
    fn test_serial_vs_nextval_integer_is_clean() {
        // A desired SERIAL primary key against an observed integer column
        // with a nextval default yields no columns_modified entry.
        let mut id = desired_field("User", "id", "SERIAL");
        id.primary = true;
        id.auto_increment = true;
        let desired = DesiredSchema {
            tables: vec![desired_table("User", "users")],
            fields: vec![id],
            ..Default::default()
        };

        let mut observed_id = observed_column("id", "integer");
        observed_id.is_nullable = "NO".to_string();
        observed_id.is_primary_key = true;
        observed_id.column_default = Some("nextval('users_id_seq'::regclass)".to_string());
        let observed = ObservedSchema {
            tables: vec![ObservedTable {
                name: "users".to_string(),
                columns: vec![observed_id],
            }],
            ..Default::default()
        };

        let diff = compare(&desired, &observed).unwrap();
        assert!(diff.tables_modified.is_empty());
    }

    #[test]
    fn test_column_added_and_removed() {
        let desired = DesiredSchema {
            tables: vec![desired_table("User", "users")],
            fields: vec![
                desired_field("User", "email", "TEXT"),
                desired_field("User", "last_login", "TIMESTAMP"),
            ],
            ..Default::default()
        };
        let observed = ObservedSchema {
            tables: vec![ObservedTable {
                name: "users".to_string(),
                columns: vec![observed_column("email", "text"), observed_column("legacy", "text")],
            }],
            ..Default::default()
        };
        let diff = compare(&desired, &observed).unwrap();
        assert_eq!(diff.tables_modified.len(), 1);
        let t = &diff.tables_modified[0];
        assert_eq!(t.columns_added, vec!["last_login"]);
        assert_eq!(t.columns_removed, vec!["legacy"]);
    }

    #[test]
    fn test_type_change_records_old_to_new() {
        let desired = DesiredSchema {
            tables: vec![desired_table("User", "users")],
            fields: vec![desired_field("User", "email", "VARCHAR(255)")],
            ..Default::default()
        };
        let mut col = observed_column("email", "character varying");
        col.character_max_length = Some(100);
        let observed = ObservedSchema {
            tables: vec![ObservedTable {
                name: "users".to_string(),
                columns: vec![col],
            }],
            ..Default::default()
        };
        let diff = compare(&desired, &observed).unwrap();
        let changes = &diff.tables_modified[0].columns_modified[0].changes;
        assert_eq!(changes["type"], "varchar(100) -> varchar(255)");
    }

    #[test]
    fn test_type_comparison_case_insensitive() {
        let desired = DesiredSchema {
            tables: vec![desired_table("User", "users")],
            fields: vec![desired_field("User", "email", "Text")],
            ..Default::default()
        };
        let observed = ObservedSchema {
            tables: vec![ObservedTable {
                name: "users".to_string(),
                columns: vec![observed_column("email", "TEXT")],
            }],
            ..Default::default()
        };
        let diff = compare(&desired, &observed).unwrap();
        assert!(diff.tables_modified.is_empty());
    }

    #[test]
    fn test_udt_name_takes_precedence() {
        let mut status = desired_field("User", "status", "ENUM");
        status.enum_ref = Some("status_enum".to_string());
        let desired = DesiredSchema {
            tables: vec![desired_table("User", "users")],
            fields: vec![status],
            enums: vec![EnumType {
                name: "status_enum".to_string(),
                values: vec!["active".to_string()],
            }],
            ..Default::default()
        };
        let mut col = observed_column("status", "USER-DEFINED");
        col.udt_name = Some("status_enum".to_string());
        let observed = ObservedSchema {
            tables: vec![ObservedTable {
                name: "users".to_string(),
                columns: vec![col],
            }],
            enums: vec![ObservedEnum {
                name: "status_enum".to_string(),
                values: vec!["active".to_string()],
            }],
            ..Default::default()
        };
        let diff = compare(&desired, &observed).unwrap();
        assert!(!diff.has_changes());
    }

    #[test]
    fn test_default_normalization() {
        let mut status = desired_field("User", "status", "TEXT");
        status.default_literal = Some("active".to_string());
        let desired = DesiredSchema {
            tables: vec![desired_table("User", "users")],
            fields: vec![status],
            ..Default::default()
        };
        let mut col = observed_column("status", "text");
        col.column_default = Some("'active'::text".to_string());
        let observed = ObservedSchema {
            tables: vec![ObservedTable {
                name: "users".to_string(),
                columns: vec![col],
            }],
            ..Default::default()
        };
        let diff = compare(&desired, &observed).unwrap();
        assert!(!diff.has_changes());
    }

    #[test]
    fn test_enum_value_diff_sorted() {
        let desired = DesiredSchema {
            enums: vec![EnumType {
                name: "status_enum".to_string(),
                values: vec![
                    "active".to_string(),
                    "inactive".to_string(),
                    "pending".to_string(),
                ],
            }],
            ..Default::default()
        };
        let observed = ObservedSchema {
            enums: vec![ObservedEnum {
                name: "status_enum".to_string(),
                values: vec!["active".to_string(), "inactive".to_string(), "zombie".to_string()],
            }],
            ..Default::default()
        };
        let diff = compare(&desired, &observed).unwrap();
        assert_eq!(diff.enums_modified.len(), 1);
        assert_eq!(diff.enums_modified[0].values_added, vec!["pending"]);
        assert_eq!(diff.enums_modified[0].values_removed, vec!["zombie"]);
    }

    #[test]
    fn test_constraint_backing_indexes_never_removed() {
        let observed = ObservedSchema {
            indexes: vec![
                ObservedIndex {
                    name: "users_pkey".to_string(),
                    table: "users".to_string(),
                    columns: vec!["id".to_string()],
                    unique: true,
                    definition: None,
                    backs_constraint: true,
                },
                ObservedIndex {
                    name: "users_email_key".to_string(),
                    table: "users".to_string(),
                    columns: vec!["email".to_string()],
                    unique: true,
                    definition: None,
                    backs_constraint: true,
                },
                ObservedIndex {
                    name: "idx_stale".to_string(),
                    table: "users".to_string(),
                    columns: vec!["name".to_string()],
                    unique: false,
                    definition: None,
                    backs_constraint: false,
                },
            ],
            ..Default::default()
        };
        let diff = compare(&DesiredSchema::default(), &observed).unwrap();
        assert_eq!(diff.indexes_removed, vec!["idx_stale"]);
    }

    #[test]
    fn test_reversed_swaps_buckets_and_change_strings() {
        let mut diff = SchemaDiff {
            tables_added: vec!["users".to_string()],
            tables_removed: vec!["legacy".to_string()],
            enums_added: vec!["status_enum".to_string()],
            indexes_added: vec!["idx_users_email".to_string()],
            ..Default::default()
        };
        diff.tables_modified.push(TableDiff {
            table_name: "areas".to_string(),
            columns_added: vec!["new_col".to_string()],
            columns_removed: vec![],
            columns_modified: vec![ColumnDiff {
                column_name: "name".to_string(),
                changes: BTreeMap::from([(
                    "type".to_string(),
                    "text -> varchar(100)".to_string(),
                )]),
            }],
        });

        let rev = diff.reversed();
        assert_eq!(rev.tables_added, vec!["legacy"]);
        assert_eq!(rev.tables_removed, vec!["users"]);
        assert_eq!(rev.enums_removed, vec!["status_enum"]);
        assert_eq!(rev.indexes_removed, vec!["idx_users_email"]);
        assert_eq!(rev.tables_modified[0].columns_removed, vec!["new_col"]);
        assert_eq!(
            rev.tables_modified[0].columns_modified[0].changes["type"],
            "varchar(100) -> text"
        );

        // Reversal is an involution
        let back = rev.reversed();
        assert_eq!(back.tables_added, diff.tables_added);
        assert_eq!(
            back.tables_modified[0].columns_modified[0].changes["type"],
            "text -> varchar(100)"
        );
    }

    #[test]
    fn test_deterministic_output() {
        let desired = DesiredSchema {
            tables: vec![desired_table("B", "bees"), desired_table("A", "ants")],
            indexes: vec![
                Index {
                    owner_struct_name: "B".to_string(),
                    table: "bees".to_string(),
                    name: "idx_z".to_string(),
                    columns: vec!["x".to_string()],
                    unique: false,
                    condition: None,
                    method: None,
                    platform_overrides: PlatformOverrides::new(),
                },
                Index {
                    owner_struct_name: "A".to_string(),
                    table: "ants".to_string(),
                    name: "idx_a".to_string(),
                    columns: vec!["x".to_string()],
                    unique: false,
                    condition: None,
                    method: None,
                    platform_overrides: PlatformOverrides::new(),
                },
            ],
            ..Default::default()
        };
        let observed = ObservedSchema::default();
        let a = compare(&desired, &observed).unwrap();
        let b = compare(&desired, &observed).unwrap();
        assert_eq!(format!("{:?}", a), format!("{:?}", b));
        assert_eq!(a.indexes_added, vec!["idx_a", "idx_z"]);
    }
}
