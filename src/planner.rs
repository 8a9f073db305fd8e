//! Convert a schema diff into an ordered sequence of DDL nodes.
//!
//! Forward ordering: enum creates, enum value additions, table creates in
//! foreign-key dependency order (cycle-breaking constraints deferred),
//! table alterations (adds before modifications before removals), index
//! creates, then index drops, table drops in reverse dependency order,
//! and type drops last. Ties break alphabetically so output is
//! deterministic.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::ddl::{
    ColumnChange, ColumnSpec, ConstraintKind, ConstraintSpec, CreateTable, DdlNode, DefaultValue,
    IndexSpec, TypeSpec,
};
use crate::desired::{DesiredSchema, Field, PlatformOverrides};
use crate::diff::SchemaDiff;
use crate::dialect::Dialect;
use crate::error::{PtahError, Result};
use crate::observed::ObservedSchema;
use crate::render;

/// An ordered migration plan.
#[derive(Debug, Clone)]
pub struct Plan {
    /// DDL nodes in execution order.
    pub nodes: Vec<DdlNode>,
    /// Human-readable descriptions of data-destroying operations.
    pub destructive: Vec<String>,
}

impl Plan {
    /// Whether the plan would drop data.
    pub fn is_destructive(&self) -> bool {
        !self.destructive.is_empty()
    }

    /// Render every node for the dialect. Fails without partial output
    /// when any node cannot be expressed.
    pub fn render(&self, dialect: Dialect) -> Result<Vec<String>> {
        render::render_all(dialect, &self.nodes)
    }
}

/// Object definitions and dependency data backing a plan.
///
/// Built from whichever schema holds the definitions the plan needs:
/// the desired schema for forward migrations, the observed schema for
/// the reverse.
#[derive(Debug, Clone, Default)]
pub struct PlanContext {
    tables: BTreeMap<String, Vec<ColumnSpec>>,
    table_constraints: BTreeMap<String, Vec<ConstraintSpec>>,
    table_comments: BTreeMap<String, Option<String>>,
    table_overrides: BTreeMap<String, PlatformOverrides>,
    enums: BTreeMap<String, Vec<String>>,
    indexes: BTreeMap<String, IndexSpec>,
    /// Table name -> tables it references by foreign key.
    dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl PlanContext {
    /// Build a context from the desired schema.
    pub fn from_desired(schema: &DesiredSchema) -> Result<Self> {
        let mut ctx = PlanContext::default();
        let expanded = schema.expand()?;

        for table in &expanded {
            let primary_columns: Vec<&Field> =
                table.columns.iter().filter(|c| c.primary).collect();
            let composite_key = primary_columns.len() > 1;

            let mut columns = Vec::with_capacity(table.columns.len());
            let mut constraints = Vec::new();

            for field in &table.columns {
                let mut spec = column_spec_from_field(field, schema);
                if composite_key {
                    spec.primary = false;
                }
                columns.push(spec);

                if let (Some(ref_table), Some(ref_column)) =
                    (&field.foreign_table, &field.foreign_column)
                {
                    let name = field.foreign_key_name.clone().unwrap_or_else(|| {
                        format!("fk_{}_{}", table.table.name, field.column_name)
                    });
                    constraints.push(ConstraintSpec {
                        name: Some(name),
                        kind: ConstraintKind::ForeignKey {
                            columns: vec![field.column_name.clone()],
                            ref_table: ref_table.clone(),
                            ref_columns: vec![ref_column.clone()],
                            on_delete: field.on_delete.clone(),
                            on_update: field.on_update.clone(),
                        },
                    });
                }
            }

            if composite_key {
                constraints.insert(
                    0,
                    ConstraintSpec {
                        name: Some(format!("pk_{}", table.table.name)),
                        kind: ConstraintKind::PrimaryKey {
                            columns: primary_columns
                                .iter()
                                .map(|c| c.column_name.clone())
                                .collect(),
                        },
                    },
                );
            }

            ctx.tables.insert(table.table.name.clone(), columns);
            ctx.table_constraints
                .insert(table.table.name.clone(), constraints);
            ctx.table_comments
                .insert(table.table.name.clone(), table.table.comment.clone());
            ctx.table_overrides
                .insert(table.table.name.clone(), table.table.platform_overrides.clone());
        }

        for e in &schema.enums {
            ctx.enums.insert(e.name.clone(), e.values.clone());
        }
        for index in &schema.indexes {
            ctx.indexes.insert(
                index.name.clone(),
                IndexSpec {
                    name: index.name.clone(),
                    table: index.table.clone(),
                    columns: index.columns.clone(),
                    unique: index.unique,
                    condition: index.condition.clone(),
                    method: index.method.clone(),
                },
            );
        }
        ctx.dependencies = schema.dependencies.clone();
        Ok(ctx)
    }

    /// Build a context from an observed schema (used for reverse plans).
    pub fn from_observed(schema: &ObservedSchema) -> Self {
        let mut ctx = PlanContext::default();

        for table in &schema.tables {
            let primary_count = table.columns.iter().filter(|c| c.is_primary_key).count();
            let mut columns = Vec::with_capacity(table.columns.len());
            for col in &table.columns {
                let comparable = col.comparable_type();
                let type_spec = match schema.enum_by_name(&comparable) {
                    Some(e) => TypeSpec::Enum {
                        name: e.name.clone(),
                        values: e.values.clone(),
                    },
                    None => TypeSpec::parse(&comparable),
                };
                let default = col.comparable_default().map(|value| {
                    if value == "CURRENT_TIMESTAMP" {
                        DefaultValue::Expression(value)
                    } else {
                        DefaultValue::Literal(value)
                    }
                });
                columns.push(ColumnSpec {
                    name: col.name.clone(),
                    type_spec,
                    nullable: col.nullable(),
                    primary: col.is_primary_key && primary_count == 1,
                    unique: col.is_unique,
                    auto_increment: col.is_auto_increment,
                    default,
                    check: None,
                    platform_overrides: PlatformOverrides::new(),
                });
            }

            let mut constraints = Vec::new();
            if primary_count > 1 {
                constraints.push(ConstraintSpec {
                    name: Some(format!("pk_{}", table.name)),
                    kind: ConstraintKind::PrimaryKey {
                        columns: table
                            .columns
                            .iter()
                            .filter(|c| c.is_primary_key)
                            .map(|c| c.name.clone())
                            .collect(),
                    },
                });
            }
            for constraint in schema.constraints.iter().filter(|c| c.table == table.name) {
                if constraint.kind == "FOREIGN KEY" {
                    if let Some(ref_table) = &constraint.foreign_table {
                        constraints.push(ConstraintSpec {
                            name: Some(constraint.name.clone()),
                            kind: ConstraintKind::ForeignKey {
                                columns: constraint.columns.clone(),
                                ref_table: ref_table.clone(),
                                ref_columns: constraint.foreign_columns.clone(),
                                on_delete: constraint.on_delete.clone(),
                                on_update: constraint.on_update.clone(),
                            },
                        });
                        ctx.dependencies
                            .entry(table.name.clone())
                            .or_default()
                            .insert(ref_table.clone());
                    }
                }
            }

            ctx.tables.insert(table.name.clone(), columns);
            ctx.table_constraints.insert(table.name.clone(), constraints);
            ctx.table_comments.insert(table.name.clone(), None);
            ctx.table_overrides
                .insert(table.name.clone(), PlatformOverrides::new());
        }

        for e in &schema.enums {
            ctx.enums.insert(e.name.clone(), e.values.clone());
        }
        for index in schema.indexes.iter().filter(|i| !i.backs_constraint) {
            ctx.indexes.insert(
                index.name.clone(),
                IndexSpec {
                    name: index.name.clone(),
                    table: index.table.clone(),
                    columns: index.columns.clone(),
                    unique: index.unique,
                    condition: None,
                    method: None,
                },
            );
        }
        ctx
    }

    fn column(&self, table: &str, column: &str) -> Result<&ColumnSpec> {
        self.tables
            .get(table)
            .and_then(|cols| cols.iter().find(|c| c.name == column))
            .ok_or_else(|| PtahError::PlanFailed {
                detail: format!("no definition for column {}.{}", table, column),
            })
    }
}

/// Build a [`ColumnSpec`] from a desired field, resolving enum references.
fn column_spec_from_field(field: &Field, schema: &DesiredSchema) -> ColumnSpec {
    let type_spec = match &field.enum_ref {
        Some(enum_name) => {
            let values = schema
                .enum_by_name(enum_name)
                .map(|e| e.values.clone())
                .unwrap_or_default();
            TypeSpec::Enum {
                name: enum_name.clone(),
                values,
            }
        }
        None => TypeSpec::parse(&field.sql_type),
    };
    let default = match (&field.default_literal, &field.default_expression) {
        (Some(literal), _) => Some(DefaultValue::Literal(literal.clone())),
        (None, Some(expr)) => Some(DefaultValue::Expression(expr.clone())),
        (None, None) => None,
    };
    ColumnSpec {
        name: field.column_name.clone(),
        type_spec,
        nullable: field.nullable && !field.primary,
        primary: field.primary,
        unique: field.unique,
        auto_increment: field.auto_increment,
        default,
        check: field.check_expression.clone(),
        platform_overrides: field.platform_overrides.clone(),
    }
}

/// Plan the DDL for a diff.
///
/// `target` holds definitions for objects being created (the desired
/// schema on the way up, the observed schema on the way down); `current`
/// supplies dependency data for objects being dropped.
pub fn plan(diff: &SchemaDiff, target: &PlanContext, current: &PlanContext) -> Result<Plan> {
    let mut nodes = Vec::new();
    let mut destructive = Vec::new();

    // 1. New enum types
    for name in &diff.enums_added {
        let values = target
            .enums
            .get(name)
            .ok_or_else(|| PtahError::PlanFailed {
                detail: format!("no definition for enum {}", name),
            })?;
        nodes.push(DdlNode::CreateEnum {
            name: name.clone(),
            values: values.clone(),
        });
    }

    // 2. Enum value additions, in the target's declared order
    for enum_diff in &diff.enums_modified {
        let declared_order = target.enums.get(&enum_diff.name).cloned().unwrap_or_default();
        let added: BTreeSet<&str> = enum_diff.values_added.iter().map(String::as_str).collect();
        for value in &declared_order {
            if added.contains(value.as_str()) {
                nodes.push(DdlNode::AlterEnumAddValue {
                    name: enum_diff.name.clone(),
                    value: value.clone(),
                });
            }
        }
        for value in &enum_diff.values_removed {
            destructive.push(format!(
                "enum {} loses value '{}'",
                enum_diff.name, value
            ));
            nodes.push(DdlNode::Comment {
                text: format!(
                    "Removing value '{}' from enum {} requires recreating the type; manual review needed",
                    value, enum_diff.name
                ),
            });
        }
    }

    // 3. New tables in dependency order; constraints that would form a
    // cycle are deferred to ALTER TABLE ... ADD CONSTRAINT
    let (creation_order, cyclic) = order_created_tables(&diff.tables_added, &target.dependencies);
    let mut deferred = Vec::new();
    for name in &creation_order {
        let columns = target
            .tables
            .get(name)
            .ok_or_else(|| PtahError::PlanFailed {
                detail: format!("no definition for table {}", name),
            })?;
        let mut constraints = target
            .table_constraints
            .get(name)
            .cloned()
            .unwrap_or_default();
        if cyclic.contains(name) {
            let (fk, inline): (Vec<ConstraintSpec>, Vec<ConstraintSpec>) = constraints
                .into_iter()
                .partition(|c| matches!(c.kind, ConstraintKind::ForeignKey { .. }));
            constraints = inline;
            for constraint in fk {
                deferred.push((name.clone(), constraint));
            }
        }
        nodes.push(DdlNode::CreateTable(CreateTable {
            name: name.clone(),
            columns: columns.clone(),
            constraints,
            comment: target.table_comments.get(name).cloned().flatten(),
            platform_overrides: target
                .table_overrides
                .get(name)
                .cloned()
                .unwrap_or_default(),
        }));
    }
    for (table, constraint) in deferred {
        nodes.push(DdlNode::AddConstraint { table, constraint });
    }

    // 4. Altered tables: column additions, then modifications, then removals
    for table_diff in &diff.tables_modified {
        let table = &table_diff.table_name;
        for column in &table_diff.columns_added {
            nodes.push(DdlNode::AlterTableAddColumn {
                table: table.clone(),
                column: target.column(table, column)?.clone(),
            });
        }
        for column_diff in &table_diff.columns_modified {
            plan_column_modification(table, column_diff, target, &mut nodes)?;
        }
        for column in &table_diff.columns_removed {
            destructive.push(format!("column {}.{} is dropped", table, column));
            nodes.push(DdlNode::AlterTableDropColumn {
                table: table.clone(),
                column: column.clone(),
            });
        }
    }

    // 5. New indexes
    for name in &diff.indexes_added {
        let index = target
            .indexes
            .get(name)
            .ok_or_else(|| PtahError::PlanFailed {
                detail: format!("no definition for index {}", name),
            })?;
        nodes.push(DdlNode::CreateIndex(index.clone()));
    }

    // 6. Drops: indexes, tables (reverse dependency order), enum types
    for name in &diff.indexes_removed {
        let table = current
            .indexes
            .get(name)
            .map(|i| i.table.clone())
            .unwrap_or_default();
        nodes.push(DdlNode::DropIndex {
            name: name.clone(),
            table,
        });
    }

    let (drop_order, _) = order_created_tables(&diff.tables_removed, &current.dependencies);
    for name in drop_order.iter().rev() {
        destructive.push(format!("table {} is dropped", name));
        nodes.push(DdlNode::DropTable { name: name.clone() });
    }

    for name in &diff.enums_removed {
        destructive.push(format!("enum type {} is dropped", name));
        nodes.push(DdlNode::DropEnum { name: name.clone() });
    }

    Ok(Plan { nodes, destructive })
}

fn plan_column_modification(
    table: &str,
    column_diff: &crate::diff::ColumnDiff,
    target: &PlanContext,
    nodes: &mut Vec<DdlNode>,
) -> Result<()> {
    let column = &column_diff.column_name;
    let spec = target.column(table, column)?.clone();

    let mut alter_changes = Vec::new();
    for key in column_diff.changes.keys() {
        match key.as_str() {
            "type" => alter_changes.push(ColumnChange::Type),
            "nullable" => alter_changes.push(ColumnChange::Nullability),
            "default" => alter_changes.push(ColumnChange::Default),
            _ => {}
        }
    }
    if !alter_changes.is_empty() {
        nodes.push(DdlNode::AlterTableAlterColumn {
            table: table.to_string(),
            column: spec.clone(),
            changes: alter_changes,
        });
    }

    // Constraint-level changes become separate ADD/DROP CONSTRAINT nodes.
    // Dropped constraints use the conventional catalog names.
    if let Some(change) = column_diff.changes.get("unique") {
        if change.ends_with("-> true") {
            nodes.push(DdlNode::AddConstraint {
                table: table.to_string(),
                constraint: ConstraintSpec {
                    name: Some(format!("uq_{}_{}", table, column)),
                    kind: ConstraintKind::Unique {
                        columns: vec![column.clone()],
                    },
                },
            });
        } else {
            nodes.push(DdlNode::DropConstraint {
                table: table.to_string(),
                name: format!("{}_{}_key", table, column),
            });
        }
    }
    if let Some(change) = column_diff.changes.get("primary_key") {
        if change.ends_with("-> true") {
            nodes.push(DdlNode::AddConstraint {
                table: table.to_string(),
                constraint: ConstraintSpec {
                    name: None,
                    kind: ConstraintKind::PrimaryKey {
                        columns: vec![column.clone()],
                    },
                },
            });
        } else {
            nodes.push(DdlNode::DropConstraint {
                table: table.to_string(),
                name: format!("{}_pkey", table),
            });
        }
    }
    if let Some(change) = column_diff.changes.get("foreign_key") {
        let new_target = change.split(" -> ").nth(1).unwrap_or_default();
        if new_target.is_empty() {
            nodes.push(DdlNode::DropConstraint {
                table: table.to_string(),
                name: format!("fk_{}_{}", table, column),
            });
        } else {
            let constraint = target
                .table_constraints
                .get(table)
                .and_then(|constraints| {
                    constraints.iter().find(|c| {
                        matches!(&c.kind, ConstraintKind::ForeignKey { columns, .. }
                            if columns.len() == 1 && columns[0] == *column)
                    })
                })
                .cloned()
                .ok_or_else(|| PtahError::PlanFailed {
                    detail: format!("no foreign key definition for {}.{}", table, column),
                })?;
            nodes.push(DdlNode::AddConstraint {
                table: table.to_string(),
                constraint,
            });
        }
    }
    if let Some(change) = column_diff.changes.get("check") {
        let new_expression = change.split(" -> ").nth(1).unwrap_or_default();
        if new_expression.is_empty() {
            nodes.push(DdlNode::DropConstraint {
                table: table.to_string(),
                name: format!("ck_{}_{}", table, column),
            });
        } else {
            nodes.push(DdlNode::AddConstraint {
                table: table.to_string(),
                constraint: ConstraintSpec {
                    name: Some(format!("ck_{}_{}", table, column)),
                    kind: ConstraintKind::Check {
                        expression: new_expression.to_string(),
                    },
                },
            });
        }
    }
    Ok(())
}

/// Topologically order tables so referenced tables come first (Kahn's
/// algorithm with an alphabetical ready set). Returns the order plus the
/// set of tables involved in reference cycles, which are appended
/// alphabetically.
fn order_created_tables(
    tables: &[String],
    dependencies: &BTreeMap<String, BTreeSet<String>>,
) -> (Vec<String>, BTreeSet<String>) {
    let table_set: BTreeSet<&str> = tables.iter().map(String::as_str).collect();

    // Edges restricted to the tables being ordered
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for &table in &table_set {
        let deps = dependencies
            .get(table)
            .map(|refs| refs.iter().filter(|r| table_set.contains(r.as_str())).count())
            .unwrap_or(0);
        in_degree.insert(table, deps);
        if let Some(refs) = dependencies.get(table) {
            for referenced in refs {
                if table_set.contains(referenced.as_str()) {
                    dependents.entry(referenced.as_str()).or_default().push(table);
                }
            }
        }
    }

    let mut ready: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(table, _)| *table)
        .collect();
    let mut ordered: Vec<String> = Vec::with_capacity(tables.len());

    while let Some(table) = ready.pop_front() {
        ordered.push(table.to_string());
        if let Some(deps) = dependents.get(table) {
            for &dependent in deps {
                let degree = in_degree.get_mut(dependent).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    // Keep the ready queue sorted for deterministic output
                    let pos = ready
                        .iter()
                        .position(|&t| t > dependent)
                        .unwrap_or(ready.len());
                    ready.insert(pos, dependent);
                }
            }
        }
    }

    let cyclic: BTreeSet<String> = table_set
        .iter()
        .filter(|t| !ordered.iter().any(|o| o.as_str() == **t))
        .map(|t| t.to_string())
        .collect();
    ordered.extend(cyclic.iter().cloned());
    (ordered, cyclic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::parse_sources;
    use crate::diff::compare;

    fn scenario_a_schema() -> DesiredSchema {
        parse_sources(&[(
            "models.rs".to_string(),
            r#"
// migrator:schema:enum name="status_enum" values="active,inactive"
// migrator:schema:table name="users"
struct User {
    // migrator:schema:field name="id" type="SERIAL" primary="true"
    // migrator:schema:field name="email" type="VARCHAR(255)" not_null="true" unique="true"
    // migrator:schema:field name="status" type="ENUM" enum="status_enum" not_null="true" default="active"
    // migrator:schema:field name="created_at" type="TIMESTAMP" not_null="true" default_fn="CURRENT_TIMESTAMP"
}
// migrator:schema:index table="users" name="idx_users_email" columns="email"
"#
            .to_string(),
        )])
        .unwrap()
    }

    #[test]
    fn test_scenario_a_forward_order() {
        let desired = scenario_a_schema();
        let observed = ObservedSchema::default();
        let diff = compare(&desired, &observed).unwrap();

        let target = PlanContext::from_desired(&desired).unwrap();
        let current = PlanContext::from_observed(&observed);
        let plan = plan(&diff, &target, &current).unwrap();

        let statements = plan.render(Dialect::Postgres).unwrap();
        assert_eq!(statements.len(), 3);
        assert_eq!(
            statements[0],
            "CREATE TYPE status_enum AS ENUM ('active', 'inactive')"
        );
        assert!(statements[1].contains("CREATE TABLE users ("));
        assert!(statements[1].contains("id SERIAL PRIMARY KEY"));
        assert_eq!(
            statements[2],
            "CREATE INDEX idx_users_email ON users (email)"
        );
        assert!(!plan.is_destructive());
    }

    #[test]
    fn test_scenario_a_reverse_order() {
        let desired = scenario_a_schema();
        let observed = ObservedSchema::default();
        let diff = compare(&desired, &observed).unwrap();

        let target = PlanContext::from_observed(&observed);
        let current = PlanContext::from_desired(&desired).unwrap();
        let plan = plan(&diff.reversed(), &target, &current).unwrap();

        let statements = plan.render(Dialect::Postgres).unwrap();
        assert_eq!(
            statements,
            vec![
                "DROP INDEX idx_users_email",
                "DROP TABLE users",
                "DROP TYPE status_enum",
            ]
        );
        assert!(plan.is_destructive());
    }

    #[test]
    fn test_scenario_b_add_column() {
        let desired = parse_sources(&[(
            "models.rs".to_string(),
            r#"
// migrator:schema:table name="users"
struct User {
    // migrator:schema:field name="email" type="TEXT"
    // migrator:schema:field name="last_login" type="TIMESTAMP"
}
"#
            .to_string(),
        )])
        .unwrap();
        let observed = ObservedSchema {
            tables: vec![crate::observed::ObservedTable {
                name: "users".to_string(),
                columns: vec![crate::observed::ObservedColumn {
                    name: "email".to_string(),
                    data_type: "text".to_string(),
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
                }],
            }],
            ..Default::default()
        };

        let diff = compare(&desired, &observed).unwrap();
        let target = PlanContext::from_desired(&desired).unwrap();
        let current = PlanContext::from_observed(&observed);

        let up = plan(&diff, &target, &current).unwrap();
        assert_eq!(
            up.render(Dialect::Postgres).unwrap(),
            vec!["ALTER TABLE users ADD COLUMN last_login TIMESTAMP"]
        );

        let down = plan(&diff.reversed(), &current, &target).unwrap();
        assert_eq!(
            down.render(Dialect::Postgres).unwrap(),
            vec!["ALTER TABLE users DROP COLUMN last_login"]
        );
        assert!(down.is_destructive());
    }

    #[test]
    fn test_scenario_c_enum_value_addition() {
        let desired = parse_sources(&[(
            "models.rs".to_string(),
            "// migrator:schema:enum name=\"status_enum\" values=\"active,inactive,pending\"\n"
                .to_string(),
        )])
        .unwrap();
        let observed = ObservedSchema {
            enums: vec![crate::observed::ObservedEnum {
                name: "status_enum".to_string(),
                values: vec!["active".to_string(), "inactive".to_string()],
            }],
            ..Default::default()
        };

        let diff = compare(&desired, &observed).unwrap();
        let target = PlanContext::from_desired(&desired).unwrap();
        let current = PlanContext::from_observed(&observed);

        let up = plan(&diff, &target, &current).unwrap();
        assert_eq!(
            up.render(Dialect::Postgres).unwrap(),
            vec!["ALTER TYPE status_enum ADD VALUE 'pending'"]
        );

        // The reverse is destructive and flagged
        let down = plan(&diff.reversed(), &current, &target).unwrap();
        assert!(down.is_destructive());
        let statements = down.render(Dialect::Postgres).unwrap();
        assert!(statements[0].starts_with("-- Removing value 'pending'"));
    }

    #[test]
    fn test_enum_values_added_in_declared_order() {
        let desired = parse_sources(&[(
            "models.rs".to_string(),
            "// migrator:schema:enum name=\"s\" values=\"zeta,beta,alpha\"\n".to_string(),
        )])
        .unwrap();
        let observed = ObservedSchema {
            enums: vec![crate::observed::ObservedEnum {
                name: "s".to_string(),
                values: vec!["zeta".to_string()],
            }],
            ..Default::default()
        };
        let diff = compare(&desired, &observed).unwrap();
        let target = PlanContext::from_desired(&desired).unwrap();
        let plan = plan(&diff, &target, &PlanContext::default()).unwrap();
        let statements = plan.render(Dialect::Postgres).unwrap();
        // Declared order beta, alpha — not alphabetical
        assert_eq!(
            statements,
            vec![
                "ALTER TYPE s ADD VALUE 'beta'",
                "ALTER TYPE s ADD VALUE 'alpha'",
            ]
        );
    }

    #[test]
    fn test_tables_created_in_dependency_order() {
        let desired = parse_sources(&[(
            "models.rs".to_string(),
            r#"
// migrator:schema:table name="areas"
struct Area {
    // migrator:schema:field name="id" type="SERIAL" primary="true"
    // migrator:schema:field name="location_id" type="INTEGER" not_null="true" foreign="locations(id)"
}
// migrator:schema:table name="locations"
struct Location {
    // migrator:schema:field name="id" type="SERIAL" primary="true"
}
"#
            .to_string(),
        )])
        .unwrap();

        let diff = compare(&desired, &ObservedSchema::default()).unwrap();
        let target = PlanContext::from_desired(&desired).unwrap();
        let plan = plan(&diff, &target, &PlanContext::default()).unwrap();
        let statements = plan.render(Dialect::Postgres).unwrap();

        let locations_pos = statements
            .iter()
            .position(|s| s.contains("CREATE TABLE locations"))
            .unwrap();
        let areas_pos = statements
            .iter()
            .position(|s| s.contains("CREATE TABLE areas"))
            .unwrap();
        assert!(locations_pos < areas_pos);
        // The foreign key rides inline on the dependent table
        assert!(statements[areas_pos].contains("FOREIGN KEY (location_id) REFERENCES locations (id)"));
    }

    #[test]
    fn test_cyclic_foreign_keys_deferred() {
        let desired = parse_sources(&[(
            "models.rs".to_string(),
            r#"
// migrator:schema:table name="a_table"
struct A {
    // migrator:schema:field name="id" type="SERIAL" primary="true"
    // migrator:schema:field name="b_id" type="INTEGER" foreign="b_table(id)"
}
// migrator:schema:table name="b_table"
struct B {
    // migrator:schema:field name="id" type="SERIAL" primary="true"
    // migrator:schema:field name="a_id" type="INTEGER" foreign="a_table(id)"
}
"#
            .to_string(),
        )])
        .unwrap();

        let diff = compare(&desired, &ObservedSchema::default()).unwrap();
        let target = PlanContext::from_desired(&desired).unwrap();
        let plan = plan(&diff, &target, &PlanContext::default()).unwrap();
        let statements = plan.render(Dialect::Postgres).unwrap();

        // Both tables created without inline FKs, then two ADD CONSTRAINT
        assert!(statements[0].contains("CREATE TABLE a_table"));
        assert!(!statements[0].contains("FOREIGN KEY"));
        assert!(statements[1].contains("CREATE TABLE b_table"));
        assert!(!statements[1].contains("FOREIGN KEY"));
        assert!(statements[2].contains("ADD CONSTRAINT fk_a_table_b_id FOREIGN KEY"));
        assert!(statements[3].contains("ADD CONSTRAINT fk_b_table_a_id FOREIGN KEY"));
    }

    #[test]
    fn test_dropped_tables_reverse_dependency_order() {
        let observed = ObservedSchema {
            tables: vec![
                crate::observed::ObservedTable {
                    name: "locations".to_string(),
                    columns: vec![],
                },
                crate::observed::ObservedTable {
                    name: "areas".to_string(),
                    columns: vec![],
                },
            ],
            constraints: vec![crate::observed::ObservedConstraint {
                name: "fk_areas_location".to_string(),
                table: "areas".to_string(),
                kind: "FOREIGN KEY".to_string(),
                columns: vec!["location_id".to_string()],
                foreign_table: Some("locations".to_string()),
                foreign_columns: vec!["id".to_string()],
                on_delete: None,
                on_update: None,
                check_clause: None,
            }],
            ..Default::default()
        };
        let diff = compare(&DesiredSchema::default(), &observed).unwrap();
        let current = PlanContext::from_observed(&observed);
        let plan = plan(&diff, &PlanContext::default(), &current).unwrap();
        let statements = plan.render(Dialect::Postgres).unwrap();
        // areas references locations, so areas drops first
        assert_eq!(statements, vec!["DROP TABLE areas", "DROP TABLE locations"]);
    }

    #[test]
    fn test_modifications_ordered_adds_then_alters_then_drops() {
        use crate::diff::{ColumnDiff, TableDiff};
        use std::collections::BTreeMap;

        let desired = parse_sources(&[(
            "models.rs".to_string(),
            r#"
// migrator:schema:table name="users"
struct User {
    // migrator:schema:field name="email" type="VARCHAR(255)"
    // migrator:schema:field name="age" type="INTEGER"
}
"#
            .to_string(),
        )])
        .unwrap();
        let target = PlanContext::from_desired(&desired).unwrap();

        let diff = SchemaDiff {
            tables_modified: vec![TableDiff {
                table_name: "users".to_string(),
                columns_added: vec!["age".to_string()],
                columns_removed: vec!["legacy".to_string()],
                columns_modified: vec![ColumnDiff {
                    column_name: "email".to_string(),
                    changes: BTreeMap::from([(
                        "type".to_string(),
                        "text -> varchar(255)".to_string(),
                    )]),
                }],
            }],
            ..Default::default()
        };

        let plan = plan(&diff, &target, &PlanContext::default()).unwrap();
        let statements = plan.render(Dialect::Postgres).unwrap();
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE users ADD COLUMN age INTEGER",
                "ALTER TABLE users ALTER COLUMN email TYPE VARCHAR(255)",
                "ALTER TABLE users DROP COLUMN legacy",
            ]
        );
        assert!(plan.is_destructive());
    }

    #[test]
    fn test_alphabetical_tie_breaks() {
        let desired = parse_sources(&[(
            "models.rs".to_string(),
            r#"
// migrator:schema:table name="zebras"
struct Zebra {
    // migrator:schema:field name="id" type="SERIAL" primary="true"
}
// migrator:schema:table name="apples"
struct Apple {
    // migrator:schema:field name="id" type="SERIAL" primary="true"
}
"#
            .to_string(),
        )])
        .unwrap();
        let diff = compare(&desired, &ObservedSchema::default()).unwrap();
        let target = PlanContext::from_desired(&desired).unwrap();
        let plan = plan(&diff, &target, &PlanContext::default()).unwrap();
        let statements = plan.render(Dialect::Postgres).unwrap();
        assert!(statements[0].contains("CREATE TABLE apples"));
        assert!(statements[1].contains("CREATE TABLE zebras"));
    }

    #[test]
    fn test_unique_change_becomes_constraint_ops() {
        use crate::diff::{ColumnDiff, TableDiff};
        use std::collections::BTreeMap;

        let desired = parse_sources(&[(
            "models.rs".to_string(),
            r#"
// migrator:schema:table name="users"
struct User {
    // migrator:schema:field name="email" type="TEXT" unique="true"
}
"#
            .to_string(),
        )])
        .unwrap();
        let target = PlanContext::from_desired(&desired).unwrap();
        let diff = SchemaDiff {
            tables_modified: vec![TableDiff {
                table_name: "users".to_string(),
                columns_added: vec![],
                columns_removed: vec![],
                columns_modified: vec![ColumnDiff {
                    column_name: "email".to_string(),
                    changes: BTreeMap::from([(
                        "unique".to_string(),
                        "false -> true".to_string(),
                    )]),
                }],
            }],
            ..Default::default()
        };
        let plan = plan(&diff, &target, &PlanContext::default()).unwrap();
        let statements = plan.render(Dialect::Postgres).unwrap();
        assert_eq!(
            statements,
            vec!["ALTER TABLE users ADD CONSTRAINT uq_users_email UNIQUE (email)"]
        );
    }
}
