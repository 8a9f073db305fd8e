//! MySQL/MariaDB renderer.
//!
//! Enum types are inline column types here, so the standalone enum nodes
//! (CreateEnum, DropEnum, AlterEnumAddValue) are unsupported. Partial
//! indexes are likewise rejected.

use crate::ddl::{ColumnSpec, ConstraintKind, ConstraintSpec, DdlNode};
use crate::dialect::Dialect;
use crate::error::Result;

use super::{
    effective_name, effective_type, render_default, table_comment, table_header, table_options,
    unsupported,
};

pub(super) fn render_node(dialect: Dialect, node: &DdlNode) -> Result<String> {
    match node {
        DdlNode::CreateTable(table) => {
            let name = effective_name(&table.platform_overrides, dialect, &table.name);
            let mut lines = Vec::with_capacity(table.columns.len() + table.constraints.len());
            for column in &table.columns {
                lines.push(format!("    {}", render_column(column, dialect)));
            }
            for constraint in &table.constraints {
                lines.push(format!("    {}", render_constraint(constraint, dialect)));
            }
            let mut sql = format!(
                "{}\nCREATE TABLE {} (\n{}\n)",
                table_header(dialect, name),
                dialect.quote(name),
                lines.join(",\n")
            );
            if let Some(comment) = table_comment(table, dialect) {
                sql.push_str(&format!(" COMMENT={}", crate::dialect::escape_literal(&comment)));
            }
            if let Some(options) = table_options(table, dialect) {
                sql.push_str(&format!(" {}", options));
            }
            Ok(sql)
        }
        DdlNode::DropTable { name } => Ok(format!("DROP TABLE {}", dialect.quote(name))),
        DdlNode::AlterTableAddColumn { table, column } => Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            dialect.quote(table),
            render_column(column, dialect)
        )),
        DdlNode::AlterTableDropColumn { table, column } => Ok(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            dialect.quote(table),
            dialect.quote(column)
        )),
        DdlNode::AlterTableAlterColumn { table, column, .. } => {
            // MODIFY COLUMN restates the full target definition, so the
            // change list collapses into one clause.
            Ok(format!(
                "ALTER TABLE {} MODIFY COLUMN {}",
                dialect.quote(table),
                render_modify_column(column, dialect)
            ))
        }
        DdlNode::AddConstraint { table, constraint } => Ok(format!(
            "ALTER TABLE {} ADD {}",
            dialect.quote(table),
            render_constraint(constraint, dialect)
        )),
        DdlNode::DropConstraint { table, name } => Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            dialect.quote(table),
            dialect.quote(name)
        )),
        DdlNode::CreateEnum { .. } | DdlNode::DropEnum { .. } | DdlNode::AlterEnumAddValue { .. } => {
            Err(unsupported(dialect, node))
        }
        DdlNode::CreateIndex(index) => {
            if index.condition.is_some() {
                // No partial indexes in MySQL/MariaDB
                return Err(unsupported(dialect, node));
            }
            let unique = if index.unique { "UNIQUE " } else { "" };
            let columns: Vec<String> = index.columns.iter().map(|c| dialect.quote(c)).collect();
            Ok(format!(
                "CREATE {}INDEX {} ON {} ({})",
                unique,
                dialect.quote(&index.name),
                dialect.quote(&index.table),
                columns.join(", ")
            ))
        }
        DdlNode::DropIndex { name, table } => Ok(format!(
            "DROP INDEX {} ON {}",
            dialect.quote(name),
            dialect.quote(table)
        )),
        DdlNode::Comment { text } => Ok(format!("-- {}", text)),
    }
}

fn render_column(column: &ColumnSpec, dialect: Dialect) -> String {
    let mut sql = format!(
        "{} {}",
        dialect.quote(&column.name),
        effective_type(column, dialect)
    );
    if !column.nullable || column.primary {
        sql.push_str(" NOT NULL");
    }
    if column.auto_increment {
        sql.push_str(" AUTO_INCREMENT");
    }
    if column.primary {
        sql.push_str(" PRIMARY KEY");
    }
    if let Some(default) = &column.default {
        sql.push_str(&format!(" DEFAULT {}", render_default(default)));
    }
    if column.unique && !column.primary {
        sql.push_str(" UNIQUE");
    }
    if let Some(check) = &column.check {
        sql.push_str(&format!(" CHECK ({})", check));
    }
    sql
}

/// Column rendering for MODIFY COLUMN: the key flags (PRIMARY KEY,
/// UNIQUE) stay with their constraints and are not restated.
fn render_modify_column(column: &ColumnSpec, dialect: Dialect) -> String {
    let mut sql = format!(
        "{} {}",
        dialect.quote(&column.name),
        effective_type(column, dialect)
    );
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if column.auto_increment {
        sql.push_str(" AUTO_INCREMENT");
    }
    if let Some(default) = &column.default {
        sql.push_str(&format!(" DEFAULT {}", render_default(default)));
    }
    sql
}

fn render_constraint(constraint: &ConstraintSpec, dialect: Dialect) -> String {
    let prefix = match &constraint.name {
        Some(name) => format!("CONSTRAINT {} ", dialect.quote(name)),
        None => String::new(),
    };
    let body = match &constraint.kind {
        ConstraintKind::PrimaryKey { columns } => {
            let cols: Vec<String> = columns.iter().map(|c| dialect.quote(c)).collect();
            format!("PRIMARY KEY ({})", cols.join(", "))
        }
        ConstraintKind::Unique { columns } => {
            let cols: Vec<String> = columns.iter().map(|c| dialect.quote(c)).collect();
            format!("UNIQUE ({})", cols.join(", "))
        }
        ConstraintKind::ForeignKey {
            columns,
            ref_table,
            ref_columns,
            on_delete,
            on_update,
        } => {
            let cols: Vec<String> = columns.iter().map(|c| dialect.quote(c)).collect();
            let refs: Vec<String> = ref_columns.iter().map(|c| dialect.quote(c)).collect();
            let mut sql = format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                cols.join(", "),
                dialect.quote(ref_table),
                refs.join(", ")
            );
            if let Some(action) = on_delete {
                sql.push_str(&format!(" ON DELETE {}", action));
            }
            if let Some(action) = on_update {
                sql.push_str(&format!(" ON UPDATE {}", action));
            }
            sql
        }
        ConstraintKind::Check { expression } => format!("CHECK ({})", expression),
    };
    format!("{}{}", prefix, body)
}
