//! PostgreSQL renderer.

use crate::ddl::{ColumnChange, ColumnSpec, ConstraintKind, ConstraintSpec, DdlNode};
use crate::dialect::{escape_literal, Dialect};
use crate::error::Result;

use super::{effective_name, effective_type, render_default, table_comment, table_header};

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
                "{}\n",
                table_header(dialect, name)
            );
            if let Some(comment) = table_comment(table, dialect) {
                sql.push_str(&format!("-- {}\n", comment));
            }
            sql.push_str(&format!(
                "CREATE TABLE {} (\n{}\n)",
                dialect.quote(name),
                lines.join(",\n")
            ));
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
        DdlNode::AlterTableAlterColumn {
            table,
            column,
            changes,
        } => {
            let col = dialect.quote(&column.name);
            let mut clauses = Vec::with_capacity(changes.len());
            for change in changes {
                match change {
                    ColumnChange::Type => clauses.push(format!(
                        "ALTER COLUMN {} TYPE {}",
                        col,
                        effective_type(column, dialect)
                    )),
                    ColumnChange::Nullability => {
                        if column.nullable {
                            clauses.push(format!("ALTER COLUMN {} DROP NOT NULL", col));
                        } else {
                            clauses.push(format!("ALTER COLUMN {} SET NOT NULL", col));
                        }
                    }
                    ColumnChange::Default => match &column.default {
                        Some(default) => clauses.push(format!(
                            "ALTER COLUMN {} SET DEFAULT {}",
                            col,
                            render_default(default)
                        )),
                        None => clauses.push(format!("ALTER COLUMN {} DROP DEFAULT", col)),
                    },
                }
            }
            Ok(format!(
                "ALTER TABLE {} {}",
                dialect.quote(table),
                clauses.join(", ")
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
        DdlNode::CreateEnum { name, values } => {
            let quoted: Vec<String> = values.iter().map(|v| escape_literal(v)).collect();
            Ok(format!(
                "CREATE TYPE {} AS ENUM ({})",
                dialect.quote(name),
                quoted.join(", ")
            ))
        }
        DdlNode::DropEnum { name } => Ok(format!("DROP TYPE {}", dialect.quote(name))),
        DdlNode::AlterEnumAddValue { name, value } => Ok(format!(
            "ALTER TYPE {} ADD VALUE {}",
            dialect.quote(name),
            escape_literal(value)
        )),
        DdlNode::CreateIndex(index) => {
            let unique = if index.unique { "UNIQUE " } else { "" };
            let using = match &index.method {
                Some(method) => format!(" USING {}", method),
                None => String::new(),
            };
            let columns: Vec<String> = index.columns.iter().map(|c| dialect.quote(c)).collect();
            let condition = match &index.condition {
                Some(cond) => format!(" WHERE {}", cond),
                None => String::new(),
            };
            Ok(format!(
                "CREATE {}INDEX {} ON {}{} ({}){}",
                unique,
                dialect.quote(&index.name),
                dialect.quote(&index.table),
                using,
                columns.join(", "),
                condition
            ))
        }
        DdlNode::DropIndex { name, .. } => Ok(format!("DROP INDEX {}", dialect.quote(name))),
        DdlNode::Comment { text } => Ok(format!("-- {}", text)),
    }
}

fn render_column(column: &ColumnSpec, dialect: Dialect) -> String {
    let mut sql = format!(
        "{} {}",
        dialect.quote(&column.name),
        effective_type(column, dialect)
    );
    if column.primary {
        sql.push_str(" PRIMARY KEY");
    } else if !column.nullable {
        sql.push_str(" NOT NULL");
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
