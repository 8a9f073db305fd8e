//! Dialect-aware SQL rendering of DDL nodes.
//!
//! The contract: `render(dialect, node)` produces a single SQL string
//! with no trailing semicolon; the planner joins statements with `;`.
//! Nodes a dialect cannot express fail with a DialectUnsupported error
//! and nothing partial is emitted.

mod mysql;
mod postgres;

use crate::ddl::{ColumnSpec, CreateTable, DdlNode, DefaultValue};
use crate::desired::PlatformOverrides;
use crate::dialect::{escape_literal, Dialect};
use crate::error::{PtahError, Result};

/// Render a DDL node for the given dialect.
pub fn render(dialect: Dialect, node: &DdlNode) -> Result<String> {
    match dialect {
        Dialect::Postgres => postgres::render_node(dialect, node),
        Dialect::MySql | Dialect::MariaDb => mysql::render_node(dialect, node),
    }
}

/// Render a sequence of nodes, failing on the first unsupported node.
pub fn render_all(dialect: Dialect, nodes: &[DdlNode]) -> Result<Vec<String>> {
    nodes.iter().map(|node| render(dialect, node)).collect()
}

fn unsupported(dialect: Dialect, node: &DdlNode) -> PtahError {
    PtahError::DialectUnsupported {
        dialect: dialect.name().to_string(),
        node: node.kind().to_string(),
    }
}

/// The `-- <DIALECT> TABLE: <name> --` header emitted before CREATE TABLE.
fn table_header(dialect: Dialect, name: &str) -> String {
    format!("-- {} TABLE: {} --", dialect.name(), name)
}

/// Apply a per-dialect name override, falling back to the declared name.
fn effective_name<'a>(overrides: &'a PlatformOverrides, dialect: Dialect, name: &'a str) -> &'a str {
    overrides
        .get(dialect.key())
        .and_then(|o| o.name.as_deref())
        .unwrap_or(name)
}

/// The rendered type for a column, honoring per-dialect type overrides.
fn effective_type(column: &ColumnSpec, dialect: Dialect) -> String {
    if let Some(type_name) = column
        .platform_overrides
        .get(dialect.key())
        .and_then(|o| o.type_name.as_deref())
    {
        return type_name.to_string();
    }
    column.type_spec.render(dialect)
}

fn render_default(default: &DefaultValue) -> String {
    match default {
        DefaultValue::Literal(value) => {
            // Bare numeric and boolean literals stay unquoted
            if value.parse::<f64>().is_ok()
                || value.eq_ignore_ascii_case("true")
                || value.eq_ignore_ascii_case("false")
            {
                value.clone()
            } else {
                escape_literal(value)
            }
        }
        DefaultValue::Expression(expr) => expr.clone(),
    }
}

/// The table options clause (`ENGINE=InnoDB` etc.) for a dialect, if any.
fn table_options(table: &CreateTable, dialect: Dialect) -> Option<String> {
    table
        .platform_overrides
        .get(dialect.key())
        .and_then(|o| o.options.clone())
}

/// The effective table comment for a dialect.
fn table_comment(table: &CreateTable, dialect: Dialect) -> Option<String> {
    table
        .platform_overrides
        .get(dialect.key())
        .and_then(|o| o.comment.clone())
        .or_else(|| table.comment.clone())
}
