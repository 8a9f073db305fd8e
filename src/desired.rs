//! Desired schema data model.
//!
//! Built by the annotation parser, consumed read-only by the diff engine
//! and planner. Embedded fields are flattened into their owning tables by
//! [`DesiredSchema::expand`].

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::{PtahError, Result};

/// Per-dialect attribute overrides (`platform.<dialect>.<attribute>`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlatformOverride {
    /// Rename the object for this dialect.
    pub name: Option<String>,
    /// Replace the SQL type for this dialect.
    pub type_name: Option<String>,
    /// Dialect-specific comment text.
    pub comment: Option<String>,
    /// Extra trailing options (e.g. `ENGINE=InnoDB`).
    pub options: Option<String>,
}

/// Overrides keyed by dialect key (`postgres`, `mysql`, `mariadb`).
pub type PlatformOverrides = BTreeMap<String, PlatformOverride>;

/// A table declared by a `migrator:schema:table` directive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    /// Name of the record type the directive is attached to.
    pub struct_name: String,
    /// SQL table name.
    pub name: String,
    /// Optional table comment.
    pub comment: Option<String>,
    /// Per-dialect overrides.
    pub platform_overrides: PlatformOverrides,
}

/// A column declared by a `migrator:schema:field` directive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    /// Record type that owns this field.
    pub owner_struct_name: String,
    /// Source field name the directive is attached to.
    pub field_name: String,
    /// SQL column name.
    pub column_name: String,
    /// Dialect-agnostic SQL type (SERIAL, VARCHAR(255), TIMESTAMP, ENUM, ...).
    pub sql_type: String,
    /// Whether the column allows NULL.
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    pub primary: bool,
    /// Whether the column auto-increments.
    pub auto_increment: bool,
    /// Whether the column carries a single-column UNIQUE constraint.
    pub unique: bool,
    /// Literal default value (quoted when rendered).
    pub default_literal: Option<String>,
    /// Expression default value (rendered verbatim).
    pub default_expression: Option<String>,
    /// CHECK constraint expression.
    pub check_expression: Option<String>,
    /// Referenced table for a foreign key.
    pub foreign_table: Option<String>,
    /// Referenced column for a foreign key.
    pub foreign_column: Option<String>,
    /// Explicit foreign-key constraint name.
    pub foreign_key_name: Option<String>,
    /// ON DELETE action.
    pub on_delete: Option<String>,
    /// ON UPDATE action.
    pub on_update: Option<String>,
    /// Name of the enum type this column uses.
    pub enum_ref: Option<String>,
    /// Per-dialect overrides.
    pub platform_overrides: PlatformOverrides,
}

/// An index declared by a `migrator:schema:index` directive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Index {
    /// Record type owning the target table (empty when unresolved).
    pub owner_struct_name: String,
    /// SQL table the index is built on.
    pub table: String,
    /// Index name; globally unique across the schema.
    pub name: String,
    /// Indexed columns in order.
    pub columns: Vec<String>,
    /// Whether this is a UNIQUE index.
    pub unique: bool,
    /// Partial-index predicate (PostgreSQL only).
    pub condition: Option<String>,
    /// Index method (e.g. `gin`; PostgreSQL only).
    pub method: Option<String>,
    /// Per-dialect overrides.
    pub platform_overrides: PlatformOverrides,
}

/// A named, ordered set of string values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumType {
    /// Enum type name; globally unique across the schema.
    pub name: String,
    /// Ordered, unique, non-empty values.
    pub values: Vec<String>,
}

/// How an embedded composite type is included in its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EmbedMode {
    /// Copy the embedded type's fields into the owner.
    Inline,
    /// Store the embedded type as a single JSON column.
    Json,
    /// Record a foreign-key-like dependency only.
    Relation,
}

/// An `migrator:embedded` directive attached to a record field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddedField {
    /// Record type that owns the embedding.
    pub owner_struct_name: String,
    /// Expansion mode.
    pub mode: EmbedMode,
    /// The embedded record type.
    pub embedded_type_name: String,
    /// Column-name prefix for inline mode, or the column name for json mode.
    pub prefix: Option<String>,
    /// Whether to index the generated json column.
    pub index: bool,
    /// Type override for the generated column (json mode).
    pub type_override: Option<String>,
}

/// The schema as expressed by source-file annotations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DesiredSchema {
    /// Declared tables in source order.
    pub tables: Vec<Table>,
    /// All fields in source order, keyed by owning struct name.
    pub fields: Vec<Field>,
    /// Declared indexes in source order.
    pub indexes: Vec<Index>,
    /// Declared and collected enum types.
    pub enums: Vec<EnumType>,
    /// Embedded-field inclusions in source order.
    pub embedded_fields: Vec<EmbeddedField>,
    /// Table name -> set of table names it references by foreign key.
    pub dependencies: BTreeMap<String, BTreeSet<String>>,
}

/// A table with its embedded fields flattened into a column list.
#[derive(Debug, Clone, Serialize)]
pub struct ExpandedTable {
    /// The table definition.
    pub table: Table,
    /// Final column list in source order, prefixes applied.
    pub columns: Vec<Field>,
}

impl DesiredSchema {
    /// Look up a table by SQL name.
    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Look up a table by the record type it is attached to.
    pub fn table_by_struct(&self, struct_name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.struct_name == struct_name)
    }

    /// Look up an enum by name.
    pub fn enum_by_name(&self, name: &str) -> Option<&EnumType> {
        self.enums.iter().find(|e| e.name == name)
    }

    /// Flatten embedded fields into each declared table.
    ///
    /// Inline embeds copy the embedded type's fields (prefix applied),
    /// json embeds produce one JSON column, relation embeds produce no
    /// column. Primary-key columns are forced non-nullable. Fails on
    /// inline cycles and on column-name collisions introduced by
    /// expansion.
    pub fn expand(&self) -> Result<Vec<ExpandedTable>> {
        let mut expanded = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            let mut columns = Vec::new();
            let mut stack = Vec::new();
            self.collect_columns(&table.struct_name, "", &mut stack, &mut columns)?;

            let mut seen = BTreeSet::new();
            for column in &mut columns {
                if !seen.insert(column.column_name.clone()) {
                    return Err(PtahError::DuplicateField {
                        table: table.name.clone(),
                        column: column.column_name.clone(),
                    });
                }
                if column.primary {
                    column.nullable = false;
                }
            }

            expanded.push(ExpandedTable {
                table: table.clone(),
                columns,
            });
        }
        Ok(expanded)
    }

    fn collect_columns(
        &self,
        struct_name: &str,
        prefix: &str,
        stack: &mut Vec<String>,
        out: &mut Vec<Field>,
    ) -> Result<()> {
        if stack.iter().any(|s| s == struct_name) {
            let mut path = stack.clone();
            path.push(struct_name.to_string());
            return Err(PtahError::EmbeddedCycle {
                path: path.join(" -> "),
            });
        }
        stack.push(struct_name.to_string());

        for field in self.fields.iter().filter(|f| f.owner_struct_name == struct_name) {
            let mut column = field.clone();
            if !prefix.is_empty() {
                column.column_name = format!("{}{}", prefix, column.column_name);
            }
            out.push(column);
        }

        for embed in self
            .embedded_fields
            .iter()
            .filter(|e| e.owner_struct_name == struct_name)
        {
            match embed.mode {
                EmbedMode::Inline => {
                    let nested_prefix = match &embed.prefix {
                        Some(p) => format!("{}{}", prefix, p),
                        None => prefix.to_string(),
                    };
                    self.collect_columns(&embed.embedded_type_name, &nested_prefix, stack, out)?;
                }
                EmbedMode::Json => {
                    let base = embed
                        .prefix
                        .clone()
                        .unwrap_or_else(|| snake_case(&embed.embedded_type_name));
                    let sql_type = embed
                        .type_override
                        .clone()
                        .unwrap_or_else(|| "JSON".to_string());
                    out.push(Field {
                        owner_struct_name: struct_name.to_string(),
                        field_name: embed.embedded_type_name.clone(),
                        column_name: format!("{}{}", prefix, base),
                        sql_type,
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
                    });
                }
                EmbedMode::Relation => {}
            }
        }

        stack.pop();
        Ok(())
    }

    /// Rebuild the dependency map from field foreign keys and relation
    /// embeds. Called by the parser after all directives are collected.
    pub fn rebuild_dependencies(&mut self) {
        let mut deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for table in &self.tables {
            let entry = deps.entry(table.name.clone()).or_default();
            for field in self
                .fields
                .iter()
                .filter(|f| f.owner_struct_name == table.struct_name)
            {
                if let Some(foreign) = &field.foreign_table {
                    if *foreign != table.name {
                        entry.insert(foreign.clone());
                    }
                }
            }
            for embed in self
                .embedded_fields
                .iter()
                .filter(|e| e.owner_struct_name == table.struct_name && e.mode == EmbedMode::Relation)
            {
                if let Some(target) = self.table_by_struct(&embed.embedded_type_name) {
                    if target.name != table.name {
                        entry.insert(target.name.clone());
                    }
                }
            }
        }

        // Keep only tables with at least one reference
        deps.retain(|_, refs| !refs.is_empty());
        self.dependencies = deps;
    }
}

/// Convert a CamelCase type name to snake_case.
pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        } else {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out.trim_matches('_').to_string()
}

/// Deterministic name for an anonymous enum with the given value set.
///
/// The MySQL introspector reconstructs the same name from the ordered
/// value list of an inline enum column, so desired and observed enums
/// with identical values compare equal.
pub fn synthetic_enum_name(values: &[String]) -> String {
    let joined = values
        .iter()
        .map(|v| {
            v.chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() {
                        c.to_ascii_lowercase()
                    } else {
                        '_'
                    }
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("_");
    format!("enum_{}", joined)
}
