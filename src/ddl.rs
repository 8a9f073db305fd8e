//! Dialect-neutral abstract syntax tree for DDL statements.
//!
//! The planner emits these nodes; the per-dialect renderers in
//! [`crate::render`] turn them into SQL text.

use crate::desired::PlatformOverrides;
use crate::dialect::Dialect;

/// A single DDL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlNode {
    /// CREATE TABLE with columns and table-level constraints.
    CreateTable(CreateTable),
    /// DROP TABLE.
    DropTable {
        /// Table to drop.
        name: String,
    },
    /// ALTER TABLE ... ADD COLUMN.
    AlterTableAddColumn {
        /// Table being altered.
        table: String,
        /// Full definition of the new column.
        column: ColumnSpec,
    },
    /// ALTER TABLE ... DROP COLUMN.
    AlterTableDropColumn {
        /// Table being altered.
        table: String,
        /// Column to drop.
        column: String,
    },
    /// ALTER TABLE ... ALTER COLUMN toward the given target definition.
    AlterTableAlterColumn {
        /// Table being altered.
        table: String,
        /// Target definition of the column.
        column: ColumnSpec,
        /// Which aspects changed.
        changes: Vec<ColumnChange>,
    },
    /// ALTER TABLE ... ADD CONSTRAINT.
    AddConstraint {
        /// Table the constraint is added to.
        table: String,
        /// The constraint.
        constraint: ConstraintSpec,
    },
    /// ALTER TABLE ... DROP CONSTRAINT.
    DropConstraint {
        /// Table the constraint is dropped from.
        table: String,
        /// Constraint name.
        name: String,
    },
    /// CREATE TYPE ... AS ENUM (PostgreSQL only).
    CreateEnum {
        /// Enum type name.
        name: String,
        /// Ordered labels.
        values: Vec<String>,
    },
    /// DROP TYPE (PostgreSQL only).
    DropEnum {
        /// Enum type name.
        name: String,
    },
    /// ALTER TYPE ... ADD VALUE (PostgreSQL only).
    AlterEnumAddValue {
        /// Enum type name.
        name: String,
        /// Label to append.
        value: String,
    },
    /// CREATE INDEX.
    CreateIndex(IndexSpec),
    /// DROP INDEX.
    DropIndex {
        /// Index name.
        name: String,
        /// Owning table (required by MySQL's DROP INDEX form).
        table: String,
    },
    /// A bare SQL comment line emitted into the migration.
    Comment {
        /// Comment text without the leading `--`.
        text: String,
    },
}

impl DdlNode {
    /// Short node label used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            DdlNode::CreateTable(_) => "CreateTable",
            DdlNode::DropTable { .. } => "DropTable",
            DdlNode::AlterTableAddColumn { .. } => "AlterTableAddColumn",
            DdlNode::AlterTableDropColumn { .. } => "AlterTableDropColumn",
            DdlNode::AlterTableAlterColumn { .. } => "AlterTableAlterColumn",
            DdlNode::AddConstraint { .. } => "AddConstraint",
            DdlNode::DropConstraint { .. } => "DropConstraint",
            DdlNode::CreateEnum { .. } => "CreateEnum",
            DdlNode::DropEnum { .. } => "DropEnum",
            DdlNode::AlterEnumAddValue { .. } => "AlterEnumAddValue",
            DdlNode::CreateIndex(_) => "CreateIndex",
            DdlNode::DropIndex { .. } => "DropIndex",
            DdlNode::Comment { .. } => "Comment",
        }
    }
}

/// A CREATE TABLE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    /// Table name.
    pub name: String,
    /// Column definitions in order.
    pub columns: Vec<ColumnSpec>,
    /// Table-level constraints (multi-column keys, foreign keys).
    pub constraints: Vec<ConstraintSpec>,
    /// Table comment.
    pub comment: Option<String>,
    /// Per-dialect overrides (rename, options, comment).
    pub platform_overrides: PlatformOverrides,
}

/// A column definition within CREATE TABLE or ALTER TABLE.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Abstract type.
    pub type_spec: TypeSpec,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether this column is the (single-column) primary key.
    pub primary: bool,
    /// Whether the column carries an inline UNIQUE constraint.
    pub unique: bool,
    /// Whether the column auto-increments.
    pub auto_increment: bool,
    /// Default value, if any.
    pub default: Option<DefaultValue>,
    /// Inline CHECK expression.
    pub check: Option<String>,
    /// Per-dialect overrides (type replacement).
    pub platform_overrides: PlatformOverrides,
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// A literal, quoted when rendered (`DEFAULT 'active'`).
    Literal(String),
    /// An expression, rendered verbatim (`DEFAULT CURRENT_TIMESTAMP`).
    Expression(String),
}

/// An abstract SQL type, mapped per dialect at render time.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    /// Auto-incrementing 32-bit key.
    Serial,
    /// Auto-incrementing 64-bit key.
    BigSerial,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// 16-bit integer.
    SmallInt,
    /// Variable-length string with optional length.
    Varchar(Option<u32>),
    /// Fixed-length string.
    Char(Option<u32>),
    /// Unbounded text.
    Text,
    /// Boolean.
    Boolean,
    /// Timestamp without time zone.
    Timestamp,
    /// Calendar date.
    Date,
    /// JSON document.
    Json,
    /// Double-precision float.
    Double,
    /// Exact decimal with optional precision/scale.
    Decimal(Option<(u32, u32)>),
    /// UUID.
    Uuid,
    /// Binary blob.
    Binary,
    /// A named enum type with its values (for inline rendering).
    Enum {
        /// Type name (used by PostgreSQL).
        name: String,
        /// Ordered values (used by MySQL inline rendering).
        values: Vec<String>,
    },
    /// Unrecognized type, passed through verbatim.
    Raw(String),
}

impl TypeSpec {
    /// Parse a dialect-agnostic type string from the desired schema.
    pub fn parse(sql_type: &str) -> TypeSpec {
        let normalized = crate::observed::normalize_type_name(sql_type);
        let (base, params) = match (normalized.find('('), normalized.ends_with(')')) {
            (Some(pos), true) => (
                &normalized[..pos],
                Some(&normalized[pos + 1..normalized.len() - 1]),
            ),
            _ => (normalized.as_str(), None),
        };
        match base {
            "serial" => TypeSpec::Serial,
            "bigserial" => TypeSpec::BigSerial,
            "integer" => TypeSpec::Integer,
            "bigint" => TypeSpec::BigInt,
            "smallint" => TypeSpec::SmallInt,
            "varchar" => TypeSpec::Varchar(params.and_then(|p| p.parse().ok())),
            "char" => TypeSpec::Char(params.and_then(|p| p.parse().ok())),
            "text" => TypeSpec::Text,
            "boolean" => TypeSpec::Boolean,
            "timestamp" => TypeSpec::Timestamp,
            "date" => TypeSpec::Date,
            "json" => TypeSpec::Json,
            "double" | "real" => TypeSpec::Double,
            "decimal" => TypeSpec::Decimal(params.and_then(|p| {
                let (prec, scale) = p.split_once(',')?;
                Some((prec.trim().parse().ok()?, scale.trim().parse().ok()?))
            })),
            "uuid" => TypeSpec::Uuid,
            "binary" => TypeSpec::Binary,
            _ => TypeSpec::Raw(sql_type.trim().to_string()),
        }
    }

    /// Render the type for a dialect. AUTO_INCREMENT is a column
    /// attribute on MySQL and is appended by the column renderer, not
    /// here.
    pub fn render(&self, dialect: Dialect) -> String {
        let mysql = dialect.is_mysql_family();
        match self {
            TypeSpec::Serial => {
                if mysql {
                    "INT".to_string()
                } else {
                    "SERIAL".to_string()
                }
            }
            TypeSpec::BigSerial => {
                if mysql {
                    "BIGINT".to_string()
                } else {
                    "BIGSERIAL".to_string()
                }
            }
            TypeSpec::Integer => {
                if mysql {
                    "INT".to_string()
                } else {
                    "INTEGER".to_string()
                }
            }
            TypeSpec::BigInt => "BIGINT".to_string(),
            TypeSpec::SmallInt => "SMALLINT".to_string(),
            TypeSpec::Varchar(Some(n)) => format!("VARCHAR({})", n),
            TypeSpec::Varchar(None) => {
                if mysql {
                    "VARCHAR(255)".to_string()
                } else {
                    "VARCHAR".to_string()
                }
            }
            TypeSpec::Char(Some(n)) => format!("CHAR({})", n),
            TypeSpec::Char(None) => "CHAR".to_string(),
            TypeSpec::Text => "TEXT".to_string(),
            TypeSpec::Boolean => "BOOLEAN".to_string(),
            TypeSpec::Timestamp => "TIMESTAMP".to_string(),
            TypeSpec::Date => "DATE".to_string(),
            TypeSpec::Json => {
                if mysql {
                    "JSON".to_string()
                } else {
                    "JSONB".to_string()
                }
            }
            TypeSpec::Double => {
                if mysql {
                    "DOUBLE".to_string()
                } else {
                    "DOUBLE PRECISION".to_string()
                }
            }
            TypeSpec::Decimal(Some((p, s))) => format!("DECIMAL({},{})", p, s),
            TypeSpec::Decimal(None) => "DECIMAL".to_string(),
            TypeSpec::Uuid => {
                if mysql {
                    "CHAR(36)".to_string()
                } else {
                    "UUID".to_string()
                }
            }
            TypeSpec::Binary => {
                if mysql {
                    "LONGBLOB".to_string()
                } else {
                    "BYTEA".to_string()
                }
            }
            TypeSpec::Enum { name, values } => {
                if mysql {
                    let quoted: Vec<String> = values
                        .iter()
                        .map(|v| crate::dialect::escape_literal(v))
                        .collect();
                    format!("ENUM({})", quoted.join(", "))
                } else {
                    dialect.quote(name)
                }
            }
            TypeSpec::Raw(raw) => raw.clone(),
        }
    }
}

/// A table constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSpec {
    /// Constraint name; anonymous when absent.
    pub name: Option<String>,
    /// Constraint kind and payload.
    pub kind: ConstraintKind,
}

/// The payload of a table constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind {
    /// PRIMARY KEY over the given columns.
    PrimaryKey {
        /// Key columns in order.
        columns: Vec<String>,
    },
    /// UNIQUE over the given columns.
    Unique {
        /// Key columns in order.
        columns: Vec<String>,
    },
    /// FOREIGN KEY referencing another table.
    ForeignKey {
        /// Constrained columns.
        columns: Vec<String>,
        /// Referenced table.
        ref_table: String,
        /// Referenced columns.
        ref_columns: Vec<String>,
        /// ON DELETE action.
        on_delete: Option<String>,
        /// ON UPDATE action.
        on_update: Option<String>,
    },
    /// CHECK with an expression.
    Check {
        /// The check expression.
        expression: String,
    },
}

/// A CREATE INDEX statement.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    /// Index name.
    pub name: String,
    /// Table the index is built on.
    pub table: String,
    /// Indexed columns in order.
    pub columns: Vec<String>,
    /// Whether the index is UNIQUE.
    pub unique: bool,
    /// Partial-index predicate (PostgreSQL only).
    pub condition: Option<String>,
    /// Index method (PostgreSQL only; e.g. `gin`).
    pub method: Option<String>,
}

/// Which aspects of a column an AlterColumn node changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnChange {
    /// The type changed.
    Type,
    /// Nullability changed.
    Nullability,
    /// The default changed (set or dropped).
    Default,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_types() {
        assert_eq!(TypeSpec::parse("SERIAL"), TypeSpec::Serial);
        assert_eq!(TypeSpec::parse("VARCHAR(255)"), TypeSpec::Varchar(Some(255)));
        assert_eq!(TypeSpec::parse("timestamp"), TypeSpec::Timestamp);
        assert_eq!(TypeSpec::parse("DECIMAL(10,2)"), TypeSpec::Decimal(Some((10, 2))));
        assert_eq!(TypeSpec::parse("JSONB"), TypeSpec::Json);
        assert_eq!(
            TypeSpec::parse("GEOMETRY"),
            TypeSpec::Raw("GEOMETRY".to_string())
        );
    }

    #[test]
    fn test_render_serial_per_dialect() {
        assert_eq!(TypeSpec::Serial.render(Dialect::Postgres), "SERIAL");
        assert_eq!(TypeSpec::Serial.render(Dialect::MySql), "INT");
        assert_eq!(TypeSpec::BigSerial.render(Dialect::MariaDb), "BIGINT");
    }

    #[test]
    fn test_render_enum_per_dialect() {
        let spec = TypeSpec::Enum {
            name: "status_enum".to_string(),
            values: vec!["active".to_string(), "inactive".to_string()],
        };
        assert_eq!(spec.render(Dialect::Postgres), "status_enum");
        assert_eq!(spec.render(Dialect::MySql), "ENUM('active', 'inactive')");
    }

    #[test]
    fn test_render_json_per_dialect() {
        assert_eq!(TypeSpec::Json.render(Dialect::Postgres), "JSONB");
        assert_eq!(TypeSpec::Json.render(Dialect::MySql), "JSON");
    }
}
