//! Observed schema data model and normalization rules.
//!
//! Introspectors fill these shapes straight from the catalogs; the
//! normalization helpers here turn raw catalog values into the comparable
//! forms the diff engine works on.

use serde::Serialize;

/// The schema as currently present in the live database.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ObservedSchema {
    /// Base tables (the migration ledger excluded).
    pub tables: Vec<ObservedTable>,
    /// Enum types (PostgreSQL) or reconstructed inline enums (MySQL).
    pub enums: Vec<ObservedEnum>,
    /// Indexes, including those backing constraints.
    pub indexes: Vec<ObservedIndex>,
    /// Table constraints.
    pub constraints: Vec<ObservedConstraint>,
}

/// An observed base table.
#[derive(Debug, Clone, Serialize)]
pub struct ObservedTable {
    /// Table name.
    pub name: String,
    /// Columns ordered by ordinal position.
    pub columns: Vec<ObservedColumn>,
}

/// An observed column, carrying the raw catalog values.
#[derive(Debug, Clone, Serialize)]
pub struct ObservedColumn {
    /// Column name.
    pub name: String,
    /// Generic catalog data type (e.g. `character varying`, `USER-DEFINED`).
    pub data_type: String,
    /// Underlying type name (PostgreSQL; names the enum type for enum columns).
    pub udt_name: Option<String>,
    /// Raw column type text (MySQL; e.g. `enum('a','b')`, `varchar(255)`).
    pub column_type: Option<String>,
    /// Catalog nullability flag, `"YES"` or `"NO"`.
    pub is_nullable: String,
    /// Raw default expression, if any.
    pub column_default: Option<String>,
    /// Character length for varchar-like types.
    pub character_max_length: Option<i64>,
    /// Numeric precision for decimal types.
    pub numeric_precision: Option<i64>,
    /// Numeric scale for decimal types.
    pub numeric_scale: Option<i64>,
    /// 1-based position within the table.
    pub ordinal_position: i32,
    /// Derived: the column auto-increments (nextval default / AUTO_INCREMENT).
    pub is_auto_increment: bool,
    /// Derived: the column is part of the primary key.
    pub is_primary_key: bool,
    /// Derived: the column carries a single-column unique constraint.
    pub is_unique: bool,
}

/// An observed enum type.
#[derive(Debug, Clone, Serialize)]
pub struct ObservedEnum {
    /// Type name (synthetic for MySQL inline enums).
    pub name: String,
    /// Ordered labels.
    pub values: Vec<String>,
}

/// An observed index.
#[derive(Debug, Clone, Serialize)]
pub struct ObservedIndex {
    /// Index name.
    pub name: String,
    /// Table the index is built on.
    pub table: String,
    /// Indexed columns in order.
    pub columns: Vec<String>,
    /// Whether the index is unique.
    pub unique: bool,
    /// Full index definition where the catalog provides one.
    pub definition: Option<String>,
    /// Whether the index backs a primary-key or unique constraint.
    pub backs_constraint: bool,
}

/// An observed table constraint.
#[derive(Debug, Clone, Serialize)]
pub struct ObservedConstraint {
    /// Constraint name.
    pub name: String,
    /// Table the constraint is on.
    pub table: String,
    /// Constraint type: `PRIMARY KEY`, `UNIQUE`, `FOREIGN KEY`, `CHECK`.
    pub kind: String,
    /// Constrained columns in order.
    pub columns: Vec<String>,
    /// Referenced table for foreign keys.
    pub foreign_table: Option<String>,
    /// Referenced columns for foreign keys.
    pub foreign_columns: Vec<String>,
    /// ON DELETE rule for foreign keys.
    pub on_delete: Option<String>,
    /// ON UPDATE rule for foreign keys.
    pub on_update: Option<String>,
    /// Check clause for check constraints.
    pub check_clause: Option<String>,
}

impl ObservedSchema {
    /// Look up a table by name.
    pub fn table_by_name(&self, name: &str) -> Option<&ObservedTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Look up an enum by name.
    pub fn enum_by_name(&self, name: &str) -> Option<&ObservedEnum> {
        self.enums.iter().find(|e| e.name == name)
    }

    /// Foreign-key constraint covering exactly this column, if any.
    pub fn foreign_key_for(&self, table: &str, column: &str) -> Option<&ObservedConstraint> {
        self.constraints.iter().find(|c| {
            c.kind == "FOREIGN KEY" && c.table == table && c.columns.len() == 1 && c.columns[0] == column
        })
    }

    /// Single-column check constraint for this column, if any.
    pub fn check_for(&self, table: &str, column: &str) -> Option<&ObservedConstraint> {
        self.constraints.iter().find(|c| {
            c.kind == "CHECK"
                && c.table == table
                && (c.columns.iter().any(|col| col == column)
                    || c.check_clause
                        .as_deref()
                        .map(|clause| clause.contains(column))
                        .unwrap_or(false))
        })
    }
}

impl ObservedColumn {
    /// Effective nullability. Primary-key columns are non-nullable even
    /// if the catalog reports otherwise.
    pub fn nullable(&self) -> bool {
        !self.is_primary_key && self.is_nullable.eq_ignore_ascii_case("YES")
    }

    /// The normalized type family used for comparison.
    pub fn comparable_type(&self) -> String {
        // Serial normalization: integer with a sequence default
        if self.is_auto_increment || has_nextval_default(self.column_default.as_deref()) {
            match normalize_type_name(&self.data_type).as_str() {
                "integer" => return "serial".to_string(),
                "bigint" => return "bigserial".to_string(),
                _ => {}
            }
        }

        // UDT name wins for user-defined types (PostgreSQL enum columns)
        if self.data_type.eq_ignore_ascii_case("USER-DEFINED") {
            if let Some(udt) = &self.udt_name {
                return udt.to_lowercase();
            }
        }

        // MySQL inline enum: reconstruct the synthetic type name
        if self.data_type.eq_ignore_ascii_case("enum") {
            if let Some(raw) = &self.column_type {
                let values = parse_inline_enum_values(raw);
                if !values.is_empty() {
                    return crate::desired::synthetic_enum_name(&values);
                }
            }
        }

        // The raw column type (MySQL) carries length/width detail the
        // generic data_type lacks
        let source = self.column_type.as_deref().unwrap_or(&self.data_type);
        let base = normalize_type_name(source);
        match base.as_str() {
            "varchar" | "char" => match self.character_max_length {
                Some(n) => format!("{}({})", base, n),
                None => base,
            },
            "decimal" => match (self.numeric_precision, self.numeric_scale) {
                (Some(p), Some(s)) => format!("decimal({},{})", p, s),
                (Some(p), None) => format!("decimal({})", p),
                _ => base,
            },
            _ => base,
        }
    }

    /// The normalized default used for comparison. Sequence defaults on
    /// auto-increment columns are ignored.
    pub fn comparable_default(&self) -> Option<String> {
        if self.is_auto_increment || has_nextval_default(self.column_default.as_deref()) {
            return None;
        }
        normalize_default(self.column_default.as_deref())
    }
}

/// Whether a raw default expression draws from a sequence.
pub fn has_nextval_default(default: Option<&str>) -> bool {
    default
        .map(|d| d.trim_start().to_lowercase().starts_with("nextval("))
        .unwrap_or(false)
}

/// Collapse a raw SQL type name to its comparable family.
///
/// Parenthesized parameters present in the raw text are preserved;
/// catalog-supplied lengths are appended by the caller.
pub fn normalize_type_name(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let (base, params) = match lowered.find('(') {
        Some(pos) => (
            lowered[..pos].trim().to_string(),
            Some(lowered[pos..].replace(' ', "")),
        ),
        None => (lowered.clone(), None),
    };
    // MySQL width/sign noise
    let base = base
        .strip_suffix(" unsigned")
        .unwrap_or(&base)
        .trim()
        .to_string();
    let params = params.map(|p| p.replace("unsigned", ""));

    let family = match base.as_str() {
        "character varying" | "varchar" => "varchar",
        "character" | "char" | "bpchar" => "char",
        "int" | "integer" | "int4" | "mediumint" => "integer",
        "bigint" | "int8" => "bigint",
        "smallint" | "int2" => "smallint",
        "serial" | "serial4" => "serial",
        "bigserial" | "serial8" => "bigserial",
        "timestamp" | "timestamp without time zone" | "timestamp with time zone" | "timestamptz"
        | "datetime" => "timestamp",
        "date" => "date",
        "time" | "time without time zone" => "time",
        "boolean" | "bool" => "boolean",
        "tinyint" if params.as_deref() == Some("(1)") => "boolean",
        "json" | "jsonb" => "json",
        "text" | "tinytext" | "mediumtext" | "longtext" => "text",
        "bytea" | "blob" | "longblob" | "mediumblob" | "varbinary" => "binary",
        "numeric" | "decimal" => "decimal",
        "double precision" | "double" | "float8" => "double",
        "real" | "float4" => "real",
        "uuid" => "uuid",
        other => other,
    };

    match (family, params) {
        // Length on these families is noise (tinyint(1) already mapped,
        // int(11) display width is a MySQL-ism)
        ("integer" | "bigint" | "smallint" | "boolean" | "serial" | "bigserial", _) => {
            family.to_string()
        }
        (_, Some(params)) => format!("{}{}", family, params),
        (_, None) => family.to_string(),
    }
}

/// Normalize a raw column default into its comparable form.
///
/// Strips PostgreSQL casts (`'active'::status_enum` -> `active`), unifies
/// `now()` with `CURRENT_TIMESTAMP`, and treats NULL defaults as absent.
pub fn normalize_default(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
        return None;
    }

    // Drop a trailing ::type cast
    let uncast = match raw.find("::") {
        Some(pos) => raw[..pos].trim(),
        None => raw,
    };

    if uncast.eq_ignore_ascii_case("now()") || uncast.eq_ignore_ascii_case("current_timestamp")
        || uncast.eq_ignore_ascii_case("current_timestamp()")
    {
        return Some("CURRENT_TIMESTAMP".to_string());
    }

    // Unwrap a single level of quoting
    if uncast.len() >= 2 && uncast.starts_with('\'') && uncast.ends_with('\'') {
        return Some(uncast[1..uncast.len() - 1].replace("''", "'"));
    }

    Some(uncast.to_string())
}

/// Parse the value list out of a raw `enum('a','b')` column type.
pub fn parse_inline_enum_values(raw: &str) -> Vec<String> {
    let lowered = raw.trim();
    let Some(open) = lowered.find('(') else {
        return Vec::new();
    };
    let Some(close) = lowered.rfind(')') else {
        return Vec::new();
    };
    let inner = &lowered[open + 1..close];

    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_quote => in_quote = true,
            '\'' if in_quote => {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    current.push('\'');
                } else {
                    in_quote = false;
                    values.push(std::mem::take(&mut current));
                }
            }
            _ if in_quote => current.push(c),
            _ => {}
        }
    }
    values
}
