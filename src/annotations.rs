//! Parse `migrator:*` comment directives from source files.
//!
//! Directives are structured comments attached to record-type
//! declarations:
//!
//! ```text
//! // migrator:schema:table name="users"
//! struct User {
//!     // migrator:schema:field name="id" type="SERIAL" primary="true"
//!     // migrator:schema:field name="email" type="VARCHAR(255)" not_null="true" unique="true"
//! }
//! ```
//!
//! Recognized kinds: `schema:table`, `schema:field`, `schema:index`,
//! `schema:enum`, `embedded`. Unknown keys are ignored with a warning;
//! malformed directives fail with file/line context.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex_lite::Regex;

use crate::desired::{
    synthetic_enum_name, DesiredSchema, EmbedMode, EmbeddedField, EnumType, Field, Index,
    PlatformOverride, PlatformOverrides, Table,
};
use crate::error::{PtahError, Result};

const DIRECTIVE_PREFIX: &str = "migrator:";

static RECORD_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Matches Rust/Go/generic record declarations: `struct User`,
    // `type Location struct`, `class Commodity`.
    Regex::new(r"\b(?:struct|class|type)\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap()
});

static FOREIGN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\(([A-Za-z_][A-Za-z0-9_]*)\)$").unwrap());

/// Parse every source file under `dir` into a [`DesiredSchema`].
///
/// Files are visited in sorted path order so output is deterministic.
/// Non-UTF-8 files are skipped.
pub fn parse_directory(dir: &Path) -> Result<DesiredSchema> {
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();

    let mut sources = Vec::with_capacity(files.len());
    for path in &files {
        match std::fs::read_to_string(path) {
            Ok(content) => sources.push((path.display().to_string(), content)),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                log::debug!("Skipping non-text file; file={}", path.display());
            }
            Err(e) => return Err(e.into()),
        }
    }

    parse_sources(&sources)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Parse a set of `(file name, content)` pairs into a [`DesiredSchema`].
///
/// Two passes: named enums (`schema:enum`) are collected first so field
/// directives can reference them regardless of file order.
pub fn parse_sources(sources: &[(String, String)]) -> Result<DesiredSchema> {
    let mut parser = Parser::default();

    for (file, content) in sources {
        parser.collect_enums(file, content)?;
    }
    for (file, content) in sources {
        parser.parse_file(file, content)?;
    }

    parser.finish()
}

/// One parsed directive line.
struct Directive {
    kind: String,
    pairs: Vec<(String, String)>,
    file: String,
    line: usize,
}

impl Directive {
    fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| PtahError::DirectiveSyntax {
            file: self.file.clone(),
            line: self.line,
            detail: format!("missing required key '{}'", key),
        })
    }

    fn get_bool(&self, key: &str) -> Result<bool> {
        match self.get(key) {
            None => Ok(false),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(PtahError::DirectiveSyntax {
                file: self.file.clone(),
                line: self.line,
                detail: format!("key '{}' must be \"true\" or \"false\", got \"{}\"", key, other),
            }),
        }
    }

    fn syntax_error(&self, detail: impl Into<String>) -> PtahError {
        PtahError::DirectiveSyntax {
            file: self.file.clone(),
            line: self.line,
            detail: detail.into(),
        }
    }

    /// Extract `platform.<dialect>.<attribute>` keys into an override map.
    fn platform_overrides(&self) -> PlatformOverrides {
        let mut overrides: PlatformOverrides = BTreeMap::new();
        for (key, value) in &self.pairs {
            let Some(rest) = key.strip_prefix("platform.") else {
                continue;
            };
            let Some((dialect, attribute)) = rest.split_once('.') else {
                log::warn!(
                    "Ignoring malformed platform key '{}' at {}:{}",
                    key,
                    self.file,
                    self.line
                );
                continue;
            };
            if !matches!(dialect, "postgres" | "mysql" | "mariadb") {
                log::warn!(
                    "Ignoring platform key for unknown dialect '{}' at {}:{}",
                    dialect,
                    self.file,
                    self.line
                );
                continue;
            }
            let entry: &mut PlatformOverride = overrides.entry(dialect.to_string()).or_default();
            match attribute {
                "name" => entry.name = Some(value.clone()),
                "type" => entry.type_name = Some(value.clone()),
                "comment" => entry.comment = Some(value.clone()),
                "options" => entry.options = Some(value.clone()),
                other => {
                    log::warn!(
                        "Ignoring unknown platform attribute '{}' at {}:{}",
                        other,
                        self.file,
                        self.line
                    );
                }
            }
        }
        overrides
    }

    /// Warn about keys outside the expected set for this directive kind.
    fn warn_unknown_keys(&self, known: &[&str]) {
        for (key, _) in &self.pairs {
            if key.starts_with("platform.") {
                continue;
            }
            if !known.contains(&key.as_str()) {
                log::warn!(
                    "Ignoring unknown key '{}' on {}{} at {}:{}",
                    key,
                    DIRECTIVE_PREFIX,
                    self.kind,
                    self.file,
                    self.line
                );
            }
        }
    }
}

#[derive(Default)]
struct Parser {
    schema: DesiredSchema,
    /// Record type most recently declared; field/embedded directives
    /// attach here.
    current_struct: Option<String>,
    /// A table directive waiting for its record declaration.
    pending_table: Option<Directive>,
}

impl Parser {
    /// First pass: collect `schema:enum` declarations.
    fn collect_enums(&mut self, file: &str, content: &str) -> Result<()> {
        for (line_no, line) in content.lines().enumerate() {
            let Some(directive) = parse_directive_line(line, file, line_no + 1)? else {
                continue;
            };
            if directive.kind == "schema:enum" {
                self.handle_enum(&directive)?;
            }
        }
        Ok(())
    }

    /// Second pass: everything except `schema:enum`.
    fn parse_file(&mut self, file: &str, content: &str) -> Result<()> {
        self.current_struct = None;
        self.pending_table = None;

        for (line_no, line) in content.lines().enumerate() {
            if let Some(directive) = parse_directive_line(line, file, line_no + 1)? {
                let kind = directive.kind.clone();
                match kind.as_str() {
                    "schema:table" => {
                        if let Some(stale) = self.pending_table.take() {
                            log::warn!(
                                "Table directive at {}:{} has no record declaration; ignored",
                                stale.file,
                                stale.line
                            );
                        }
                        self.pending_table = Some(directive);
                    }
                    "schema:field" => self.handle_field(&directive)?,
                    "schema:index" => self.handle_index(&directive)?,
                    "schema:enum" => {} // handled in the first pass
                    "embedded" => self.handle_embedded(&directive)?,
                    other => {
                        return Err(PtahError::UnknownKind {
                            file: directive.file.clone(),
                            line: directive.line,
                            kind: other.to_string(),
                        });
                    }
                }
                continue;
            }

            // Non-directive line: a record declaration binds any pending
            // table directive and becomes the attachment context.
            if is_comment_line(line) {
                continue;
            }
            if let Some(caps) = RECORD_DECL_RE.captures(line) {
                let struct_name = caps.get(1).map(|m| m.as_str().to_string());
                self.current_struct = struct_name.clone();
                if let Some(directive) = self.pending_table.take() {
                    self.handle_table(&directive, struct_name.as_deref())?;
                }
            }
        }

        if let Some(stale) = self.pending_table.take() {
            log::warn!(
                "Table directive at {}:{} has no record declaration; ignored",
                stale.file,
                stale.line
            );
        }
        Ok(())
    }

    fn handle_table(&mut self, directive: &Directive, struct_name: Option<&str>) -> Result<()> {
        directive.warn_unknown_keys(&["name", "comment"]);
        let name = directive.require("name")?;
        let struct_name = match struct_name {
            Some(s) => s.to_string(),
            None => return Ok(()),
        };
        if self.schema.table_by_name(name).is_some() {
            return Err(PtahError::DuplicateTable {
                name: name.to_string(),
            });
        }
        self.schema.tables.push(Table {
            struct_name,
            name: name.to_string(),
            comment: directive.get("comment").map(String::from),
            platform_overrides: directive.platform_overrides(),
        });
        Ok(())
    }

    fn handle_field(&mut self, directive: &Directive) -> Result<()> {
        directive.warn_unknown_keys(&[
            "name",
            "type",
            "primary",
            "not_null",
            "unique",
            "default",
            "default_fn",
            "enum",
            "foreign",
            "foreign_key_name",
            "check",
            "on_delete",
            "on_update",
        ]);

        let owner = self
            .current_struct
            .clone()
            .ok_or_else(|| directive.syntax_error("field directive outside a record declaration"))?;
        let name = directive.require("name")?.to_string();
        let sql_type = directive.require("type")?.to_string();

        if self
            .schema
            .fields
            .iter()
            .any(|f| f.owner_struct_name == owner && f.column_name == name)
        {
            return Err(PtahError::DuplicateField {
                table: owner,
                column: name,
            });
        }

        let enum_ref = match directive.get("enum") {
            Some(spec) => Some(self.resolve_enum_ref(directive, spec)?),
            None => {
                if sql_type.eq_ignore_ascii_case("enum") {
                    return Err(directive.syntax_error("ENUM type requires an enum=\"...\" key"));
                }
                None
            }
        };

        let (foreign_table, foreign_column) = match directive.get("foreign") {
            Some(spec) => {
                let caps = FOREIGN_RE.captures(spec).ok_or_else(|| {
                    directive
                        .syntax_error(format!("foreign must be \"table(column)\", got \"{}\"", spec))
                })?;
                (
                    Some(caps.get(1).unwrap().as_str().to_string()),
                    Some(caps.get(2).unwrap().as_str().to_string()),
                )
            }
            None => (None, None),
        };

        self.schema.fields.push(Field {
            owner_struct_name: owner,
            field_name: name.clone(),
            column_name: name,
            sql_type,
            nullable: !directive.get_bool("not_null")? && !directive.get_bool("primary")?,
            primary: directive.get_bool("primary")?,
            auto_increment: directive
                .get("type")
                .map(|t| t.eq_ignore_ascii_case("serial") || t.eq_ignore_ascii_case("bigserial"))
                .unwrap_or(false),
            unique: directive.get_bool("unique")?,
            default_literal: directive.get("default").map(String::from),
            default_expression: directive.get("default_fn").map(String::from),
            check_expression: directive.get("check").map(String::from),
            foreign_table,
            foreign_column,
            foreign_key_name: directive.get("foreign_key_name").map(String::from),
            on_delete: directive.get("on_delete").map(String::from),
            on_update: directive.get("on_update").map(String::from),
            enum_ref,
            platform_overrides: directive.platform_overrides(),
        });
        Ok(())
    }

    /// Resolve the `enum="..."` key on a field.
    ///
    /// A comma-separated value is an anonymous enum, deduplicated per
    /// distinct ordered value set and named deterministically. A bare
    /// name references a declared enum; a bare value with no matching
    /// declaration is treated as a single-value anonymous enum.
    fn resolve_enum_ref(&mut self, directive: &Directive, spec: &str) -> Result<String> {
        if !spec.contains(',') && self.schema.enum_by_name(spec).is_some() {
            return Ok(spec.to_string());
        }

        let values: Vec<String> = spec
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            return Err(directive.syntax_error("enum value list is empty"));
        }
        let name = synthetic_enum_name(&values);
        match self.schema.enum_by_name(&name) {
            Some(existing) if existing.values == values => {}
            Some(_) => {
                return Err(PtahError::EnumValueConflict { name });
            }
            None => {
                self.schema.enums.push(EnumType {
                    name: name.clone(),
                    values,
                });
            }
        }
        Ok(name)
    }

    fn handle_enum(&mut self, directive: &Directive) -> Result<()> {
        directive.warn_unknown_keys(&["name", "values"]);
        let name = directive.require("name")?.to_string();
        let values: Vec<String> = directive
            .require("values")?
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            return Err(directive.syntax_error("enum value list is empty"));
        }
        match self.schema.enum_by_name(&name) {
            Some(existing) if existing.values == values => Ok(()),
            Some(_) => Err(PtahError::EnumValueConflict { name }),
            None => {
                self.schema.enums.push(EnumType { name, values });
                Ok(())
            }
        }
    }

    fn handle_index(&mut self, directive: &Directive) -> Result<()> {
        directive.warn_unknown_keys(&["table", "name", "columns", "unique", "condition", "method"]);
        let table = directive.require("table")?.to_string();
        let name = directive.require("name")?.to_string();
        let columns: Vec<String> = directive
            .require("columns")?
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if columns.is_empty() {
            return Err(directive.syntax_error("index column list is empty"));
        }
        if self.schema.indexes.iter().any(|i| i.name == name) {
            return Err(directive.syntax_error(format!("duplicate index name '{}'", name)));
        }
        self.schema.indexes.push(Index {
            owner_struct_name: String::new(), // resolved in finish()
            table,
            name,
            columns,
            unique: directive.get_bool("unique")?,
            condition: directive.get("condition").map(String::from),
            method: directive.get("method").map(String::from),
            platform_overrides: directive.platform_overrides(),
        });
        Ok(())
    }

    fn handle_embedded(&mut self, directive: &Directive) -> Result<()> {
        directive.warn_unknown_keys(&["mode", "prefix", "type_name", "type", "index"]);
        let owner = self.current_struct.clone().ok_or_else(|| {
            directive.syntax_error("embedded directive outside a record declaration")
        })?;
        let mode = match directive.require("mode")? {
            "inline" => EmbedMode::Inline,
            "json" => EmbedMode::Json,
            "relation" => EmbedMode::Relation,
            other => {
                return Err(directive.syntax_error(format!(
                    "mode must be inline, json, or relation, got \"{}\"",
                    other
                )));
            }
        };
        self.schema.embedded_fields.push(EmbeddedField {
            owner_struct_name: owner,
            mode,
            embedded_type_name: directive.require("type_name")?.to_string(),
            prefix: directive.get("prefix").map(String::from),
            index: directive.get_bool("index")?,
            type_override: directive.get("type").map(String::from),
        });
        Ok(())
    }

    /// Final resolution: index owners, json-embed indexes, dependencies.
    fn finish(mut self) -> Result<DesiredSchema> {
        for i in 0..self.schema.indexes.len() {
            let table = self.schema.indexes[i].table.clone();
            let owner = self
                .schema
                .table_by_name(&table)
                .map(|t| t.struct_name.clone());
            if let Some(owner) = owner {
                self.schema.indexes[i].owner_struct_name = owner;
            }
        }

        // Indexed json embeds become GIN indexes on the generated column.
        let mut generated = Vec::new();
        for embed in &self.schema.embedded_fields {
            if embed.mode != EmbedMode::Json || !embed.index {
                continue;
            }
            let Some(table) = self.schema.table_by_struct(&embed.owner_struct_name) else {
                continue;
            };
            let column = embed
                .prefix
                .clone()
                .unwrap_or_else(|| crate::desired::snake_case(&embed.embedded_type_name));
            let name = format!("idx_{}_{}", table.name, column);
            if self.schema.indexes.iter().any(|i| i.name == name) {
                continue;
            }
            generated.push(Index {
                owner_struct_name: table.struct_name.clone(),
                table: table.name.clone(),
                name,
                columns: vec![column],
                unique: false,
                condition: None,
                method: Some("gin".to_string()),
                platform_overrides: PlatformOverrides::new(),
            });
        }
        self.schema.indexes.extend(generated);

        self.schema.rebuild_dependencies();
        Ok(self.schema)
    }
}

/// Check if a line is a comment (and thus never a record declaration).
fn is_comment_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("//") || trimmed.starts_with("--") || trimmed.starts_with('#')
        || trimmed.starts_with('*')
}

/// Parse one line into a directive, if it carries one.
fn parse_directive_line(line: &str, file: &str, line_no: usize) -> Result<Option<Directive>> {
    let mut rest = line.trim_start();
    let mut in_comment = false;
    for marker in ["///", "//", "--", "#", "*"] {
        if let Some(stripped) = rest.strip_prefix(marker) {
            rest = stripped.trim_start();
            in_comment = true;
            break;
        }
    }
    if !in_comment {
        return Ok(None);
    }
    let Some(body) = rest.strip_prefix(DIRECTIVE_PREFIX) else {
        return Ok(None);
    };

    let (kind, args) = match body.find(char::is_whitespace) {
        Some(pos) => (&body[..pos], body[pos..].trim_start()),
        None => (body, ""),
    };
    if kind.is_empty() {
        return Err(PtahError::DirectiveSyntax {
            file: file.to_string(),
            line: line_no,
            detail: "missing directive kind".to_string(),
        });
    }

    let pairs = parse_pairs(args, file, line_no)?;
    Ok(Some(Directive {
        kind: kind.to_string(),
        pairs,
        file: file.to_string(),
        line: line_no,
    }))
}

/// Parse `key="value"` pairs, rejecting anything else on the line.
fn parse_pairs(args: &str, file: &str, line_no: usize) -> Result<Vec<(String, String)>> {
    let syntax_err = |detail: String| PtahError::DirectiveSyntax {
        file: file.to_string(),
        line: line_no,
        detail,
    };

    let mut pairs = Vec::new();
    let mut chars = args.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        // Key
        let mut end = start;
        while let Some(&(i, c)) = chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                end = i + c.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let key = &args[start..end];
        if key.is_empty() {
            return Err(syntax_err(format!(
                "unexpected character '{}' (expected key=\"value\")",
                c
            )));
        }
        match chars.next() {
            Some((_, '=')) => {}
            _ => return Err(syntax_err(format!("key '{}' is missing '='", key))),
        }
        match chars.next() {
            Some((_, '"')) => {}
            _ => return Err(syntax_err(format!("value for '{}' must be double-quoted", key))),
        }
        let value_start = chars.peek().map(|&(i, _)| i).unwrap_or(args.len());
        let mut value_end = None;
        for (i, c) in chars.by_ref() {
            if c == '"' {
                value_end = Some(i);
                break;
            }
        }
        let Some(value_end) = value_end else {
            return Err(syntax_err(format!("unterminated value for '{}'", key)));
        };
        pairs.push((key.to_string(), args[value_start..value_end].to_string()));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(content: &str) -> Result<DesiredSchema> {
        parse_sources(&[("models.rs".to_string(), content.to_string())])
    }

    #[test]
    fn test_parse_table_and_fields() {
        let schema = parse_one(
            r#"
// migrator:schema:table name="users" comment="Application users"
struct User {
    // migrator:schema:field name="id" type="SERIAL" primary="true"
    // migrator:schema:field name="email" type="VARCHAR(255)" not_null="true" unique="true"
}
"#,
        )
        .unwrap();
        assert_eq!(schema.tables.len(), 1);
        assert_eq!(schema.tables[0].name, "users");
        assert_eq!(schema.tables[0].struct_name, "User");
        assert_eq!(schema.tables[0].comment.as_deref(), Some("Application users"));

        assert_eq!(schema.fields.len(), 2);
        let id = &schema.fields[0];
        assert!(id.primary);
        assert!(id.auto_increment);
        assert!(!id.nullable);
        let email = &schema.fields[1];
        assert!(!email.nullable);
        assert!(email.unique);
        assert_eq!(email.sql_type, "VARCHAR(255)");
    }

    #[test]
    fn test_go_style_declaration_and_comments() {
        let schema = parse_one(
            r#"
-- migrator:schema:table name="locations"
type Location struct {
    -- migrator:schema:field name="id" type="SERIAL" primary="true"
}
"#,
        )
        .unwrap();
        assert_eq!(schema.tables[0].struct_name, "Location");
        assert_eq!(schema.fields.len(), 1);
    }

    #[test]
    fn test_table_without_declaration_is_dropped() {
        let schema = parse_one("// migrator:schema:table name=\"ghosts\"\n").unwrap();
        assert!(schema.tables.is_empty());
    }

    #[test]
    fn test_field_outside_record_fails() {
        let err = parse_one("// migrator:schema:field name=\"x\" type=\"TEXT\"\n").unwrap_err();
        assert!(matches!(err, PtahError::DirectiveSyntax { .. }));
    }

    #[test]
    fn test_unknown_kind_fails() {
        let err = parse_one("// migrator:schema:view name=\"v\"\n").unwrap_err();
        match err {
            PtahError::UnknownKind { kind, line, .. } => {
                assert_eq!(kind, "schema:view");
                assert_eq!(line, 1);
            }
            other => panic!("Expected UnknownKind, got {}", other),
        }
    }

    #[test]
    fn test_malformed_pairs_fail_with_location() {
        let err = parse_one("// migrator:schema:table name=users\nstruct User {}\n").unwrap_err();
        match err {
            PtahError::DirectiveSyntax { file, line, .. } => {
                assert_eq!(file, "models.rs");
                assert_eq!(line, 1);
            }
            other => panic!("Expected DirectiveSyntax, got {}", other),
        }
    }

    #[test]
    fn test_unterminated_value_fails() {
        let err = parse_one("// migrator:schema:table name=\"users\nstruct User {}\n").unwrap_err();
        assert!(matches!(err, PtahError::DirectiveSyntax { .. }));
    }

    #[test]
    fn test_duplicate_table_fails() {
        let err = parse_one(
            r#"
// migrator:schema:table name="users"
struct User {}
// migrator:schema:table name="users"
struct UserV2 {}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PtahError::DuplicateTable { .. }));
    }

    #[test]
    fn test_duplicate_field_fails() {
        let err = parse_one(
            r#"
// migrator:schema:table name="users"
struct User {
    // migrator:schema:field name="email" type="TEXT"
    // migrator:schema:field name="email" type="VARCHAR(100)"
}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PtahError::DuplicateField { .. }));
    }

    #[test]
    fn test_anonymous_enum_dedup() {
        let schema = parse_one(
            r#"
// migrator:schema:table name="commodities"
struct Commodity {
    // migrator:schema:field name="status" type="ENUM" enum="draft,published"
    // migrator:schema:field name="state" type="ENUM" enum="draft,published"
}
"#,
        )
        .unwrap();
        // Same value set collapses to one enum
        assert_eq!(schema.enums.len(), 1);
        assert_eq!(schema.enums[0].values, vec!["draft", "published"]);
        assert_eq!(
            schema.fields[0].enum_ref.as_deref(),
            schema.fields[1].enum_ref.as_deref()
        );
    }

    #[test]
    fn test_named_enum_reference() {
        let schema = parse_one(
            r#"
// migrator:schema:enum name="status_enum" values="active,inactive"
// migrator:schema:table name="users"
struct User {
    // migrator:schema:field name="status" type="ENUM" enum="status_enum" default="active"
}
"#,
        )
        .unwrap();
        assert_eq!(schema.enums.len(), 1);
        assert_eq!(schema.enums[0].name, "status_enum");
        assert_eq!(schema.fields[0].enum_ref.as_deref(), Some("status_enum"));
        assert_eq!(schema.fields[0].default_literal.as_deref(), Some("active"));
    }

    #[test]
    fn test_named_enum_resolves_across_files() {
        // The enum declaration comes later in file order than the reference
        let schema = parse_sources(&[
            (
                "a_users.rs".to_string(),
                r#"
// migrator:schema:table name="users"
struct User {
    // migrator:schema:field name="status" type="ENUM" enum="status_enum"
}
"#
                .to_string(),
            ),
            (
                "z_enums.rs".to_string(),
                "// migrator:schema:enum name=\"status_enum\" values=\"active,inactive\"\n"
                    .to_string(),
            ),
        ])
        .unwrap();
        assert_eq!(schema.fields[0].enum_ref.as_deref(), Some("status_enum"));
    }

    #[test]
    fn test_enum_value_conflict() {
        let err = parse_one(
            "// migrator:schema:enum name=\"st\" values=\"a,b\"\n// migrator:schema:enum name=\"st\" values=\"a,c\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, PtahError::EnumValueConflict { .. }));
    }

    #[test]
    fn test_enum_type_without_values_fails() {
        let err = parse_one(
            r#"
// migrator:schema:table name="users"
struct User {
    // migrator:schema:field name="status" type="ENUM"
}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PtahError::DirectiveSyntax { .. }));
    }

    #[test]
    fn test_foreign_key_parsing() {
        let schema = parse_one(
            r#"
// migrator:schema:table name="locations"
struct Location {
    // migrator:schema:field name="id" type="SERIAL" primary="true"
}
// migrator:schema:table name="areas"
struct Area {
    // migrator:schema:field name="id" type="SERIAL" primary="true"
    // migrator:schema:field name="location_id" type="INTEGER" not_null="true" foreign="locations(id)" on_delete="CASCADE"
}
"#,
        )
        .unwrap();
        let fk = &schema.fields[2];
        assert_eq!(fk.foreign_table.as_deref(), Some("locations"));
        assert_eq!(fk.foreign_column.as_deref(), Some("id"));
        assert_eq!(fk.on_delete.as_deref(), Some("CASCADE"));
        assert!(schema.dependencies["areas"].contains("locations"));
    }

    #[test]
    fn test_malformed_foreign_fails() {
        let err = parse_one(
            r#"
// migrator:schema:table name="areas"
struct Area {
    // migrator:schema:field name="location_id" type="INTEGER" foreign="locations.id"
}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PtahError::DirectiveSyntax { .. }));
    }

    #[test]
    fn test_index_directive() {
        let schema = parse_one(
            r#"
// migrator:schema:table name="users"
struct User {
    // migrator:schema:field name="email" type="VARCHAR(255)"
}
// migrator:schema:index table="users" name="idx_users_email" columns="email" unique="true"
"#,
        )
        .unwrap();
        assert_eq!(schema.indexes.len(), 1);
        let idx = &schema.indexes[0];
        assert_eq!(idx.table, "users");
        assert_eq!(idx.columns, vec!["email"]);
        assert!(idx.unique);
        assert_eq!(idx.owner_struct_name, "User");
    }

    #[test]
    fn test_duplicate_index_name_fails() {
        let err = parse_one(
            "// migrator:schema:index table=\"a\" name=\"i\" columns=\"x\"\n// migrator:schema:index table=\"b\" name=\"i\" columns=\"y\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, PtahError::DirectiveSyntax { .. }));
    }

    #[test]
    fn test_embedded_inline() {
        let schema = parse_one(
            r#"
// migrator:schema:table name="locations"
struct Location {
    // migrator:schema:field name="id" type="SERIAL" primary="true"
    // migrator:embedded mode="inline" type_name="Address" prefix="addr_"
}
struct Address {
    // migrator:schema:field name="street" type="TEXT"
}
"#,
        )
        .unwrap();
        assert_eq!(schema.embedded_fields.len(), 1);
        let expanded = schema.expand().unwrap();
        let cols: Vec<&str> = expanded[0]
            .columns
            .iter()
            .map(|c| c.column_name.as_str())
            .collect();
        assert_eq!(cols, vec!["id", "addr_street"]);
    }

    #[test]
    fn test_embedded_json_with_index_generates_gin_index() {
        let schema = parse_one(
            r#"
// migrator:schema:table name="commodities"
struct Commodity {
    // migrator:schema:field name="id" type="SERIAL" primary="true"
    // migrator:embedded mode="json" type_name="Attributes" prefix="attrs" index="true"
}
"#,
        )
        .unwrap();
        assert_eq!(schema.indexes.len(), 1);
        let idx = &schema.indexes[0];
        assert_eq!(idx.name, "idx_commodities_attrs");
        assert_eq!(idx.method.as_deref(), Some("gin"));
        assert_eq!(idx.columns, vec!["attrs"]);
    }

    #[test]
    fn test_embedded_bad_mode_fails() {
        let err = parse_one(
            r#"
// migrator:schema:table name="t"
struct T {
    // migrator:embedded mode="flatten" type_name="X"
}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PtahError::DirectiveSyntax { .. }));
    }

    #[test]
    fn test_platform_overrides() {
        let schema = parse_one(
            r#"
// migrator:schema:table name="files" platform.mysql.options="ENGINE=InnoDB" platform.postgres.comment="binary blobs"
struct File {
    // migrator:schema:field name="data" type="TEXT" platform.postgres.type="BYTEA" platform.mysql.type="LONGBLOB"
}
"#,
        )
        .unwrap();
        let t = &schema.tables[0];
        assert_eq!(
            t.platform_overrides["mysql"].options.as_deref(),
            Some("ENGINE=InnoDB")
        );
        let f = &schema.fields[0];
        assert_eq!(
            f.platform_overrides["postgres"].type_name.as_deref(),
            Some("BYTEA")
        );
        assert_eq!(
            f.platform_overrides["mysql"].type_name.as_deref(),
            Some("LONGBLOB")
        );
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        // Unknown keys warn but do not fail
        let schema = parse_one(
            r#"
// migrator:schema:table name="users" color="blue"
struct User {
    // migrator:schema:field name="id" type="SERIAL" primary="true" sparkle="yes"
}
"#,
        )
        .unwrap();
        assert_eq!(schema.tables.len(), 1);
        assert_eq!(schema.fields.len(), 1);
    }

    #[test]
    fn test_bad_bool_fails() {
        let err = parse_one(
            r#"
// migrator:schema:table name="users"
struct User {
    // migrator:schema:field name="id" type="SERIAL" primary="yes"
}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PtahError::DirectiveSyntax { .. }));
    }

    #[test]
    fn test_non_directive_comments_are_ignored() {
        let schema = parse_one(
            r#"
// Regular comment mentioning nothing special
// migrator:schema:table name="users"
struct User {
    // another comment
    // migrator:schema:field name="id" type="SERIAL" primary="true"
}
"#,
        )
        .unwrap();
        assert_eq!(schema.tables.len(), 1);
        assert_eq!(schema.fields.len(), 1);
    }

    #[test]
    fn test_fields_keep_source_order() {
        let schema = parse_one(
            r#"
// migrator:schema:table name="t"
struct T {
    // migrator:schema:field name="zeta" type="TEXT"
    // migrator:schema:field name="alpha" type="TEXT"
    // migrator:schema:field name="mid" type="TEXT"
}
"#,
        )
        .unwrap();
        let names: Vec<&str> = schema.fields.iter().map(|f| f.column_name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_default_fn_expression() {
        let schema = parse_one(
            r#"
// migrator:schema:table name="users"
struct User {
    // migrator:schema:field name="created_at" type="TIMESTAMP" not_null="true" default_fn="CURRENT_TIMESTAMP"
}
"#,
        )
        .unwrap();
        assert_eq!(
            schema.fields[0].default_expression.as_deref(),
            Some("CURRENT_TIMESTAMP")
        );
        assert!(schema.fields[0].default_literal.is_none());
    }
}
