//! PostgreSQL introspection via information_schema and pg_catalog.

use std::collections::{BTreeMap, BTreeSet};

use tokio_postgres::Client;

use crate::error::{format_pg_error, PtahError, Result};
use crate::observed::{
    has_nextval_default, ObservedColumn, ObservedConstraint, ObservedEnum, ObservedIndex,
    ObservedSchema, ObservedTable,
};

fn catalog_err(operation: &str) -> impl Fn(tokio_postgres::Error) -> PtahError + '_ {
    move |e| PtahError::CatalogQueryFailure {
        operation: operation.to_string(),
        detail: format_pg_error(&e),
    }
}

/// Read the observed schema from a PostgreSQL database.
///
/// The migration ledger table is excluded from the result.
pub async fn introspect(
    client: &Client,
    schema: &str,
    ledger_table: &str,
) -> Result<ObservedSchema> {
    let constraints = introspect_constraints(client, schema, ledger_table).await?;
    let tables = introspect_tables(client, schema, ledger_table, &constraints).await?;
    let enums = introspect_enums(client, schema).await?;
    let indexes = introspect_indexes(client, schema, ledger_table, &constraints).await?;

    Ok(ObservedSchema {
        tables,
        enums,
        indexes,
        constraints,
    })
}

async fn introspect_tables(
    client: &Client,
    schema: &str,
    ledger_table: &str,
    constraints: &[ObservedConstraint],
) -> Result<Vec<ObservedTable>> {
    // Column sets of primary-key and single-column unique constraints,
    // used to derive the per-column flags
    let mut primary_columns: BTreeSet<(String, String)> = BTreeSet::new();
    let mut unique_columns: BTreeSet<(String, String)> = BTreeSet::new();
    for constraint in constraints {
        match constraint.kind.as_str() {
            "PRIMARY KEY" => {
                for column in &constraint.columns {
                    primary_columns.insert((constraint.table.clone(), column.clone()));
                }
            }
            "UNIQUE" if constraint.columns.len() == 1 => {
                unique_columns.insert((constraint.table.clone(), constraint.columns[0].clone()));
            }
            _ => {}
        }
    }

    let rows = client
        .query(
            "SELECT table_name FROM information_schema.tables
             WHERE table_schema = $1 AND table_type = 'BASE TABLE' AND table_name <> $2
             ORDER BY table_name",
            &[&schema, &ledger_table],
        )
        .await
        .map_err(catalog_err("table listing"))?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in &rows {
        let table_name: String = row.get(0);

        let column_rows = client
            .query(
                "SELECT column_name, data_type, udt_name, is_nullable, column_default,
                        character_maximum_length, numeric_precision, numeric_scale,
                        ordinal_position
                 FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2
                 ORDER BY ordinal_position",
                &[&schema, &table_name],
            )
            .await
            .map_err(catalog_err("column listing"))?;

        let columns = column_rows
            .iter()
            .map(|r| {
                let name: String = r.get(0);
                let column_default: Option<String> = r.get(4);
                let is_primary_key = primary_columns.contains(&(table_name.clone(), name.clone()));
                ObservedColumn {
                    is_auto_increment: has_nextval_default(column_default.as_deref()),
                    is_primary_key,
                    is_unique: unique_columns.contains(&(table_name.clone(), name.clone())),
                    name,
                    data_type: r.get(1),
                    udt_name: r.get::<_, Option<String>>(2),
                    column_type: None,
                    is_nullable: r.get(3),
                    column_default,
                    character_max_length: r.get::<_, Option<i32>>(5).map(i64::from),
                    numeric_precision: r.get::<_, Option<i32>>(6).map(i64::from),
                    numeric_scale: r.get::<_, Option<i32>>(7).map(i64::from),
                    ordinal_position: r.get(8),
                }
            })
            .collect();

        tables.push(ObservedTable {
            name: table_name,
            columns,
        });
    }

    Ok(tables)
}

async fn introspect_enums(client: &Client, schema: &str) -> Result<Vec<ObservedEnum>> {
    let rows = client
        .query(
            "SELECT t.typname, array_agg(e.enumlabel ORDER BY e.enumsortorder)::text[]
             FROM pg_type t
             JOIN pg_enum e ON e.enumtypid = t.oid
             JOIN pg_namespace n ON n.oid = t.typnamespace
             WHERE n.nspname = $1
             GROUP BY t.typname
             ORDER BY t.typname",
            &[&schema],
        )
        .await
        .map_err(catalog_err("enum listing"))?;

    Ok(rows
        .iter()
        .map(|r| ObservedEnum {
            name: r.get(0),
            values: r.get(1),
        })
        .collect())
}

async fn introspect_constraints(
    client: &Client,
    schema: &str,
    ledger_table: &str,
) -> Result<Vec<ObservedConstraint>> {
    // Key constraints with their columns
    let rows = client
        .query(
            "SELECT tc.constraint_name, tc.table_name, tc.constraint_type, kcu.column_name
             FROM information_schema.table_constraints tc
             LEFT JOIN information_schema.key_column_usage kcu
               ON kcu.constraint_name = tc.constraint_name
              AND kcu.constraint_schema = tc.constraint_schema
             WHERE tc.table_schema = $1
               AND tc.table_name <> $2
               AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE', 'FOREIGN KEY')
             ORDER BY tc.table_name, tc.constraint_name, kcu.ordinal_position",
            &[&schema, &ledger_table],
        )
        .await
        .map_err(catalog_err("constraint listing"))?;

    let mut by_name: BTreeMap<String, ObservedConstraint> = BTreeMap::new();
    for row in &rows {
        let name: String = row.get(0);
        let entry = by_name.entry(name.clone()).or_insert_with(|| ObservedConstraint {
            name,
            table: row.get(1),
            kind: row.get(2),
            columns: Vec::new(),
            foreign_table: None,
            foreign_columns: Vec::new(),
            on_delete: None,
            on_update: None,
            check_clause: None,
        });
        if let Some(column) = row.get::<_, Option<String>>(3) {
            entry.columns.push(column);
        }
    }

    // Foreign key targets and rules
    let fk_rows = client
        .query(
            "SELECT rc.constraint_name, rc.delete_rule, rc.update_rule,
                    kcu.table_name, kcu.column_name
             FROM information_schema.referential_constraints rc
             JOIN information_schema.key_column_usage kcu
               ON kcu.constraint_name = rc.unique_constraint_name
              AND kcu.constraint_schema = rc.unique_constraint_schema
             WHERE rc.constraint_schema = $1
             ORDER BY rc.constraint_name, kcu.ordinal_position",
            &[&schema],
        )
        .await
        .map_err(catalog_err("foreign key listing"))?;

    for row in &fk_rows {
        let name: String = row.get(0);
        if let Some(constraint) = by_name.get_mut(&name) {
            constraint.on_delete = Some(row.get(1));
            constraint.on_update = Some(row.get(2));
            constraint.foreign_table = Some(row.get(3));
            constraint.foreign_columns.push(row.get(4));
        }
    }

    // Check constraints; the catalog also lists generated IS NOT NULL
    // checks, which are nullability rather than real check constraints
    let check_rows = client
        .query(
            "SELECT cc.constraint_name, tc.table_name, cc.check_clause
             FROM information_schema.check_constraints cc
             JOIN information_schema.table_constraints tc
               ON tc.constraint_name = cc.constraint_name
              AND tc.constraint_schema = cc.constraint_schema
             WHERE cc.constraint_schema = $1 AND tc.table_name <> $2
             ORDER BY cc.constraint_name",
            &[&schema, &ledger_table],
        )
        .await
        .map_err(catalog_err("check constraint listing"))?;

    let mut constraints: Vec<ObservedConstraint> = by_name.into_values().collect();
    for row in &check_rows {
        let clause: String = row.get(2);
        if clause.to_uppercase().ends_with("IS NOT NULL") {
            continue;
        }
        constraints.push(ObservedConstraint {
            name: row.get(0),
            table: row.get(1),
            kind: "CHECK".to_string(),
            columns: Vec::new(),
            foreign_table: None,
            foreign_columns: Vec::new(),
            on_delete: None,
            on_update: None,
            check_clause: Some(clause),
        });
    }

    Ok(constraints)
}

async fn introspect_indexes(
    client: &Client,
    schema: &str,
    ledger_table: &str,
    constraints: &[ObservedConstraint],
) -> Result<Vec<ObservedIndex>> {
    let constraint_names: BTreeSet<&str> = constraints.iter().map(|c| c.name.as_str()).collect();

    let rows = client
        .query(
            "SELECT indexname, tablename, indexdef
             FROM pg_indexes
             WHERE schemaname = $1 AND tablename <> $2
             ORDER BY indexname",
            &[&schema, &ledger_table],
        )
        .await
        .map_err(catalog_err("index listing"))?;

    Ok(rows
        .iter()
        .map(|r| {
            let name: String = r.get(0);
            let definition: String = r.get(2);
            ObservedIndex {
                backs_constraint: constraint_names.contains(name.as_str()),
                columns: parse_index_columns(&definition),
                unique: definition.to_uppercase().contains("UNIQUE INDEX"),
                name,
                table: r.get(1),
                definition: Some(definition),
            }
        })
        .collect())
}

/// Pull the column list out of a pg_indexes definition string.
fn parse_index_columns(definition: &str) -> Vec<String> {
    let Some(open) = definition.find('(') else {
        return Vec::new();
    };
    let Some(close) = definition.rfind(')') else {
        return Vec::new();
    };
    definition[open + 1..close]
        .split(',')
        .map(|c| c.trim().trim_matches('"').to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index_columns() {
        assert_eq!(
            parse_index_columns("CREATE INDEX idx_users_email ON public.users USING btree (email)"),
            vec!["email"]
        );
        assert_eq!(
            parse_index_columns(
                "CREATE UNIQUE INDEX u ON public.t USING btree (a, \"B\")"
            ),
            vec!["a", "B"]
        );
        assert!(parse_index_columns("garbage").is_empty());
    }
}
