// SPDX-License-Identifier: Apache-2.0

//! Schema Introspector (C1) — spec §4.1.

pub mod sqlite;
pub mod tsql;

use crate::error::{CoreError, CoreResult};
use crate::model::{Column, ForeignKey, Schema, Table};
use async_trait::async_trait;
use regex::Regex;

/// Database interface the introspector is built against (spec §6):
/// `list_tables`, `get_columns`, `get_primary_key`, `get_foreign_keys`,
/// dialect-dispatched by the concrete implementation.
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    async fn list_tables(&self) -> CoreResult<Vec<String>>;
    async fn get_columns(&self, table: &str) -> CoreResult<Vec<Column>>;
    async fn get_primary_key(&self, table: &str) -> CoreResult<Option<String>>;
    async fn get_foreign_keys(&self, table: &str) -> CoreResult<Vec<ForeignKey>>;
}

/// Runs introspection over every base table visible in the default
/// namespace and returns a validated `Schema`.
pub async fn introspect(introspector: &dyn SchemaIntrospector) -> CoreResult<Schema> {
    let table_names = introspector.list_tables().await?;
    let mut tables = Vec::with_capacity(table_names.len());

    for table_name in table_names {
        let columns = introspector.get_columns(&table_name).await?;
        let primary_key = introspector.get_primary_key(&table_name).await?;
        let foreign_keys = introspector.get_foreign_keys(&table_name).await?;

        tables.push(Table {
            table_name,
            columns,
            primary_key,
            foreign_keys,
            metadata: None,
        });
    }

    let schema = Schema { tables };
    validate(&schema)?;
    Ok(schema)
}

/// Strips `COLLATE "…"` / `COLLATE '…'` / `COLLATE <ident>` segments and
/// collapses redundant whitespace (spec §4.1). Three-stage regex pipeline,
/// grounded on `original_source/database/introspection.py::clean_data_type`.
pub fn clean_data_type(data_type: &str) -> String {
    let collate_double_quoted = Regex::new(r#"\s+COLLATE\s+"[^"]+""#).unwrap();
    let collate_single_quoted = Regex::new(r"\s+COLLATE\s+'[^']+'").unwrap();
    let collate_bare = Regex::new(r"\s+COLLATE\s+\S+").unwrap();

    let cleaned = collate_double_quoted.replace_all(data_type, "");
    let cleaned = collate_single_quoted.replace_all(&cleaned, "");
    let cleaned = collate_bare.replace_all(&cleaned, "");

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Validates the structural contract every component downstream of C1
/// depends on. Grounded on
/// `original_source/database/introspection.py::validate_schema_structure`.
pub fn validate(schema: &Schema) -> CoreResult<()> {
    for table in &schema.tables {
        if table.table_name.trim().is_empty() {
            return Err(CoreError::schema_introspection("table missing table_name"));
        }
        if table.columns.is_empty() {
            return Err(CoreError::schema_introspection(format!(
                "table '{}' has no columns",
                table.table_name
            )));
        }
        for column in &table.columns {
            if column.name.trim().is_empty() {
                return Err(CoreError::schema_introspection(format!(
                    "table '{}' has a column missing column_name",
                    table.table_name
                )));
            }
        }
        for fk in &table.foreign_keys {
            if fk.fk_column.trim().is_empty() {
                return Err(CoreError::schema_introspection(format!(
                    "table '{}' has a foreign key missing its constrained column",
                    table.table_name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_collate_double_quoted() {
        assert_eq!(
            clean_data_type(r#"nvarchar(50) COLLATE "SQL_Latin1_General_CP1_CI_AS""#),
            "nvarchar(50)"
        );
    }

    #[test]
    fn strips_collate_bare_ident() {
        assert_eq!(clean_data_type("TEXT COLLATE NOCASE"), "TEXT");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(clean_data_type("varchar(10)   not null"), "varchar(10) not null");
    }

    #[test]
    fn clean_data_type_is_idempotent() {
        let once = clean_data_type(r#"nvarchar(50) COLLATE "X""#);
        let twice = clean_data_type(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn validate_rejects_empty_columns() {
        let schema = Schema {
            tables: vec![Table {
                table_name: "t".to_string(),
                columns: vec![],
                primary_key: None,
                foreign_keys: vec![],
                metadata: None,
            }],
        };
        assert!(validate(&schema).is_err());
    }
}
