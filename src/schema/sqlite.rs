// SPDX-License-Identifier: Apache-2.0

//! SQLite introspector. Grounded on
//! `engine/drivers/sqlite.rs::describe_table` (`PRAGMA table_info`,
//! `PRAGMA foreign_key_list`).

use super::{clean_data_type, SchemaIntrospector};
use crate::error::{CoreError, CoreResult};
use crate::model::{Column, ForeignKey};
use async_trait::async_trait;
use sqlx::SqlitePool;

pub struct SqliteIntrospector {
    pool: SqlitePool,
}

impl SqliteIntrospector {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn quote_ident(ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

#[async_trait]
impl SchemaIntrospector for SqliteIntrospector {
    async fn list_tables(&self) -> CoreResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::schema_introspection(e.to_string()))?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn get_columns(&self, table: &str) -> CoreResult<Vec<Column>> {
        let pragma = format!("PRAGMA table_info({})", Self::quote_ident(table));
        let rows: Vec<(i64, String, String, i64, Option<String>, i64)> = sqlx::query_as(&pragma)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::schema_introspection(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(_cid, name, data_type, notnull, _dflt, _pk)| Column {
                name,
                data_type: clean_data_type(&data_type),
                nullable: notnull == 0,
            })
            .collect())
    }

    async fn get_primary_key(&self, table: &str) -> CoreResult<Option<String>> {
        let pragma = format!("PRAGMA table_info({})", Self::quote_ident(table));
        let rows: Vec<(i64, String, String, i64, Option<String>, i64)> = sqlx::query_as(&pragma)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::schema_introspection(e.to_string()))?;

        let pk_columns: Vec<String> = rows
            .into_iter()
            .filter(|(_, _, _, _, _, pk)| *pk > 0)
            .map(|(_, name, ..)| name)
            .collect();

        // Only single-column PKs are retained (spec §3/§4.1).
        Ok(match pk_columns.len() {
            1 => Some(pk_columns.into_iter().next().unwrap()),
            _ => None,
        })
    }

    async fn get_foreign_keys(&self, table: &str) -> CoreResult<Vec<ForeignKey>> {
        let pragma = format!("PRAGMA foreign_key_list({})", Self::quote_ident(table));
        let rows: Vec<(i64, i64, String, String, String, String, String, String)> =
            sqlx::query_as(&pragma)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| CoreError::schema_introspection(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(_id, _seq, ref_table, from_col, to_col, ..)| ForeignKey {
                fk_column: from_col,
                pk_table: ref_table,
                pk_column: if to_col.is_empty() { None } else { Some(to_col) },
                inferred: false,
                confidence: None,
            })
            .collect())
    }
}
