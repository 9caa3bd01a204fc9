// SPDX-License-Identifier: Apache-2.0

//! SQL Server introspector. Grounded on
//! `engine/drivers/sqlserver.rs::describe_table` (`INFORMATION_SCHEMA`
//! joins for columns and foreign keys, `pg`-style PK lookup adapted to
//! `sys.key_constraints`/`sys.index_columns` for tsql).

use super::{clean_data_type, SchemaIntrospector};
use crate::error::{CoreError, CoreResult};
use crate::model::{Column, ForeignKey};
use async_trait::async_trait;
use tokio::sync::Mutex;

pub struct TSqlIntrospector {
    client: Mutex<tiberius::Client<tokio_util::compat::Compat<tokio::net::TcpStream>>>,
}

impl TSqlIntrospector {
    pub fn new(
        client: tiberius::Client<tokio_util::compat::Compat<tokio::net::TcpStream>>,
    ) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }
}

#[async_trait]
impl SchemaIntrospector for TSqlIntrospector {
    async fn list_tables(&self) -> CoreResult<Vec<String>> {
        let mut client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
                &[],
            )
            .await
            .map_err(|e| CoreError::schema_introspection(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| CoreError::schema_introspection(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.get::<&str, _>(0).map(|s| s.to_string()))
            .collect())
    }

    async fn get_columns(&self, table: &str) -> CoreResult<Vec<Column>> {
        let mut client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_NAME = @P1 ORDER BY ORDINAL_POSITION",
                &[&table],
            )
            .await
            .map_err(|e| CoreError::schema_introspection(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| CoreError::schema_introspection(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let name = row.get::<&str, _>(0)?.to_string();
                let data_type = row.get::<&str, _>(1)?.to_string();
                let is_nullable = row.get::<&str, _>(2)? == "YES";
                Some(Column {
                    name,
                    data_type: clean_data_type(&data_type),
                    nullable: is_nullable,
                })
            })
            .collect())
    }

    async fn get_primary_key(&self, table: &str) -> CoreResult<Option<String>> {
        let mut client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT kcu.COLUMN_NAME FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
                 JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
                   ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME \
                 WHERE tc.TABLE_NAME = @P1 AND tc.CONSTRAINT_TYPE = 'PRIMARY KEY' \
                 ORDER BY kcu.ORDINAL_POSITION",
                &[&table],
            )
            .await
            .map_err(|e| CoreError::schema_introspection(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| CoreError::schema_introspection(e.to_string()))?;

        let pk_columns: Vec<String> = rows
            .into_iter()
            .filter_map(|row| row.get::<&str, _>(0).map(|s| s.to_string()))
            .collect();

        Ok(match pk_columns.len() {
            1 => Some(pk_columns.into_iter().next().unwrap()),
            _ => None,
        })
    }

    async fn get_foreign_keys(&self, table: &str) -> CoreResult<Vec<ForeignKey>> {
        let mut client = self.client.lock().await;
        // Composite constraints are decomposed into positional pairs by
        // ORDINAL_POSITION on each side (spec §3). `CONSTRAINT_COLUMN_USAGE`
        // carries no ordinal position, so it can't correlate a constrained
        // column to its matching referenced column for multi-column keys —
        // a second self-join of `KEY_COLUMN_USAGE` against the unique
        // constraint, keyed by matching ordinal position, is required
        // instead.
        let rows = client
            .query(
                "SELECT kcu.COLUMN_NAME, kcu2.TABLE_NAME, kcu2.COLUMN_NAME \
                 FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
                 JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
                   ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME \
                   AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA \
                 JOIN INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc \
                   ON tc.CONSTRAINT_NAME = rc.CONSTRAINT_NAME \
                   AND tc.TABLE_SCHEMA = rc.CONSTRAINT_SCHEMA \
                 JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu2 \
                   ON rc.UNIQUE_CONSTRAINT_NAME = kcu2.CONSTRAINT_NAME \
                   AND rc.UNIQUE_CONSTRAINT_SCHEMA = kcu2.TABLE_SCHEMA \
                   AND kcu.ORDINAL_POSITION = kcu2.ORDINAL_POSITION \
                 WHERE tc.TABLE_NAME = @P1 AND tc.CONSTRAINT_TYPE = 'FOREIGN KEY'",
                &[&table],
            )
            .await
            .map_err(|e| CoreError::schema_introspection(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| CoreError::schema_introspection(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let fk_column = row.get::<&str, _>(0)?.to_string();
                let pk_table = row.get::<&str, _>(1)?.to_string();
                let pk_column = row.get::<&str, _>(2).map(|s| s.to_string());
                Some(ForeignKey {
                    fk_column,
                    pk_table,
                    pk_column,
                    inferred: false,
                    confidence: None,
                })
            })
            .collect())
    }
}
