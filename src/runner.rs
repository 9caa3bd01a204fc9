// SPDX-License-Identifier: Apache-2.0

//! Concrete `QueryRunner` backends (spec §5, §6).
//!
//! The query text handed to `run` is always the dialect-wrapped form
//! produced by `Dialect::wrap_json` (spec §4.8), so both backends reduce
//! to "execute and read back the single JSON column" rather than the
//! general row-to-`QRow` conversion `engine/drivers/{sqlite,sqlserver}.rs`
//! perform for interactive result sets.

use crate::executor::QueryRunner;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

/// Holds one exclusively-owned `SqlitePool` connection for the lifetime of
/// a single request (spec §5), grounded on
/// `engine/drivers/sqlite.rs::execute_in_namespace`.
pub struct SqliteRunner {
    pool: SqlitePool,
}

impl SqliteRunner {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryRunner for SqliteRunner {
    async fn run(&self, query: &str) -> Result<String, String> {
        let row = sqlx::query(query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.to_string())?;
        let json: Option<String> = row.try_get(0).map_err(|e| e.to_string())?;
        Ok(json.unwrap_or_else(|| "[]".to_string()))
    }
}

/// Holds one exclusively-owned `tiberius::Client` connection for the
/// lifetime of a single request, grounded on
/// `engine/drivers/sqlserver.rs`'s query execution path. `FOR JSON AUTO`
/// can split its output across multiple rows once the payload exceeds
/// tsql's internal chunk size, so the chunks are concatenated before
/// being returned.
pub struct TSqlRunner {
    client: Mutex<tiberius::Client<tokio_util::compat::Compat<tokio::net::TcpStream>>>,
}

impl TSqlRunner {
    pub fn new(client: tiberius::Client<tokio_util::compat::Compat<tokio::net::TcpStream>>) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }
}

#[async_trait]
impl QueryRunner for TSqlRunner {
    async fn run(&self, query: &str) -> Result<String, String> {
        let mut client = self.client.lock().await;
        let rows = client
            .query(query, &[])
            .await
            .map_err(|e| e.to_string())?
            .into_first_result()
            .await
            .map_err(|e| e.to_string())?;

        let mut json = String::new();
        for row in &rows {
            if let Some(chunk) = row.get::<&str, _>(0) {
                json.push_str(chunk);
            }
        }
        if json.is_empty() {
            json.push_str("[]");
        }
        Ok(json)
    }
}
