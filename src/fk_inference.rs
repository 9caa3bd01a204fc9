// SPDX-License-Identifier: Apache-2.0

//! FK Inferencer (C4) — spec §4.4.
//!
//! Grounded on `original_source/database/infer_foreign_keys.py`
//! (`find_candidate_tables`, `infer_foreign_keys`, `infer_pk_column`,
//! `has_existing_fk`).

use crate::embedding::{EmbeddingIndex, EmbeddingProvider};
use crate::id_columns::detect_id_columns;
use crate::model::{ForeignKey, Schema, Table};
use tracing::debug;

fn has_existing_fk(column_name: &str, existing: &[ForeignKey]) -> bool {
    existing.iter().any(|fk| fk.fk_column == column_name)
}

/// `pk_of(t)`: prefers `t.primary_key`, else the column literally named
/// `ID`/`Id`/`id`, else `<TableName>ID`/`<TableName>Id`, else `None`.
fn pk_of(table: &Table) -> Option<String> {
    if let Some(pk) = &table.primary_key {
        return Some(pk.clone());
    }
    for column in &table.columns {
        if column.name.eq_ignore_ascii_case("id") {
            return Some(column.name.clone());
        }
    }
    let candidates = [
        format!("{}ID", table.table_name),
        format!("{}Id", table.table_name),
    ];
    for candidate in &candidates {
        if table.columns.iter().any(|c| &c.name == candidate) {
            return Some(candidate.clone());
        }
    }
    None
}

/// Finds up to `top_k` candidate tables for a given ID-column base name,
/// excluding the source table. Retrieves `top_k + 1` to absorb
/// self-reference filtering (spec §4.4 steps 1-3).
pub async fn find_candidate_tables(
    base_name: &str,
    index: &EmbeddingIndex,
    provider: &dyn EmbeddingProvider,
    source_table: &str,
    top_k: usize,
) -> Result<Vec<(Table, f32)>, String> {
    let query = format!("Table related to {base_name}");
    let results = index.search(&query, top_k + 1, provider).await?;
    let mut filtered: Vec<(Table, f32)> = results
        .into_iter()
        .filter(|(t, _)| t.table_name != source_table)
        .collect();
    filtered.truncate(top_k);
    Ok(filtered)
}

/// Runs FK inference over every table's detected ID-columns, mutating
/// `schema` in place by appending inferred foreign keys after any
/// existing ones (existing FKs are never overwritten). An embedding-
/// backend error aborts inference for that column only, not the whole
/// batch (spec §4.4 failure semantics).
pub async fn infer_foreign_keys(
    schema: &mut Schema,
    index: &EmbeddingIndex,
    provider: &dyn EmbeddingProvider,
    confidence_threshold: f32,
    top_k: usize,
) {
    let snapshot = schema.tables.clone();

    for table in &mut schema.tables {
        let id_columns = detect_id_columns(table);
        for (fk_column, base_name) in id_columns {
            if has_existing_fk(&fk_column, &table.foreign_keys) {
                continue;
            }

            let candidates = match find_candidate_tables(
                &base_name,
                index,
                provider,
                &table.table_name,
                top_k,
            )
            .await
            {
                Ok(c) => c,
                Err(e) => {
                    debug!(table = %table.table_name, column = %fk_column, error = %e, "embedding lookup failed");
                    continue;
                }
            };

            let Some((top_table, top_score)) = candidates.first() else {
                debug!(table = %table.table_name, column = %fk_column, "no FK candidates found");
                continue;
            };

            if *top_score >= confidence_threshold {
                // Resolve pk_of against the pre-inference snapshot so a
                // table's own inferred FKs never feed back into another
                // table's lookup within the same pass.
                let resolved = snapshot
                    .iter()
                    .find(|t| t.table_name == top_table.table_name)
                    .unwrap_or(top_table);

                table.foreign_keys.push(ForeignKey {
                    fk_column,
                    pk_table: top_table.table_name.clone(),
                    pk_column: pk_of(resolved),
                    inferred: true,
                    confidence: Some((*top_score * 1000.0).round() / 1000.0),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Column;
    use async_trait::async_trait;

    struct ExactMatchProvider;

    #[async_trait]
    impl EmbeddingProvider for ExactMatchProvider {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    vec![lower.contains("company") as i32 as f32, lower.contains("user") as i32 as f32]
                })
                .collect())
        }
    }

    fn schema_fixture() -> Schema {
        Schema {
            tables: vec![
                Table {
                    table_name: "tb_Company".to_string(),
                    columns: vec![Column {
                        name: "ID".to_string(),
                        data_type: "int".to_string(),
                        nullable: false,
                    }],
                    primary_key: Some("ID".to_string()),
                    foreign_keys: vec![],
                    metadata: None,
                },
                Table {
                    table_name: "tb_User".to_string(),
                    columns: vec![
                        Column {
                            name: "ID".to_string(),
                            data_type: "int".to_string(),
                            nullable: false,
                        },
                        Column {
                            name: "CompanyID".to_string(),
                            data_type: "int".to_string(),
                            nullable: false,
                        },
                    ],
                    primary_key: Some("ID".to_string()),
                    foreign_keys: vec![],
                    metadata: None,
                },
            ],
        }
    }

    #[tokio::test]
    async fn infers_fk_above_threshold() {
        let mut schema = schema_fixture();
        let provider = ExactMatchProvider;
        let index = EmbeddingIndex::build(&schema.tables, &provider).await.unwrap();

        infer_foreign_keys(&mut schema, &index, &provider, 0.6, 3).await;

        let user = schema.find_table("tb_User").unwrap();
        assert_eq!(user.foreign_keys.len(), 1);
        let fk = &user.foreign_keys[0];
        assert_eq!(fk.fk_column, "CompanyID");
        assert_eq!(fk.pk_table, "tb_Company");
        assert_eq!(fk.pk_column.as_deref(), Some("ID"));
        assert!(fk.inferred);
    }

    #[tokio::test]
    async fn existing_fk_is_never_overwritten() {
        let mut schema = schema_fixture();
        schema.find_table_mut("tb_User").unwrap().foreign_keys.push(ForeignKey {
            fk_column: "CompanyID".to_string(),
            pk_table: "tb_Company".to_string(),
            pk_column: Some("ID".to_string()),
            inferred: false,
            confidence: None,
        });
        let provider = ExactMatchProvider;
        let index = EmbeddingIndex::build(&schema.tables, &provider).await.unwrap();

        infer_foreign_keys(&mut schema, &index, &provider, 0.6, 3).await;

        let user = schema.find_table("tb_User").unwrap();
        assert_eq!(user.foreign_keys.len(), 1);
        assert!(!user.foreign_keys[0].inferred);
    }
}
