// SPDX-License-Identifier: Apache-2.0

//! Embedding Index (C3) — spec §4.3.
//!
//! The embedding provider is excluded infrastructure (spec §1): a
//! black-box function `embed(texts) -> vectors`. `EmbeddingIndex` is the
//! in-process vector store built over that provider's output, holding
//! table records by value (never back-pointing into the owning schema,
//! per spec §9's cyclic-reference note).
//!
//! Score semantics here are similarity-style: cosine similarity,
//! higher-is-better. This is the convention spec §4.4's threshold check
//! and §4.10's `score_gap` formula both assume; a distance-metric backend
//! would need to negate its scores at the boundary before handing them to
//! this index (spec §9's "implementations must normalize at the
//! boundary"). No such backend ships here, so no flip is implemented.

use async_trait::async_trait;
use crate::model::Table;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String>;
}

struct IndexedTable {
    table: Table,
    vector: Vec<f32>,
}

pub struct EmbeddingIndex {
    entries: Vec<IndexedTable>,
}

impl EmbeddingIndex {
    /// Builds an index over every table in the schema. Each document's
    /// content is `"Table: <table_name>"` — deliberately minimal; the
    /// original implementation found that appending table descriptions
    /// dilutes the table-name signal and reduces precision/recall.
    pub async fn build(
        tables: &[Table],
        provider: &dyn EmbeddingProvider,
    ) -> Result<Self, String> {
        let documents: Vec<String> = tables
            .iter()
            .map(|t| format!("Table: {}", t.table_name))
            .collect();
        let vectors = provider.embed(&documents).await?;
        if vectors.len() != tables.len() {
            return Err(format!(
                "embedding provider returned {} vectors for {} documents",
                vectors.len(),
                tables.len()
            ));
        }
        let entries = tables
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(table, vector)| IndexedTable { table, vector })
            .collect();
        Ok(Self { entries })
    }

    /// Returns up to `k` `(table, score)` pairs ordered by descending
    /// similarity.
    pub async fn search(
        &self,
        query_text: &str,
        k: usize,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Vec<(Table, f32)>, String> {
        let query_vec = provider
            .embed(&[query_text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| "embedding provider returned no vector for query".to_string())?;

        let mut scored: Vec<(Table, f32)> = self
            .entries
            .iter()
            .map(|e| (e.table.clone(), cosine_similarity(&query_vec, &e.vector)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
