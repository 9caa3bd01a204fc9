// SPDX-License-Identifier: Apache-2.0

//! Domain Overlay (C5) — spec §4.5.
//!
//! Grounded structurally on `virtual_relations/store.rs`'s load/cache/apply
//! shape, and on the field whitelist + pruning rules of
//! `original_source/domain_specific_guidance/combine_json_schema.py`.

use crate::model::{CuratedForeignKeys, CuratedTableMetadata, Schema, TableMetadata};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct DomainOverlayStore {
    table_metadata: HashMap<String, CuratedTableMetadata>,
    foreign_keys: HashMap<String, CuratedForeignKeys>,
}

impl DomainOverlayStore {
    /// Loads the two optional curated JSON files. Returns `None` if
    /// neither exists — callers should pass the schema through unchanged
    /// in that case (spec §4.5).
    pub fn load(table_metadata_path: &Path, foreign_keys_path: &Path) -> Option<Self> {
        let table_metadata = load_json_file::<Vec<CuratedTableMetadata>>(table_metadata_path);
        let foreign_keys = load_json_file::<Vec<CuratedForeignKeys>>(foreign_keys_path);

        if table_metadata.is_none() && foreign_keys.is_none() {
            info!("no domain-specific metadata or foreign keys found, schema passes through unchanged");
            return None;
        }

        Some(Self {
            table_metadata: table_metadata
                .unwrap_or_default()
                .into_iter()
                .map(|m| (m.table_name.clone(), m))
                .collect(),
            foreign_keys: foreign_keys
                .unwrap_or_default()
                .into_iter()
                .map(|f| (f.table_name.clone(), f))
                .collect(),
        })
    }

    /// Merges curated metadata/FKs onto `schema` in place. Metadata is
    /// filtered to `{description, key_columns}`; curated foreign keys
    /// fully replace the table's inferred set (never merged).
    pub fn apply(&self, schema: &mut Schema) {
        for table in &mut schema.tables {
            if let Some(curated) = self.table_metadata.get(&table.table_name) {
                let description = curated
                    .metadata
                    .get("description")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());

                let key_columns = curated
                    .metadata
                    .get("key_columns")
                    .map(|v| match v {
                        serde_json::Value::String(s) => s
                            .split('\n')
                            .map(|c| c.trim().to_string())
                            .filter(|c| !c.is_empty())
                            .collect(),
                        serde_json::Value::Array(items) => items
                            .iter()
                            .filter_map(|i| i.as_str().map(|s| s.to_string()))
                            .collect(),
                        _ => Vec::new(),
                    })
                    .unwrap_or_default();

                table.metadata = Some(TableMetadata {
                    description,
                    key_columns,
                });
            }

            if let Some(curated) = self.foreign_keys.get(&table.table_name) {
                table.foreign_keys = curated.foreign_keys.clone();
            }
        }

        prune_empty_table_metadata(schema);
    }
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        info!(path = %path.display(), "domain-specific file not found (optional)");
        return None;
    }
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// `remove_empty_properties`: recursively prunes any `metadata.description`
/// that is empty and drops the `metadata` object entirely if it ends up
/// with no surviving fields.
fn prune_empty_table_metadata(schema: &mut Schema) {
    for table in &mut schema.tables {
        if let Some(metadata) = &mut table.metadata {
            if let Some(desc) = &metadata.description {
                if desc.is_empty() {
                    metadata.description = None;
                }
            }
            metadata.key_columns.retain(|c| !c.is_empty());
            if metadata.description.is_none() && metadata.key_columns.is_empty() {
                table.metadata = None;
            }
        }
    }
}

/// Returns the paths the overlay looks for, relative to a guidance
/// directory, matching the original's co-located file layout.
pub fn default_overlay_paths(guidance_dir: &Path) -> (PathBuf, PathBuf) {
    (
        guidance_dir.join("domain-specific-table-metadata.json"),
        guidance_dir.join("domain-specific-foreign-keys.json"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, ForeignKey, Table};
    use std::io::Write;

    fn schema_fixture() -> Schema {
        Schema {
            tables: vec![Table {
                table_name: "tb_Company".to_string(),
                columns: vec![Column {
                    name: "ID".to_string(),
                    data_type: "int".to_string(),
                    nullable: false,
                }],
                primary_key: Some("ID".to_string()),
                foreign_keys: vec![ForeignKey {
                    fk_column: "RegionID".to_string(),
                    pk_table: "tb_Region".to_string(),
                    pk_column: Some("ID".to_string()),
                    inferred: true,
                    confidence: Some(0.7),
                }],
                metadata: None,
            }],
        }
    }

    #[test]
    fn curated_fks_replace_inferred_set() {
        let dir = tempfile::tempdir().unwrap();
        let fk_path = dir.path().join("fks.json");
        let meta_path = dir.path().join("meta.json");

        let mut f = std::fs::File::create(&fk_path).unwrap();
        writeln!(
            f,
            r#"[{{"table_name": "tb_Company", "foreign_keys": []}}]"#
        )
        .unwrap();

        let mut schema = schema_fixture();
        let store = DomainOverlayStore::load(&meta_path, &fk_path).unwrap();
        store.apply(&mut schema);

        assert!(schema.find_table("tb_Company").unwrap().foreign_keys.is_empty());
    }

    #[test]
    fn missing_files_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let (meta, fks) = default_overlay_paths(dir.path());
        assert!(DomainOverlayStore::load(&meta, &fks).is_none());
    }

    #[test]
    fn key_columns_split_on_newline() {
        let dir = tempfile::tempdir().unwrap();
        let fk_path = dir.path().join("fks.json");
        let meta_path = dir.path().join("meta.json");

        let mut f = std::fs::File::create(&meta_path).unwrap();
        writeln!(
            f,
            r#"[{{"table_name": "tb_Company", "description": "Companies", "key_columns": "Name\nTaxId"}}]"#
        )
        .unwrap();

        let mut schema = schema_fixture();
        let store = DomainOverlayStore::load(&meta_path, &fk_path).unwrap();
        store.apply(&mut schema);

        let metadata = schema.find_table("tb_Company").unwrap().metadata.clone().unwrap();
        assert_eq!(metadata.key_columns, vec!["Name".to_string(), "TaxId".to_string()]);
    }
}
