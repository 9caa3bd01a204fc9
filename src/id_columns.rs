// SPDX-License-Identifier: Apache-2.0

//! ID-Column Detector (C2) — spec §4.2.

use crate::model::Table;
use regex::RegexBuilder;

/// Patterns tried in order, case-insensitive, against the full column
/// name. First match wins; capture group 1 is the base name. Grounded on
/// `original_source/database/infer_foreign_keys.py`'s `ID_PATTERNS`.
const ID_PATTERNS: &[&str] = &[r"^(.+)ID$", r"^(.+)Id$", r"^(.+)_ID$", r"^(.+)_Id$", r"^(.+)_id$"];

/// Detects ID-style columns in a table, returning `(column_name,
/// base_name)` pairs in column order. The column named exactly
/// `ID`/`Id`/`id` is the PK candidate, never an ID-column.
pub fn detect_id_columns(table: &Table) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for column in &table.columns {
        if column.name.eq_ignore_ascii_case("id") {
            continue;
        }
        if let Some(base_name) = match_id_pattern(&column.name) {
            out.push((column.name.clone(), base_name));
        }
    }
    out
}

fn match_id_pattern(column_name: &str) -> Option<String> {
    for pattern in ID_PATTERNS {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .expect("static ID pattern is always valid");
        if let Some(caps) = re.captures(column_name) {
            return Some(caps[1].to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Column;

    fn table_with_columns(names: &[&str]) -> Table {
        Table {
            table_name: "tb_User".to_string(),
            columns: names
                .iter()
                .map(|n| Column {
                    name: n.to_string(),
                    data_type: "int".to_string(),
                    nullable: false,
                })
                .collect(),
            primary_key: None,
            foreign_keys: Vec::new(),
            metadata: None,
        }
    }

    #[test]
    fn detects_suffix_variants() {
        let table = table_with_columns(&["ID", "CompanyID", "manager_Id", "Region_ID", "dept_id"]);
        let detected = detect_id_columns(&table);
        assert_eq!(
            detected,
            vec![
                ("CompanyID".to_string(), "Company".to_string()),
                ("manager_Id".to_string(), "manager".to_string()),
                ("Region_ID".to_string(), "Region".to_string()),
                ("dept_id".to_string(), "dept".to_string()),
            ]
        );
    }

    #[test]
    fn bare_id_column_excluded() {
        let table = table_with_columns(&["id"]);
        assert!(detect_id_columns(&table).is_empty());
    }

    #[test]
    fn first_pattern_wins() {
        // "CompanyID" matches `^(.+)ID$` before the less-specific variants.
        let table = table_with_columns(&["CompanyID"]);
        assert_eq!(detect_id_columns(&table)[0].1, "Company");
    }
}
