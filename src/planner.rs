// SPDX-License-Identifier: Apache-2.0

//! Planner Adapter (C6) — spec §4.6.
//!
//! The language model is excluded infrastructure (spec §1): a black-box
//! function `plan(question, schema) -> PlannerOutput` and `propose(prompt)
//! -> string`. Grounded structurally (trait-for-pluggable-backend idiom,
//! fenced-code-block extraction) on `ai/provider.rs`'s `AIProvider` trait
//! and `extract_query_from_response` helper — no concrete HTTP-backed
//! provider ships, since an implementation of the LM itself is out of
//! scope.

use crate::error::{CoreError, CoreResult};
use crate::model::{PlannerOutput, Schema, SortOrderPref, TimeFilter};
use async_trait::async_trait;

pub struct PlannerPreferences {
    pub sort_order: SortOrderPref,
    pub result_limit: u64,
    pub time_filter: TimeFilter,
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// Sends the schema, question, and preferences to the LM and
    /// validates the response against `PlannerOutput` (spec §4.6).
    async fn plan(
        &self,
        question: &str,
        schema: &Schema,
        prefs: &PlannerPreferences,
    ) -> CoreResult<PlannerOutput>;

    /// Raw-text completion used by the executor's correction and
    /// refinement loops (spec §4.8), which work directly with SQL text
    /// rather than structured `PlannerOutput`.
    async fn propose(&self, prompt: &str) -> CoreResult<String>;
}

/// Extracts a fenced code block from LM response text, trying SQL-specific
/// fences before a bare ``` ``` fence. Grounded verbatim on
/// `ai/provider.rs::extract_query_from_response`.
pub fn extract_query_from_response(response: &str) -> Option<String> {
    let patterns = [
        "```sql", "```mysql", "```postgresql", "```mongo", "```json", "```js", "```javascript",
        "```redis", "```",
    ];

    for pattern in &patterns {
        if let Some(start_idx) = response.find(pattern) {
            let content_start = start_idx + pattern.len();
            let content_start = response[content_start..]
                .find('\n')
                .map(|i| content_start + i + 1)
                .unwrap_or(content_start);

            if let Some(end_idx) = response[content_start..].find("```") {
                let query = response[content_start..content_start + end_idx].trim();
                if !query.is_empty() {
                    return Some(query.to_string());
                }
            }
        }
    }

    None
}

/// Validates a raw LM response as a `PlannerOutput`. Validation failure
/// surfaces as `CoreError::Planner` (spec §4.6, §7).
pub fn validate_planner_output(raw: &str) -> CoreResult<PlannerOutput> {
    serde_json::from_str(raw).map_err(|e| CoreError::planner(format!("invalid PlannerOutput: {e}")))
}

/// Deterministic test double — never calls out to a real LM.
pub struct MockPlanner {
    pub fixed_output: PlannerOutput,
    pub fixed_proposal: String,
}

#[async_trait]
impl Planner for MockPlanner {
    async fn plan(
        &self,
        _question: &str,
        _schema: &Schema,
        _prefs: &PlannerPreferences,
    ) -> CoreResult<PlannerOutput> {
        Ok(self.fixed_output.clone())
    }

    async fn propose(&self, _prompt: &str) -> CoreResult<String> {
        Ok(self.fixed_proposal.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_sql_fenced_block() {
        let response = "Here's your query:\n\n```sql\nSELECT * FROM users WHERE id = 1;\n```\n";
        assert_eq!(
            extract_query_from_response(response),
            Some("SELECT * FROM users WHERE id = 1;".to_string())
        );
    }

    #[test]
    fn no_block_returns_none() {
        assert_eq!(extract_query_from_response("just text"), None);
    }

    #[test]
    fn invalid_planner_output_is_a_planner_error() {
        let err = validate_planner_output("{not json}").unwrap_err();
        assert!(matches!(err, CoreError::Planner(_)));
    }
}
