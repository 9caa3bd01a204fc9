// SPDX-License-Identifier: Apache-2.0

//! Query Executor (C8) — spec §4.8.
//!
//! Holds the exclusively-owned connection for one request (spec §5's
//! per-request connection ownership model, a deliberate departure from
//! `engine/drivers/*.rs`'s session-pool-of-connections pattern: this
//! crate never multiplexes several in-flight requests over one
//! connection). Drives the error-retry loop (LM-assisted correction, with
//! an inline fast path for `Invalid column name` errors) and the
//! empty-result refinement loop, grounded on
//! `original_source/agent/execute_query.py`,
//! `original_source/agent/handle_tool_error.py`, and
//! `original_source/agent/refine_query.py`.

use crate::error::{CoreError, CoreResult};
use crate::model::WorkflowState;
use crate::planner::Planner;
use crate::sql::dialect::Dialect;
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, instrument, warn};

/// Backend-agnostic statement execution. `sqlite.rs`/`tsql.rs` hold the
/// concrete `sqlx::SqlitePool` / `tiberius::Client` connections; this
/// trait is what `Executor` drives, keeping the retry/refinement control
/// flow backend-independent.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Runs `query` and returns the dialect-wrapped JSON payload (spec
    /// §4.8's `wrap_json` contract), or the raw driver error string on
    /// failure.
    async fn run(&self, query: &str) -> Result<String, String>;
}

fn invalid_column_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)invalid column name '([^']+)'").unwrap())
}

/// Parses a `SQLSTATE`/driver error message for an `Invalid column name
/// 'X'` complaint. Ported from
/// `original_source/agent/execute_query.py::parse_invalid_column_name`.
pub fn parse_invalid_column_name(error_message: &str) -> Option<String> {
    invalid_column_re()
        .captures(error_message)
        .map(|c| c[1].to_string())
}

/// Strips one column reference from a flat `SELECT <cols> FROM ...` list,
/// handling a bare name, a table-qualified name (`p.OS`), and an aliased
/// projection (`OS AS OperatingSystem`). This is a text-level repair
/// limited to the projection list — it does not touch WHERE/JOIN/GROUP BY,
/// matching the scope of the source's inline fast path.
pub fn remove_column_from_query(query: &str, column: &str) -> String {
    let from_idx = match query.to_uppercase().find(" FROM ") {
        Some(i) => i,
        None => return query.to_string(),
    };

    let select_prefix_len = query
        .to_uppercase()
        .find("SELECT")
        .map(|i| i + "SELECT".len())
        .unwrap_or(0);

    let projection = &query[select_prefix_len..from_idx];
    let rest = &query[from_idx..];

    let kept: Vec<&str> = projection
        .split(',')
        .map(|c| c.trim())
        .filter(|c| !column_matches(c, column))
        .collect();

    if kept.len() == projection.split(',').count() {
        // No match found; leave the query untouched rather than risk
        // corrupting it.
        return query.to_string();
    }

    format!("SELECT {}{}", kept.join(", "), rest)
}

fn column_matches(projection_item: &str, column: &str) -> bool {
    let bare = projection_item
        .rsplit('.')
        .next()
        .unwrap_or(projection_item)
        .trim();

    let head = bare.split_whitespace().next().unwrap_or(bare);
    head.eq_ignore_ascii_case(column)
}

pub struct Executor<'a> {
    runner: &'a dyn QueryRunner,
    planner: &'a dyn Planner,
    dialect: Dialect,
    max_retries: u32,
    max_refinements: u32,
}

impl<'a> Executor<'a> {
    pub fn new(
        runner: &'a dyn QueryRunner,
        planner: &'a dyn Planner,
        dialect: Dialect,
        max_retries: u32,
        max_refinements: u32,
    ) -> Self {
        Self {
            runner,
            planner,
            dialect,
            max_retries,
            max_refinements,
        }
    }

    /// Runs the full execute → (error-retry)* → (refinement)* cycle
    /// against `state.query`, mutating `state` in place and returning once
    /// a result lands or the loop terminates per spec §4.9's
    /// `should_continue` routing (retry ceiling, rate-limit signal, or
    /// success).
    #[instrument(skip(self, state), fields(retry_count = state.retry_count))]
    pub async fn execute(&self, state: &mut WorkflowState) -> CoreResult<()> {
        let query = state
            .query
            .clone()
            .ok_or_else(|| CoreError::execution("no query to execute"))?;

        match self.runner.run(&query).await {
            Ok(json) => {
                state.result = Some(json);
                state.last_step = "execute_query".to_string();
                state.last_attempt_time = Some(chrono::Utc::now());

                if is_empty_result(state.result.as_deref().unwrap_or("")) {
                    return self.run_refinement_loop(state).await;
                }
                Ok(())
            }
            Err(driver_error) => {
                state.last_step = "execute_query".to_string();
                state.last_attempt_time = Some(chrono::Utc::now());

                if driver_error.to_lowercase().contains("rate limit") {
                    state.rate_limited = true;
                    return Err(CoreError::RateLimitSignal);
                }

                self.run_error_retry_loop(state, &driver_error).await
            }
        }
    }

    /// Error-retry loop (spec §4.8, §4.9): on an `Invalid column name`
    /// error, strips the offending column inline and retries without
    /// consulting the LM; otherwise asks the planner to propose a
    /// corrected query. Terminates at `max_retries` or a rate-limit
    /// signal. `retry_count` counts failures that have triggered a
    /// correction attempt, and `error_history` gets exactly one entry per
    /// such failure — the two stay in lockstep (`first_error`, the attempt
    /// that got us here, is recorded as the first one) so
    /// `len(error_history) == retry_count` holds whether the loop exits on
    /// success or on exhaustion (spec §3, §8).
    async fn run_error_retry_loop(&self, state: &mut WorkflowState, first_error: &str) -> CoreResult<()> {
        let mut current_error = first_error.to_string();

        while state.retry_count < self.max_retries {
            state.retry_count += 1;
            state.error_history.push(current_error.clone());

            let corrected = if let Some(column) = parse_invalid_column_name(&current_error) {
                debug!(column = %column, "stripping invalid column inline, skipping LM round-trip");
                remove_column_from_query(state.query.as_deref().unwrap_or(""), &column)
            } else {
                let prompt = build_correction_prompt(state, &current_error);
                let proposal = self.planner.propose(&prompt).await?;
                crate::planner::extract_query_from_response(&proposal).unwrap_or(proposal)
            };

            state.correction_history.push(corrected.clone());
            state.query = Some(corrected.clone());
            state.last_step = "handle_error".to_string();

            match self.runner.run(&corrected).await {
                Ok(json) => {
                    state.result = Some(json);
                    state.last_step = "execute_query".to_string();
                    state.last_attempt_time = Some(chrono::Utc::now());

                    if is_empty_result(state.result.as_deref().unwrap_or("")) {
                        return self.run_refinement_loop(state).await;
                    }
                    return Ok(());
                }
                Err(e) => {
                    state.last_attempt_time = Some(chrono::Utc::now());
                    if e.to_lowercase().contains("rate limit") {
                        state.rate_limited = true;
                        return Err(CoreError::RateLimitSignal);
                    }
                    current_error = e;
                }
            }
        }

        warn!(retry_count = state.retry_count, "exhausted error-retry loop");
        Err(CoreError::execution(current_error))
    }

    /// Empty-result refinement loop (spec §4.8, §4.9): asks the planner to
    /// broaden the query up to `max_refinements` times, stopping as soon
    /// as a non-empty result lands.
    async fn run_refinement_loop(&self, state: &mut WorkflowState) -> CoreResult<()> {
        while state.refined_count < self.max_refinements {
            let prompt = build_refinement_prompt(state);
            let proposal = self.planner.propose(&prompt).await?;
            let refined = crate::planner::extract_query_from_response(&proposal).unwrap_or(proposal);

            state
                .refined_queries
                .push(state.query.clone().unwrap_or_default());
            state.refinement_history.push(refined.clone());
            state.refined_count += 1;
            state.query = Some(refined.clone());
            state.last_step = "refine_query".to_string();

            match self.runner.run(&refined).await {
                Ok(json) => {
                    state.last_attempt_time = Some(chrono::Utc::now());
                    let empty = is_empty_result(&json);
                    state.result = Some(json);
                    if !empty {
                        state.last_step = "execute_query".to_string();
                        return Ok(());
                    }
                }
                Err(e) => {
                    state.error_history.push(e);
                    state.last_attempt_time = Some(chrono::Utc::now());
                }
            }
        }

        Err(CoreError::EmptyResult)
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// A dialect-wrapped JSON payload is "empty" when it serializes to an
/// empty array (sqlite's `json_group_array` on no rows) or `null` (tsql's
/// `FOR JSON AUTO` on no rows emits no value at all).
fn is_empty_result(json: &str) -> bool {
    let trimmed = json.trim();
    trimmed.is_empty() || trimmed == "[]" || trimmed.eq_ignore_ascii_case("null")
}

fn build_correction_prompt(state: &WorkflowState, error: &str) -> String {
    format!(
        "The following SQL query generated an error; analyze it and avoid repeating the issue.\n\
         Original query:\n{}\n\nError history:\n{}\n\nLatest error: {error}\n\n\
         Return ONLY the corrected SQL query, no markdown formatting or explanation.",
        state.query.as_deref().unwrap_or(""),
        state.error_history.join("\n"),
    )
}

fn build_refinement_prompt(state: &WorkflowState) -> String {
    let previous = if state.refined_queries.is_empty() {
        String::new()
    } else {
        format!(
            "Previous refinement attempts that still returned no results:\n{}\n",
            state
                .refined_queries
                .iter()
                .enumerate()
                .map(|(i, q)| format!("{}. {q}", i + 1))
                .collect::<Vec<_>>()
                .join("\n")
        )
    };

    format!(
        "The query returned no results; broaden it.\n\
         Original question: {}\nCurrent query: {}\n{previous}\n\
         Consider: broadening WHERE clauses, using LIKE instead of exact matches, \
         removing overly restrictive conditions, checking for NULL values, using OR \
         conditions where appropriate.\n\n\
         Return ONLY the refined SQL query, no markdown formatting or explanation.",
        state.question,
        state.query.as_deref().unwrap_or(""),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PlannerOutput, Schema};
    use proptest::prelude::*;

    #[test]
    fn parses_bracketed_sql_server_error() {
        let msg = "('42S22', \"[42S22] [Microsoft][ODBC Driver 17 for SQL Server]\
                    [SQL Server]Invalid column name 'OS'. (207) (SQLExecDirectW)\")";
        assert_eq!(parse_invalid_column_name(msg), Some("OS".to_string()));
    }

    #[test]
    fn parses_plain_error() {
        assert_eq!(
            parse_invalid_column_name("Invalid column name 'UserStatus'."),
            Some("UserStatus".to_string())
        );
    }

    #[test]
    fn no_match_returns_none() {
        assert_eq!(parse_invalid_column_name("Some other error"), None);
    }

    #[test]
    fn removes_bare_column() {
        let query = "SELECT Name, OS, Version FROM Products WHERE Active = 1";
        let modified = remove_column_from_query(query, "OS");
        assert!(!modified.contains("OS"));
        assert!(modified.contains("Name"));
        assert!(modified.contains("Version"));
    }

    #[test]
    fn removes_table_qualified_column() {
        let query = "SELECT p.Name, p.OS, p.Version FROM Products AS p";
        let modified = remove_column_from_query(query, "OS");
        assert!(!modified.contains("p.OS"));
    }

    #[test]
    fn removes_aliased_column() {
        let query = "SELECT Name, OS AS OperatingSystem, Version FROM Products";
        let modified = remove_column_from_query(query, "OS");
        assert!(!modified.contains("OperatingSystem"));
    }

    #[test]
    fn empty_result_detection() {
        assert!(is_empty_result("[]"));
        assert!(is_empty_result("null"));
        assert!(is_empty_result(""));
        assert!(!is_empty_result("[{\"id\":1}]"));
    }

    struct FixedRunner {
        responses: std::sync::Mutex<Vec<Result<String, String>>>,
    }

    #[async_trait]
    impl QueryRunner for FixedRunner {
        async fn run(&self, _query: &str) -> Result<String, String> {
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn mock_planner(proposal: &str) -> crate::planner::MockPlanner {
        crate::planner::MockPlanner {
            fixed_output: PlannerOutput {
                decision: crate::model::PlannerDecision::Proceed,
                intent_summary: String::new(),
                selections: Vec::new(),
                join_edges: Vec::new(),
                global_filters: Vec::new(),
                group_by: None,
                window_functions: Vec::new(),
                subquery_filters: Vec::new(),
                ctes: Vec::new(),
                order_by: Vec::new(),
                limit: None,
            },
            fixed_proposal: proposal.to_string(),
        }
    }

    #[tokio::test]
    async fn invalid_column_retried_without_lm_roundtrip() {
        let runner = FixedRunner {
            responses: std::sync::Mutex::new(vec![
                Err("Invalid column name 'OS'.".to_string()),
                Ok("[{\"Name\":\"x\"}]".to_string()),
            ]),
        };
        let planner = mock_planner("SELECT * FROM never_called");
        let executor = Executor::new(&runner, &planner, Dialect::TSql, 3, 3);

        let schema = Schema::default();
        let mut state = WorkflowState::new("q", schema);
        state.query = Some("SELECT Name, OS FROM Products".to_string());

        executor.execute(&mut state).await.unwrap();
        assert_eq!(state.retry_count, 1);
        assert_eq!(state.error_history.len(), state.retry_count as usize);
        assert!(!state.query.unwrap().contains("OS"));
    }

    #[tokio::test]
    async fn retry_ceiling_is_respected() {
        let runner = FixedRunner {
            responses: std::sync::Mutex::new(vec![
                Err("syntax error".to_string()),
                Err("syntax error".to_string()),
                Err("syntax error".to_string()),
                Err("syntax error".to_string()),
            ]),
        };
        let planner = mock_planner("SELECT 1");
        let executor = Executor::new(&runner, &planner, Dialect::TSql, 3, 3);

        let schema = Schema::default();
        let mut state = WorkflowState::new("q", schema);
        state.query = Some("SELECT bad syntax".to_string());

        let err = executor.execute(&mut state).await.unwrap_err();
        assert!(matches!(err, CoreError::Execution(_)));
        assert_eq!(state.retry_count, 3);
        assert_eq!(state.error_history.len(), state.retry_count as usize);
    }

    proptest! {
        /// Spec §8 invariant: `error_history.len() == retry_count`, for
        /// any number of consecutive failures up to and past the retry
        /// ceiling, whether the request eventually succeeds or exhausts.
        #[test]
        fn error_history_tracks_retry_count(num_failures in 0usize..=6) {
            let mut responses: Vec<Result<String, String>> = (0..num_failures)
                .map(|_| Err("syntax error".to_string()))
                .collect();
            responses.push(Ok("[{\"Name\":\"x\"}]".to_string()));

            let runner = FixedRunner {
                responses: std::sync::Mutex::new(responses),
            };
            let planner = mock_planner("SELECT 1");
            let executor = Executor::new(&runner, &planner, Dialect::TSql, 3, 3);

            let schema = Schema::default();
            let mut state = WorkflowState::new("q", schema);
            state.query = Some("SELECT bad syntax".to_string());

            let rt = tokio::runtime::Runtime::new().unwrap();
            let outcome = rt.block_on(executor.execute(&mut state));

            prop_assert_eq!(state.error_history.len(), state.retry_count as usize);
            if num_failures <= 3 {
                prop_assert!(outcome.is_ok());
            } else {
                prop_assert!(outcome.is_err());
                prop_assert_eq!(state.retry_count, 3);
            }
        }
    }

    #[tokio::test]
    async fn empty_result_triggers_refinement() {
        let runner = FixedRunner {
            responses: std::sync::Mutex::new(vec![
                Ok("[]".to_string()),
                Ok("[{\"Name\":\"x\"}]".to_string()),
            ]),
        };
        let planner = mock_planner("SELECT * FROM Products");
        let executor = Executor::new(&runner, &planner, Dialect::TSql, 3, 3);

        let schema = Schema::default();
        let mut state = WorkflowState::new("q", schema);
        state.query = Some("SELECT * FROM Products WHERE Rare = 1".to_string());

        executor.execute(&mut state).await.unwrap();
        assert_eq!(state.refined_count, 1);
        assert!(!is_empty_result(state.result.as_deref().unwrap()));
    }
}
