// SPDX-License-Identifier: Apache-2.0

//! Natural-language-to-SQL orchestration core.
//!
//! `lib.rs` is the composition root, the way QoreDB's own `lib.rs` wires
//! `SessionManager`/`DriverRegistry`/`AiManager` into the app's command
//! surface. There is no command surface here — no terminal UI and no
//! Tauri bridge (spec §1's excluded infrastructure) — so this module
//! composes the pipeline components (C1–C10) into a single library-facing
//! facade, `Agent`, instead of a set of `#[tauri::command]` handlers.

pub mod config;
pub mod domain_overlay;
pub mod embedding;
pub mod error;
pub mod executor;
pub mod fk_agent;
pub mod fk_inference;
pub mod id_columns;
pub mod model;
pub mod planner;
pub mod runner;
pub mod schema;
pub mod sql;
pub mod workflow;

use config::AgentConfig;
use domain_overlay::DomainOverlayStore;
use error::CoreError;
use executor::{Executor, QueryRunner};
use model::{PlannerDecision, Schema, SortOrderPref, TimeFilter, WorkflowState};
use planner::Planner;
use schema::SchemaIntrospector;
use sql::TimeWindowTarget;
use workflow::{Checkpointer, InMemoryCheckpointer, WorkflowContext, WorkflowNode};

/// Per-request preferences, the library-facing analogue of spec §4.6's
/// `PlannerPreferences` plus the externally-supplied time-window column
/// resolution `sql::synth` needs (see `TimeWindowTarget`'s doc comment).
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub sort_order: SortOrderPref,
    pub result_limit: u64,
    pub time_filter: TimeFilter,
    pub time_window_target: Option<TimeWindowTarget>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            sort_order: SortOrderPref::Default,
            result_limit: 0,
            time_filter: TimeFilter::AllTime,
            time_window_target: None,
        }
    }
}

/// Spec §6's result envelope, extended with `error_message` for the
/// fatal-error path spec §7 calls out separately ("fatal errors surface a
/// single `error_message` through the input-boundary return shape").
#[derive(Debug, Clone, Default)]
pub struct QueryEnvelope {
    pub result: Option<String>,
    pub query: Option<String>,
    pub corrected_query: Option<String>,
    pub error_message: Option<String>,
}

/// Composes the pipeline's collaborators (C1, C6, C8, and the C9
/// checkpointer) behind the single `query` entry point spec §6 names.
/// FK inference (C2–C4) and the interactive FK agent (C10) are schema-time
/// concerns, run ahead of `Agent` construction via `fk_inference`/
/// `fk_agent` directly rather than through this per-query facade.
pub struct Agent {
    introspector: Box<dyn SchemaIntrospector>,
    planner: Box<dyn Planner>,
    runner: Box<dyn QueryRunner>,
    checkpointer: Box<dyn Checkpointer>,
    domain_overlay: Option<DomainOverlayStore>,
    config: AgentConfig,
}

impl Agent {
    pub fn new(
        introspector: Box<dyn SchemaIntrospector>,
        planner: Box<dyn Planner>,
        runner: Box<dyn QueryRunner>,
        domain_overlay: Option<DomainOverlayStore>,
        config: AgentConfig,
    ) -> Self {
        Self {
            introspector,
            planner,
            runner,
            checkpointer: Box::new(InMemoryCheckpointer::default()),
            domain_overlay,
            config,
        }
    }

    /// Swaps the default in-memory checkpointer for a caller-supplied one
    /// (spec §9's "an injected collaborator" treatment of persistence).
    pub fn with_checkpointer(mut self, checkpointer: Box<dyn Checkpointer>) -> Self {
        self.checkpointer = checkpointer;
        self
    }

    /// Drives one question through the full C1/C6/C7/C8/C9 pipeline and
    /// returns the envelope spec §6 names. Never panics on a recoverable
    /// pipeline failure — every `CoreError` is folded into
    /// `QueryEnvelope.error_message` rather than propagated, matching
    /// spec §7's "fatal errors surface a single `error_message` through
    /// the input-boundary return shape."
    pub async fn query(&self, question: &str, opts: QueryOptions) -> QueryEnvelope {
        let mut state = WorkflowState::new(question, Schema::default());
        state.sort_order = opts.sort_order;
        state.result_limit = opts.result_limit;
        state.time_filter = opts.time_filter;

        let executor = Executor::new(
            self.runner.as_ref(),
            self.planner.as_ref(),
            self.config.dialect,
            self.config.max_retries,
            self.config.max_refinements,
        );
        let ctx = WorkflowContext {
            introspector: self.introspector.as_ref(),
            planner: self.planner.as_ref(),
            executor: &executor,
            time_window_target: opts.time_window_target.as_ref(),
        };

        let thread_id = uuid::Uuid::new_v4().to_string();
        let mut node = WorkflowNode::AnalyzeSchema;
        let mut initial_query: Option<String> = None;

        loop {
            let next = match workflow::step(node, &mut state, &ctx).await {
                Ok(n) => n,
                Err(e) => return self.fatal_envelope(&state, e),
            };

            match node {
                WorkflowNode::AnalyzeSchema => {
                    if !self.config.test_mode {
                        if let Some(overlay) = &self.domain_overlay {
                            overlay.apply(&mut state.schema);
                        }
                    }
                }
                WorkflowNode::GenerateQuery => {
                    initial_query = state.query.clone();
                }
                _ => {}
            }

            self.checkpointer.save(&thread_id, &state).await;
            node = next;
            if node == WorkflowNode::End {
                break;
            }
        }

        self.finish_envelope(state, initial_query)
    }

    fn fatal_envelope(&self, state: &WorkflowState, err: CoreError) -> QueryEnvelope {
        QueryEnvelope {
            result: None,
            query: state.query.clone(),
            corrected_query: None,
            error_message: Some(err.to_string()),
        }
    }

    fn finish_envelope(&self, state: WorkflowState, initial_query: Option<String>) -> QueryEnvelope {
        if let Some(output) = &state.planner_output {
            if matches!(output.decision, PlannerDecision::Refuse) {
                return QueryEnvelope {
                    result: None,
                    query: None,
                    corrected_query: None,
                    error_message: Some(output.intent_summary.clone()),
                };
            }
        }

        if state.rate_limited {
            return QueryEnvelope {
                result: None,
                query: state.query,
                corrected_query: None,
                error_message: Some(CoreError::RateLimitSignal.to_string()),
            };
        }

        if let Some(result) = state.result {
            let corrected_query = if state.query != initial_query {
                state.query
            } else {
                None
            };
            QueryEnvelope {
                result: Some(result),
                query: initial_query,
                corrected_query,
                error_message: None,
            }
        } else {
            QueryEnvelope {
                result: None,
                query: state.query,
                corrected_query: None,
                error_message: state.error_history.last().cloned(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use model::{
        Column, ForeignKey, GroupBy, JoinEdge, PlannerOutput, Selection, SelectionColumn,
        SubqueryFilter, WindowFunction,
    };
    use planner::MockPlanner;

    struct FixedIntrospector;

    #[async_trait]
    impl SchemaIntrospector for FixedIntrospector {
        async fn list_tables(&self) -> error::CoreResult<Vec<String>> {
            Ok(vec!["Users".to_string()])
        }
        async fn get_columns(&self, _table: &str) -> error::CoreResult<Vec<Column>> {
            Ok(vec![Column {
                name: "Id".to_string(),
                data_type: "int".to_string(),
                nullable: false,
            }])
        }
        async fn get_primary_key(&self, _table: &str) -> error::CoreResult<Option<String>> {
            Ok(Some("Id".to_string()))
        }
        async fn get_foreign_keys(&self, _table: &str) -> error::CoreResult<Vec<ForeignKey>> {
            Ok(vec![])
        }
    }

    struct FixedRunner(&'static str);

    #[async_trait]
    impl QueryRunner for FixedRunner {
        async fn run(&self, _query: &str) -> Result<String, String> {
            Ok(self.0.to_string())
        }
    }

    fn proceeding_output() -> PlannerOutput {
        PlannerOutput {
            decision: PlannerDecision::Proceed,
            intent_summary: "list users".to_string(),
            selections: vec![Selection {
                table: "Users".to_string(),
                alias: None,
                columns: vec![SelectionColumn {
                    table: "Users".to_string(),
                    column: "Id".to_string(),
                    role: model::ColumnRole::Projection,
                }],
                filters: vec![],
            }],
            join_edges: Vec::<JoinEdge>::new(),
            global_filters: vec![],
            group_by: Option::<GroupBy>::None,
            window_functions: Vec::<WindowFunction>::new(),
            subquery_filters: Vec::<SubqueryFilter>::new(),
            ctes: vec![],
            order_by: vec![],
            limit: None,
        }
    }

    #[tokio::test]
    async fn query_returns_result_with_matching_initial_query() {
        let agent = Agent::new(
            Box::new(FixedIntrospector),
            Box::new(MockPlanner {
                fixed_output: proceeding_output(),
                fixed_proposal: String::new(),
            }),
            Box::new(FixedRunner(r#"[{"Id":1}]"#)),
            None,
            AgentConfig::default(),
        );

        let envelope = agent.query("list users", QueryOptions::default()).await;
        assert_eq!(envelope.result.as_deref(), Some(r#"[{"Id":1}]"#));
        assert!(envelope.query.is_some());
        assert!(envelope.corrected_query.is_none());
        assert!(envelope.error_message.is_none());
    }

    #[tokio::test]
    async fn refusal_surfaces_intent_summary_as_error_message() {
        let mut output = proceeding_output();
        output.decision = PlannerDecision::Refuse;
        output.intent_summary = "question is out of scope".to_string();

        let agent = Agent::new(
            Box::new(FixedIntrospector),
            Box::new(MockPlanner {
                fixed_output: output,
                fixed_proposal: String::new(),
            }),
            Box::new(FixedRunner("[]")),
            None,
            AgentConfig::default(),
        );

        let envelope = agent.query("drop all tables", QueryOptions::default()).await;
        assert!(envelope.result.is_none());
        assert_eq!(envelope.error_message.as_deref(), Some("question is out of scope"));
    }
}
