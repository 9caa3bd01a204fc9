// SPDX-License-Identifier: Apache-2.0

//! Workflow Engine (C9) — spec §4.9.
//!
//! Per the design note that "dynamic dispatch over node functions becomes
//! a tagged sum type," nodes are a closed `WorkflowNode` enum rather than
//! the Python driver's registry of node functions
//! (`original_source/agent/create_agent.py`'s `workflow.add_node(...)`
//! calls). `step` is the Rust analogue of LangGraph's
//! `should_continue`/node-dispatch pair.

use crate::error::CoreResult;
use crate::executor::Executor;
use crate::model::WorkflowState;
use crate::planner::{Planner, PlannerPreferences};
use crate::schema::SchemaIntrospector;
use crate::sql::{synthesize, SynthesisOptions};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowNode {
    AnalyzeSchema,
    GenerateQuery,
    ExecuteQuery,
    HandleError,
    RefineQuery,
    Cleanup,
    End,
}

/// Persists a state snapshot after every node transition (spec §9:
/// "every node transition yields a persisted state snapshot"). An
/// injected collaborator, matching the excluded-infrastructure treatment
/// of persistent storage in spec §1.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, thread_id: &str, state: &WorkflowState);
    async fn load(&self, thread_id: &str) -> Option<WorkflowState>;
}

/// In-memory default, the way `virtual_relations/store.rs` provides a
/// concrete file-backed default for an otherwise-pluggable concern.
#[derive(Default)]
pub struct InMemoryCheckpointer {
    snapshots: Mutex<HashMap<String, WorkflowState>>,
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, thread_id: &str, state: &WorkflowState) {
        self.snapshots
            .lock()
            .await
            .insert(thread_id.to_string(), state.clone());
    }

    async fn load(&self, thread_id: &str) -> Option<WorkflowState> {
        self.snapshots.lock().await.get(thread_id).cloned()
    }
}

pub struct WorkflowContext<'a> {
    pub introspector: &'a dyn SchemaIntrospector,
    pub planner: &'a dyn Planner,
    pub executor: &'a Executor<'a>,
    pub time_window_target: Option<&'a crate::sql::TimeWindowTarget>,
}

/// Runs one node transition, returning the next node to enter.
/// Implements the `should_continue` routing rules of spec §4.9: stop at
/// the retry ceiling, stop on a rate-limit signal, route a successful
/// execution or a handled correction to cleanup, route an execution error
/// to `HandleError`.
#[instrument(skip(state, ctx), fields(node = ?node))]
pub async fn step(
    node: WorkflowNode,
    state: &mut WorkflowState,
    ctx: &WorkflowContext<'_>,
) -> CoreResult<WorkflowNode> {
    match node {
        WorkflowNode::AnalyzeSchema => {
            let schema = crate::schema::introspect(ctx.introspector).await?;
            state.schema = schema;
            state.last_step = "analyze_schema".to_string();
            Ok(WorkflowNode::GenerateQuery)
        }

        WorkflowNode::GenerateQuery => {
            let prefs = PlannerPreferences {
                sort_order: state.sort_order,
                result_limit: state.result_limit,
                time_filter: state.time_filter,
            };
            let output = ctx.planner.plan(&state.question, &state.schema, &prefs).await?;

            if matches!(output.decision, crate::model::PlannerDecision::Refuse) {
                state.last_step = "generate_query".to_string();
                state.planner_output = Some(output);
                return Ok(WorkflowNode::End);
            }

            let opts = SynthesisOptions {
                dialect: ctx.executor.dialect(),
                sort_order: state.sort_order,
                result_limit: state.result_limit,
                time_filter: state.time_filter,
                time_window_target: ctx.time_window_target,
            };
            let (query, projection_columns) = synthesize(&output, &opts)?;

            state.planner_output = Some(output);
            state.query = Some(ctx.executor.dialect().wrap_json(&query, &projection_columns));
            state.last_step = "generate_query".to_string();
            Ok(WorkflowNode::ExecuteQuery)
        }

        WorkflowNode::ExecuteQuery => match ctx.executor.execute(state).await {
            Ok(()) => Ok(WorkflowNode::Cleanup),
            Err(crate::error::CoreError::RateLimitSignal) => Ok(WorkflowNode::End),
            Err(crate::error::CoreError::EmptyResult) => Ok(WorkflowNode::Cleanup),
            Err(_) if state.retry_count >= ctx.executor.max_retries() => Ok(WorkflowNode::End),
            Err(_) => Ok(WorkflowNode::HandleError),
        },

        // The executor owns the retry/refinement loops internally (spec
        // §4.8); `HandleError`/`RefineQuery` exist as explicit workflow
        // states for checkpoint visibility, and always hand back to
        // `ExecuteQuery` per `original_source/agent/create_agent.py`'s
        // `workflow.add_edge("handle_error", "execute_query")`.
        WorkflowNode::HandleError => {
            state.last_step = "handle_error".to_string();
            Ok(WorkflowNode::ExecuteQuery)
        }

        WorkflowNode::RefineQuery => {
            state.last_step = "refine_query".to_string();
            Ok(WorkflowNode::ExecuteQuery)
        }

        WorkflowNode::Cleanup => {
            state.last_step = "cleanup".to_string();
            Ok(WorkflowNode::End)
        }

        WorkflowNode::End => Ok(WorkflowNode::End),
    }
}

/// Drives the node graph from `AnalyzeSchema` to `End`, checkpointing
/// after every transition.
pub async fn run(
    thread_id: &str,
    mut state: WorkflowState,
    ctx: &WorkflowContext<'_>,
    checkpointer: &dyn Checkpointer,
) -> CoreResult<WorkflowState> {
    let mut node = WorkflowNode::AnalyzeSchema;
    loop {
        node = step(node, &mut state, ctx).await?;
        checkpointer.save(thread_id, &state).await;
        if node == WorkflowNode::End {
            return Ok(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checkpointer_round_trips_state() {
        let checkpointer = InMemoryCheckpointer::default();
        let state = WorkflowState::new("q", crate::model::Schema::default());
        checkpointer.save("thread-1", &state).await;
        let loaded = checkpointer.load("thread-1").await.unwrap();
        assert_eq!(loaded.question, "q");
    }

    #[tokio::test]
    async fn missing_thread_returns_none() {
        let checkpointer = InMemoryCheckpointer::default();
        assert!(checkpointer.load("nonexistent").await.is_none());
    }
}
