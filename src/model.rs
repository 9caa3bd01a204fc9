// SPDX-License-Identifier: Apache-2.0

//! Core data model — spec §3.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ordered sequence of tables making up a normalized schema document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<Table>,
}

impl Schema {
    pub fn find_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.table_name == name)
    }

    pub fn find_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.table_name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub table_name: String,
    pub columns: Vec<Column>,
    /// Single-column PK name, or `None` if composite/absent (spec §3).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TableMetadata>,
}

/// Free-form subset of `{description, key_columns}` (spec §3, §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Canonicalized type string: COLLATE clauses stripped, whitespace
    /// collapsed (spec §4.1).
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    pub fk_column: String,
    pub pk_table: String,
    /// `None` when a composite constraint's referenced-column list is
    /// shorter than its constrained-column list (spec §3).
    pub pk_column: Option<String>,
    pub inferred: bool,
    /// Present iff `inferred`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

// ─── PlannerOutput (contract between C6 and C7) ────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerDecision {
    Proceed,
    Refuse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerOutput {
    pub decision: PlannerDecision,
    #[serde(default)]
    pub intent_summary: String,
    #[serde(default)]
    pub selections: Vec<Selection>,
    #[serde(default)]
    pub join_edges: Vec<JoinEdge>,
    #[serde(default)]
    pub global_filters: Vec<FilterPredicate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<GroupBy>,
    #[serde(default)]
    pub window_functions: Vec<WindowFunction>,
    #[serde(default)]
    pub subquery_filters: Vec<SubqueryFilter>,
    #[serde(default)]
    pub ctes: Vec<Cte>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Projection,
    Filter,
    GroupBy,
    Aggregate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionColumn {
    pub table: String,
    pub column: String,
    pub role: ColumnRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub columns: Vec<SelectionColumn>,
    #[serde(default)]
    pub filters: Vec<FilterPredicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinEdge {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub join_type: JoinType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    In,
    Between,
    Like,
    Ilike,
    #[serde(rename = "is null")]
    IsNull,
    #[serde(rename = "is not null")]
    IsNotNull,
}

/// A filter value: scalar, list (for `in`/`between`), or a
/// `Table.Column`-shaped string treated as a column reference (spec
/// §4.7.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<FilterValue>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub table: String,
    pub column: String,
    pub op: FilterOp,
    #[serde(default = "default_filter_value")]
    pub value: FilterValue,
}

fn default_filter_value() -> FilterValue {
    FilterValue::Null
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFunction {
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregate {
    pub function: AggregateFunction,
    pub table: String,
    /// May itself be a SQL expression string (spec §3).
    pub column: String,
    pub alias: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupBy {
    pub group_by_columns: Vec<SelectionColumn>,
    #[serde(default)]
    pub aggregates: Vec<Aggregate>,
    #[serde(default)]
    pub having_filters: Vec<FilterPredicate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowFunction {
    pub function: String,
    #[serde(default)]
    pub partition_by: Vec<SelectionColumn>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    pub alias: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubqueryFilter {
    pub outer_table: String,
    pub outer_column: String,
    pub op: FilterOp,
    pub subquery_table: String,
    pub subquery_column: String,
    #[serde(default)]
    pub subquery_filters: Vec<FilterPredicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBy {
    pub table: String,
    pub column: String,
    pub direction: SortDirection,
}

/// A CTE reduces through the same synthesizer recursively (spec §4.7.1
/// step 7): it is itself a nested `PlannerOutput`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cte {
    pub name: String,
    pub output: Box<PlannerOutput>,
}

// ─── WorkflowState (C9) ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrderPref {
    Default,
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeFilter {
    AllTime,
    Last30Days,
    Last60Days,
    Last90Days,
    LastYear,
}

impl TimeFilter {
    /// Day-window mapping from spec §4.6: `Last 30/60/90 Days -> 30/60/90`,
    /// `Last Year -> 365`, `All Time -> None`.
    pub fn day_window(&self) -> Option<u32> {
        match self {
            Self::AllTime => None,
            Self::Last30Days => Some(30),
            Self::Last60Days => Some(60),
            Self::Last90Days => Some(90),
            Self::LastYear => Some(365),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub question: String,
    pub schema: Schema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planner_output: Option<PlannerOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub sort_order: SortOrderPref,
    pub result_limit: u64,
    pub time_filter: TimeFilter,
    pub last_step: String,
    #[serde(default)]
    pub error_history: Vec<String>,
    #[serde(default)]
    pub correction_history: Vec<String>,
    #[serde(default)]
    pub refinement_history: Vec<String>,
    #[serde(default)]
    pub refined_queries: Vec<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub refined_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_time: Option<chrono::DateTime<chrono::Utc>>,
    /// Set when the executor observes a rate-limit signal from the LM
    /// (spec §4.9's `should_continue` routing).
    #[serde(default)]
    pub rate_limited: bool,
}

impl WorkflowState {
    pub fn new(question: impl Into<String>, schema: Schema) -> Self {
        Self {
            question: question.into(),
            schema,
            planner_output: None,
            query: None,
            result: None,
            sort_order: SortOrderPref::Default,
            result_limit: 0,
            time_filter: TimeFilter::AllTime,
            last_step: "start".to_string(),
            error_history: Vec::new(),
            correction_history: Vec::new(),
            refinement_history: Vec::new(),
            refined_queries: Vec::new(),
            retry_count: 0,
            refined_count: 0,
            last_attempt_time: None,
            rate_limited: false,
        }
    }
}

// ─── FKDecisionRow (C10 audit record) ───────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionType {
    Auto,
    Manual,
    Existing,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub table: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FkDecisionRow {
    pub table: String,
    pub fk_column: String,
    pub base_name: String,
    /// Up to 5 candidates, in descending score order.
    pub candidates: Vec<Candidate>,
    pub chosen_table: Option<String>,
    pub chosen_score: Option<f32>,
    pub decision_type: Option<DecisionType>,
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub notes: String,
}

impl FkDecisionRow {
    pub fn is_incomplete(&self) -> bool {
        self.chosen_table.is_none()
    }
}

/// Curated FK overlay entry (C5), keyed by table in
/// `domain-specific-foreign-keys.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratedForeignKeys {
    pub table_name: String,
    pub foreign_keys: Vec<ForeignKey>,
}

/// Curated metadata overlay entry (C5), keyed by table in
/// `domain-specific-table-metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratedTableMetadata {
    pub table_name: String,
    #[serde(flatten)]
    pub metadata: HashMap<String, serde_json::Value>,
}
