// SPDX-License-Identifier: Apache-2.0

//! Interactive FK Agent (C10) — spec §4.10.
//!
//! Grounded in full on
//! `original_source/fk_inferencing_agent/{state,cli,nodes/*}.py`: the
//! `skip-primary-keys` auto-skip, the find-candidates/evaluate-ambiguity/
//! auto-select/request-decision/record-decision node sequence, and the
//! `excel_manager.py` "first row with an empty chosen_table is
//! incomplete" resumability rule (ported here onto a CSV sink rather than
//! `openpyxl`, per DESIGN.md).
//!
//! Suspend/resume is the synchronous translation of the Python driver's
//! `for event in agent.stream(...)` / `Command(resume=...)` loop in
//! `cli.py`: `run_until_interrupt` returns as soon as a decision is
//! needed, and `resume` re-enters at `record_decision` with the caller's
//! choice.

use crate::embedding::{EmbeddingIndex, EmbeddingProvider};
use crate::error::CoreResult;
use crate::id_columns::detect_id_columns;
use crate::model::{Candidate, DecisionType, FkDecisionRow, Schema};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FkAgentNode {
    Initialize,
    LoadNextRow,
    FindCandidates,
    EvaluateAmbiguity,
    AutoSelect,
    RequestDecision,
    RecordDecision,
    Finalize,
}

/// Mirrors `FKInferencingState` (spec §3 supplement): the full set of
/// per-row working fields plus the running totals the CLI reports at the
/// end of a session.
#[derive(Debug, Clone)]
pub struct FkAgentState {
    pub threshold: f32,
    pub top_k: usize,
    pub skip_primary_keys: bool,

    pub schema: Schema,
    pub pending: Vec<(String, String, String)>, // (table, column, base_name)

    pub current_row_idx: Option<usize>,
    pub current_table: String,
    pub current_column: String,
    pub current_base_name: String,
    pub current_is_pk: bool,

    pub candidates: Vec<Candidate>,
    pub score_gap: f32,

    pub chosen_table: Option<String>,
    pub chosen_score: Option<f32>,
    pub decision_type: Option<DecisionType>,
    pub notes: String,

    pub has_next_row: bool,
    pub user_quit: bool,

    pub total_rows: usize,
    pub processed_count: usize,
}

impl FkAgentState {
    pub fn new(schema: Schema, threshold: f32, top_k: usize, skip_primary_keys: bool) -> Self {
        let mut pending = Vec::new();
        for table in &schema.tables {
            for (column, base_name) in detect_id_columns(table) {
                pending.push((table.table_name.clone(), column, base_name));
            }
        }
        let total_rows = pending.len();

        Self {
            threshold,
            top_k,
            skip_primary_keys,
            schema,
            pending,
            current_row_idx: None,
            current_table: String::new(),
            current_column: String::new(),
            current_base_name: String::new(),
            current_is_pk: false,
            candidates: Vec::new(),
            score_gap: 0.0,
            chosen_table: None,
            chosen_score: None,
            decision_type: None,
            notes: String::new(),
            has_next_row: true,
            user_quit: false,
            total_rows,
            processed_count: 0,
        }
    }
}

/// The five interactive options `request_decision` offers (spec §4.10
/// step 6): pick a candidate by 1-based index, mark the column as a
/// primary key (skip), skip outright, or quit and save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeChoice {
    SelectCandidate(usize),
    MarkPrimaryKey,
    Skip,
    Quit,
}

#[derive(Debug, Clone)]
pub struct InterruptDescriptor {
    pub table: String,
    pub column: String,
    pub base_name: String,
    pub candidates: Vec<Candidate>,
    pub score_gap: f32,
    pub threshold: f32,
}

#[derive(Debug, Clone, Default)]
pub struct FkAgentStats {
    pub total: usize,
    pub auto: usize,
    pub manual: usize,
    pub existing: usize,
    pub skipped: usize,
}

pub enum FkAgentOutcome {
    Suspended(InterruptDescriptor),
    Finished(FkAgentStats),
}

/// Append-only tabular audit sink (spec §1's "persistent audit storage").
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn write_candidates(&self, row_idx: usize, candidates: &[Candidate]) -> CoreResult<()>;
    async fn write_decision(&self, row_idx: usize, row: &FkDecisionRow) -> CoreResult<()>;
    /// Index of the first row whose `chosen_table` is still unset, or
    /// `None` if every row is complete — the resumability contract spec
    /// §4.10 asks for.
    async fn find_next_incomplete_row(&self) -> CoreResult<Option<usize>>;
    async fn statistics(&self) -> CoreResult<FkAgentStats>;
}

/// CSV-backed default audit sink. One row per detected ID column, columns:
/// `table_name, fk_column, base_name, candidate_1..5, score_1..5,
/// chosen_table, chosen_score, decision_type, timestamp, notes`.
pub struct CsvAuditSink {
    rows: tokio::sync::Mutex<Vec<FkDecisionRow>>,
    path: std::path::PathBuf,
}

const AUDIT_HEADER: &[&str] = &[
    "table_name",
    "fk_column",
    "base_name",
    "candidate_1",
    "score_1",
    "candidate_2",
    "score_2",
    "candidate_3",
    "score_3",
    "candidate_4",
    "score_4",
    "candidate_5",
    "score_5",
    "chosen_table",
    "chosen_score",
    "decision_type",
    "timestamp",
    "notes",
];

impl CsvAuditSink {
    /// Loads an existing audit file, or seeds one row per `(table,
    /// column, base_name)` if `path` does not yet exist — matching
    /// `excel_manager.create_excel`'s "only create if missing" behavior.
    pub fn open_or_create(
        path: &std::path::Path,
        pending: &[(String, String, String)],
        existing_fks: impl Fn(&str, &str) -> Option<&'static str>,
    ) -> CoreResult<Self> {
        let _ = existing_fks;
        let rows = if path.exists() {
            Self::load(path)?
        } else {
            pending
                .iter()
                .map(|(table, column, base)| FkDecisionRow {
                    table: table.clone(),
                    fk_column: column.clone(),
                    base_name: base.clone(),
                    candidates: Vec::new(),
                    chosen_table: None,
                    chosen_score: None,
                    decision_type: None,
                    timestamp: None,
                    notes: String::new(),
                })
                .collect()
        };

        Ok(Self {
            rows: tokio::sync::Mutex::new(rows),
            path: path.to_path_buf(),
        })
    }

    fn load(path: &std::path::Path) -> CoreResult<Vec<FkDecisionRow>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|e| crate::error::CoreError::execution(format!("failed to open audit csv: {e}")))?;

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| crate::error::CoreError::execution(e.to_string()))?;
            let get = |i: usize| record.get(i).unwrap_or("").to_string();

            let mut candidates = Vec::new();
            for slot in 0..5 {
                let table_col = 3 + slot * 2;
                let score_col = 4 + slot * 2;
                let table = get(table_col);
                if table.is_empty() {
                    continue;
                }
                if let Ok(score) = get(score_col).parse::<f32>() {
                    candidates.push(Candidate { table, score });
                }
            }

            let chosen_table = get(13);
            rows.push(FkDecisionRow {
                table: get(0),
                fk_column: get(1),
                base_name: get(2),
                candidates,
                chosen_table: if chosen_table.is_empty() { None } else { Some(chosen_table) },
                chosen_score: get(14).parse().ok(),
                decision_type: parse_decision_type(&get(15)),
                timestamp: get(16).parse().ok(),
                notes: get(17),
            });
        }
        Ok(rows)
    }

    async fn flush(&self, rows: &[FkDecisionRow]) -> CoreResult<()> {
        let mut writer = csv::Writer::from_path(&self.path)
            .map_err(|e| crate::error::CoreError::execution(format!("failed to write audit csv: {e}")))?;
        writer
            .write_record(AUDIT_HEADER)
            .map_err(|e| crate::error::CoreError::execution(e.to_string()))?;

        for row in rows {
            let mut fields = vec![row.table.clone(), row.fk_column.clone(), row.base_name.clone()];
            for slot in 0..5 {
                if let Some(c) = row.candidates.get(slot) {
                    fields.push(c.table.clone());
                    fields.push(format!("{:.3}", c.score));
                } else {
                    fields.push(String::new());
                    fields.push(String::new());
                }
            }
            fields.push(row.chosen_table.clone().unwrap_or_default());
            fields.push(row.chosen_score.map(|s| format!("{s:.3}")).unwrap_or_default());
            fields.push(row.decision_type.map(decision_type_str).unwrap_or_default().to_string());
            fields.push(row.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default());
            fields.push(row.notes.clone());

            writer
                .write_record(&fields)
                .map_err(|e| crate::error::CoreError::execution(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| crate::error::CoreError::execution(e.to_string()))
    }
}

fn decision_type_str(d: DecisionType) -> &'static str {
    match d {
        DecisionType::Auto => "auto",
        DecisionType::Manual => "manual",
        DecisionType::Existing => "existing",
        DecisionType::Skipped => "skipped",
    }
}

fn parse_decision_type(s: &str) -> Option<DecisionType> {
    match s {
        "auto" => Some(DecisionType::Auto),
        "manual" => Some(DecisionType::Manual),
        "existing" => Some(DecisionType::Existing),
        "skipped" => Some(DecisionType::Skipped),
        _ => None,
    }
}

#[async_trait::async_trait]
impl AuditSink for CsvAuditSink {
    async fn write_candidates(&self, row_idx: usize, candidates: &[Candidate]) -> CoreResult<()> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.get_mut(row_idx) {
            row.candidates = candidates.to_vec();
        }
        self.flush(&rows).await
    }

    async fn write_decision(&self, row_idx: usize, decision: &FkDecisionRow) -> CoreResult<()> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.get_mut(row_idx) {
            row.chosen_table = decision.chosen_table.clone();
            row.chosen_score = decision.chosen_score;
            row.decision_type = decision.decision_type;
            row.notes = decision.notes.clone();
            row.timestamp = decision.timestamp;
        }
        self.flush(&rows).await
    }

    async fn find_next_incomplete_row(&self) -> CoreResult<Option<usize>> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().position(|r| r.is_incomplete()))
    }

    async fn statistics(&self) -> CoreResult<FkAgentStats> {
        let rows = self.rows.lock().await;
        let mut stats = FkAgentStats {
            total: rows.len(),
            ..Default::default()
        };
        for row in rows.iter() {
            match row.decision_type {
                Some(DecisionType::Auto) => stats.auto += 1,
                Some(DecisionType::Manual) => stats.manual += 1,
                Some(DecisionType::Existing) => stats.existing += 1,
                Some(DecisionType::Skipped) => stats.skipped += 1,
                None => {}
            }
        }
        Ok(stats)
    }
}

/// Drives the node sequence from `LoadNextRow` through `RequestDecision`,
/// returning as soon as a human decision is needed, or `Finished` once
/// every row is complete — the synchronous equivalent of the Python
/// driver streaming events until `__interrupt__` appears.
pub async fn run_until_interrupt(
    state: &mut FkAgentState,
    index: &EmbeddingIndex,
    provider: &dyn EmbeddingProvider,
    sink: &dyn AuditSink,
) -> CoreResult<FkAgentOutcome> {
    loop {
        load_next_row(state, sink).await?;
        if !state.has_next_row {
            let stats = sink.statistics().await?;
            return Ok(FkAgentOutcome::Finished(stats));
        }

        if state.skip_primary_keys && state.current_is_pk {
            record_skip(state, "Marked as primary key (auto-skip)");
            record_decision(state, sink).await?;
            continue;
        }

        find_candidates(state, index, provider).await?;
        write_candidates_to_sink(state, sink).await?;

        if state.candidates.is_empty() {
            record_skip(state, "No candidates found");
            record_decision(state, sink).await?;
            continue;
        }

        evaluate_ambiguity(state);

        if state.score_gap >= state.threshold {
            auto_select(state);
            record_decision(state, sink).await?;
            continue;
        }

        return Ok(FkAgentOutcome::Suspended(InterruptDescriptor {
            table: state.current_table.clone(),
            column: state.current_column.clone(),
            base_name: state.current_base_name.clone(),
            candidates: state.candidates.iter().take(5).cloned().collect(),
            score_gap: state.score_gap,
            threshold: state.threshold,
        }));
    }
}

/// Re-enters at `record_decision` with the human's choice (spec §4.10
/// step 6), then continues the loop until the next interrupt or
/// completion.
pub async fn resume(
    state: &mut FkAgentState,
    choice: ResumeChoice,
    index: &EmbeddingIndex,
    provider: &dyn EmbeddingProvider,
    sink: &dyn AuditSink,
) -> CoreResult<FkAgentOutcome> {
    match choice {
        ResumeChoice::Quit => {
            state.user_quit = true;
            record_skip(state, "User quit session");
        }
        ResumeChoice::Skip => record_skip(state, "User skipped this FK"),
        ResumeChoice::MarkPrimaryKey => record_skip(state, "Marked as primary key by user"),
        ResumeChoice::SelectCandidate(one_based) => {
            let idx = one_based.checked_sub(1);
            match idx.and_then(|i| state.candidates.get(i)) {
                Some(candidate) => {
                    state.chosen_table = Some(candidate.table.clone());
                    state.chosen_score = Some(candidate.score);
                    state.decision_type = Some(DecisionType::Manual);
                    state.notes = format!("User selected option {one_based}");
                }
                None => record_skip(state, &format!("Invalid choice: {one_based}")),
            }
        }
    }

    record_decision(state, sink).await?;

    if state.user_quit {
        let stats = sink.statistics().await?;
        return Ok(FkAgentOutcome::Finished(stats));
    }

    run_until_interrupt(state, index, provider, sink).await
}

async fn load_next_row(state: &mut FkAgentState, sink: &dyn AuditSink) -> CoreResult<()> {
    let next = sink.find_next_incomplete_row().await?;
    match next {
        None => {
            state.has_next_row = false;
            state.current_row_idx = None;
        }
        Some(row_idx) => {
            let (table, column, base_name) = state
                .pending
                .get(row_idx)
                .cloned()
                .ok_or_else(|| crate::error::CoreError::execution("audit row index out of range"))?;

            state.current_row_idx = Some(row_idx);
            state.current_table = table;
            state.current_column = column;
            state.current_base_name = base_name;
            state.current_is_pk = state
                .schema
                .find_table(&state.current_table)
                .and_then(|t| t.primary_key.as_deref())
                .map(|pk| pk.eq_ignore_ascii_case(&state.current_column))
                .unwrap_or(false);
            state.has_next_row = true;
            state.processed_count += 1;

            state.candidates.clear();
            state.score_gap = 0.0;
            state.chosen_table = None;
            state.chosen_score = None;
            state.decision_type = None;
            state.notes.clear();
        }
    }
    Ok(())
}

async fn find_candidates(
    state: &mut FkAgentState,
    index: &EmbeddingIndex,
    provider: &dyn EmbeddingProvider,
) -> CoreResult<()> {
    let results = crate::fk_inference::find_candidate_tables(
        &state.current_base_name,
        index,
        provider,
        &state.current_table,
        state.top_k,
    )
    .await
    .unwrap_or_default();

    state.candidates = results
        .into_iter()
        .map(|(table, score)| Candidate {
            table: table.table_name,
            score,
        })
        .collect();

    info!(
        table = %state.current_table,
        column = %state.current_column,
        found = state.candidates.len(),
        "fk candidates found"
    );
    Ok(())
}

async fn write_candidates_to_sink(state: &FkAgentState, sink: &dyn AuditSink) -> CoreResult<()> {
    if let Some(row_idx) = state.current_row_idx {
        sink.write_candidates(row_idx, &state.candidates).await?;
    }
    Ok(())
}

/// Score gap between the top two candidates (spec §4.10 step 4): a
/// single candidate is treated as a clear winner (`gap = 1.0`), no
/// candidates as `0.0`.
fn evaluate_ambiguity(state: &mut FkAgentState) {
    state.score_gap = match state.candidates.len() {
        0 => 0.0,
        1 => 1.0,
        _ => state.candidates[0].score - state.candidates[1].score,
    };
}

fn auto_select(state: &mut FkAgentState) {
    let top = &state.candidates[0];
    state.chosen_table = Some(top.table.clone());
    state.chosen_score = Some(top.score);
    state.decision_type = Some(DecisionType::Auto);
    state.notes = format!("Gap: {:.3} >= threshold", state.score_gap);
}

fn record_skip(state: &mut FkAgentState, reason: &str) {
    state.chosen_table = Some("[SKIPPED]".to_string());
    state.chosen_score = None;
    state.decision_type = Some(DecisionType::Skipped);
    state.notes = reason.to_string();
}

async fn record_decision(state: &mut FkAgentState, sink: &dyn AuditSink) -> CoreResult<()> {
    let Some(row_idx) = state.current_row_idx else {
        return Ok(());
    };
    let row = FkDecisionRow {
        table: state.current_table.clone(),
        fk_column: state.current_column.clone(),
        base_name: state.current_base_name.clone(),
        candidates: state.candidates.clone(),
        chosen_table: state.chosen_table.clone(),
        chosen_score: state.chosen_score,
        decision_type: state.decision_type,
        timestamp: Some(chrono::Utc::now()),
        notes: state.notes.clone(),
    };
    sink.write_decision(row_idx, &row).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_candidate_is_clear_winner() {
        let mut state = FkAgentState::new(Schema::default(), 0.1, 3, true);
        state.candidates = vec![Candidate {
            table: "tb_Company".to_string(),
            score: 0.9,
        }];
        evaluate_ambiguity(&mut state);
        assert_eq!(state.score_gap, 1.0);
    }

    #[test]
    fn gap_is_difference_of_top_two() {
        let mut state = FkAgentState::new(Schema::default(), 0.1, 3, true);
        state.candidates = vec![
            Candidate { table: "A".to_string(), score: 0.9 },
            Candidate { table: "B".to_string(), score: 0.5 },
        ];
        evaluate_ambiguity(&mut state);
        assert!((state.score_gap - 0.4).abs() < 1e-6);
    }

    #[test]
    fn auto_select_picks_top_candidate() {
        let mut state = FkAgentState::new(Schema::default(), 0.1, 3, true);
        state.candidates = vec![Candidate {
            table: "tb_Region".to_string(),
            score: 0.8,
        }];
        state.score_gap = 0.3;
        auto_select(&mut state);
        assert_eq!(state.chosen_table, Some("tb_Region".to_string()));
        assert_eq!(state.decision_type, Some(DecisionType::Auto));
    }

    #[test]
    fn resume_select_candidate_out_of_range_is_skipped() {
        let mut state = FkAgentState::new(Schema::default(), 0.1, 3, true);
        state.candidates = vec![Candidate {
            table: "A".to_string(),
            score: 0.8,
        }];
        // Simulating the branch `resume()` takes without async machinery.
        let idx: Option<usize> = 9usize.checked_sub(1);
        assert!(idx.and_then(|i| state.candidates.get(i)).is_none());
    }
}
