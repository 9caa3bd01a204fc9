// SPDX-License-Identifier: Apache-2.0

//! Injected configuration record.
//!
//! Per spec §9's design note: "global mutable state... is modeled as an
//! injected configuration record passed at workflow construction. No
//! module-level singletons." `AgentConfig` is built once (typically by
//! `main()` from the environment) and threaded through every component
//! that needs it.

/// Maximum error-retry attempts for the executor's error-retry loop
/// (spec §3: `retry_count <= MAX_RETRIES`).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// SQL dialect the synthesizer and introspector target for this session.
    pub dialect: crate::sql::dialect::Dialect,

    /// When true, the domain overlay (C5) is skipped entirely, matching
    /// `original_source`'s `USE_TEST_DB` guard.
    pub test_mode: bool,

    /// Ceiling on the executor's error-retry loop (spec §3, §4.8).
    pub max_retries: u32,

    /// Ceiling on the executor's empty-result refinement loop. Not fixed
    /// by the source (spec §9 open question); exposed here with a small
    /// default.
    pub max_refinements: u32,

    /// Minimum top-candidate similarity score for C4 to auto-accept an
    /// inferred foreign key (spec §4.4).
    pub fk_confidence_threshold: f32,

    /// Score-gap threshold above which C10 auto-selects the top candidate
    /// instead of suspending for human adjudication (spec §4.10 step 5).
    pub fk_agent_auto_select_threshold: f32,

    /// Number of FK candidates retrieved per ID column (spec §4.4 step 2,
    /// §4.10 step 3).
    pub fk_candidate_top_k: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            dialect: crate::sql::dialect::Dialect::Sqlite,
            test_mode: false,
            max_retries: DEFAULT_MAX_RETRIES,
            max_refinements: 3,
            fk_confidence_threshold: 0.6,
            fk_agent_auto_select_threshold: 0.10,
            fk_candidate_top_k: 3,
        }
    }
}

impl AgentConfig {
    /// Builds a config from environment variables, falling back to
    /// defaults for anything unset. Loaded once at the composition root,
    /// via the same `dotenvy`-backed env loading used elsewhere.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(dialect) = std::env::var("QSQL_DIALECT") {
            if let Some(d) = crate::sql::dialect::Dialect::from_str(&dialect) {
                cfg.dialect = d;
            }
        }

        cfg.test_mode = std::env::var("USE_TEST_DB")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if let Ok(v) = std::env::var("QSQL_MAX_REFINEMENTS") {
            if let Ok(n) = v.parse() {
                cfg.max_refinements = n;
            }
        }

        cfg
    }
}
