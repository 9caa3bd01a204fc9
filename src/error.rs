// SPDX-License-Identifier: Apache-2.0

//! Error kinds for the orchestration core.
//!
//! One enum per spec §7's error taxonomy, mirrored on the shape of a
//! `thiserror` enum with helper constructors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("schema introspection failed: {0}")]
    SchemaIntrospection(String),

    #[error("planner error: {0}")]
    Planner(String),

    #[error("SQL synthesis failed: {0}")]
    SqlSynthesis(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("invalid column name '{column}': {message}")]
    InvalidColumnName { column: String, message: String },

    #[error("query returned no rows")]
    EmptyResult,

    #[error("rate limit signal observed from language model provider")]
    RateLimitSignal,
}

impl CoreError {
    pub fn schema_introspection(msg: impl Into<String>) -> Self {
        Self::SchemaIntrospection(msg.into())
    }

    pub fn planner(msg: impl Into<String>) -> Self {
        Self::Planner(msg.into())
    }

    pub fn sql_synthesis(msg: impl Into<String>) -> Self {
        Self::SqlSynthesis(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    pub fn invalid_column_name(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidColumnName {
            column: column.into(),
            message: message.into(),
        }
    }

    /// True for errors that feed a retry/refinement loop rather than
    /// escaping the request immediately (spec §7 propagation policy).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Execution(_) | Self::InvalidColumnName { .. } | Self::EmptyResult
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
