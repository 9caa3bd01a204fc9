// SPDX-License-Identifier: Apache-2.0

//! Thin binary entry point.
//!
//! Configuration loading, logging infrastructure, and the language model
//! provider are treated as external collaborators, so this binary exists
//! only to wire the real things (env-loaded config, a
//! `tracing-subscriber` sink, a concrete database connection) around the
//! `Agent` facade `lib.rs` composes.

use qsql_agent::config::AgentConfig;
use qsql_agent::executor::QueryRunner;
use qsql_agent::model::PlannerOutput;
use qsql_agent::planner::{MockPlanner, Planner};
use qsql_agent::runner::{SqliteRunner, TSqlRunner};
use qsql_agent::schema::sqlite::SqliteIntrospector;
use qsql_agent::schema::tsql::TSqlIntrospector;
use qsql_agent::schema::SchemaIntrospector;
use qsql_agent::sql::Dialect;
use qsql_agent::{Agent, QueryOptions};
use std::path::Path;
use tracing_subscriber::EnvFilter;

type MainResult<T> = Result<T, Box<dyn std::error::Error>>;

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("qsql_agent=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
}

/// No HTTP-backed language model ships with this crate (spec §1); a real
/// deployment swaps this for a provider implementing `Planner` over the
/// backend of its choice, the way `ai/provider.rs`'s multi-backend trait
/// lets `AiManager` swap providers without touching its callers.
/// `QSQL_FIXED_PLANNER_OUTPUT` lets this binary be exercised end-to-end
/// against a real database without a live LM by supplying a literal
/// `PlannerOutput` JSON document, mirroring `original_source`'s
/// `USE_TEST_DB` substitution pattern.
fn build_planner() -> Box<dyn Planner> {
    let fixed_output = std::env::var("QSQL_FIXED_PLANNER_OUTPUT")
        .ok()
        .and_then(|raw| serde_json::from_str::<PlannerOutput>(&raw).ok())
        .unwrap_or_else(|| PlannerOutput {
            decision: qsql_agent::model::PlannerDecision::Refuse,
            intent_summary: "no language model provider is configured".to_string(),
            selections: vec![],
            join_edges: vec![],
            global_filters: vec![],
            group_by: None,
            window_functions: vec![],
            subquery_filters: vec![],
            ctes: vec![],
            order_by: vec![],
            limit: None,
        });

    Box::new(MockPlanner {
        fixed_output,
        fixed_proposal: String::new(),
    })
}

async fn build_sqlite_collaborators(
    url: &str,
) -> MainResult<(Box<dyn SchemaIntrospector>, Box<dyn QueryRunner>)> {
    let pool = sqlx::SqlitePool::connect(url).await?;
    Ok((
        Box::new(SqliteIntrospector::new(pool.clone())),
        Box::new(SqliteRunner::new(pool)),
    ))
}

async fn build_tsql_collaborators(
    connection_string: &str,
) -> MainResult<(Box<dyn SchemaIntrospector>, Box<dyn QueryRunner>)> {
    use tokio::net::TcpStream;
    use tokio_util::compat::TokioAsyncWriteCompatExt;

    let introspect_config = tiberius::Config::from_ado_string(connection_string)?;
    let introspect_tcp = TcpStream::connect(introspect_config.get_addr()).await?;
    introspect_tcp.set_nodelay(true)?;
    let introspect_client =
        tiberius::Client::connect(introspect_config, introspect_tcp.compat_write()).await?;

    let exec_config = tiberius::Config::from_ado_string(connection_string)?;
    let exec_tcp = TcpStream::connect(exec_config.get_addr()).await?;
    exec_tcp.set_nodelay(true)?;
    let exec_client = tiberius::Client::connect(exec_config, exec_tcp.compat_write()).await?;

    Ok((
        Box::new(TSqlIntrospector::new(introspect_client)),
        Box::new(TSqlRunner::new(exec_client)),
    ))
}

#[tokio::main]
async fn main() -> MainResult<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AgentConfig::from_env();

    let (introspector, runner) = match config.dialect {
        Dialect::Sqlite => {
            let url = std::env::var("QSQL_DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());
            build_sqlite_collaborators(&url).await?
        }
        Dialect::TSql => {
            let connection_string = std::env::var("QSQL_DATABASE_URL")
                .expect("QSQL_DATABASE_URL must be set for the tsql dialect");
            build_tsql_collaborators(&connection_string).await?
        }
    };

    let domain_overlay = qsql_agent::domain_overlay::DomainOverlayStore::load(
        Path::new("domain_table_metadata.json"),
        Path::new("domain_foreign_keys.json"),
    );

    let agent = Agent::new(introspector, build_planner(), runner, domain_overlay, config);

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.is_empty() {
        eprintln!("usage: qsql-agent <question>");
        std::process::exit(2);
    }

    let envelope = agent.query(&question, QueryOptions::default()).await;
    println!("{}", serde_json::to_string_pretty(&EnvelopeJson::from(envelope))?);

    Ok(())
}

/// `QueryEnvelope` carries no `Serialize` impl of its own (it is a
/// library-facing return value, not a wire type); this binary's own
/// printed output is the only place JSON framing of the envelope itself
/// is needed.
#[derive(serde::Serialize)]
struct EnvelopeJson {
    result: Option<String>,
    query: Option<String>,
    corrected_query: Option<String>,
    error_message: Option<String>,
}

impl From<qsql_agent::QueryEnvelope> for EnvelopeJson {
    fn from(e: qsql_agent::QueryEnvelope) -> Self {
        Self {
            result: e.result,
            query: e.query,
            corrected_query: e.corrected_query,
            error_message: e.error_message,
        }
    }
}
