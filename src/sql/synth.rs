// SPDX-License-Identifier: Apache-2.0

//! SQL Synthesizer (C7) — spec §4.7, the central algorithm.
//!
//! Consumes a `PlannerOutput` and a dialect and returns a fully formed SQL
//! string, built around a symbolic expression tree rather than string
//! concatenation: intermediate stages build ordered lists of rendered
//! clause fragments, and only the final assembly step joins them into
//! text. Generalized from `engine/sql_generator.rs`'s dialect/literal
//! primitives (`quote_ident`, `format_value`, `escape_string`), which the
//! teacher applies to single-statement mutation generation, to a
//! recursive SELECT-tree renderer.

use super::dialect::Dialect;
use super::expr::{self, render_value};
use crate::error::{CoreError, CoreResult};
use crate::model::{
    Aggregate, AggregateFunction, ColumnRole, FilterOp, FilterPredicate, FilterValue, JoinType,
    PlannerOutput, SelectionColumn, SortDirection, SortOrderPref, TimeFilter,
};
use std::collections::{HashMap, HashSet};

type AliasMap = HashMap<String, String>;

/// Designates which column the time-filter user preference is realized
/// against. The planner is expected to pick "an appropriate date/timestamp
/// column" but `PlannerOutput` carries no field for it, so the caller
/// supplies the target column explicitly rather than a new,
/// undocumented field being invented on `PlannerOutput`.
#[derive(Debug, Clone)]
pub struct TimeWindowTarget {
    pub table: String,
    pub column: String,
}

pub struct SynthesisOptions<'a> {
    pub dialect: Dialect,
    pub sort_order: SortOrderPref,
    pub result_limit: u64,
    pub time_filter: TimeFilter,
    pub time_window_target: Option<&'a TimeWindowTarget>,
}

pub fn synthesize(output: &PlannerOutput, opts: &SynthesisOptions) -> CoreResult<(String, Vec<String>)> {
    if output.selections.is_empty() {
        return Err(CoreError::sql_synthesis("PlannerOutput has no selections"));
    }

    let alias_map = build_alias_map(output);
    let dialect = opts.dialect;

    let mut ctes_sql = Vec::new();
    for cte in &output.ctes {
        let inner_opts = SynthesisOptions {
            dialect,
            sort_order: SortOrderPref::Default,
            result_limit: 0,
            time_filter: TimeFilter::AllTime,
            time_window_target: None,
        };
        let (inner, _inner_columns) = synthesize(&cte.output, &inner_opts)?;
        ctes_sql.push(format!("{} AS ({})", dialect.quote_ident(&cte.name), inner));
    }

    let projection_items = build_projection_list(output, dialect, &alias_map);
    if projection_items.is_empty() {
        return Err(CoreError::sql_synthesis("PlannerOutput selects no columns"));
    }
    let projections: Vec<String> = projection_items.iter().map(|p| p.sql.clone()).collect();
    let projection_columns: Vec<String> = projection_items.into_iter().map(|p| p.alias).collect();
    let from_join = build_from_join(output, dialect, &alias_map)?;
    let where_clause = build_where(output, opts, dialect, &alias_map);
    let group_by_having = build_group_by_having(output, dialect, &alias_map);
    let order_limit = build_order_limit(output, opts, dialect, &alias_map);

    let mut sql = String::new();
    if !ctes_sql.is_empty() {
        sql.push_str("WITH ");
        sql.push_str(&ctes_sql.join(", "));
        sql.push(' ');
    }

    sql.push_str("SELECT ");
    if dialect.limit_is_prefix() {
        if let Some(n) = effective_limit(output, opts) {
            sql.push_str(&format!("TOP {n} "));
        }
    }
    sql.push_str(&projections.join(", "));
    sql.push_str(" FROM ");
    sql.push_str(&from_join);

    if let Some(w) = where_clause {
        sql.push_str(" WHERE ");
        sql.push_str(&w);
    }

    if let Some(gb) = group_by_having {
        sql.push(' ');
        sql.push_str(&gb);
    }

    if let Some(ob) = order_limit.order_by {
        sql.push_str(" ORDER BY ");
        sql.push_str(&ob);
    }

    if !dialect.limit_is_prefix() {
        if let Some(n) = order_limit.limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }
    }

    Ok((sql, projection_columns))
}

fn build_alias_map(output: &PlannerOutput) -> AliasMap {
    output
        .selections
        .iter()
        .map(|s| (s.table.clone(), s.alias.clone().unwrap_or_else(|| s.table.clone())))
        .collect()
}

fn qualify_column(table: &str, column: &str, dialect: Dialect, alias_map: &AliasMap) -> String {
    if expr::is_expression(column) {
        expr::qualify_expression(column, table, alias_map)
    } else {
        let alias = alias_map.get(table).cloned().unwrap_or_else(|| table.to_string());
        format!("{}.{}", dialect.quote_ident(&alias), dialect.quote_ident(column))
    }
}

/// All `FilterPredicate`s referenced anywhere in the plan (table-local,
/// global, HAVING, subquery outer side) — used by the orphaned-filter-
/// column heuristic.
fn all_filter_targets(output: &PlannerOutput) -> Vec<(String, String)> {
    let mut targets = Vec::new();
    for sel in &output.selections {
        for f in &sel.filters {
            targets.push((f.table.clone(), f.column.clone()));
        }
    }
    for f in &output.global_filters {
        targets.push((f.table.clone(), f.column.clone()));
    }
    if let Some(gb) = &output.group_by {
        for f in &gb.having_filters {
            targets.push((f.table.clone(), f.column.clone()));
        }
    }
    for sf in &output.subquery_filters {
        targets.push((sf.outer_table.clone(), sf.outer_column.clone()));
    }
    targets
}

/// One projection entry: `sql` is the rendered select-list fragment
/// (always explicitly aliased), `alias` is the bare, unquoted output name
/// used as the JSON key once the result set is wrapped (`Dialect::wrap_json`).
struct ProjectionItem {
    sql: String,
    alias: String,
}

/// Base name for a projection's output alias before dedup: the bare column
/// name for an identifier, or a sanitized form of the expression text for
/// anything `is_expression` flags.
fn alias_base(raw_column: &str) -> String {
    if expr::is_expression(raw_column) {
        let sanitized: String = raw_column
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        let trimmed = sanitized.trim_matches('_');
        if trimmed.is_empty() {
            "expr".to_string()
        } else {
            trimmed.to_string()
        }
    } else {
        raw_column.to_string()
    }
}

/// Registers `base` as an output alias, disambiguating against `used` by
/// qualifying with `table` and, failing that, a numeric suffix.
fn dedup_alias(used: &mut HashSet<String>, base: &str, table: &str) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    let qualified = format!("{table}_{base}");
    if used.insert(qualified.clone()) {
        return qualified;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{qualified}_{n}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Projection list: union of `role == projection` columns, plus — the
/// orphaned-filter-column heuristic (spec §4.7.1 step 2) — any
/// `role == filter` column with no matching `FilterPredicate` anywhere.
/// Every entry is given an explicit `AS alias` so the result set's own
/// column names are known up front, not inferred from SQLite's implicit
/// result-column-naming rules.
fn build_projection_list(output: &PlannerOutput, dialect: Dialect, alias_map: &AliasMap) -> Vec<ProjectionItem> {
    let filter_targets = all_filter_targets(output);
    let is_orphaned = |col: &SelectionColumn| {
        col.role == ColumnRole::Filter
            && !filter_targets
                .iter()
                .any(|(t, c)| t == &col.table && c == &col.column)
    };

    let mut used_aliases = HashSet::new();
    let mut projections = Vec::new();
    for sel in &output.selections {
        for col in &sel.columns {
            if col.role == ColumnRole::Projection || is_orphaned(col) {
                let qualified = qualify_column(&col.table, &col.column, dialect, alias_map);
                let alias = dedup_alias(&mut used_aliases, &alias_base(&col.column), &col.table);
                let sql = format!("{qualified} AS {}", dialect.quote_ident(&alias));
                projections.push(ProjectionItem { sql, alias });
            }
        }
    }

    if let Some(gb) = &output.group_by {
        for agg in &gb.aggregates {
            let alias = dedup_alias(&mut used_aliases, &agg.alias, &agg.table);
            let sql = render_aggregate(agg, &alias, dialect, alias_map);
            projections.push(ProjectionItem { sql, alias });
        }
    }

    for win in &output.window_functions {
        let alias = dedup_alias(&mut used_aliases, &win.alias, "");
        let sql = render_window_function(win, &alias, dialect, alias_map);
        projections.push(ProjectionItem { sql, alias });
    }

    projections
}

fn render_aggregate(agg: &Aggregate, alias: &str, dialect: Dialect, alias_map: &AliasMap) -> String {
    let func = match agg.function {
        AggregateFunction::Sum => "SUM",
        AggregateFunction::Count => "COUNT",
        AggregateFunction::Avg => "AVG",
        AggregateFunction::Min => "MIN",
        AggregateFunction::Max => "MAX",
    };
    let inner = qualify_column(&agg.table, &agg.column, dialect, alias_map);
    format!("{func}({inner}) AS {}", dialect.quote_ident(alias))
}

fn render_window_function(
    win: &crate::model::WindowFunction,
    alias: &str,
    dialect: Dialect,
    alias_map: &AliasMap,
) -> String {
    let mut clause = format!("{}() OVER (", win.function.trim_end_matches("()"));
    if !win.partition_by.is_empty() {
        let cols: Vec<String> = win
            .partition_by
            .iter()
            .map(|c| qualify_column(&c.table, &c.column, dialect, alias_map))
            .collect();
        clause.push_str("PARTITION BY ");
        clause.push_str(&cols.join(", "));
        if !win.order_by.is_empty() {
            clause.push(' ');
        }
    }
    if !win.order_by.is_empty() {
        clause.push_str("ORDER BY ");
        clause.push_str(&render_order_by_list(&win.order_by, dialect, alias_map));
    }
    clause.push(')');
    format!("{clause} AS {}", dialect.quote_ident(alias))
}

fn build_from_join(output: &PlannerOutput, dialect: Dialect, alias_map: &AliasMap) -> CoreResult<String> {
    let base = &output.selections[0];
    let base_alias = alias_map.get(&base.table).unwrap();
    let mut sql = format!("{}", dialect.quote_ident(&base.table));
    if base_alias != &base.table {
        sql.push_str(&format!(" AS {}", dialect.quote_ident(base_alias)));
    }

    let mut joined_tables = vec![base.table.clone()];

    for sel in &output.selections[1..] {
        let edge = output
            .join_edges
            .iter()
            .find(|e| {
                (joined_tables.contains(&e.from_table) && e.to_table == sel.table)
                    || (joined_tables.contains(&e.to_table) && e.from_table == sel.table)
            })
            .ok_or_else(|| {
                CoreError::sql_synthesis(format!("no JoinEdge connects table '{}'", sel.table))
            })?;

        let join_kw = match edge.join_type {
            JoinType::Inner => "JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
        };

        let sel_alias = alias_map.get(&sel.table).unwrap();
        sql.push_str(&format!(" {join_kw} {}", dialect.quote_ident(&sel.table)));
        if sel_alias != &sel.table {
            sql.push_str(&format!(" AS {}", dialect.quote_ident(sel_alias)));
        }

        let left = qualify_column(&edge.from_table, &edge.from_column, dialect, alias_map);
        let right = qualify_column(&edge.to_table, &edge.to_column, dialect, alias_map);
        sql.push_str(&format!(" ON {left} = {right}"));

        joined_tables.push(sel.table.clone());
    }

    Ok(sql)
}

/// Renders one `FilterPredicate` — the operator dispatch, IN-with-null
/// rewrite, and BETWEEN handling of spec §4.7.2.
fn render_predicate(pred: &FilterPredicate, dialect: Dialect, alias_map: &AliasMap) -> String {
    let col = qualify_column(&pred.table, &pred.column, dialect, alias_map);

    match pred.op {
        FilterOp::Eq => format!("{col} = {}", render_value(&pred.value, dialect, alias_map)),
        FilterOp::Neq => format!("{col} != {}", render_value(&pred.value, dialect, alias_map)),
        FilterOp::Lt => format!("{col} < {}", render_value(&pred.value, dialect, alias_map)),
        FilterOp::Lte => format!("{col} <= {}", render_value(&pred.value, dialect, alias_map)),
        FilterOp::Gt => format!("{col} > {}", render_value(&pred.value, dialect, alias_map)),
        FilterOp::Gte => format!("{col} >= {}", render_value(&pred.value, dialect, alias_map)),
        FilterOp::Like | FilterOp::Ilike => {
            // `ilike` rewritten to `LIKE` for dialects without ILIKE.
            format!("{col} LIKE {}", render_value(&pred.value, dialect, alias_map))
        }
        FilterOp::IsNull => format!("{col} IS NULL"),
        FilterOp::IsNotNull => format!("{col} IS NOT NULL"),
        FilterOp::Between => {
            if let FilterValue::List(bounds) = &pred.value {
                if bounds.len() == 2 {
                    let lo = render_value(&bounds[0], dialect, alias_map);
                    let hi = render_value(&bounds[1], dialect, alias_map);
                    return format!("{col} BETWEEN {lo} AND {hi}");
                }
            }
            format!("{col} BETWEEN {}", render_value(&pred.value, dialect, alias_map))
        }
        FilterOp::In => render_in_predicate(&col, &pred.value, dialect, alias_map),
    }
}

fn render_in_predicate(col: &str, value: &FilterValue, dialect: Dialect, alias_map: &AliasMap) -> String {
    let items = match value {
        FilterValue::List(items) => items.clone(),
        other => vec![other.clone()],
    };

    let has_null = items.iter().any(|v| matches!(v, FilterValue::Null));
    let non_nulls: Vec<&FilterValue> = items.iter().filter(|v| !matches!(v, FilterValue::Null)).collect();

    if has_null && non_nulls.is_empty() {
        return format!("{col} IS NULL");
    }

    let rendered: Vec<String> = non_nulls.iter().map(|v| render_value(v, dialect, alias_map)).collect();
    let in_clause = format!("{col} IN ({})", rendered.join(", "));

    if has_null {
        format!("({in_clause} OR {col} IS NULL)")
    } else {
        in_clause
    }
}

fn build_where(
    output: &PlannerOutput,
    opts: &SynthesisOptions,
    dialect: Dialect,
    alias_map: &AliasMap,
) -> Option<String> {
    let mut clauses = Vec::new();

    for sel in &output.selections {
        for f in &sel.filters {
            clauses.push(render_predicate(f, dialect, alias_map));
        }
    }
    for f in &output.global_filters {
        clauses.push(render_predicate(f, dialect, alias_map));
    }
    for sf in &output.subquery_filters {
        clauses.push(render_subquery_filter(sf, dialect, alias_map));
    }

    if let (Some(days), Some(target)) = (opts.time_filter.day_window(), opts.time_window_target) {
        let col = qualify_column(&target.table, &target.column, dialect, alias_map);
        clauses.push(dialect.time_window_expr(&col, days));
    }

    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" AND "))
    }
}

fn render_subquery_filter(
    sf: &crate::model::SubqueryFilter,
    dialect: Dialect,
    alias_map: &AliasMap,
) -> String {
    let outer = qualify_column(&sf.outer_table, &sf.outer_column, dialect, alias_map);
    let op = filter_op_symbol(sf.op);
    let sub_col = dialect.quote_ident(&sf.subquery_column);
    let sub_table = dialect.quote_ident(&sf.subquery_table);

    let mut inner_where = String::new();
    if !sf.subquery_filters.is_empty() {
        // Subquery filters reference the subquery's own table directly
        // (it has no alias distinct from its table name within this
        // nested scope).
        let mut local_alias_map = alias_map.clone();
        local_alias_map.insert(sf.subquery_table.clone(), sf.subquery_table.clone());
        let rendered: Vec<String> = sf
            .subquery_filters
            .iter()
            .map(|f| render_predicate(f, dialect, &local_alias_map))
            .collect();
        inner_where = format!(" WHERE {}", rendered.join(" AND "));
    }

    format!("{outer} {op} (SELECT {sub_col} FROM {sub_table}{inner_where})")
}

fn filter_op_symbol(op: FilterOp) -> &'static str {
    match op {
        FilterOp::Eq => "=",
        FilterOp::Neq => "!=",
        FilterOp::Lt => "<",
        FilterOp::Lte => "<=",
        FilterOp::Gt => ">",
        FilterOp::Gte => ">=",
        FilterOp::In => "IN",
        FilterOp::Between => "BETWEEN",
        FilterOp::Like | FilterOp::Ilike => "LIKE",
        FilterOp::IsNull => "IS NULL",
        FilterOp::IsNotNull => "IS NOT NULL",
    }
}

fn build_group_by_having(output: &PlannerOutput, dialect: Dialect, alias_map: &AliasMap) -> Option<String> {
    let gb = output.group_by.as_ref()?;

    let cols: Vec<String> = gb
        .group_by_columns
        .iter()
        .map(|c| qualify_column(&c.table, &c.column, dialect, alias_map))
        .collect();

    let mut clause = format!("GROUP BY {}", cols.join(", "));

    if !gb.having_filters.is_empty() {
        let rendered: Vec<String> = gb
            .having_filters
            .iter()
            .map(|f| render_predicate(f, dialect, alias_map))
            .collect();
        clause.push_str(&format!(" HAVING {}", rendered.join(" AND ")));
    }

    Some(clause)
}

fn render_order_by_list(order_by: &[crate::model::OrderBy], dialect: Dialect, alias_map: &AliasMap) -> String {
    order_by
        .iter()
        .map(|o| {
            let col = qualify_column(&o.table, &o.column, dialect, alias_map);
            let dir = match o.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            format!("{col} {dir}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

struct OrderLimit {
    order_by: Option<String>,
    limit: Option<u64>,
}

fn effective_limit(output: &PlannerOutput, opts: &SynthesisOptions) -> Option<u64> {
    output.limit.or({
        if opts.result_limit > 0 {
            Some(opts.result_limit)
        } else {
            None
        }
    })
}

/// ORDER BY / LIMIT: the plan's fields take precedence; if absent, fall
/// back to user preferences. `Ascending`/`Descending` applies to the
/// first projection column (spec §4.7.1 step 8).
fn build_order_limit(
    output: &PlannerOutput,
    opts: &SynthesisOptions,
    dialect: Dialect,
    alias_map: &AliasMap,
) -> OrderLimit {
    let order_by = if !output.order_by.is_empty() {
        Some(render_order_by_list(&output.order_by, dialect, alias_map))
    } else {
        match opts.sort_order {
            SortOrderPref::Default => None,
            SortOrderPref::Ascending | SortOrderPref::Descending => {
                output.selections.first().and_then(|sel| {
                    sel.columns.first().map(|first_col| {
                        let col = qualify_column(&first_col.table, &first_col.column, dialect, alias_map);
                        let dir = if opts.sort_order == SortOrderPref::Ascending {
                            "ASC"
                        } else {
                            "DESC"
                        };
                        format!("{col} {dir}")
                    })
                })
            }
        }
    };

    OrderLimit {
        order_by,
        limit: effective_limit(output, opts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FilterPredicate, JoinEdge, Selection, SelectionColumn};

    fn selection(table: &str, columns: Vec<SelectionColumn>, filters: Vec<FilterPredicate>) -> Selection {
        Selection {
            table: table.to_string(),
            alias: None,
            columns,
            filters,
        }
    }

    fn col(table: &str, column: &str, role: ColumnRole) -> SelectionColumn {
        SelectionColumn {
            table: table.to_string(),
            column: column.to_string(),
            role,
        }
    }

    fn base_output(selections: Vec<Selection>) -> PlannerOutput {
        PlannerOutput {
            decision: crate::model::PlannerDecision::Proceed,
            intent_summary: String::new(),
            selections,
            join_edges: Vec::new(),
            global_filters: Vec::new(),
            group_by: None,
            window_functions: Vec::new(),
            subquery_filters: Vec::new(),
            ctes: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    fn default_opts() -> SynthesisOptions<'static> {
        SynthesisOptions {
            dialect: Dialect::TSql,
            sort_order: SortOrderPref::Default,
            result_limit: 0,
            time_filter: TimeFilter::AllTime,
            time_window_target: None,
        }
    }

    #[test]
    fn bit_equality_is_unquoted() {
        let output = base_output(vec![selection(
            "tb_Test",
            vec![col("tb_Test", "IsDeleted", ColumnRole::Filter)],
            vec![FilterPredicate {
                table: "tb_Test".to_string(),
                column: "IsDeleted".to_string(),
                op: FilterOp::Eq,
                value: FilterValue::Text("0".to_string()),
            }],
        )]);
        let (sql, _cols) = synthesize(&output, &default_opts()).unwrap();
        assert!(sql.contains("[IsDeleted] = 0"), "got: {sql}");
        assert!(!sql.contains("'0'"));
    }

    #[test]
    fn date_range_uses_cast_as_date() {
        let output = base_output(vec![selection(
            "tb_Test",
            vec![col("tb_Test", "CreatedOn", ColumnRole::Filter)],
            vec![FilterPredicate {
                table: "tb_Test".to_string(),
                column: "CreatedOn".to_string(),
                op: FilterOp::Gte,
                value: FilterValue::Text("2025-10-01".to_string()),
            }],
        )]);
        let (sql, _cols) = synthesize(&output, &default_opts()).unwrap();
        assert!(sql.contains("CAST('2025-10-01' AS DATE)"), "got: {sql}");
    }

    #[test]
    fn time_window_last_30_days() {
        let output = base_output(vec![selection(
            "tb_Test",
            vec![col("tb_Test", "LoginDate", ColumnRole::Projection)],
            vec![],
        )]);
        let target = TimeWindowTarget {
            table: "tb_Test".to_string(),
            column: "LoginDate".to_string(),
        };
        let opts = SynthesisOptions {
            time_filter: TimeFilter::Last30Days,
            time_window_target: Some(&target),
            ..default_opts()
        };
        let (sql, _cols) = synthesize(&output, &opts).unwrap();
        assert!(sql.contains("DATEADD(day, -30, GETDATE())"), "got: {sql}");
    }

    #[test]
    fn reserved_word_column_is_bracketed() {
        let output = base_output(vec![selection(
            "tb_Test",
            vec![col("tb_Test", "Index", ColumnRole::Projection)],
            vec![],
        )]);
        let (sql, _cols) = synthesize(&output, &default_opts()).unwrap();
        assert!(sql.contains("[Index]"), "got: {sql}");
    }

    #[test]
    fn projection_columns_are_named_and_deduped() {
        let mut output = base_output(vec![
            selection("tb_User", vec![col("tb_User", "ID", ColumnRole::Projection)], vec![]),
            selection("tb_Company", vec![col("tb_Company", "ID", ColumnRole::Projection)], vec![]),
        ]);
        output.join_edges.push(JoinEdge {
            from_table: "tb_User".to_string(),
            from_column: "CompanyID".to_string(),
            to_table: "tb_Company".to_string(),
            to_column: "ID".to_string(),
            join_type: JoinType::Inner,
        });
        let (sql, cols) = synthesize(&output, &default_opts()).unwrap();
        assert_eq!(cols, vec!["ID".to_string(), "tb_Company_ID".to_string()]);
        assert!(sql.contains("AS [ID]"), "got: {sql}");
        assert!(sql.contains("AS [tb_Company_ID]"), "got: {sql}");
    }

    #[test]
    fn orphaned_filter_column_appears_in_select_list() {
        let output = base_output(vec![selection(
            "tb_Test",
            vec![col("tb_Test", "TagName", ColumnRole::Filter)],
            vec![],
        )]);
        let (sql, _cols) = synthesize(&output, &default_opts()).unwrap();
        assert!(sql.contains("TagName"), "got: {sql}");
    }

    #[test]
    fn in_with_null_uses_or_is_null() {
        let output = base_output(vec![selection(
            "tb_Test",
            vec![col("tb_Test", "Status", ColumnRole::Filter)],
            vec![FilterPredicate {
                table: "tb_Test".to_string(),
                column: "Status".to_string(),
                op: FilterOp::In,
                value: FilterValue::List(vec![FilterValue::Number(0.0), FilterValue::Null]),
            }],
        )]);
        let (sql, _cols) = synthesize(&output, &default_opts()).unwrap();
        assert!(sql.contains("IN (0)"), "got: {sql}");
        assert!(sql.contains("IS NULL"));
        assert!(sql.contains(" OR "));
    }

    #[test]
    fn quoted_function_value_is_recovered() {
        let output = base_output(vec![selection(
            "tb_Test",
            vec![col("tb_Test", "CreatedOn", ColumnRole::Filter)],
            vec![FilterPredicate {
                table: "tb_Test".to_string(),
                column: "CreatedOn".to_string(),
                op: FilterOp::Gte,
                value: FilterValue::Text("'DATEADD(DAY, -60, GETDATE())'".to_string()),
            }],
        )]);
        let (sql, _cols) = synthesize(&output, &default_opts()).unwrap();
        assert!(sql.contains("DATEADD(DAY, -60, GETDATE())"), "got: {sql}");
        assert!(!sql.contains("'DATEADD"));
    }

    #[test]
    fn join_renders_matching_edge() {
        let mut output = base_output(vec![
            selection("tb_User", vec![col("tb_User", "ID", ColumnRole::Projection)], vec![]),
            selection(
                "tb_Company",
                vec![col("tb_Company", "Name", ColumnRole::Projection)],
                vec![],
            ),
        ]);
        output.join_edges.push(JoinEdge {
            from_table: "tb_User".to_string(),
            from_column: "CompanyID".to_string(),
            to_table: "tb_Company".to_string(),
            to_column: "ID".to_string(),
            join_type: JoinType::Inner,
        });
        let (sql, _cols) = synthesize(&output, &default_opts()).unwrap();
        assert!(sql.contains("JOIN [tb_Company]"), "got: {sql}");
        assert!(sql.contains("ON [tb_User].[CompanyID] = [tb_Company].[ID]"), "got: {sql}");
    }

    #[test]
    fn limit_is_prefix_for_tsql() {
        let mut output = base_output(vec![selection(
            "tb_Test",
            vec![col("tb_Test", "ID", ColumnRole::Projection)],
            vec![],
        )]);
        output.limit = Some(10);
        let (sql, _cols) = synthesize(&output, &default_opts()).unwrap();
        assert!(sql.starts_with("SELECT TOP 10"), "got: {sql}");
    }

    #[test]
    fn sqlite_synthesized_columns_produce_valid_json_object_wrap() {
        let output = base_output(vec![selection(
            "Users",
            vec![
                col("Users", "Id", ColumnRole::Projection),
                col("Users", "Name", ColumnRole::Projection),
            ],
            vec![],
        )]);
        let opts = SynthesisOptions {
            dialect: Dialect::Sqlite,
            ..default_opts()
        };
        let (sql, cols) = synthesize(&output, &opts).unwrap();
        let wrapped = Dialect::Sqlite.wrap_json(&sql, &cols);
        assert!(wrapped.contains("json_object('Id', \"Id\", 'Name', \"Name\")"), "got: {wrapped}");
        assert!(!wrapped.contains("json_object(*)"));
    }

    #[test]
    fn limit_is_trailing_for_sqlite() {
        let mut output = base_output(vec![selection(
            "tb_Test",
            vec![col("tb_Test", "ID", ColumnRole::Projection)],
            vec![],
        )]);
        output.limit = Some(10);
        let opts = SynthesisOptions {
            dialect: Dialect::Sqlite,
            ..default_opts()
        };
        let (sql, _cols) = synthesize(&output, &opts).unwrap();
        assert!(sql.trim_end().ends_with("LIMIT 10"), "got: {sql}");
    }
}
