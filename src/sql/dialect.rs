// SPDX-License-Identifier: Apache-2.0

//! Dialect-specific quoting, literal, and clause rendering.
//!
//! Generalized from `engine/sql_generator.rs`'s `SqlDialect` enum (which
//! covers {Postgres, MySql, Sqlite} mutation-statement generation) to the
//! two dialects this spec names: `tsql` (SQL Server) and `sqlite`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    TSql,
    Sqlite,
}

impl Dialect {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tsql" | "sqlserver" | "mssql" => Some(Self::TSql),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    pub fn is_sql_server(&self) -> bool {
        matches!(self, Self::TSql)
    }

    pub fn is_sqlite(&self) -> bool {
        matches!(self, Self::Sqlite)
    }

    /// Square brackets for tsql, double quotes elsewhere (spec §4.7).
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Self::TSql => format!("[{}]", ident.replace(']', "]]")),
            Self::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    pub fn escape_string(&self, s: &str) -> String {
        s.replace('\'', "''")
    }

    /// `DATEADD(day, -N, GETDATE())` for tsql, `datetime('now', '-N day')`
    /// for sqlite — the unquoted-interval form is required for tsql (spec
    /// §4.7.2).
    pub fn time_window_expr(&self, column: &str, days: u32) -> String {
        match self {
            Self::TSql => format!("{column} >= DATEADD(day, -{days}, GETDATE())"),
            Self::Sqlite => format!("{column} >= datetime('now', '-{days} day')"),
        }
    }

    /// `CAST('YYYY-MM-DD' AS DATE)` for tsql, plain quoted string for
    /// sqlite.
    pub fn date_literal(&self, value: &str) -> String {
        match self {
            Self::TSql => format!("CAST('{value}' AS DATE)"),
            Self::Sqlite => format!("'{value}'"),
        }
    }

    pub fn datetime_literal(&self, value: &str) -> String {
        match self {
            Self::TSql => format!("CAST('{value}' AS DATETIME)"),
            Self::Sqlite => format!("'{value}'"),
        }
    }

    /// `SELECT TOP n ...` for tsql (limit is a prefix clause, handled by
    /// the caller), trailing `LIMIT n` elsewhere.
    pub fn limit_is_prefix(&self) -> bool {
        self.is_sql_server()
    }

    /// Wraps a SELECT statement to marshal its result set as a single JSON
    /// payload (spec §4.8). `columns` names the query's own output columns,
    /// in order — `json_object` has no `*` form, so sqlite needs the
    /// explicit `'key', value` pairs built from that list; tsql's `FOR JSON
    /// AUTO` derives key names from the result set itself and ignores it.
    pub fn wrap_json(&self, query: &str, columns: &[String]) -> String {
        match self {
            Self::TSql => format!("SELECT ({query} FOR JSON AUTO) AS json"),
            Self::Sqlite => {
                let pairs: Vec<String> = columns
                    .iter()
                    .map(|c| format!("'{}', {}", c.replace('\'', "''"), self.quote_ident(c)))
                    .collect();
                format!(
                    "SELECT json_group_array(json_object({})) AS json_result FROM ({query})",
                    pairs.join(", ")
                )
            }
        }
    }

    pub fn terminator(&self) -> &'static str {
        ";"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_tsql_brackets() {
        assert_eq!(Dialect::TSql.quote_ident("Index"), "[Index]");
    }

    #[test]
    fn quote_ident_sqlite_double_quotes() {
        assert_eq!(Dialect::Sqlite.quote_ident("Order"), "\"Order\"");
    }

    #[test]
    fn time_window_tsql_uses_unquoted_interval() {
        let expr = Dialect::TSql.time_window_expr("[LoginDate]", 30);
        assert!(expr.contains("DATEADD(day, -30, GETDATE())"));
        assert!(!expr.contains("DATEADD('day'"));
    }

    #[test]
    fn wrap_json_sqlite_builds_json_object_from_columns() {
        let columns = vec!["Id".to_string(), "Name".to_string()];
        let wrapped = Dialect::Sqlite.wrap_json("SELECT \"Id\", \"Name\" FROM \"Users\"", &columns);
        assert!(wrapped.contains("json_object('Id', \"Id\", 'Name', \"Name\")"), "got: {wrapped}");
        assert!(!wrapped.contains("json_object(*)"));
    }

    #[test]
    fn wrap_json_tsql_ignores_column_list() {
        let wrapped = Dialect::TSql.wrap_json("SELECT [Id] FROM [Users]", &["Id".to_string()]);
        assert_eq!(wrapped, "SELECT (SELECT [Id] FROM [Users] FOR JSON AUTO) AS json");
    }
}
