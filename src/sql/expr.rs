// SPDX-License-Identifier: Apache-2.0

//! Literal construction, value-type inference, column-reference and
//! expression detection, function-unquoting — spec §4.7.2.

use super::dialect::Dialect;
use crate::model::FilterValue;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Null,
    Boolean,
    Date,
    DateTime,
    Number,
    String,
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap())
}

fn datetime_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(\.\d+)?$").unwrap())
}

fn column_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][\w]*\.[A-Za-z_][\w]*$").unwrap())
}

fn quoted_function_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^[A-Z_][A-Z0-9_]*\s*\(.*\)$").unwrap())
}

/// Recognized function tokens that mark a column/aggregate string as an
/// expression rather than a bare identifier (spec §4.7.2 "Expression
/// detection").
const EXPRESSION_FUNCTION_TOKENS: &[&str] = &[
    "COALESCE", "CAST", "CONCAT", "DATEADD", "DATEDIFF", "GETDATE", "SUM", "COUNT", "AVG", "MIN",
    "MAX",
];

/// `infer_type(v)` — spec §4.7.2. Operates on the raw textual
/// representation of a value, since untagged JSON deserialization folds
/// numeric-looking strings like `"0"` into `FilterValue::Text`.
pub fn infer_type(value: &FilterValue) -> ValueType {
    match value {
        FilterValue::Null => ValueType::Null,
        FilterValue::Bool(_) => ValueType::Boolean,
        FilterValue::Number(_) => ValueType::Number,
        FilterValue::List(_) => ValueType::String, // callers destructure lists themselves
        FilterValue::Text(s) => infer_type_str(s),
    }
}

pub fn infer_type_str(s: &str) -> ValueType {
    if s.eq_ignore_ascii_case("null") {
        return ValueType::Null;
    }
    if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") {
        return ValueType::Boolean;
    }
    if date_re().is_match(s) {
        return ValueType::Date;
    }
    if datetime_re().is_match(s) {
        return ValueType::DateTime;
    }
    if s.parse::<f64>().is_ok() {
        return ValueType::Number;
    }
    ValueType::String
}

/// Does this string look like a `Table.Column` reference rather than a
/// literal? (spec §4.7.2 "Column-reference detection")
pub fn is_column_reference(s: &str) -> bool {
    column_ref_re().is_match(s)
}

/// Does this free-form column/aggregate string need expression parsing
/// rather than plain identifier quoting? (spec §4.7.2 "Expression
/// detection")
pub fn is_expression(s: &str) -> bool {
    if s.contains('(') || s.contains(')') {
        return true;
    }
    if s.contains('+') || s.contains('-') || s.contains('*') || s.contains('/') {
        return true;
    }
    let upper = s.to_uppercase();
    EXPRESSION_FUNCTION_TOKENS.iter().any(|tok| upper.contains(tok))
}

/// Resolves a `Table.Column` reference through the alias map and emits it
/// unquoted, qualified (spec §4.7.2).
pub fn resolve_column_reference(
    s: &str,
    dialect: Dialect,
    alias_map: &HashMap<String, String>,
) -> String {
    let (table, column) = s.split_once('.').unwrap_or(("", s));
    let alias = alias_map.get(table).cloned().unwrap_or_else(|| table.to_string());
    format!("{}.{}", dialect.quote_ident(&alias), dialect.quote_ident(column))
}

/// Qualifies bare column-looking identifiers inside a free-form expression
/// string through the alias map, leaving recognized function names,
/// numeric literals, and already-qualified references untouched. A
/// lightweight rewrite rather than a full SQL parser — matches spec
/// §4.7.2's requirement to avoid malformed output like
/// `"ii"."COALESCE(...)"` without implementing a general expression
/// grammar.
pub fn qualify_expression(expr: &str, default_table: &str, alias_map: &HashMap<String, String>) -> String {
    static IDENT_RE: OnceLock<Regex> = OnceLock::new();
    let ident_re = IDENT_RE.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap());

    let alias = alias_map
        .get(default_table)
        .cloned()
        .unwrap_or_else(|| default_table.to_string());

    let bytes = expr.as_bytes();
    let mut out = String::with_capacity(expr.len());
    let mut last_end = 0;

    for m in ident_re.find_iter(expr) {
        out.push_str(&expr[last_end..m.start()]);
        let token = m.as_str();
        last_end = m.end();

        let preceded_by_dot = m.start() > 0 && bytes[m.start() - 1] == b'.';
        let followed_by_paren = expr[m.end()..].trim_start().starts_with('(');
        let is_numeric = token.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false);
        let is_function_token = EXPRESSION_FUNCTION_TOKENS
            .iter()
            .any(|t| t.eq_ignore_ascii_case(token));

        if preceded_by_dot || followed_by_paren || is_numeric || is_function_token {
            out.push_str(token);
        } else {
            out.push_str(&format!("{alias}.{token}"));
        }
    }
    out.push_str(&expr[last_end..]);
    out
}

/// Renders a single text value as a SQL literal, applying the
/// function-unquoting compensation (spec §4.7.2): a quoted string whose
/// inner content matches a function-call shape is emitted unquoted.
fn render_string_literal(s: &str, dialect: Dialect) -> String {
    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        let inner = &s[1..s.len() - 1];
        if quoted_function_re().is_match(inner) {
            return inner.to_string();
        }
    }
    format!("'{}'", dialect.escape_string(s))
}

fn render_text(s: &str, dialect: Dialect) -> String {
    match infer_type_str(s) {
        ValueType::Null => "NULL".to_string(),
        ValueType::Boolean => {
            if s.eq_ignore_ascii_case("true") {
                "1".to_string()
            } else {
                "0".to_string()
            }
        }
        ValueType::Number => s.to_string(),
        ValueType::Date => dialect.date_literal(s),
        ValueType::DateTime => dialect.datetime_literal(s),
        ValueType::String => render_string_literal(s, dialect),
    }
}

/// Renders any non-list `FilterValue` as SQL, resolving column references
/// through the alias map first (spec §4.7.2).
pub fn render_value(
    value: &FilterValue,
    dialect: Dialect,
    alias_map: &HashMap<String, String>,
) -> String {
    match value {
        FilterValue::Null => "NULL".to_string(),
        FilterValue::Bool(b) => {
            if *b {
                "1".to_string()
            } else {
                "0".to_string()
            }
        }
        FilterValue::Number(n) => {
            if n.fract() == 0.0 {
                format!("{}", *n as i64)
            } else {
                format!("{n}")
            }
        }
        FilterValue::Text(s) => {
            if is_column_reference(s) {
                resolve_column_reference(s, dialect, alias_map)
            } else {
                render_text(s, dialect)
            }
        }
        FilterValue::List(items) => {
            let rendered: Vec<String> = items.iter().map(|v| render_value(v, dialect, alias_map)).collect();
            rendered.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_type_number_includes_bit_strings() {
        assert_eq!(infer_type(&FilterValue::Text("0".to_string())), ValueType::Number);
        assert_eq!(infer_type(&FilterValue::Text("1".to_string())), ValueType::Number);
    }

    #[test]
    fn infer_type_date() {
        assert_eq!(infer_type(&FilterValue::Text("2025-10-01".to_string())), ValueType::Date);
    }

    #[test]
    fn quoted_function_is_recovered_unquoted() {
        let rendered = render_text("'DATEADD(DAY, -60, GETDATE())'", Dialect::TSql);
        assert_eq!(rendered, "DATEADD(DAY, -60, GETDATE())");
    }

    #[test]
    fn plain_number_text_is_unquoted() {
        assert_eq!(render_text("0", Dialect::TSql), "0");
    }

    #[test]
    fn column_reference_detection() {
        assert!(is_column_reference("tb_Users.CompanyID"));
        assert!(!is_column_reference("just a string"));
    }

    #[test]
    fn expression_detection_catches_function_calls() {
        assert!(is_expression("COALESCE(a, b)"));
        assert!(!is_expression("CompanyID"));
    }
}
