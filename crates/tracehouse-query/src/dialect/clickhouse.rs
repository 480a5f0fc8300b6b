//! ClickHouse dialect
//!
//! Besides ClickHouse's quoting and literal syntax this dialect carries the
//! expression rewrites that let the server use its native string functions,
//! token indexes and `AggregatingMergeTree` states:
//!
//! - regex matches become equality, `IN`, `startsWith`/`endsWith`/`contains`
//!   or `LIKE` where the pattern allows it ([`regex_match`]);
//! - multi-token `hasToken` needles are split ([`has_token`]);
//! - `sum`/`count` over a pre-aggregated column become `sumMerge`/`countMerge`;
//! - `first(x)`/`last(x)` become `argMin(x, ts)`/`argMax(x, ts)`.
//!
//! Every rule goes through [`apply_rule`], so a failing rule leaves its node
//! untouched.

use chrono::{DateTime, Utc};

use super::SqlDialect;
use crate::error::QueryError;
use crate::expr::Expr;
use crate::optimizer::{apply_rule, has_token, regex_match, transform_up};
use crate::query::Limit;
use crate::schema::Schema;
use crate::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct ClickHouseDialect;

impl SqlDialect for ClickHouseDialect {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }

    fn timestamp_expression(&self, timestamp: DateTime<Utc>) -> String {
        format!("fromUnixTimestamp64Milli({})", timestamp.timestamp_millis())
    }

    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    }

    fn transform(&self, schema: &Schema, expr: Expr) -> Expr {
        transform_up(expr, &mut |node| rewrite(schema, node))
    }

    fn function_sql(&self, name: &str, args: &[String]) -> Option<String> {
        match (name, args) {
            ("contains", [haystack, needle]) => Some(format!("position({}, {}) > 0", haystack, needle)),
            _ => None,
        }
    }

    fn regex_match_sql(&self, expr: &str, pattern: &str, negated: bool) -> String {
        let call = format!("match({}, {})", expr, pattern);
        if negated {
            format!("NOT {}", call)
        } else {
            call
        }
    }

    fn limit_sql(&self, limit: &Limit) -> String {
        if limit.offset > 0 {
            format!("LIMIT {}, {}", limit.offset, limit.limit)
        } else {
            format!("LIMIT {}", limit.limit)
        }
    }
}

fn rewrite(schema: &Schema, node: Expr) -> Expr {
    match &node {
        Expr::RegexMatch { .. } => apply_rule("regex_match", node, |e| match e {
            Expr::RegexMatch {
                expr,
                pattern,
                negated,
            } => regex_match::optimize(expr, pattern, *negated),
            _ => Ok(None),
        }),
        Expr::Function { name, .. } if name.eq_ignore_ascii_case("hasToken") => {
            apply_rule("has_token", node, |e| match e {
                Expr::Function { args, .. } => Ok(has_token::optimize(args)),
                _ => Ok(None),
            })
        }
        Expr::Function { name, .. } if is_merge_candidate(name) => {
            apply_rule("aggregate_merge", node, |e| merge_aggregate(schema, e))
        }
        Expr::Function { name, .. } if is_first_or_last(name) => {
            apply_rule("first_last", node, |e| first_last(schema, e))
        }
        _ => node,
    }
}

fn is_merge_candidate(name: &str) -> bool {
    name.eq_ignore_ascii_case("sum") || name.eq_ignore_ascii_case("count")
}

fn is_first_or_last(name: &str) -> bool {
    name.eq_ignore_ascii_case("first") || name.eq_ignore_ascii_case("last")
}

/// `sum(col)`/`count(col)` over a column holding aggregate states merges
/// those states with the column's own merge combinator.
fn merge_aggregate(schema: &Schema, expr: &Expr) -> Result<Option<Expr>> {
    let Expr::Function { args, .. } = expr else {
        return Ok(None);
    };
    // count() counts rows, not states
    let [Expr::Identifier(column)] = args.as_slice() else {
        return Ok(None);
    };
    let Some(kind) = schema.pre_aggregate(column) else {
        return Ok(None);
    };
    let merged = Expr::function(
        format!("{}Merge", kind.function_name()),
        vec![Expr::ident(column.clone())],
    );
    merged.validate()?;
    Ok(Some(merged))
}

fn first_last(schema: &Schema, expr: &Expr) -> Result<Option<Expr>> {
    let Expr::Function { name, args } = expr else {
        return Ok(None);
    };
    let function = if name.eq_ignore_ascii_case("first") {
        "argMin"
    } else {
        "argMax"
    };
    let [value] = args.as_slice() else {
        return Err(QueryError::InvalidExpression(format!(
            "{} expects 1 argument, got {}",
            name,
            args.len()
        )));
    };
    let rewritten = Expr::function(
        function,
        vec![value.clone(), Expr::ident(schema.timestamp_column.clone())],
    );
    rewritten.validate()?;
    Ok(Some(rewritten))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AggregateKind, ColumnSpec};
    use crate::value::DataType;
    use chrono::TimeZone;

    fn schema() -> Schema {
        Schema::new(
            "http-metrics",
            "http_metrics",
            "timestamp",
            vec![
                ColumnSpec::new("appName", DataType::String),
                ColumnSpec::new("uri", DataType::String),
                ColumnSpec::new("responseTime", DataType::Long),
                ColumnSpec::pre_aggregated("requestCount", DataType::Long, AggregateKind::Sum),
                ColumnSpec::pre_aggregated("errorCount", DataType::Long, AggregateKind::Count),
            ],
        )
    }

    #[test]
    fn test_quoting() {
        let d = ClickHouseDialect;
        assert_eq!(d.quote_identifier("app`Name"), "`app\\`Name`");
        assert_eq!(d.string_literal("it's a\\b"), "'it\\'s a\\\\b'");
        let ts = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(d.timestamp_expression(ts), "fromUnixTimestamp64Milli(1700000000123)");
    }

    #[test]
    fn test_limit_and_functions() {
        let d = ClickHouseDialect;
        assert_eq!(d.limit_sql(&Limit { limit: 10, offset: 5 }), "LIMIT 5, 10");
        assert_eq!(d.limit_sql(&Limit { limit: 10, offset: 0 }), "LIMIT 10");
        assert_eq!(
            d.function_sql("contains", &["`uri`".to_string(), "'api'".to_string()]),
            Some("position(`uri`, 'api') > 0".to_string())
        );
        assert_eq!(d.function_sql("startsWith", &[]), None);
    }

    #[test]
    fn test_regex_rewrite_inside_conjunction() {
        let filter = Expr::and_all([
            Expr::equals(Expr::ident("appName"), Expr::lit("x")),
            Expr::not_matches(Expr::ident("uri"), "^/api"),
        ])
        .unwrap();
        let out = ClickHouseDialect.transform(&schema(), filter);
        let expected = Expr::and_all([
            Expr::equals(Expr::ident("appName"), Expr::lit("x")),
            Expr::not(Expr::function(
                "startsWith",
                vec![Expr::ident("uri"), Expr::lit("/api")],
            )),
        ])
        .unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_unsupported_regex_is_kept() {
        let filter = Expr::matches(Expr::ident("uri"), "^/api/[0-9]+$");
        assert_eq!(ClickHouseDialect.transform(&schema(), filter.clone()), filter);
    }

    #[test]
    fn test_merge_rewrite() {
        let d = ClickHouseDialect;
        let out = d.transform(&schema(), Expr::function("sum", vec![Expr::ident("requestCount")]));
        assert_eq!(out, Expr::function("sumMerge", vec![Expr::ident("requestCount")]));

        let out = d.transform(&schema(), Expr::function("count", vec![Expr::ident("errorCount")]));
        assert_eq!(out, Expr::function("countMerge", vec![Expr::ident("errorCount")]));

        // raw columns and count() are untouched
        let raw = Expr::function("sum", vec![Expr::ident("responseTime")]);
        assert_eq!(d.transform(&schema(), raw.clone()), raw);
        let star = Expr::function("count", vec![]);
        assert_eq!(d.transform(&schema(), star.clone()), star);
    }

    #[test]
    fn test_first_last_rewrite() {
        let d = ClickHouseDialect;
        let out = d.transform(&schema(), Expr::function("first", vec![Expr::ident("uri")]));
        assert_eq!(
            out,
            Expr::function("argMin", vec![Expr::ident("uri"), Expr::ident("timestamp")])
        );
        let out = d.transform(&schema(), Expr::function("last", vec![Expr::ident("uri")]));
        assert_eq!(
            out,
            Expr::function("argMax", vec![Expr::ident("uri"), Expr::ident("timestamp")])
        );
    }

    #[test]
    fn test_malformed_first_falls_back() {
        let bad = Expr::function("first", vec![Expr::ident("a"), Expr::ident("b")]);
        assert_eq!(ClickHouseDialect.transform(&schema(), bad.clone()), bad);
    }

    #[test]
    fn test_has_token_rewrite() {
        let out = ClickHouseDialect.transform(
            &schema(),
            Expr::function("hasToken", vec![Expr::ident("uri"), Expr::lit("api/v1")]),
        );
        let expected = Expr::and_all([
            Expr::function("hasToken", vec![Expr::ident("uri"), Expr::lit("api")]),
            Expr::like(Expr::ident("uri"), "%api/v1%"),
        ])
        .unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_transform_is_idempotent() {
        let d = ClickHouseDialect;
        let filter = Expr::and_all([
            Expr::matches(Expr::ident("uri"), "^(a|b|c)$"),
            Expr::function("last", vec![Expr::ident("appName")]),
        ])
        .unwrap();
        let once = d.transform(&schema(), filter);
        let twice = d.transform(&schema(), once.clone());
        assert_eq!(once, twice);
    }
}
