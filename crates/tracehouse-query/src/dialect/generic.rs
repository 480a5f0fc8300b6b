//! ANSI-flavoured dialect (H2 and friends)

use chrono::{DateTime, Utc};

use super::SqlDialect;
use crate::expr::Expr;
use crate::schema::Schema;

/// Double-quoted identifiers, `TIMESTAMP '...'` literals, `REGEXP_LIKE`.
/// Expressions are passed through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDialect;

impl SqlDialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn timestamp_expression(&self, timestamp: DateTime<Utc>) -> String {
        format!("TIMESTAMP '{}'", timestamp.format("%Y-%m-%d %H:%M:%S%.3f"))
    }

    fn transform(&self, _schema: &Schema, expr: Expr) -> Expr {
        expr
    }

    fn regex_match_sql(&self, expr: &str, pattern: &str, negated: bool) -> String {
        let call = format!("REGEXP_LIKE({}, {})", expr, pattern);
        if negated {
            format!("NOT {}", call)
        } else {
            call
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Limit;
    use chrono::TimeZone;

    #[test]
    fn test_quoting_and_literals() {
        let d = GenericDialect;
        assert_eq!(d.quote_identifier("app\"Name"), "\"app\"\"Name\"");
        assert_eq!(d.string_literal("it's"), "'it''s'");
        let ts = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(d.timestamp_expression(ts), "TIMESTAMP '2023-11-14 22:13:20.123'");
    }

    #[test]
    fn test_limit() {
        let d = GenericDialect;
        assert_eq!(d.limit_sql(&Limit { limit: 10, offset: 0 }), "LIMIT 10");
        assert_eq!(d.limit_sql(&Limit { limit: 10, offset: 20 }), "LIMIT 10 OFFSET 20");
    }
}
