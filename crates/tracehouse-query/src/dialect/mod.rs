//! SQL dialects
//!
//! A dialect owns everything that differs between SQL engines: identifier
//! quoting, literal formatting, function spellings, clause syntax and the
//! expression rewrites applied before rendering ([`SqlDialect::transform`]).
//! The statement AST itself is shared.

mod clickhouse;
mod generic;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use clickhouse::ClickHouseDialect;
pub use generic::GenericDialect;

use crate::error::QueryError;
use crate::expr::Expr;
use crate::query::{Limit, SortDirection};
use crate::schema::Schema;
use crate::Result;

pub trait SqlDialect: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn quote_identifier(&self, name: &str) -> String;

    /// SQL expression for a point in time.
    fn timestamp_expression(&self, timestamp: DateTime<Utc>) -> String;

    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Rewrite a filter or selector expression into a form this engine runs
    /// efficiently. Must preserve semantics and never fail.
    fn transform(&self, schema: &Schema, expr: Expr) -> Expr;

    /// Native spelling of a function call, given already-rendered arguments.
    /// `None` renders `name(args...)` verbatim.
    fn function_sql(&self, _name: &str, _args: &[String]) -> Option<String> {
        None
    }

    fn regex_match_sql(&self, expr: &str, pattern: &str, negated: bool) -> String;

    fn limit_sql(&self, limit: &Limit) -> String {
        if limit.offset > 0 {
            format!("LIMIT {} OFFSET {}", limit.limit, limit.offset)
        } else {
            format!("LIMIT {}", limit.limit)
        }
    }

    fn order_by_sql(&self, column: &str, direction: SortDirection) -> String {
        let direction = match direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        format!("{} {}", self.quote_identifier(column), direction)
    }
}

/// Look up a dialect by its configured name.
pub fn dialect_for_name(name: &str) -> Result<Arc<dyn SqlDialect>> {
    match name.to_ascii_lowercase().as_str() {
        "clickhouse" => Ok(Arc::new(ClickHouseDialect)),
        "generic" | "ansi" | "h2" => Ok(Arc::new(GenericDialect)),
        other => Err(QueryError::Config(format!("unknown SQL dialect '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_for_name() {
        assert_eq!(dialect_for_name("ClickHouse").unwrap().name(), "clickhouse");
        assert_eq!(dialect_for_name("h2").unwrap().name(), "generic");
        assert!(matches!(dialect_for_name("oracle"), Err(QueryError::Config(_))));
    }
}
