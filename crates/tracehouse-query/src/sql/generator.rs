use chrono::{TimeZone, Utc};

use super::ast::{FromClause, SelectItem, SelectStatement};
use crate::dialect::SqlDialect;
use crate::error::QueryError;
use crate::expr::Expr;
use crate::value::Value;
use crate::Result;

/// Renders statements to SQL text through a dialect.
pub struct SqlGenerator<'a> {
    dialect: &'a dyn SqlDialect,
}

impl<'a> SqlGenerator<'a> {
    pub fn new(dialect: &'a dyn SqlDialect) -> Self {
        Self { dialect }
    }

    pub fn generate(&self, stmt: &SelectStatement) -> Result<String> {
        let mut sql = String::from("SELECT ");
        if stmt.distinct {
            sql.push_str("DISTINCT ");
        }

        let selectors = stmt
            .selectors
            .iter()
            .map(|item| self.select_item(item))
            .collect::<Result<Vec<_>>>()?;
        sql.push_str(&selectors.join(", "));

        sql.push_str(" FROM ");
        match &stmt.from {
            FromClause::Table(table) => sql.push_str(&self.dialect.quote_identifier(table)),
            FromClause::Subquery { statement, alias } => {
                sql.push('(');
                sql.push_str(&self.generate(statement)?);
                sql.push_str(") AS ");
                sql.push_str(&self.dialect.quote_identifier(alias));
            }
        }

        if let Some(filter) = &stmt.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expr(filter, false)?);
        }

        if !stmt.group_by.is_empty() {
            let columns: Vec<String> = stmt
                .group_by
                .iter()
                .map(|c| self.dialect.quote_identifier(c))
                .collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&columns.join(", "));
        }

        if !stmt.order_by.is_empty() {
            let orders: Vec<String> = stmt
                .order_by
                .iter()
                .map(|o| self.dialect.order_by_sql(&o.column, o.direction))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }

        if let Some(limit) = &stmt.limit {
            sql.push(' ');
            sql.push_str(&self.dialect.limit_sql(limit));
        }

        Ok(sql)
    }

    fn select_item(&self, item: &SelectItem) -> Result<String> {
        if item.is_plain_column() {
            return Ok(self.dialect.quote_identifier(&item.output));
        }
        Ok(format!(
            "{} AS {}",
            self.expr(&item.expr, false)?,
            self.dialect.quote_identifier(&item.output)
        ))
    }

    /// Render an expression. `nested` asks for parentheses around
    /// lower-precedence nodes (AND/OR) that appear as operands.
    pub fn expr(&self, expr: &Expr, nested: bool) -> Result<String> {
        let sql = match expr {
            Expr::Identifier(name) => self.dialect.quote_identifier(name),
            Expr::Literal(value) => self.literal(value)?,
            Expr::Timestamp(ms) => {
                let timestamp = Utc.timestamp_millis_opt(*ms).single().ok_or_else(|| {
                    QueryError::InvalidExpression(format!("timestamp out of range: {}", ms))
                })?;
                self.dialect.timestamp_expression(timestamp)
            }
            Expr::Comparison { op, lhs, rhs } => format!(
                "{} {} {}",
                self.expr(lhs, true)?,
                op.symbol(),
                self.expr(rhs, true)?
            ),
            Expr::Arithmetic { op, lhs, rhs } => format!(
                "({} {} {})",
                self.expr(lhs, true)?,
                op.symbol(),
                self.expr(rhs, true)?
            ),
            Expr::Logical { op, operands } => {
                let parts = operands
                    .iter()
                    .map(|o| self.expr(o, true))
                    .collect::<Result<Vec<_>>>()?;
                let joined = parts.join(&format!(" {} ", op.keyword()));
                if nested && parts.len() > 1 {
                    format!("({})", joined)
                } else {
                    joined
                }
            }
            Expr::Not(inner) => format!("NOT ({})", self.expr(inner, false)?),
            Expr::In {
                expr,
                values,
                negated,
            } => {
                let values = values
                    .iter()
                    .map(|v| self.literal(v))
                    .collect::<Result<Vec<_>>>()?;
                format!(
                    "{} {}IN ({})",
                    self.expr(expr, true)?,
                    if *negated { "NOT " } else { "" },
                    values.join(", ")
                )
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => format!(
                "{} {}LIKE {}",
                self.expr(expr, true)?,
                if *negated { "NOT " } else { "" },
                self.dialect.string_literal(pattern)
            ),
            Expr::RegexMatch {
                expr,
                pattern,
                negated,
            } => self.dialect.regex_match_sql(
                &self.expr(expr, true)?,
                &self.dialect.string_literal(pattern),
                *negated,
            ),
            Expr::Function { name, args } => {
                if args.is_empty() && name.eq_ignore_ascii_case("count") {
                    "count(*)".to_string()
                } else {
                    let args = args
                        .iter()
                        .map(|a| self.expr(a, false))
                        .collect::<Result<Vec<_>>>()?;
                    match self.dialect.function_sql(name, &args) {
                        Some(sql) => sql,
                        None => format!("{}({})", name, args.join(", ")),
                    }
                }
            }
            Expr::Window(_) => {
                return Err(QueryError::InvalidExpression(format!(
                    "window function is evaluated in memory and cannot be rendered as SQL: {}",
                    expr
                )))
            }
        };
        Ok(sql)
    }

    fn literal(&self, value: &Value) -> Result<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::Long(v) => Ok(v.to_string()),
            Value::Double(v) if v.is_finite() => Ok(format!("{:?}", v)),
            Value::Double(v) => Err(QueryError::InvalidExpression(format!(
                "non-finite literal: {}",
                v
            ))),
            Value::String(s) => Ok(self.dialect.string_literal(s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{ClickHouseDialect, GenericDialect};
    use crate::expr::ComparisonOp;
    use crate::query::{Limit, OrderBy};
    use crate::value::DataType;

    fn statement() -> SelectStatement {
        let mut stmt = SelectStatement::new(FromClause::Table("http_metrics".to_string()));
        stmt.selectors = vec![
            SelectItem {
                expr: Expr::ident("appName"),
                output: "appName".to_string(),
                data_type: DataType::String,
            },
            SelectItem {
                expr: Expr::function("sum", vec![Expr::ident("responseTime")]),
                output: "totalTime".to_string(),
                data_type: DataType::Long,
            },
        ];
        stmt.where_clause = Expr::and_all([
            Expr::compare(ComparisonOp::Ge, Expr::ident("timestamp"), Expr::Timestamp(0)),
            Expr::compare(ComparisonOp::Lt, Expr::ident("timestamp"), Expr::Timestamp(60_000)),
            Expr::or(vec![
                Expr::equals(Expr::ident("appName"), Expr::lit("a")),
                Expr::equals(Expr::ident("appName"), Expr::lit("b")),
            ]),
        ]);
        stmt.group_by = vec!["appName".to_string()];
        stmt.order_by = vec![OrderBy::desc("totalTime")];
        stmt.limit = Some(Limit {
            limit: 10,
            offset: 20,
        });
        stmt
    }

    #[test]
    fn test_same_statement_two_dialects() {
        let stmt = statement();

        let generic = SqlGenerator::new(&GenericDialect).generate(&stmt).unwrap();
        assert_eq!(
            generic,
            "SELECT \"appName\", sum(\"responseTime\") AS \"totalTime\" FROM \"http_metrics\" \
             WHERE \"timestamp\" >= TIMESTAMP '1970-01-01 00:00:00.000' \
             AND \"timestamp\" < TIMESTAMP '1970-01-01 00:01:00.000' \
             AND (\"appName\" = 'a' OR \"appName\" = 'b') \
             GROUP BY \"appName\" ORDER BY \"totalTime\" DESC LIMIT 10 OFFSET 20"
        );

        let clickhouse = SqlGenerator::new(&ClickHouseDialect).generate(&stmt).unwrap();
        assert_eq!(
            clickhouse,
            "SELECT `appName`, sum(`responseTime`) AS `totalTime` FROM `http_metrics` \
             WHERE `timestamp` >= fromUnixTimestamp64Milli(0) \
             AND `timestamp` < fromUnixTimestamp64Milli(60000) \
             AND (`appName` = 'a' OR `appName` = 'b') \
             GROUP BY `appName` ORDER BY `totalTime` DESC LIMIT 20, 10"
        );
    }

    #[test]
    fn test_subquery() {
        let mut inner = SelectStatement::new(FromClause::Table("t".to_string()));
        inner.selectors.push(SelectItem {
            expr: Expr::ident("v"),
            output: "v".to_string(),
            data_type: DataType::Long,
        });
        inner.order_by = vec![OrderBy::asc("v")];
        let outer = inner.into_subquery("raw");
        let sql = SqlGenerator::new(&GenericDialect).generate(&outer).unwrap();
        assert_eq!(
            sql,
            "SELECT \"v\" FROM (SELECT \"v\" FROM \"t\" ORDER BY \"v\" ASC) AS \"raw\""
        );
    }

    #[test]
    fn test_predicates() {
        let g = SqlGenerator::new(&ClickHouseDialect);
        let e = Expr::not(Expr::function(
            "contains",
            vec![Expr::ident("uri"), Expr::lit("api")],
        ));
        assert_eq!(g.expr(&e, false).unwrap(), "NOT (position(`uri`, 'api') > 0)");

        let e = Expr::not_matches(Expr::ident("uri"), "a\\.b");
        assert_eq!(g.expr(&e, false).unwrap(), "NOT match(`uri`, 'a\\\\.b')");

        let e = Expr::In {
            expr: Box::new(Expr::ident("code")),
            values: vec![Value::Long(200), Value::Long(204)],
            negated: true,
        };
        assert_eq!(g.expr(&e, false).unwrap(), "`code` NOT IN (200, 204)");

        let e = Expr::function("count", vec![]);
        assert_eq!(g.expr(&e, false).unwrap(), "count(*)");
    }

    #[test]
    fn test_window_cannot_render() {
        let e = Expr::Window(crate::expr::WindowSpec {
            function: "sum".to_string(),
            argument: Box::new(Expr::ident("v")),
            partition_by: vec![],
            order_by: "timestamp".to_string(),
            window_ms: 1_000,
        });
        assert!(matches!(
            SqlGenerator::new(&GenericDialect).expr(&e, false),
            Err(QueryError::InvalidExpression(_))
        ));
    }
}
