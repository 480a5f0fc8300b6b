use std::collections::HashSet;

use tracing::debug;

use super::ast::{FromClause, SelectItem, SelectStatement};
use crate::dialect::SqlDialect;
use crate::error::QueryError;
use crate::expr::{ComparisonOp, Expr};
use crate::query::{Interval, Query};
use crate::schema::Schema;
use crate::Result;

/// Lowers a [`Query`] into a [`SelectStatement`] for one schema and dialect.
///
/// All validation happens here, before any SQL reaches a backend.
pub struct StatementBuilder<'a> {
    schema: &'a Schema,
    dialect: &'a dyn SqlDialect,
    optimize: bool,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(schema: &'a Schema, dialect: &'a dyn SqlDialect) -> Self {
        Self {
            schema,
            dialect,
            optimize: true,
        }
    }

    /// Toggle the dialect's expression rewrites.
    pub fn optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn build(&self, query: &Query) -> Result<SelectStatement> {
        if query.selectors.is_empty() {
            return Err(QueryError::InvalidExpression(format!(
                "query on schema '{}' selects nothing",
                self.schema.name
            )));
        }

        let mut outputs = HashSet::new();
        let mut windows = Vec::new();
        let mut selectors = Vec::with_capacity(query.selectors.len());
        for selector in &query.selectors {
            if !outputs.insert(selector.output.as_str()) {
                return Err(QueryError::DuplicateOutputName(selector.output.clone()));
            }
            self.check(&selector.expr)?;
            if selector.expr.is_window() {
                windows.push(selector.expr.to_string());
            }
            selectors.push(SelectItem {
                expr: self.rewrite(selector.expr.clone()),
                output: selector.output.clone(),
                data_type: selector.data_type,
            });
        }
        if windows.len() > 1 {
            return Err(QueryError::MultipleWindowFunctions(windows.join(", ")));
        }

        let filter = match &query.filter {
            Some(filter) => {
                self.check(filter)?;
                if filter.is_window() || filter.has_aggregate() {
                    return Err(QueryError::InvalidExpression(format!(
                        "filter must be a row predicate: {}",
                        filter
                    )));
                }
                Some(self.rewrite(filter.clone()))
            }
            None => None,
        };

        for column in &query.group_by {
            self.require(column)?;
        }
        for order in &query.order_by {
            if !outputs.contains(order.column.as_str()) {
                self.require(&order.column)?;
            }
        }

        let [lower, upper] = self.interval_predicates(&query.interval);
        let where_clause = Expr::and_all([lower, upper].into_iter().chain(filter));

        debug!(
            schema = %self.schema.name,
            dialect = self.dialect.name(),
            selectors = selectors.len(),
            "built select statement"
        );

        Ok(SelectStatement {
            distinct: false,
            selectors,
            from: FromClause::Table(self.schema.table.clone()),
            where_clause,
            group_by: query.group_by.clone(),
            order_by: query.order_by.clone(),
            limit: query.limit,
        })
    }

    /// `ts >= start` and `ts < end` on the schema's timestamp column.
    pub fn interval_predicates(&self, interval: &Interval) -> [Expr; 2] {
        let ts = || Expr::ident(self.schema.timestamp_column.clone());
        [
            Expr::compare(
                ComparisonOp::Ge,
                ts(),
                Expr::Timestamp(interval.start.timestamp_millis()),
            ),
            Expr::compare(
                ComparisonOp::Lt,
                ts(),
                Expr::Timestamp(interval.end.timestamp_millis()),
            ),
        ]
    }

    fn check(&self, expr: &Expr) -> Result<()> {
        expr.validate()?;
        for identifier in expr.identifiers() {
            self.require(identifier)?;
        }
        Ok(())
    }

    fn require(&self, identifier: &str) -> Result<()> {
        if self.schema.contains(identifier) {
            Ok(())
        } else {
            Err(QueryError::UnknownIdentifier {
                identifier: identifier.to_string(),
                schema: self.schema.name.clone(),
            })
        }
    }

    fn rewrite(&self, expr: Expr) -> Expr {
        if self.optimize && !expr.is_window() {
            self.dialect.transform(self.schema, expr)
        } else {
            expr
        }
    }
}
