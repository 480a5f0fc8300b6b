//! Query planning
//!
//! Turns a [`Query`] into a linear chain of [`QueryStep`]s. A plain query is a
//! single [`ReadStep`]. A query with a window selector reads the window's raw
//! input from a sub-query ordered by `(partition keys..., order column)` and
//! runs a [`SlidingWindowStep`] on top of it.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::backend::QueryBackend;
use crate::config::QueryConfig;
use crate::dialect::SqlDialect;
use crate::error::QueryError;
use crate::expr::{Expr, WindowSpec};
use crate::query::{Limit, OrderBy, Query, Selector};
use crate::schema::Schema;
use crate::sql::{SelectStatement, SqlGenerator, StatementBuilder};
use crate::step::{QueryStep, ReadStep, SlidingWindowStep, StepResult};
use crate::value::DataType;
use crate::window::SlidingWindow;
use crate::Result;

const WINDOW_SUBQUERY_ALIAS: &str = "windowed";

/// Executable plan for one query.
pub struct QueryPlan {
    pub query_id: Uuid,
    pub sql: String,
    root: Box<dyn QueryStep>,
}

impl QueryPlan {
    pub async fn execute(&self) -> Result<StepResult> {
        debug!(query_id = %self.query_id, root = self.root.name(), "executing plan");
        self.root.execute().await
    }
}

/// In-memory stage planned on top of the read.
struct WindowStage {
    window: SlidingWindow,
    min_timestamp_ms: i64,
    outputs: Vec<String>,
    limit: Option<Limit>,
}

struct Lowered {
    statement: SelectStatement,
    key_columns: Vec<String>,
    window: Option<WindowStage>,
}

/// Plans queries for one dialect and configuration.
pub struct Planner<'a> {
    dialect: &'a dyn SqlDialect,
    config: &'a QueryConfig,
}

impl<'a> Planner<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, config: &'a QueryConfig) -> Self {
        Self { dialect, config }
    }

    /// The statement that will be sent to the backend.
    pub fn statement(&self, query: &Query) -> Result<SelectStatement> {
        Ok(self.lower(query)?.statement)
    }

    pub fn render(&self, statement: &SelectStatement) -> Result<String> {
        SqlGenerator::new(self.dialect).generate(statement)
    }

    pub fn plan(&self, query: &Query, backend: Arc<dyn QueryBackend>, query_id: Uuid) -> Result<QueryPlan> {
        let lowered = self.lower(query)?;
        let (sql, read) = self.read_step(&lowered.statement, backend, query_id)?;
        let read = read.with_key_columns(lowered.key_columns);

        let root: Box<dyn QueryStep> = match lowered.window {
            Some(stage) => Box::new(
                SlidingWindowStep::new(
                    query_id,
                    Box::new(read),
                    stage.window,
                    stage.min_timestamp_ms,
                    stage.outputs,
                )
                .with_limit(stage.limit),
            ),
            None => Box::new(read),
        };

        Ok(QueryPlan {
            query_id,
            sql,
            root,
        })
    }

    /// Plan a single read of an already built statement.
    pub fn plan_statement(
        &self,
        statement: &SelectStatement,
        backend: Arc<dyn QueryBackend>,
        query_id: Uuid,
    ) -> Result<QueryPlan> {
        let (sql, read) = self.read_step(statement, backend, query_id)?;
        Ok(QueryPlan {
            query_id,
            sql,
            root: Box::new(read),
        })
    }

    fn read_step(
        &self,
        statement: &SelectStatement,
        backend: Arc<dyn QueryBackend>,
        query_id: Uuid,
    ) -> Result<(String, ReadStep)> {
        let sql = self.render(statement)?;
        let outputs = statement
            .selectors
            .iter()
            .map(|s| (s.output.clone(), s.data_type))
            .collect();
        let read = ReadStep::new(query_id, backend, sql.clone(), outputs)
            .with_max_rows(self.config.max_rows)
            .with_initial_capacity(self.config.initial_column_capacity);
        Ok((sql, read))
    }

    fn builder<'s>(&'s self, schema: &'s Schema) -> StatementBuilder<'s> {
        StatementBuilder::new(schema, self.dialect).optimize(self.config.enable_optimizer)
    }

    fn lower(&self, query: &Query) -> Result<Lowered> {
        // Full validation, window selector included.
        let statement = self.builder(&query.schema).build(query)?;

        let windows: Vec<(usize, &WindowSpec)> = query
            .selectors
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match &s.expr {
                Expr::Window(spec) => Some((i, spec)),
                _ => None,
            })
            .collect();

        match windows.as_slice() {
            [] => Ok(Lowered {
                statement,
                key_columns: query.group_by.clone(),
                window: None,
            }),
            [(index, spec)] => self.lower_window(query, *index, spec),
            _ => Err(QueryError::MultipleWindowFunctions(
                windows
                    .iter()
                    .map(|(_, spec)| Expr::Window((*spec).clone()).to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
        }
    }

    /// Read the window's raw input over a widened interval, ordered the way
    /// the aggregator requires, from a sub-query.
    fn lower_window(&self, query: &Query, index: usize, spec: &WindowSpec) -> Result<Lowered> {
        let schema = &query.schema;
        let output = query.selectors[index].output.clone();

        let mut inner = query.clone();
        inner.interval = query.interval.extend_back(spec.window_ms).ok_or_else(|| {
            QueryError::InvalidExpression(format!(
                "range of {} reaches outside the supported time range",
                Expr::Window(spec.clone())
            ))
        })?;
        inner.selectors[index] = Selector::new(
            output.clone(),
            (*spec.argument).clone(),
            query.selectors[index].data_type,
        );
        for column in spec.partition_by.iter().chain(std::iter::once(&spec.order_by)) {
            if !inner.selectors.iter().any(|s| &s.output == column) {
                inner.selectors.push(Selector::column(column, column_type(schema, column)));
            } else if !inner
                .selectors
                .iter()
                .any(|s| &s.output == column && s.expr.as_identifier() == Some(column.as_str()))
            {
                return Err(QueryError::InvalidExpression(format!(
                    "output '{}' shadows window column of the same name",
                    column
                )));
            }
        }
        inner.order_by = spec
            .partition_by
            .iter()
            .chain(std::iter::once(&spec.order_by))
            .map(|column| OrderBy::asc(column.clone()))
            .collect();
        inner.limit = None;

        let statement = self
            .builder(schema)
            .build(&inner)?
            .into_subquery(WINDOW_SUBQUERY_ALIAS);

        debug!(
            schema = %schema.name,
            window_ms = spec.window_ms,
            partition_by = ?spec.partition_by,
            "planned sliding window over sub-query"
        );

        Ok(Lowered {
            statement,
            key_columns: spec.partition_by.clone(),
            window: Some(WindowStage {
                window: SlidingWindow {
                    key_columns: spec.partition_by.clone(),
                    timestamp_column: spec.order_by.clone(),
                    value_column: output,
                    window_ms: spec.window_ms,
                },
                min_timestamp_ms: query.interval.start_floored_ms(),
                outputs: query.selectors.iter().map(|s| s.output.clone()).collect(),
                limit: query.limit,
            }),
        })
    }
}

fn column_type(schema: &Schema, column: &str) -> DataType {
    if column == schema.timestamp_column {
        return DataType::DateTimeMilli;
    }
    schema
        .column(column)
        .map(|c| c.data_type)
        .unwrap_or(DataType::String)
}
