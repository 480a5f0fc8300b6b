//! Query engine facade
//!
//! [`QueryEngine`] is what a query service talks to. It owns the backend, the
//! configuration and the dialect, plans every call with a fresh [`Planner`]
//! and wraps execution in a tracing span and the query metrics.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::backend::QueryBackend;
use crate::config::QueryConfig;
use crate::dialect::{dialect_for_name, SqlDialect};
use crate::error::QueryError;
use crate::expr::Expr;
use crate::metrics::{self, QUERIES_TOTAL, QUERY_ERRORS_TOTAL, QUERY_LATENCY};
use crate::planner::Planner;
use crate::query::{OrderBy, Query, Selector};
use crate::step::StepResult;
use crate::value::DataType;
use crate::Result;

const COUNT_OUTPUT: &str = "count";

pub struct QueryEngine {
    backend: Arc<dyn QueryBackend>,
    dialect: Arc<dyn SqlDialect>,
    config: QueryConfig,
}

impl QueryEngine {
    /// Create an engine for the dialect named in `config`.
    pub fn new(backend: Arc<dyn QueryBackend>, config: QueryConfig) -> Result<Self> {
        config.validate()?;
        let dialect = dialect_for_name(&config.dialect)?;
        metrics::init();
        Ok(Self {
            backend,
            dialect,
            config,
        })
    }

    /// Create an engine with an explicit dialect, ignoring `config.dialect`.
    pub fn with_dialect(
        backend: Arc<dyn QueryBackend>,
        dialect: Arc<dyn SqlDialect>,
        config: QueryConfig,
    ) -> Self {
        metrics::init();
        Self {
            backend,
            dialect,
            config,
        }
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    fn planner(&self) -> Planner<'_> {
        Planner::new(self.dialect.as_ref(), &self.config)
    }

    /// Run the full step pipeline and return its result, key and value
    /// columns included.
    pub async fn time_series(&self, query: &Query) -> Result<StepResult> {
        self.run("time_series", |query_id| async move {
            let plan = self.planner().plan(query, self.backend.clone(), query_id)?;
            plan.execute().await
        })
        .await
    }

    /// Run the query and return rows shaped by the query's result format.
    pub async fn select_rows(&self, query: &Query) -> Result<Vec<serde_json::Value>> {
        self.run("select", |query_id| async move {
            let plan = self.planner().plan(query, self.backend.clone(), query_id)?;
            let result = plan.execute().await?;
            Ok(result.table.to_rows(query.result_format))
        })
        .await
    }

    /// Distinct values of one column within the query's interval and filter,
    /// in ascending order.
    pub async fn distinct(&self, query: &Query, column: &str) -> Result<Vec<String>> {
        let mut distinct = query.clone();
        distinct.selectors = vec![Selector::column(column, DataType::String)];
        distinct.group_by.clear();
        distinct.order_by = vec![OrderBy::asc(column)];

        self.run("distinct", |query_id| async move {
            let planner = self.planner();
            let mut statement = planner.statement(&distinct)?;
            statement.distinct = true;
            let plan = planner.plan_statement(&statement, self.backend.clone(), query_id)?;
            let table = plan.execute().await?.table;
            let values = table.column(column)?;
            (0..table.row_count())
                .map(|row| values.get_string(row).map(str::to_string))
                .collect()
        })
        .await
    }

    /// Number of rows matching the query's interval and filter.
    pub async fn count(&self, query: &Query) -> Result<u64> {
        let mut count = query.clone();
        count.selectors = vec![Selector::new(
            COUNT_OUTPUT,
            Expr::function("count", vec![]),
            DataType::Long,
        )];
        count.group_by.clear();
        count.order_by.clear();
        count.limit = None;

        self.run("count", |query_id| async move {
            let plan = self.planner().plan(&count, self.backend.clone(), query_id)?;
            let table = plan.execute().await?.table;
            if table.is_empty() {
                return Ok(0);
            }
            let total = table.column(COUNT_OUTPUT)?.get_long(0)?;
            u64::try_from(total)
                .map_err(|_| QueryError::Execution(format!("backend returned negative count {}", total)))
        })
        .await
    }

    /// The SQL a query would send, without executing it.
    pub fn explain(&self, query: &Query) -> Result<String> {
        let planner = self.planner();
        planner.render(&planner.statement(query)?)
    }

    async fn run<T, F, Fut>(&self, kind: &'static str, body: F) -> Result<T>
    where
        F: FnOnce(Uuid) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let query_id = Uuid::new_v4();
        let dialect = self.dialect.name();
        let span = info_span!("query", query_id = %query_id, kind, dialect);

        QUERIES_TOTAL.with_label_values(&[dialect, kind]).inc();
        let timer = QUERY_LATENCY.with_label_values(&[kind]).start_timer();

        let result = async {
            let result = body(query_id).await;
            match &result {
                Ok(_) => info!(query_id = %query_id, "query completed"),
                Err(e) => warn!(query_id = %query_id, error = %e, kind = e.kind(), "query failed"),
            }
            result
        }
        .instrument(span)
        .await;

        timer.observe_duration();
        if let Err(e) = &result {
            QUERY_ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
        }
        result
    }
}
