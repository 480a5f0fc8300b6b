use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::{QueryStep, StepResult};
use crate::error::QueryError;
use crate::query::Limit;
use crate::table::ColumnarTable;
use crate::window::SlidingWindow;
use crate::Result;

/// Applies a [`SlidingWindow`] to the upstream table.
///
/// The upstream read is widened backwards by the window range so the first
/// requested rows see a full window. Those look-back rows are dropped again
/// here: the result is a view over the rows at or after `min_timestamp_ms`.
///
/// The upstream result must name the window's partition columns as its key
/// columns and the window's value column among its value columns.
pub struct SlidingWindowStep {
    query_id: Uuid,
    upstream: Box<dyn QueryStep>,
    window: SlidingWindow,
    min_timestamp_ms: i64,
    outputs: Vec<String>,
    limit: Option<Limit>,
}

impl SlidingWindowStep {
    pub fn new(
        query_id: Uuid,
        upstream: Box<dyn QueryStep>,
        window: SlidingWindow,
        min_timestamp_ms: i64,
        outputs: Vec<String>,
    ) -> Self {
        Self {
            query_id,
            upstream,
            window,
            min_timestamp_ms,
            outputs,
            limit: None,
        }
    }

    /// Slice the windowed rows after filtering.
    pub fn with_limit(mut self, limit: Option<Limit>) -> Self {
        self.limit = limit;
        self
    }

    fn check_upstream(&self, upstream: &StepResult) -> Result<()> {
        if upstream.key_columns != self.window.key_columns {
            return Err(QueryError::UnsupportedOperation(format!(
                "window partitions by {:?} but upstream keys are {:?}",
                self.window.key_columns, upstream.key_columns
            )));
        }
        if !upstream.value_columns.contains(&self.window.value_column) {
            return Err(QueryError::UnsupportedOperation(format!(
                "window value column '{}' is not an upstream value column",
                self.window.value_column
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl QueryStep for SlidingWindowStep {
    fn name(&self) -> &'static str {
        "sliding_window"
    }

    async fn execute(&self) -> Result<StepResult> {
        let upstream = self.upstream.execute().await?;
        self.check_upstream(&upstream)?;
        let started = Instant::now();
        let input_rows = upstream.row_count();
        let table = upstream.table.clone();

        let window = self.window.clone();
        let min_timestamp_ms = self.min_timestamp_ms;
        let outputs = self.outputs.clone();
        let limit = self.limit;

        let result = tokio::task::spawn_blocking(move || -> Result<ColumnarTable> {
            let aggregated = window.aggregate(&table)?;
            let table = table.replace_column(aggregated)?;

            let timestamps = table.column(&window.timestamp_column)?;
            let mut keep = Vec::with_capacity(table.row_count());
            for row in 0..table.row_count() {
                if timestamps.get_long(row)? >= min_timestamp_ms {
                    keep.push(row);
                }
            }
            if let Some(limit) = limit {
                keep = keep.into_iter().skip(limit.offset).take(limit.limit).collect();
            }

            table.view(keep).project(&outputs)
        })
        .await??;

        debug!(
            query_id = %self.query_id,
            input_rows,
            output_rows = result.row_count(),
            window_ms = self.window.window_ms,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sliding window step completed"
        );
        Ok(upstream.with_table(result))
    }
}
