use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::{QueryStep, StepResult};
use crate::backend::{CursorGuard, QueryBackend};
use crate::column::ColumnBuilder;
use crate::error::QueryError;
use crate::metrics::ROWS_READ_TOTAL;
use crate::table::ColumnarTable;
use crate::value::DataType;
use crate::Result;

/// Runs one SQL statement and decodes the cursor, a row at a time, into one
/// column per output.
pub struct ReadStep {
    query_id: Uuid,
    backend: Arc<dyn QueryBackend>,
    sql: String,
    outputs: Vec<(String, DataType)>,
    key_columns: Vec<String>,
    max_rows: usize,
    initial_capacity: usize,
}

impl ReadStep {
    pub fn new(
        query_id: Uuid,
        backend: Arc<dyn QueryBackend>,
        sql: String,
        outputs: Vec<(String, DataType)>,
    ) -> Self {
        Self {
            query_id,
            backend,
            sql,
            outputs,
            key_columns: Vec::new(),
            max_rows: usize::MAX,
            initial_capacity: 1024,
        }
    }

    /// Outputs that identify a series. Every other output is a value column.
    pub fn with_key_columns(mut self, key_columns: Vec<String>) -> Self {
        self.key_columns = key_columns;
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

#[async_trait]
impl QueryStep for ReadStep {
    fn name(&self) -> &'static str {
        "read"
    }

    async fn execute(&self) -> Result<StepResult> {
        let started = Instant::now();

        // Allocate first so an unsupported type fails before any SQL is sent.
        let mut builders = self
            .outputs
            .iter()
            .map(|(name, data_type)| ColumnBuilder::create(name, *data_type, self.initial_capacity))
            .collect::<Result<Vec<_>>>()?;

        debug!(query_id = %self.query_id, sql = %self.sql, "executing statement");
        let mut cursor = CursorGuard::new(self.backend.open_cursor(&self.sql).await?);

        let mut rows = 0usize;
        while let Some(row) = cursor.next_row().await? {
            if rows == self.max_rows {
                return Err(QueryError::ResultTooLarge(self.max_rows));
            }
            if row.len() < builders.len() {
                return Err(QueryError::Execution(format!(
                    "backend returned {} columns, expected {}",
                    row.len(),
                    builders.len()
                )));
            }
            for (ordinal, builder) in builders.iter_mut().enumerate() {
                builder.add_value(row.get_value(ordinal)?)?;
            }
            rows += 1;
        }
        cursor.close();

        ROWS_READ_TOTAL.inc_by(rows as u64);
        debug!(
            query_id = %self.query_id,
            rows,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "read step completed"
        );

        let table =
            ColumnarTable::from_columns(builders.into_iter().map(ColumnBuilder::finish).collect())?;
        let value_columns = self
            .outputs
            .iter()
            .map(|(name, _)| name)
            .filter(|name| !self.key_columns.contains(name))
            .cloned()
            .collect();
        Ok(StepResult {
            table,
            key_columns: self.key_columns.clone(),
            value_columns,
        })
    }
}
