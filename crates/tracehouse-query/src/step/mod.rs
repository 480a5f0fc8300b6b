//! Query execution steps
//!
//! A query runs as a short linear chain of steps. The first step reads from
//! the backend ([`ReadStep`]); later steps transform the table the previous
//! one produced in memory ([`SlidingWindowStep`]). Each step resolves to a
//! complete [`StepResult`] or fails; nothing is published mid-step and
//! nothing is retried here.

mod read;
mod sliding_window;

pub use read::ReadStep;
pub use sliding_window::SlidingWindowStep;

use async_trait::async_trait;

use crate::table::ColumnarTable;
use crate::Result;

/// Output of one step: the table plus which of its columns identify a series
/// and which carry the measured values.
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    pub table: ColumnarTable,
    pub key_columns: Vec<String>,
    pub value_columns: Vec<String>,
}

impl StepResult {
    pub fn row_count(&self) -> usize {
        self.table.row_count()
    }

    /// Narrow the result to `table`, dropping key and value names that no
    /// longer exist in it.
    pub fn with_table(self, table: ColumnarTable) -> StepResult {
        let retain = |names: Vec<String>| -> Vec<String> {
            names.into_iter().filter(|n| table.get(n).is_some()).collect()
        };
        StepResult {
            key_columns: retain(self.key_columns),
            value_columns: retain(self.value_columns),
            table,
        }
    }
}

#[async_trait]
pub trait QueryStep: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    async fn execute(&self) -> Result<StepResult>;
}
