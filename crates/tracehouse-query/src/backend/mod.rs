//! Backend executor interface
//!
//! The pipeline never talks to a database directly. It hands SQL text to a
//! [`QueryBackend`] and reads rows back through a [`RowCursor`], one row at a
//! time. Connection pooling lives behind the backend.
//!
//! Cursors are always wrapped in a [`CursorGuard`]: whether the read succeeds,
//! fails or the future driving it is dropped, the cursor is closed exactly
//! once and its connection goes back to the pool.

mod memory;

pub use memory::MemoryBackend;

use async_trait::async_trait;

use crate::error::QueryError;
use crate::value::Value;
use crate::Result;

/// One row returned by the backend, addressed by ordinal.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackendRow {
    values: Vec<Value>,
}

impl BackendRow {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get_value(&self, ordinal: usize) -> Result<&Value> {
        self.values.get(ordinal).ok_or_else(|| {
            QueryError::Execution(format!(
                "column ordinal {} out of range for row with {} columns",
                ordinal,
                self.values.len()
            ))
        })
    }

    pub fn get_long(&self, ordinal: usize) -> Result<i64> {
        let value = self.get_value(ordinal)?;
        value.as_i64().ok_or_else(|| mismatch(ordinal, "long", value))
    }

    pub fn get_double(&self, ordinal: usize) -> Result<f64> {
        let value = self.get_value(ordinal)?;
        value.as_f64().ok_or_else(|| mismatch(ordinal, "double", value))
    }

    pub fn get_string(&self, ordinal: usize) -> Result<&str> {
        let value = self.get_value(ordinal)?;
        value.as_str().ok_or_else(|| mismatch(ordinal, "string", value))
    }
}

impl From<Vec<Value>> for BackendRow {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

fn mismatch(ordinal: usize, expected: &str, actual: &Value) -> QueryError {
    QueryError::InvalidValue {
        column: format!("#{}", ordinal),
        expected: expected.to_string(),
        actual: actual.type_name().to_string(),
    }
}

/// Lazy, forward-only result set.
#[async_trait]
pub trait RowCursor: Send {
    /// Next row, or `None` once the result set is exhausted.
    async fn next_row(&mut self) -> Result<Option<BackendRow>>;

    /// Release the underlying connection. Must be idempotent.
    fn close(&mut self);
}

/// Executes SQL text.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn open_cursor(&self, sql: &str) -> Result<Box<dyn RowCursor>>;

    /// Materialize the whole result set.
    async fn fetch_all(&self, sql: &str) -> Result<Vec<BackendRow>> {
        let mut cursor = CursorGuard::new(self.open_cursor(sql).await?);
        let mut rows = Vec::new();
        while let Some(row) = cursor.next_row().await? {
            rows.push(row);
        }
        cursor.close();
        Ok(rows)
    }
}

/// Closes the wrapped cursor on drop, covering error and cancellation paths.
pub struct CursorGuard {
    cursor: Option<Box<dyn RowCursor>>,
}

impl CursorGuard {
    pub fn new(cursor: Box<dyn RowCursor>) -> Self {
        Self {
            cursor: Some(cursor),
        }
    }

    pub async fn next_row(&mut self) -> Result<Option<BackendRow>> {
        match self.cursor.as_mut() {
            Some(cursor) => cursor.next_row().await,
            None => Err(QueryError::Execution("cursor already closed".to_string())),
        }
    }

    pub fn close(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.close();
    }
}
