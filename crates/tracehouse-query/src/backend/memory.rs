use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BackendRow, QueryBackend, RowCursor};
use crate::error::QueryError;
use crate::Result;

/// In-memory backend returning canned rows.
///
/// Rows are looked up by exact SQL text, falling back to a default result
/// set. Every statement is recorded and open cursors are counted so tests can
/// check that connections are released.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    responses: HashMap<String, Vec<BackendRow>>,
    default_rows: Vec<BackendRow>,
    failure: Option<Failure>,
    executed: RwLock<Vec<String>>,
    open: Arc<AtomicUsize>,
}

#[derive(Debug, Clone)]
struct Failure {
    after_rows: usize,
    message: String,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_rows(mut self, rows: Vec<BackendRow>) -> Self {
        self.default_rows = rows;
        self
    }

    pub fn respond(mut self, sql: impl Into<String>, rows: Vec<BackendRow>) -> Self {
        self.responses.insert(sql.into(), rows);
        self
    }

    /// Make every cursor fail with `message` after yielding `after_rows`
    /// rows, the way a dropped connection would.
    pub fn fail_after(mut self, after_rows: usize, message: impl Into<String>) -> Self {
        self.failure = Some(Failure {
            after_rows,
            message: message.into(),
        });
        self
    }

    /// Statements executed so far, in order.
    pub async fn executed(&self) -> Vec<String> {
        self.executed.read().await.clone()
    }

    pub fn open_cursors(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryBackend for MemoryBackend {
    async fn open_cursor(&self, sql: &str) -> Result<Box<dyn RowCursor>> {
        self.executed.write().await.push(sql.to_string());
        let rows = self
            .responses
            .get(sql)
            .unwrap_or(&self.default_rows)
            .iter()
            .cloned()
            .collect();
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCursor {
            rows,
            yielded: 0,
            failure: self.failure.clone(),
            open: Some(self.open.clone()),
        }))
    }
}

struct MemoryCursor {
    rows: VecDeque<BackendRow>,
    yielded: usize,
    failure: Option<Failure>,
    /// Present until the cursor is closed.
    open: Option<Arc<AtomicUsize>>,
}

#[async_trait]
impl RowCursor for MemoryCursor {
    async fn next_row(&mut self) -> Result<Option<BackendRow>> {
        if self.open.is_none() {
            return Err(QueryError::Execution("cursor is closed".to_string()));
        }
        if let Some(failure) = &self.failure {
            if self.yielded >= failure.after_rows {
                return Err(QueryError::Execution(failure.message.clone()));
            }
        }
        let row = self.rows.pop_front();
        if row.is_some() {
            self.yielded += 1;
        }
        Ok(row)
    }

    fn close(&mut self) {
        if let Some(open) = self.open.take() {
            open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
