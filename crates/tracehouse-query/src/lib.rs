//! TraceHouse Query Pipeline
//!
//! Turns a backend-agnostic [`Query`] into dialect-specific SQL, runs it
//! against a relational backend and post-processes the result in memory as a
//! [`ColumnarTable`].
//!
//! ## Flow
//!
//! ```text
//! Query ──► StatementBuilder ──► SelectStatement ──► SqlGenerator ──► SQL
//!             (validate, rewrite                       (dialect)       │
//!              via SqlDialect)                                         ▼
//!                                     ColumnarTable ◄── ReadStep ◄── QueryBackend
//!                                           │
//!                                           ▼
//!                                  SlidingWindowStep (window selectors only)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use tracehouse_query::{Expr, Interval, Query, QueryConfig, QueryEngine, Selector};
//!
//! let engine = QueryEngine::new(backend, QueryConfig::from_env()?)?;
//! let query = Query::new(schema, Interval::new(start, end))
//!     .select(Selector::column("appName", DataType::String))
//!     .select(Selector::new(
//!         "requests",
//!         Expr::function("sum", vec![Expr::ident("requestCount")]),
//!         DataType::Long,
//!     ))
//!     .filter(Expr::matches(Expr::ident("uri"), "^/api"))
//!     .group_by(["appName"]);
//! let rows = engine.select_rows(&query).await?;
//! ```
//!
//! ## Dialects
//!
//! - `clickhouse`: backtick identifiers, native string predicates in place of
//!   simple regexes, merge combinators for pre-aggregated columns
//! - `generic`: ANSI-style SQL with no rewrites

pub mod backend;
pub mod column;
pub mod config;
pub mod dialect;
pub mod engine;
mod error;
pub mod expr;
mod key;
pub mod metrics;
pub mod optimizer;
pub mod planner;
pub mod query;
pub mod schema;
pub mod sql;
pub mod step;
pub mod table;
pub mod value;
pub mod window;

pub use backend::{BackendRow, CursorGuard, MemoryBackend, QueryBackend, RowCursor};
pub use column::{
    Column, ColumnBuilder, ColumnExt, ColumnRef, ColumnView, DoubleColumn, LongColumn, StringColumn,
};
pub use config::QueryConfig;
pub use dialect::{dialect_for_name, ClickHouseDialect, GenericDialect, SqlDialect};
pub use engine::QueryEngine;
pub use error::QueryError;
pub use expr::{ComparisonOp, Expr, LogicalOp, WindowSpec};
pub use key::CompositeKey;
pub use planner::{Planner, QueryPlan};
pub use query::{Interval, Limit, OrderBy, Query, Selector, SortDirection};
pub use schema::{AggregateKind, ColumnSpec, Schema};
pub use step::{QueryStep, StepResult};
pub use table::{ColumnarTable, ResultFormat};
pub use value::{DataType, Value};
pub use window::SlidingWindow;

/// Result type for query pipeline operations
pub type Result<T> = std::result::Result<T, QueryError>;
