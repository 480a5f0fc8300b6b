//! Query error types
//!
//! Errors fall into three groups:
//!
//! - **Build errors** are raised while turning a [`Query`](crate::Query) into
//!   SQL, before anything is sent to the backend. They are permanent.
//! - **Data errors** are raised at the append call site when a value does not
//!   fit the declared column type.
//! - **Execution errors** come from the backend or the worker pool and carry
//!   the backend's diagnostic text unmodified.

use thiserror::Error;

/// Query pipeline errors
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unknown identifier '{identifier}' in schema '{schema}'")]
    UnknownIdentifier { identifier: String, schema: String },

    #[error("Duplicate output name: {0}")]
    DuplicateOutputName(String),

    #[error("Only one window function is supported per query, found: {0}")]
    MultipleWindowFunctions(String),

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Unsupported column type: {0}")]
    UnsupportedType(String),

    #[error("Invalid value for column '{column}': expected {expected}, got {actual}")]
    InvalidValue {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Column '{column}' has {actual} rows, table has {expected}")]
    ColumnSizeMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Column already exists: {0}")]
    DuplicateColumn(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Result too large: more than {0} rows")]
    ResultTooLarge(usize),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Worker task failed: {0}")]
    Join(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "arrow")]
    #[error("Arrow error: {0}")]
    Arrow(String),
}

impl QueryError {
    /// Whether the error was raised while building the query, before any SQL
    /// was issued. Such errors are never worth retrying.
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            QueryError::UnknownIdentifier { .. }
                | QueryError::DuplicateOutputName(_)
                | QueryError::MultipleWindowFunctions(_)
                | QueryError::InvalidExpression(_)
                | QueryError::UnsupportedType(_)
                | QueryError::Config(_)
        )
    }

    /// Short label used for the `kind` metric dimension.
    pub fn kind(&self) -> &'static str {
        if self.is_build_error() {
            return "build";
        }
        match self {
            QueryError::InvalidValue { .. }
            | QueryError::UnsupportedOperation(_)
            | QueryError::ColumnSizeMismatch { .. }
            | QueryError::DuplicateColumn(_)
            | QueryError::ColumnNotFound(_) => "data",
            QueryError::Cancelled => "cancelled",
            _ => "execution",
        }
    }
}

impl From<tokio::task::JoinError> for QueryError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            QueryError::Cancelled
        } else {
            QueryError::Join(e.to_string())
        }
    }
}
