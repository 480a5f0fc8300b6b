//! Query Configuration
//!
//! ## QueryConfig
//!
//! Controls how queries are rendered and how much data a read may pull:
//!
//! - **dialect**: SQL dialect of the backend, `clickhouse` or `generic` (default: clickhouse)
//! - **max_rows**: Upper bound on rows decoded by a single read (default: 100,000)
//! - **initial_column_capacity**: Rows preallocated per output column (default: 1024)
//! - **enable_optimizer**: Apply dialect expression rewrites (default: true)
//!
//! ## Usage
//!
//! ```ignore
//! use tracehouse_query::QueryConfig;
//!
//! let config = QueryConfig {
//!     dialect: "generic".to_string(),
//!     max_rows: 10_000,
//!     ..Default::default()
//! };
//!
//! // Or from TRACEHOUSE_QUERY_* environment variables
//! let config = QueryConfig::from_env()?;
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// SQL dialect name (default: clickhouse)
    #[serde(default = "default_dialect")]
    pub dialect: String,

    /// Maximum rows decoded by one read step (default: 100,000)
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Initial capacity of freshly allocated output columns (default: 1024)
    #[serde(default = "default_column_capacity")]
    pub initial_column_capacity: usize,

    /// Run dialect rewrites before rendering (default: true)
    #[serde(default = "default_enable_optimizer")]
    pub enable_optimizer: bool,
}

fn default_dialect() -> String {
    "clickhouse".to_string()
}

fn default_max_rows() -> usize {
    100_000
}

fn default_column_capacity() -> usize {
    1024
}

fn default_enable_optimizer() -> bool {
    true
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            dialect: default_dialect(),
            max_rows: default_max_rows(),
            initial_column_capacity: default_column_capacity(),
            enable_optimizer: default_enable_optimizer(),
        }
    }
}

impl QueryConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(dialect) = lookup("TRACEHOUSE_QUERY_DIALECT") {
            config.dialect = dialect;
        }
        if let Some(raw) = lookup("TRACEHOUSE_QUERY_MAX_ROWS") {
            config.max_rows = parse("TRACEHOUSE_QUERY_MAX_ROWS", &raw)?;
        }
        if let Some(raw) = lookup("TRACEHOUSE_QUERY_COLUMN_CAPACITY") {
            config.initial_column_capacity = parse("TRACEHOUSE_QUERY_COLUMN_CAPACITY", &raw)?;
        }
        if let Some(raw) = lookup("TRACEHOUSE_QUERY_OPTIMIZER") {
            config.enable_optimizer = match raw.to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(QueryError::Config(format!(
                        "TRACEHOUSE_QUERY_OPTIMIZER must be true or false, got '{}'",
                        raw
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_rows == 0 {
            return Err(QueryError::Config("max_rows must be positive".to_string()));
        }
        crate::dialect::dialect_for_name(&self.dialect)?;
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| QueryError::Config(format!("Invalid {} '{}': {}", key, raw, e)))
}
