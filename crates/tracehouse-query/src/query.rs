//! Abstract query descriptor

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::schema::Schema;
use crate::table::ResultFormat;
use crate::value::DataType;

/// One output column: an expression, the name it is returned under, and its
/// declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    pub output: String,
    pub expr: Expr,
    pub data_type: DataType,
}

impl Selector {
    pub fn new(output: impl Into<String>, expr: Expr, data_type: DataType) -> Self {
        Self {
            output: output.into(),
            expr,
            data_type,
        }
    }

    /// Select a column under its own name.
    pub fn column(name: &str, data_type: DataType) -> Self {
        Self::new(name, Expr::ident(name), data_type)
    }
}

/// Half-open time range `[start, end)` with an optional bucket step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_ms: Option<i64>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            step_ms: None,
        }
    }

    pub fn with_step_ms(mut self, step_ms: i64) -> Self {
        self.step_ms = Some(step_ms);
        self
    }

    /// Start floored to the step, then widened backwards by `lookback_ms`.
    /// Every row at or after the floored start sees `lookback_ms` of history.
    /// `None` when the widened start leaves the representable range.
    pub fn extend_back(&self, lookback_ms: i64) -> Option<Interval> {
        let start = self
            .start_floored_ms()
            .checked_sub(lookback_ms)
            .and_then(DateTime::from_timestamp_millis)?;
        Some(Interval { start, ..*self })
    }

    /// Start floored to the step, in epoch milliseconds. Without a step the
    /// start itself is returned.
    pub fn start_floored_ms(&self) -> i64 {
        match self.step_ms {
            Some(step) if step > 0 => {
                let ms = self.start.timestamp_millis();
                ms - ms.rem_euclid(step)
            }
            _ => self.start.timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

/// Backend-agnostic query against one schema.
#[derive(Debug, Clone)]
pub struct Query {
    pub schema: Arc<Schema>,
    pub selectors: Vec<Selector>,
    pub filter: Option<Expr>,
    pub interval: Interval,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<Limit>,
    pub result_format: ResultFormat,
}

impl Query {
    pub fn new(schema: Arc<Schema>, interval: Interval) -> Self {
        Self {
            schema,
            selectors: Vec::new(),
            filter: None,
            interval,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            result_format: ResultFormat::default(),
        }
    }

    pub fn select(mut self, selector: Selector) -> Self {
        self.selectors.push(selector);
        self
    }

    pub fn filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn group_by<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.group_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(Limit { limit, offset });
        self
    }

    pub fn result_format(mut self, format: ResultFormat) -> Self {
        self.result_format = format;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_start_floored_to_step() {
        let start = Utc.timestamp_millis_opt(125_000).unwrap();
        let end = Utc.timestamp_millis_opt(300_000).unwrap();
        let interval = Interval::new(start, end).with_step_ms(60_000);
        assert_eq!(interval.start_floored_ms(), 120_000);
        assert_eq!(Interval::new(start, end).start_floored_ms(), 125_000);
    }

    #[test]
    fn test_extend_back() {
        let start = Utc.timestamp_millis_opt(125_000).unwrap();
        let end = Utc.timestamp_millis_opt(300_000).unwrap();
        let widened = Interval::new(start, end).extend_back(5_000).unwrap();
        assert_eq!(widened.start.timestamp_millis(), 120_000);
        assert_eq!(widened.end, end);
    }

    #[test]
    fn test_extend_back_starts_from_floored_start() {
        let start = Utc.timestamp_millis_opt(90_000).unwrap();
        let end = Utc.timestamp_millis_opt(300_000).unwrap();
        let widened = Interval::new(start, end)
            .with_step_ms(60_000)
            .extend_back(60_000)
            .unwrap();
        assert_eq!(widened.start.timestamp_millis(), 0);
        assert_eq!(widened.step_ms, Some(60_000));
    }

    #[test]
    fn test_extend_back_out_of_range() {
        let start = Utc.timestamp_millis_opt(90_000).unwrap();
        let end = Utc.timestamp_millis_opt(300_000).unwrap();
        assert_eq!(Interval::new(start, end).extend_back(i64::MAX / 2), None);
        assert_eq!(Interval::new(start, end).extend_back(i64::MAX), None);
    }
}
