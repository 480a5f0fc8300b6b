//! Typed, append-only column vectors
//!
//! Three physical representations exist, one per primitive category:
//! [`LongColumn`] (also used for epoch-millisecond datetimes), [`DoubleColumn`]
//! and [`StringColumn`]. They are filled through a [`ColumnBuilder`] and then
//! frozen into a shared, read-only [`ColumnRef`].
//!
//! A [`ColumnView`] re-indexes a frozen column without copying: view row `i`
//! reads backing row `selections[i]`. The view holds its own reference to the
//! backing column, so the backing data cannot be resized underneath it.
//!
//! Reading a row outside `[0, size)` panics; it is a programming error.

use std::fmt;
use std::sync::Arc;

use crate::error::QueryError;
use crate::value::{DataType, Value};
use crate::Result;

/// Shared handle to a frozen column.
pub type ColumnRef = Arc<dyn Column>;

/// Read access shared by physical columns and views.
pub trait Column: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn data_type(&self) -> DataType;

    /// Number of readable rows.
    fn size(&self) -> usize;

    fn get_long(&self, row: usize) -> Result<i64>;

    fn get_double(&self, row: usize) -> Result<f64>;

    fn get_string(&self, row: usize) -> Result<&str>;

    fn get_value(&self, row: usize) -> Value;

    /// Compact into a new physical column holding only the rows whose mask
    /// bit is set, in their original order. Rows past the end of `mask` are
    /// dropped.
    fn filter(&self, mask: &[bool]) -> ColumnRef;

    /// Gather the given rows, in the given order, into a new physical column.
    fn take(&self, rows: &[usize]) -> ColumnRef;

    /// Copy of this column under a different name.
    fn renamed(&self, name: &str) -> ColumnRef;
}

/// Extension methods on shared column handles.
pub trait ColumnExt {
    /// Zero-copy re-indexing over the first `length` entries of `selections`.
    fn view(&self, selections: Arc<[usize]>, length: usize) -> ColumnRef;
}

impl ColumnExt for ColumnRef {
    fn view(&self, selections: Arc<[usize]>, length: usize) -> ColumnRef {
        Arc::new(ColumnView::new(self.clone(), selections, length))
    }
}

fn unsupported(column: &str, data_type: DataType, accessor: &str) -> QueryError {
    QueryError::UnsupportedOperation(format!(
        "{} on {} column '{}'",
        accessor, data_type, column
    ))
}

/// Append with explicit growth: when full, capacity grows by half of itself
/// (at least one slot), so the backing buffer never shrinks.
fn push_grow<T>(values: &mut Vec<T>, value: T) {
    if values.len() == values.capacity() {
        let extra = (values.capacity() / 2).max(1);
        values.reserve_exact(extra);
    }
    values.push(value);
}

fn kept_rows(mask: &[bool]) -> impl Iterator<Item = usize> + '_ {
    mask.iter()
        .enumerate()
        .filter_map(|(row, keep)| keep.then_some(row))
}

// ---------------------------------------------------------------------------
// LongColumn
// ---------------------------------------------------------------------------

/// 64-bit integer column. Also backs [`DataType::DateTimeMilli`].
#[derive(Debug, Clone)]
pub struct LongColumn {
    name: String,
    data_type: DataType,
    values: Vec<i64>,
}

impl LongColumn {
    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Long,
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn datetime(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            data_type: DataType::DateTimeMilli,
            ..Self::with_capacity(name, capacity)
        }
    }

    pub fn from_values(name: impl Into<String>, values: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Long,
            values,
        }
    }

    pub fn capacity(&self) -> usize {
        self.values.capacity()
    }

    pub fn add_long(&mut self, value: i64) {
        push_grow(&mut self.values, value);
    }

    /// Doubles are truncated toward zero.
    pub fn add_double(&mut self, value: f64) {
        push_grow(&mut self.values, value as i64);
    }

    pub fn add_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.add_long(0),
            Value::Long(v) => self.add_long(*v),
            Value::Double(v) => self.add_double(*v),
            Value::String(s) => {
                let parsed = self.parse_string(s)?;
                self.add_long(parsed);
            }
        }
        Ok(())
    }

    fn parse_string(&self, s: &str) -> Result<i64> {
        if let Ok(v) = s.trim().parse::<i64>() {
            return Ok(v);
        }
        if self.data_type == DataType::DateTimeMilli {
            if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(s.trim()) {
                return Ok(ts.timestamp_millis());
            }
        }
        Err(QueryError::InvalidValue {
            column: self.name.clone(),
            expected: self.data_type.to_string(),
            actual: format!("'{}'", s),
        })
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    fn with_values(&self, name: &str, values: Vec<i64>) -> ColumnRef {
        Arc::new(LongColumn {
            name: name.to_string(),
            data_type: self.data_type,
            values,
        })
    }
}

impl Column for LongColumn {
    fn name(&self) -> &str {
        &self.name
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn size(&self) -> usize {
        self.values.len()
    }

    fn get_long(&self, row: usize) -> Result<i64> {
        Ok(self.values[row])
    }

    fn get_double(&self, row: usize) -> Result<f64> {
        Ok(self.values[row] as f64)
    }

    fn get_string(&self, _row: usize) -> Result<&str> {
        Err(unsupported(&self.name, self.data_type, "get_string"))
    }

    fn get_value(&self, row: usize) -> Value {
        Value::Long(self.values[row])
    }

    fn filter(&self, mask: &[bool]) -> ColumnRef {
        let values = kept_rows(mask).map(|row| self.values[row]).collect();
        self.with_values(&self.name, values)
    }

    fn take(&self, rows: &[usize]) -> ColumnRef {
        let values = rows.iter().map(|&row| self.values[row]).collect();
        self.with_values(&self.name, values)
    }

    fn renamed(&self, name: &str) -> ColumnRef {
        self.with_values(name, self.values.clone())
    }
}

// ---------------------------------------------------------------------------
// DoubleColumn
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DoubleColumn {
    name: String,
    values: Vec<f64>,
}

impl DoubleColumn {
    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn from_values(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn capacity(&self) -> usize {
        self.values.capacity()
    }

    pub fn add_long(&mut self, value: i64) {
        push_grow(&mut self.values, value as f64);
    }

    pub fn add_double(&mut self, value: f64) {
        push_grow(&mut self.values, value);
    }

    pub fn add_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.add_double(0.0),
            Value::Long(v) => self.add_long(*v),
            Value::Double(v) => self.add_double(*v),
            Value::String(s) => {
                let parsed = s.trim().parse::<f64>().map_err(|_| QueryError::InvalidValue {
                    column: self.name.clone(),
                    expected: DataType::Double.to_string(),
                    actual: format!("'{}'", s),
                })?;
                self.add_double(parsed);
            }
        }
        Ok(())
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl Column for DoubleColumn {
    fn name(&self) -> &str {
        &self.name
    }

    fn data_type(&self) -> DataType {
        DataType::Double
    }

    fn size(&self) -> usize {
        self.values.len()
    }

    fn get_long(&self, row: usize) -> Result<i64> {
        Ok(self.values[row] as i64)
    }

    fn get_double(&self, row: usize) -> Result<f64> {
        Ok(self.values[row])
    }

    fn get_string(&self, _row: usize) -> Result<&str> {
        Err(unsupported(&self.name, DataType::Double, "get_string"))
    }

    fn get_value(&self, row: usize) -> Value {
        Value::Double(self.values[row])
    }

    fn filter(&self, mask: &[bool]) -> ColumnRef {
        let values = kept_rows(mask).map(|row| self.values[row]).collect();
        Arc::new(DoubleColumn::from_values(self.name.clone(), values))
    }

    fn take(&self, rows: &[usize]) -> ColumnRef {
        let values = rows.iter().map(|&row| self.values[row]).collect();
        Arc::new(DoubleColumn::from_values(self.name.clone(), values))
    }

    fn renamed(&self, name: &str) -> ColumnRef {
        Arc::new(DoubleColumn::from_values(name, self.values.clone()))
    }
}

// ---------------------------------------------------------------------------
// StringColumn
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StringColumn {
    name: String,
    values: Vec<String>,
}

impl StringColumn {
    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn from_values<S: Into<String>>(name: impl Into<String>, values: Vec<S>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.values.capacity()
    }

    pub fn add_string(&mut self, value: impl Into<String>) {
        push_grow(&mut self.values, value.into());
    }

    /// Any value is accepted and stringified; NULL becomes the empty string.
    pub fn add_value(&mut self, value: &Value) {
        match value {
            Value::Null => self.add_string(String::new()),
            Value::String(s) => self.add_string(s.as_str()),
            Value::Long(v) => self.add_string(v.to_string()),
            Value::Double(v) => self.add_string(v.to_string()),
        }
    }
}

impl Column for StringColumn {
    fn name(&self) -> &str {
        &self.name
    }

    fn data_type(&self) -> DataType {
        DataType::String
    }

    fn size(&self) -> usize {
        self.values.len()
    }

    fn get_long(&self, _row: usize) -> Result<i64> {
        Err(unsupported(&self.name, DataType::String, "get_long"))
    }

    fn get_double(&self, _row: usize) -> Result<f64> {
        Err(unsupported(&self.name, DataType::String, "get_double"))
    }

    fn get_string(&self, row: usize) -> Result<&str> {
        Ok(&self.values[row])
    }

    fn get_value(&self, row: usize) -> Value {
        Value::String(self.values[row].clone())
    }

    fn filter(&self, mask: &[bool]) -> ColumnRef {
        let values: Vec<String> = kept_rows(mask).map(|row| self.values[row].clone()).collect();
        Arc::new(StringColumn::from_values(self.name.clone(), values))
    }

    fn take(&self, rows: &[usize]) -> ColumnRef {
        let values: Vec<String> = rows.iter().map(|&row| self.values[row].clone()).collect();
        Arc::new(StringColumn::from_values(self.name.clone(), values))
    }

    fn renamed(&self, name: &str) -> ColumnRef {
        Arc::new(StringColumn::from_values(name, self.values.clone()))
    }
}

// ---------------------------------------------------------------------------
// ColumnView
// ---------------------------------------------------------------------------

/// Logical re-indexing of a backing column.
#[derive(Debug, Clone)]
pub struct ColumnView {
    backing: ColumnRef,
    selections: Arc<[usize]>,
    length: usize,
}

impl ColumnView {
    /// `length` must not exceed `selections.len()`.
    pub fn new(backing: ColumnRef, selections: Arc<[usize]>, length: usize) -> Self {
        assert!(
            length <= selections.len(),
            "view length {} exceeds {} selections",
            length,
            selections.len()
        );
        Self {
            backing,
            selections,
            length,
        }
    }

    #[inline]
    fn backing_row(&self, row: usize) -> usize {
        assert!(row < self.length, "row {} out of range [0, {})", row, self.length);
        self.selections[row]
    }
}

impl Column for ColumnView {
    fn name(&self) -> &str {
        self.backing.name()
    }

    fn data_type(&self) -> DataType {
        self.backing.data_type()
    }

    fn size(&self) -> usize {
        self.length
    }

    fn get_long(&self, row: usize) -> Result<i64> {
        self.backing.get_long(self.backing_row(row))
    }

    fn get_double(&self, row: usize) -> Result<f64> {
        self.backing.get_double(self.backing_row(row))
    }

    fn get_string(&self, row: usize) -> Result<&str> {
        self.backing.get_string(self.backing_row(row))
    }

    fn get_value(&self, row: usize) -> Value {
        self.backing.get_value(self.backing_row(row))
    }

    /// The mask is expressed in view rows; it is translated into backing rows
    /// before delegating, so the result follows the view's order.
    fn filter(&self, mask: &[bool]) -> ColumnRef {
        let rows: Vec<usize> = kept_rows(mask)
            .map(|row| self.backing_row(row))
            .collect();
        self.backing.take(&rows)
    }

    fn take(&self, rows: &[usize]) -> ColumnRef {
        let rows: Vec<usize> = rows.iter().map(|&row| self.backing_row(row)).collect();
        self.backing.take(&rows)
    }

    fn renamed(&self, name: &str) -> ColumnRef {
        let all: Vec<usize> = (0..self.length).map(|row| self.selections[row]).collect();
        self.backing.take(&all).renamed(name)
    }
}

// ---------------------------------------------------------------------------
// ColumnBuilder
// ---------------------------------------------------------------------------

/// Mutable column under construction, selected by declared type.
#[derive(Debug, Clone)]
pub enum ColumnBuilder {
    Long(LongColumn),
    Double(DoubleColumn),
    String(StringColumn),
}

impl ColumnBuilder {
    /// Pick the physical representation for a declared type.
    pub fn create(name: &str, data_type: DataType, initial_capacity: usize) -> Result<Self> {
        match data_type {
            DataType::Long => Ok(ColumnBuilder::Long(LongColumn::with_capacity(name, initial_capacity))),
            DataType::DateTimeMilli => Ok(ColumnBuilder::Long(LongColumn::datetime(name, initial_capacity))),
            DataType::Double => Ok(ColumnBuilder::Double(DoubleColumn::with_capacity(name, initial_capacity))),
            DataType::String => Ok(ColumnBuilder::String(StringColumn::with_capacity(name, initial_capacity))),
            DataType::Boolean => Err(QueryError::UnsupportedType(format!(
                "{} (column '{}')",
                data_type, name
            ))),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ColumnBuilder::Long(c) => c.name(),
            ColumnBuilder::Double(c) => c.name(),
            ColumnBuilder::String(c) => c.name(),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            ColumnBuilder::Long(c) => c.size(),
            ColumnBuilder::Double(c) => c.size(),
            ColumnBuilder::String(c) => c.size(),
        }
    }

    pub fn capacity(&self) -> usize {
        match self {
            ColumnBuilder::Long(c) => c.capacity(),
            ColumnBuilder::Double(c) => c.capacity(),
            ColumnBuilder::String(c) => c.capacity(),
        }
    }

    pub fn add_long(&mut self, value: i64) {
        match self {
            ColumnBuilder::Long(c) => c.add_long(value),
            ColumnBuilder::Double(c) => c.add_long(value),
            ColumnBuilder::String(c) => c.add_string(value.to_string()),
        }
    }

    pub fn add_double(&mut self, value: f64) {
        match self {
            ColumnBuilder::Long(c) => c.add_double(value),
            ColumnBuilder::Double(c) => c.add_double(value),
            ColumnBuilder::String(c) => c.add_string(value.to_string()),
        }
    }

    pub fn add_string(&mut self, value: &str) -> Result<()> {
        self.add_value(&Value::String(value.to_string()))
    }

    pub fn add_value(&mut self, value: &Value) -> Result<()> {
        match self {
            ColumnBuilder::Long(c) => c.add_value(value),
            ColumnBuilder::Double(c) => c.add_value(value),
            ColumnBuilder::String(c) => {
                c.add_value(value);
                Ok(())
            }
        }
    }

    pub fn finish(self) -> ColumnRef {
        match self {
            ColumnBuilder::Long(c) => Arc::new(c),
            ColumnBuilder::Double(c) => Arc::new(c),
            ColumnBuilder::String(c) => Arc::new(c),
        }
    }
}
