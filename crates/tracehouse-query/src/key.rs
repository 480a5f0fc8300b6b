//! Composite group keys

use crate::column::ColumnRef;
use crate::value::{DataType, Value};

/// Values of the grouping columns at one row. Used only to detect group
/// boundaries while streaming over sorted rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CompositeKey(Vec<Value>);

impl CompositeKey {
    pub fn from_row(columns: &[ColumnRef], row: usize) -> Self {
        CompositeKey(columns.iter().map(|c| c.get_value(row)).collect())
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Compare against a row without allocating a new key.
    pub fn matches_row(&self, columns: &[ColumnRef], row: usize) -> bool {
        self.0.len() == columns.len()
            && self
                .0
                .iter()
                .zip(columns)
                .all(|(value, column)| value_matches(value, column, row))
    }
}

fn value_matches(value: &Value, column: &ColumnRef, row: usize) -> bool {
    match (value, column.data_type()) {
        (Value::String(expected), DataType::String) => {
            column.get_string(row).map_or(false, |actual| actual == expected)
        }
        (_, DataType::String) => false,
        // numeric values are Copy
        _ => *value == column.get_value(row),
    }
}
